use anyhow::{Context, Result, anyhow};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};

pub const FONT_PATTERNS: &[&str] = &["*.ttf", "*.otf"];
pub const IMAGE_PATTERNS: &[&str] = &["*.jpg", "*.jpeg", "*.png", "*.bmp", "*.webp"];

const HOME_DIR_NAME: &str = ".manga-localizer";
const TRANSLATED_DIR: &str = "translated";

/// Regular files directly inside `dir` whose names match one of `patterns`
/// (case-insensitive), sorted by file name.
pub fn list_files_matching(dir: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let matcher = build_matcher(patterns)?;
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        if matcher.is_match(name) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn build_matcher(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .literal_separator(true)
            .build()
            .map_err(|err| anyhow!("invalid file pattern '{}': {}", pattern, err))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|err| anyhow!("failed to build file matcher: {}", err))
}

/// `~/.manga-localizer`, when `HOME` is set.
pub(crate) fn home_dir() -> Option<PathBuf> {
    home_join(HOME_DIR_NAME)
}

pub fn translated_dir(chapter_dir: &Path) -> PathBuf {
    chapter_dir.join(TRANSLATED_DIR)
}

pub fn cleaned_path(translated_dir: &Path, file_name: &str) -> PathBuf {
    translated_dir.join(format!("cleaned_{}", file_name))
}

pub fn final_path(translated_dir: &Path, file_name: &str) -> PathBuf {
    translated_dir.join(format!("final_{}", file_name))
}

/// Debug overlays are always PNG, whatever the source format.
pub fn groups_path(translated_dir: &Path, file_name: &str) -> PathBuf {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(file_name);
    translated_dir.join(format!("groups_{}.png", stem))
}

/// Page title turned into a folder name: characters invalid on common filesystems are
/// dropped and surrounding whitespace trimmed.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .filter(|ch| !matches!(ch, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

pub(crate) fn expand_tilde(value: &str) -> PathBuf {
    let trimmed = value.trim();
    if trimmed == "~" || trimmed.starts_with("~/") {
        if let Some(home) = home_env() {
            if trimmed == "~" {
                return home;
            }
            return home.join(&trimmed[2..]);
        }
    }
    PathBuf::from(trimmed)
}

fn home_join(suffix: &str) -> Option<PathBuf> {
    home_env().map(|home| home.join(suffix))
}

fn home_env() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(PathBuf::from(home))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_images_case_insensitively_in_name_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["image_002.PNG", "image_001.jpg", "notes.md", "image_003.webp"] {
            std::fs::write(dir.path().join(name), b"x").expect("write");
        }
        std::fs::create_dir(dir.path().join("translated.png")).expect("mkdir");
        let files = list_files_matching(dir.path(), IMAGE_PATTERNS).expect("list");
        let names: Vec<_> = files
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["image_001.jpg", "image_002.PNG", "image_003.webp"]);
    }

    #[test]
    fn missing_dir_is_an_error() {
        assert!(list_files_matching(Path::new("no/such/dir"), IMAGE_PATTERNS).is_err());
    }

    #[test]
    fn output_names_follow_source_name() {
        let dir = translated_dir(Path::new("chapter"));
        assert_eq!(dir, Path::new("chapter/translated"));
        assert_eq!(
            cleaned_path(&dir, "image_001.jpg"),
            Path::new("chapter/translated/cleaned_image_001.jpg")
        );
        assert_eq!(
            final_path(&dir, "image_001.jpg"),
            Path::new("chapter/translated/final_image_001.jpg")
        );
        assert_eq!(
            groups_path(&dir, "image_001.jpg"),
            Path::new("chapter/translated/groups_image_001.png")
        );
    }

    #[test]
    fn title_loses_reserved_characters() {
        assert_eq!(
            sanitize_title("  Chapter 1: \"Start\" <Part/2>? * | \\ "),
            "Chapter 1 Start Part2"
        );
    }
}
