use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::grouping::GroupingConfig;
use crate::mapping::OutputFormat;
use crate::ocr::OcrEngineKind;
use crate::paths;
use crate::providers::ProviderKind;
use crate::typeset::{DEFAULT_MAX_FONT_SIZE, DEFAULT_MIN_FONT_SIZE, FontSizing};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub grouping: GroupingConfig,
    pub typeset: TypesetSettings,
    pub inpaint: InpaintSettings,
    pub translate: TranslateSettings,
    pub ocr: OcrSettings,
    pub scraper: ScraperSettings,
}

#[derive(Debug, Clone)]
pub struct TypesetSettings {
    pub min_font_size: u32,
    pub max_font_size: u32,
    pub font_size: Option<u32>,
    pub padding: i32,
    pub font: Option<String>,
    pub fonts_dir: PathBuf,
    pub font_family: Option<String>,
    pub text_color: String,
}

impl Default for TypesetSettings {
    fn default() -> Self {
        Self {
            min_font_size: DEFAULT_MIN_FONT_SIZE,
            max_font_size: DEFAULT_MAX_FONT_SIZE,
            font_size: None,
            padding: 0,
            font: None,
            fonts_dir: PathBuf::from("fonts"),
            font_family: None,
            text_color: "#000000".to_string(),
        }
    }
}

impl TypesetSettings {
    pub fn sizing(&self) -> FontSizing {
        match self.font_size {
            Some(size) => FontSizing::Fixed(size),
            None => FontSizing::Auto {
                min: self.min_font_size,
                max: self.max_font_size,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct InpaintSettings {
    pub radius: u32,
    pub dilation_iterations: u32,
}

impl Default for InpaintSettings {
    fn default() -> Self {
        Self {
            radius: 3,
            dilation_iterations: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranslateSettings {
    pub model: String,
    pub base_url: Option<String>,
    pub provider: ProviderKind,
    pub ollama_host: String,
    pub format: OutputFormat,
    pub target_language: String,
    pub source_language: String,
    pub prompt: Option<String>,
}

impl Default for TranslateSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            provider: ProviderKind::OpenAi,
            ollama_host: "http://localhost:11434".to_string(),
            format: OutputFormat::Keyed,
            target_language: "Thai".to_string(),
            source_language: "auto".to_string(),
            prompt: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub engine: OcrEngineKind,
    pub languages: String,
    pub psm: u32,
    pub json_dir: Option<PathBuf>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: OcrEngineKind::Tesseract,
            languages: "eng".to_string(),
            psm: 6,
            json_dir: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub selector: String,
    pub user_agent: String,
    pub output_dir: PathBuf,
    pub scroll_pause_secs: u64,
    pub initial_wait_secs: u64,
    pub scroll_step_px: u32,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            selector: "img".to_string(),
            user_agent: concat!("manga-localizer/", env!("CARGO_PKG_VERSION")).to_string(),
            output_dir: PathBuf::from("output_scraper"),
            scroll_pause_secs: 5,
            initial_wait_secs: 5,
            scroll_step_px: 5000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    grouping: Option<GroupingFile>,
    typeset: Option<TypesetFile>,
    inpaint: Option<InpaintFile>,
    translate: Option<TranslateFile>,
    ocr: Option<OcrFile>,
    scraper: Option<ScraperFile>,
}

#[derive(Debug, Default, Deserialize)]
struct GroupingFile {
    x_threshold: Option<f32>,
    y_threshold: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct TypesetFile {
    min_font_size: Option<u32>,
    max_font_size: Option<u32>,
    font_size: Option<u32>,
    padding: Option<i32>,
    font: Option<String>,
    fonts_dir: Option<String>,
    font_family: Option<String>,
    text_color: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct InpaintFile {
    radius: Option<u32>,
    dilation_iterations: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TranslateFile {
    model: Option<String>,
    base_url: Option<String>,
    provider: Option<String>,
    ollama_host: Option<String>,
    format: Option<String>,
    target_language: Option<String>,
    source_language: Option<String>,
    prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrFile {
    engine: Option<String>,
    languages: Option<String>,
    psm: Option<u32>,
    json_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ScraperFile {
    selector: Option<String>,
    user_agent: Option<String>,
    output_dir: Option<String>,
    scroll_pause_secs: Option<u64>,
    initial_wait_secs: Option<u64>,
    scroll_step_px: Option<u32>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = paths::home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            settings
                .merge_toml(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
        }
    }

    settings.validate()?;
    Ok(settings)
}

impl Settings {
    pub fn merge_toml(&mut self, content: &str) -> Result<()> {
        let parsed: SettingsFile = toml::from_str(content)?;
        self.merge(parsed)
    }

    /// Rejects combinations that would only fail halfway through a chapter.
    pub fn validate(&self) -> Result<()> {
        if self.typeset.min_font_size > self.typeset.max_font_size {
            return Err(anyhow!(
                "typeset.min_font_size ({}) is larger than typeset.max_font_size ({})",
                self.typeset.min_font_size,
                self.typeset.max_font_size
            ));
        }
        if self.translate.model.trim().is_empty() {
            return Err(anyhow!("translate.model must not be empty"));
        }
        if self.grouping.x_threshold < 0.0 || self.grouping.y_threshold < 0.0 {
            return Err(anyhow!("grouping thresholds must not be negative"));
        }
        if self.ocr.engine == OcrEngineKind::PaddleJson && self.ocr.json_dir.is_none() {
            return Err(anyhow!("ocr.json_dir is required for the paddle-json engine"));
        }
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) -> Result<()> {
        if let Some(grouping) = incoming.grouping {
            if let Some(value) = grouping.x_threshold {
                self.grouping.x_threshold = value;
            }
            if let Some(value) = grouping.y_threshold {
                self.grouping.y_threshold = value;
            }
        }
        if let Some(typeset) = incoming.typeset {
            self.merge_typeset(typeset);
        }
        if let Some(inpaint) = incoming.inpaint {
            if let Some(radius) = inpaint.radius.filter(|value| *value > 0) {
                self.inpaint.radius = radius;
            }
            if let Some(iterations) = inpaint.dilation_iterations {
                self.inpaint.dilation_iterations = iterations;
            }
        }
        if let Some(translate) = incoming.translate {
            self.merge_translate(translate)?;
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(engine) = non_blank(ocr.engine) {
                self.ocr.engine = OcrEngineKind::parse(&engine)
                    .ok_or_else(|| anyhow!("unknown ocr engine '{}'", engine))?;
            }
            if let Some(languages) = non_blank(ocr.languages) {
                self.ocr.languages = languages;
            }
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
            if let Some(dir) = non_blank(ocr.json_dir) {
                self.ocr.json_dir = Some(paths::expand_tilde(&dir));
            }
        }
        if let Some(scraper) = incoming.scraper {
            if let Some(selector) = non_blank(scraper.selector) {
                self.scraper.selector = selector;
            }
            if let Some(agent) = non_blank(scraper.user_agent) {
                self.scraper.user_agent = agent;
            }
            if let Some(dir) = non_blank(scraper.output_dir) {
                self.scraper.output_dir = paths::expand_tilde(&dir);
            }
            if let Some(secs) = scraper.scroll_pause_secs {
                self.scraper.scroll_pause_secs = secs;
            }
            if let Some(secs) = scraper.initial_wait_secs {
                self.scraper.initial_wait_secs = secs;
            }
            if let Some(step) = scraper.scroll_step_px.filter(|value| *value > 0) {
                self.scraper.scroll_step_px = step;
            }
        }
        Ok(())
    }

    fn merge_typeset(&mut self, typeset: TypesetFile) {
        if let Some(size) = typeset.min_font_size.filter(|value| *value > 0) {
            self.typeset.min_font_size = size;
        }
        if let Some(size) = typeset.max_font_size.filter(|value| *value > 0) {
            self.typeset.max_font_size = size;
        }
        if let Some(size) = typeset.font_size.filter(|value| *value > 0) {
            self.typeset.font_size = Some(size);
        }
        if let Some(padding) = typeset.padding.filter(|value| *value >= 0) {
            self.typeset.padding = padding;
        }
        if let Some(font) = non_blank(typeset.font) {
            self.typeset.font = Some(font);
        }
        if let Some(dir) = non_blank(typeset.fonts_dir) {
            self.typeset.fonts_dir = paths::expand_tilde(&dir);
        }
        if let Some(family) = non_blank(typeset.font_family) {
            self.typeset.font_family = Some(family);
        }
        if let Some(color) = non_blank(typeset.text_color) {
            self.typeset.text_color = color;
        }
    }

    fn merge_translate(&mut self, translate: TranslateFile) -> Result<()> {
        if let Some(model) = non_blank(translate.model) {
            self.translate.model = model;
        }
        if let Some(url) = non_blank(translate.base_url) {
            self.translate.base_url = Some(url);
        }
        if let Some(provider) = non_blank(translate.provider) {
            self.translate.provider = ProviderKind::parse(&provider)
                .ok_or_else(|| anyhow!("unknown translation provider '{}'", provider))?;
        }
        if let Some(host) = non_blank(translate.ollama_host) {
            self.translate.ollama_host = host;
        }
        if let Some(format) = non_blank(translate.format) {
            self.translate.format = OutputFormat::parse(&format)
                .ok_or_else(|| anyhow!("unknown output format '{}'", format))?;
        }
        if let Some(language) = non_blank(translate.target_language) {
            self.translate.target_language = language;
        }
        if let Some(language) = non_blank(translate.source_language) {
            self.translate.source_language = language;
        }
        if let Some(prompt) = non_blank(translate.prompt) {
            self.translate.prompt = Some(prompt);
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
