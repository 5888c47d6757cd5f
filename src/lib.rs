use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub mod geometry;
pub mod grouping;
pub mod inpaint;
pub mod logging;
pub mod mapping;
pub mod ocr;
mod paths;
pub mod pipeline;
pub mod providers;
pub mod region;
pub mod scraper;
pub mod sentences;
pub mod settings;
pub mod translations;
pub mod translator;
pub mod typeset;

pub use mapping::{MalformedResponse, OutputFormat};
pub use providers::{ChatClient, ProviderKind, ProviderUsage};
pub use translations::TranslateOptions;
pub use translator::Translator;

use inpaint::DiffusionInpainter;
use pipeline::{ChapterReport, PipelineOptions, Typesetter};
use scraper::{Downloader, ScrapeReport, ScrollOptions, StaticPageDriver};
use settings::Settings;

const FALLBACK_FONT_FAMILIES: &[&str] = &["sans-serif", "DejaVu Sans", "Arial"];

/// Command-line overrides for the translate step. `None` keeps the settings value.
#[derive(Debug, Clone, Default)]
pub struct TranslateArgs {
    pub model: Option<String>,
    pub key: Option<String>,
    pub format: Option<String>,
    pub lang: Option<String>,
    pub font: Option<String>,
    pub font_size: Option<u32>,
    pub padding: Option<i32>,
    pub debug_groups: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ScrapeArgs {
    pub selector: Option<String>,
    /// Space separated class names, turned into a `.a.b` selector.
    pub class_names: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Command {
    Scrape {
        url: String,
        args: ScrapeArgs,
    },
    Ocr {
        folder: String,
    },
    Translate {
        folder: String,
        args: TranslateArgs,
    },
    Run {
        url: String,
        scrape: ScrapeArgs,
        translate: TranslateArgs,
    },
    Fonts,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub settings_path: Option<String>,
    pub command: Command,
}

pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;

    match config.command {
        Command::Scrape { url, args } => {
            apply_scrape_args(&mut settings, &args);
            let report = scrape(&settings, &url).await?;
            Ok(report.folder.display().to_string())
        }
        Command::Ocr { folder } => {
            let engine = ocr::build_engine(&settings.ocr)?;
            let pages =
                pipeline::analyze_folder(Path::new(&folder), engine.as_ref(), &settings.grouping)?;
            to_json(&pages)
        }
        Command::Translate { folder, args } => {
            apply_translate_args(&mut settings, &args)?;
            let report = translate_folder(&settings, Path::new(&folder), &args).await?;
            to_json(&report)
        }
        Command::Run {
            url,
            scrape: scrape_args,
            translate: translate_args,
        } => {
            apply_scrape_args(&mut settings, &scrape_args);
            apply_translate_args(&mut settings, &translate_args)?;
            let scraped = scrape(&settings, &url).await?;
            if scraped.downloads.saved.is_empty() {
                return Err(anyhow!(
                    "no images were downloaded from {}; nothing to translate",
                    url
                ));
            }
            let translated = translate_folder(&settings, &scraped.folder, &translate_args).await?;
            to_json(&RunReport {
                scrape: scraped,
                translate: translated,
            })
        }
        Command::Fonts => {
            let fonts_dir = &settings.typeset.fonts_dir;
            let fonts = typeset::available_fonts(fonts_dir)?;
            if fonts.is_empty() {
                return Err(anyhow!("no .ttf/.otf fonts found in {}", fonts_dir.display()));
            }
            Ok(fonts.join("\n"))
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    scrape: ScrapeReport,
    translate: ChapterReport,
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).with_context(|| "failed to serialize report")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn apply_scrape_args(settings: &mut Settings, args: &ScrapeArgs) {
    if let Some(classes) = non_blank(args.class_names.as_deref()) {
        let selector = scraper::format_class_names(classes);
        if !selector.is_empty() {
            settings.scraper.selector = selector;
        }
    }
    if let Some(selector) = non_blank(args.selector.as_deref()) {
        settings.scraper.selector = selector.to_string();
    }
    if let Some(dir) = non_blank(args.output_dir.as_deref()) {
        settings.scraper.output_dir = PathBuf::from(dir);
    }
}

fn apply_translate_args(settings: &mut Settings, args: &TranslateArgs) -> Result<()> {
    if let Some(format) = non_blank(args.format.as_deref()) {
        settings.translate.format = OutputFormat::parse(format).ok_or_else(|| {
            anyhow!(
                "unknown output format '{}' (expected keyed, ordered or lines)",
                format
            )
        })?;
    }
    if let Some(lang) = non_blank(args.lang.as_deref()) {
        settings.translate.target_language = lang.to_string();
    }
    if let Some(font) = non_blank(args.font.as_deref()) {
        settings.typeset.font = Some(font.to_string());
    }
    if let Some(size) = args.font_size {
        if size == 0 {
            return Err(anyhow!("--font-size must be positive"));
        }
        settings.typeset.font_size = Some(size);
    }
    if let Some(padding) = args.padding {
        if padding < 0 {
            return Err(anyhow!("--padding must not be negative"));
        }
        settings.typeset.padding = padding;
    }
    settings.validate()
}

async fn scrape(settings: &Settings, url: &str) -> Result<ScrapeReport> {
    let scraper_settings = &settings.scraper;
    let mut driver = StaticPageDriver::new(&scraper_settings.user_agent)?;
    let downloader = Downloader::new(&scraper_settings.user_agent)?;
    let report = scraper::scrape_chapter(
        &mut driver,
        &downloader,
        url,
        &scraper_settings.selector,
        ScrollOptions::from_settings(scraper_settings),
        &scraper_settings.output_dir,
    )
    .await?;
    if !report.downloads.failed.is_empty() {
        warn!(
            "{} of {} images could not be downloaded",
            report.downloads.failed.len(),
            report.found
        );
    }
    Ok(report)
}

async fn translate_folder(
    settings: &Settings,
    folder: &Path,
    args: &TranslateArgs,
) -> Result<ChapterReport> {
    // Configuration problems surface before any OCR work.
    if !folder.is_dir() {
        return Err(anyhow!("folder not found: {}", folder.display()));
    }
    let provider =
        providers::build_provider(&settings.translate, args.model.as_deref(), args.key.as_deref())?;
    if let providers::ProviderImpl::Ollama(client) = &provider {
        check_ollama_model(&settings.translate.ollama_host, client.model()).await?;
    }
    let engine = ocr::build_engine(&settings.ocr)?;
    let translator = Translator::new(
        provider,
        TranslateOptions::from_settings(&settings.translate),
    );

    let typeset_settings = &settings.typeset;
    let font = match typeset::resolve_font(
        &typeset_settings.fonts_dir,
        typeset_settings.font.as_deref(),
        typeset_settings.font_family.as_deref(),
        FALLBACK_FONT_FAMILIES,
    ) {
        Ok(font) => {
            info!("typesetting with font '{}'", font.family);
            Some(font)
        }
        Err(err) => {
            warn!("{:#}; using estimated text metrics", err);
            None
        }
    };
    let typesetter = Typesetter::new(
        font,
        typeset_settings.text_color.clone(),
        typeset_settings.sizing(),
        typeset_settings.padding,
    );
    let inpainter = DiffusionInpainter {
        radius: settings.inpaint.radius,
    };
    let options = PipelineOptions {
        grouping: settings.grouping,
        dilation_iterations: settings.inpaint.dilation_iterations,
        inpainter: &inpainter,
        typesetter: &typesetter,
        debug_groups: args.debug_groups,
    };
    pipeline::process_chapter(folder, engine.as_ref(), &translator, &options).await
}

async fn check_ollama_model(host: &str, model: &str) -> Result<()> {
    let models = providers::list_ollama_models(host)
        .await
        .with_context(|| format!("cannot reach Ollama at {}", host))?;
    let found = models
        .iter()
        .any(|name| name == model || name.split(':').next() == Some(model));
    if !found {
        return Err(anyhow!(
            "model '{}' is not installed in Ollama (available: {})",
            model,
            models.join(", ")
        ));
    }
    Ok(())
}
