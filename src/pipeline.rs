use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::geometry::Quad;
use crate::grouping::{Group, GroupingConfig, group_detections};
use crate::inpaint::{Inpainter, build_mask};
use crate::ocr::OcrEngine;
use crate::paths;
use crate::providers::{ChatClient, ProviderUsage};
use crate::region::{RegionRect, consolidate, typeset_region};
use crate::sentences::{SentenceBatch, assemble_sentence};
use crate::translator::Translator;
use crate::typeset::{
    EstimatedMetrics, FontSizing, RenderPlan, ResolvedFont, TextMeasure, TextStyle, encode_image,
    plan_region, rasterize_svg, render_page_svg, render_regions_svg,
};

/// Font, sizing and colour used to draw translations.
pub struct Typesetter {
    font: Option<ResolvedFont>,
    style: TextStyle,
    sizing: FontSizing,
    padding: i32,
}

impl Typesetter {
    pub fn new(font: Option<ResolvedFont>, text_color: String, sizing: FontSizing, padding: i32) -> Self {
        let style = TextStyle {
            text_color,
            font_family: font.as_ref().map(|font| font.family.clone()),
        };
        Self {
            font,
            style,
            sizing,
            padding,
        }
    }

    fn measure(&self) -> &dyn TextMeasure {
        match &self.font {
            Some(font) => &font.metrics as &dyn TextMeasure,
            None => &EstimatedMetrics as &dyn TextMeasure,
        }
    }

    fn font_data(&self) -> Option<&[u8]> {
        self.font.as_ref().map(|font| font.metrics.data())
    }

    /// Plans for every group with a usable region and non-blank text, in group order.
    pub fn plan_page(&self, groups: &[Group], texts: &[String]) -> (Vec<RenderPlan>, usize) {
        let mut plans = Vec::new();
        let mut skipped = 0;
        for (idx, (group, text)) in groups.iter().zip(texts).enumerate() {
            let Some(region) = typeset_region(&group.polygons(), self.padding) else {
                debug!("group {} has no room after padding; skipped", idx);
                skipped += 1;
                continue;
            };
            match plan_region(text, region, self.sizing, self.measure()) {
                Some(plan) => {
                    if plan.overflow {
                        debug!("group {} overflows at {}px", idx, plan.font_size);
                    }
                    plans.push(plan);
                }
                None => skipped += 1,
            }
        }
        (plans, skipped)
    }
}

pub struct PipelineOptions<'a> {
    pub grouping: GroupingConfig,
    pub dilation_iterations: u32,
    pub inpainter: &'a dyn Inpainter,
    pub typesetter: &'a Typesetter,
    pub debug_groups: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub region: Option<RegionRect>,
    pub texts: Vec<String>,
    pub sentence: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageAnalysis {
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageReport {
    pub file_name: String,
    pub groups: usize,
    pub rendered: usize,
    pub skipped: usize,
    pub cleaned: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterReport {
    pub folder: PathBuf,
    pub sentences: usize,
    pub translated: usize,
    pub count_mismatch: bool,
    pub model: Option<String>,
    pub usage: Option<ProviderUsage>,
    pub pages: Vec<PageReport>,
}

struct Page {
    path: PathBuf,
    file_name: String,
    groups: Vec<Group>,
    error: Option<String>,
}

/// Page images directly inside `folder`, in file name order.
pub fn list_page_images(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(anyhow!("folder not found: {}", folder.display()));
    }
    paths::list_files_matching(folder, paths::IMAGE_PATTERNS)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn detect_groups(engine: &dyn OcrEngine, path: &Path, grouping: &GroupingConfig) -> Result<Vec<Group>> {
    let detections = engine
        .detect(path)
        .with_context(|| format!("{} OCR failed for {}", engine.name(), path.display()))?;
    Ok(group_detections(detections, grouping))
}

fn ocr_pages(engine: &dyn OcrEngine, images: &[PathBuf], grouping: &GroupingConfig) -> Vec<Page> {
    images
        .iter()
        .map(|path| {
            let file_name = file_name_of(path);
            info!("OCR {}", file_name);
            match detect_groups(engine, path, grouping) {
                Ok(groups) => Page {
                    path: path.clone(),
                    file_name,
                    groups,
                    error: None,
                },
                Err(err) => {
                    warn!("{:#}", err);
                    Page {
                        path: path.clone(),
                        file_name,
                        groups: Vec::new(),
                        error: Some(format!("{:#}", err)),
                    }
                }
            }
        })
        .collect()
}

/// OCR and grouping only, for inspecting what would be translated.
pub fn analyze_folder(
    folder: &Path,
    engine: &dyn OcrEngine,
    grouping: &GroupingConfig,
) -> Result<Vec<PageAnalysis>> {
    let images = list_page_images(folder)?;
    let mut pages = Vec::with_capacity(images.len());
    for page in ocr_pages(engine, &images, grouping) {
        if let Some(error) = page.error {
            return Err(anyhow!(error));
        }
        let groups = page
            .groups
            .iter()
            .map(|group| GroupSummary {
                region: consolidate(&group.polygons()),
                texts: group.texts().into_iter().map(str::to_string).collect(),
                sentence: assemble_sentence(group),
            })
            .collect();
        pages.push(PageAnalysis {
            file_name: page.file_name,
            path: page.path,
            groups,
        });
    }
    Ok(pages)
}

/// Runs a whole chapter folder: OCR every page, translate all sentences in one call,
/// then clean and typeset each page into `translated/`.
///
/// A page that fails is reported and skipped. A failed translation call aborts the
/// chapter before anything is written.
pub async fn process_chapter<C: ChatClient>(
    folder: &Path,
    engine: &dyn OcrEngine,
    translator: &Translator<C>,
    options: &PipelineOptions<'_>,
) -> Result<ChapterReport> {
    let images = list_page_images(folder)?;
    if images.is_empty() {
        warn!("no images found in {}", folder.display());
    }
    let pages = ocr_pages(engine, &images, &options.grouping);
    let batch = SentenceBatch::from_pages(pages.iter().map(|page| page.groups.as_slice()));
    info!(
        "{} sentences across {} pages",
        batch.len(),
        batch.page_count()
    );

    let (translations, count_mismatch, model, usage) = if batch.is_empty() {
        (Vec::new(), false, None, None)
    } else {
        let result = translator
            .translate_batch(&batch.sentences)
            .await
            .with_context(|| format!("translation failed for {}", folder.display()))?;
        (
            result.mapped.texts,
            !result.mapped.count_matches,
            result.model,
            result.usage,
        )
    };

    let translated_dir = paths::translated_dir(folder);
    std::fs::create_dir_all(&translated_dir)
        .with_context(|| format!("failed to create {}", translated_dir.display()))?;

    let mut reports = Vec::with_capacity(pages.len());
    for (idx, page) in pages.iter().enumerate() {
        if let Some(error) = &page.error {
            reports.push(PageReport {
                file_name: page.file_name.clone(),
                error: Some(error.clone()),
                ..PageReport::default()
            });
            continue;
        }
        let texts = page_texts(&batch, idx, &translations);
        let report = match render_page(page, &texts, &translated_dir, options) {
            Ok(report) => report,
            Err(err) => {
                warn!("{:#}", err);
                PageReport {
                    file_name: page.file_name.clone(),
                    groups: page.groups.len(),
                    error: Some(format!("{:#}", err)),
                    ..PageReport::default()
                }
            }
        };
        reports.push(report);
    }

    Ok(ChapterReport {
        folder: folder.to_path_buf(),
        sentences: batch.len(),
        translated: translations.len(),
        count_mismatch,
        model,
        usage,
        pages: reports,
    })
}

/// Translations for one page. Groups past the end of a short reply keep their
/// original sentence.
fn page_texts(batch: &SentenceBatch, page: usize, translations: &[String]) -> Vec<String> {
    let originals = batch.page_sentences(page);
    let translated = batch.page_slice(page, translations);
    if translated.len() < originals.len() {
        warn!(
            "page {} has {} sentences but only {} translations",
            page + 1,
            originals.len(),
            translated.len()
        );
    }
    originals
        .iter()
        .enumerate()
        .map(|(idx, original)| translated.get(idx).unwrap_or(original).clone())
        .collect()
}

fn render_page(
    page: &Page,
    texts: &[String],
    translated_dir: &Path,
    options: &PipelineOptions<'_>,
) -> Result<PageReport> {
    let image = image::open(&page.path)
        .with_context(|| format!("failed to decode image: {}", page.path.display()))?;
    let (width, height) = image.dimensions();
    let format = ImageFormat::from_path(&page.path).unwrap_or(ImageFormat::Png);

    let polygons: Vec<Quad> = page.groups.iter().flat_map(Group::polygons).collect();
    let mask = build_mask(width, height, &polygons, options.dilation_iterations);
    let cleaned = options.inpainter.inpaint(&image.to_rgb8(), &mask)?;
    let cleaned = DynamicImage::ImageRgb8(cleaned);

    let cleaned_path = paths::cleaned_path(translated_dir, &page.file_name);
    write_image(&cleaned, format, &cleaned_path)?;

    let cleaned_png = encode_image(&cleaned, ImageFormat::Png)?;
    if options.debug_groups {
        let regions: Vec<RegionRect> = page
            .groups
            .iter()
            .filter_map(|group| consolidate(&group.polygons()))
            .collect();
        let svg = render_regions_svg(&cleaned_png, "image/png", width, height, &regions);
        let overlay = DynamicImage::ImageRgba8(rasterize_svg(&svg, None)?);
        write_image(
            &overlay,
            ImageFormat::Png,
            &paths::groups_path(translated_dir, &page.file_name),
        )?;
    }

    let typesetter = options.typesetter;
    let (plans, skipped) = typesetter.plan_page(&page.groups, texts);
    let svg = render_page_svg(
        &cleaned_png,
        "image/png",
        width,
        height,
        &plans,
        &typesetter.style,
    );
    let rendered = DynamicImage::ImageRgba8(rasterize_svg(&svg, typesetter.font_data())?);
    let output_path = paths::final_path(translated_dir, &page.file_name);
    write_image(&rendered, format, &output_path)?;
    info!(
        "{}: {} of {} groups typeset",
        page.file_name,
        plans.len(),
        page.groups.len()
    );

    Ok(PageReport {
        file_name: page.file_name.clone(),
        groups: page.groups.len(),
        rendered: plans.len(),
        skipped,
        cleaned: Some(cleaned_path),
        output: Some(output_path),
        error: None,
    })
}

fn write_image(image: &DynamicImage, format: ImageFormat, path: &Path) -> Result<()> {
    let bytes = encode_image(image, format)?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write {}", path.display()))
}
