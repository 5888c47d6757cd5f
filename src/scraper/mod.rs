mod download;
mod driver;

use anyhow::{Context, Result};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tracing::info;

use crate::paths;
use crate::settings::ScraperSettings;

pub use download::{DownloadSummary, Downloader, FailedDownload, RetryState, image_file_name};
pub use driver::{StaticPageDriver, extract_image_urls_from_html, extract_title_from_html};

pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollOptions {
    pub pause: Duration,
    pub initial_wait: Duration,
    pub step_px: u32,
}

impl ScrollOptions {
    pub fn from_settings(settings: &ScraperSettings) -> Self {
        Self {
            pause: Duration::from_secs(settings.scroll_pause_secs),
            initial_wait: Duration::from_secs(settings.initial_wait_secs),
            step_px: settings.scroll_step_px,
        }
    }
}

/// A page loader that can surface the chapter's image URLs.
pub trait BrowserDriver: Send {
    fn navigate<'a>(&'a mut self, url: &'a str) -> DriverFuture<'a, ()>;
    /// Blocks until the page stops growing.
    fn scroll_to_bottom(&mut self, options: ScrollOptions) -> DriverFuture<'_, ()>;
    /// Ordered, de-duplicated image URLs matched by `selector`.
    fn extract_image_urls<'a>(&'a mut self, selector: &'a str) -> DriverFuture<'a, Vec<String>>;
    fn title(&mut self) -> DriverFuture<'_, Option<String>>;
    fn close(&mut self) -> DriverFuture<'_, ()>;
}

/// `"foo  bar"` becomes `".foo.bar"`; blank input gives an empty selector.
pub fn format_class_names(class_string: &str) -> String {
    let classes: Vec<&str> = class_string.split_whitespace().collect();
    if classes.is_empty() {
        return String::new();
    }
    format!(".{}", classes.join("."))
}

/// Chapter folder under `output_dir`, named after the page title.
pub fn chapter_dir(output_dir: &Path, title: Option<&str>) -> PathBuf {
    let name = title.map(paths::sanitize_title).unwrap_or_default();
    if name.is_empty() {
        output_dir.join("untitled")
    } else {
        output_dir.join(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub url: String,
    pub title: Option<String>,
    pub folder: PathBuf,
    pub found: usize,
    pub downloads: DownloadSummary,
}

/// Loads `url`, collects its images and downloads them into a per-chapter folder.
/// The driver is closed whether or not the scrape succeeds.
pub async fn scrape_chapter<D: BrowserDriver>(
    driver: &mut D,
    downloader: &Downloader,
    url: &str,
    selector: &str,
    scroll: ScrollOptions,
    output_dir: &Path,
) -> Result<ScrapeReport> {
    let result = collect_and_download(driver, downloader, url, selector, scroll, output_dir).await;
    let closed = driver.close().await;
    let report = result?;
    closed?;
    Ok(report)
}

async fn collect_and_download<D: BrowserDriver>(
    driver: &mut D,
    downloader: &Downloader,
    url: &str,
    selector: &str,
    scroll: ScrollOptions,
    output_dir: &Path,
) -> Result<ScrapeReport> {
    info!("navigating to {}", url);
    driver.navigate(url).await?;
    driver.scroll_to_bottom(scroll).await?;
    let urls = driver
        .extract_image_urls(selector)
        .await
        .with_context(|| format!("failed to extract images with selector '{}'", selector))?;
    info!("found {} unique images", urls.len());

    let title = driver.title().await?;
    let folder = chapter_dir(output_dir, title.as_deref());
    let downloads = downloader.download_all(&urls, &folder).await?;
    Ok(ScrapeReport {
        url: url.to_string(),
        title,
        folder,
        found: urls.len(),
        downloads,
    })
}
