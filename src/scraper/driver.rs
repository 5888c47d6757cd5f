use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use tokio::time::sleep;
use tracing::debug;

use super::{BrowserDriver, DriverFuture, ScrollOptions};

const IMAGE_ATTRIBUTES: &[&str] = &["src", "data-src", "data-original"];

struct LoadedPage {
    url: Url,
    html: String,
}

/// Fetches the page once over HTTP and reads images from the served HTML.
///
/// Nothing is executed, so images injected by scripts are not seen; scrolling only
/// honours the initial wait.
pub struct StaticPageDriver {
    client: reqwest::Client,
    page: Option<LoadedPage>,
}

impl StaticPageDriver {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .with_context(|| "failed to build HTTP client")?;
        Ok(Self { client, page: None })
    }

    fn page(&self) -> Result<&LoadedPage> {
        self.page
            .as_ref()
            .ok_or_else(|| anyhow!("no page loaded; call navigate first"))
    }
}

impl BrowserDriver for StaticPageDriver {
    fn navigate<'a>(&'a mut self, url: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("failed to load {}", url))?;
            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("failed to load {}: status {}", url, status));
            }
            let final_url = response.url().clone();
            let html = response
                .text()
                .await
                .with_context(|| format!("failed to read page body: {}", url))?;
            debug!("loaded {} ({} bytes)", final_url, html.len());
            self.page = Some(LoadedPage {
                url: final_url,
                html,
            });
            Ok(())
        })
    }

    fn scroll_to_bottom(&mut self, options: ScrollOptions) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            if !options.initial_wait.is_zero() {
                debug!(
                    "waiting {}s before reading the page",
                    options.initial_wait.as_secs()
                );
                sleep(options.initial_wait).await;
            }
            Ok(())
        })
    }

    fn extract_image_urls<'a>(&'a mut self, selector: &'a str) -> DriverFuture<'a, Vec<String>> {
        Box::pin(async move {
            let page = self.page()?;
            extract_image_urls_from_html(&page.html, Some(&page.url), selector)
        })
    }

    fn title(&mut self) -> DriverFuture<'_, Option<String>> {
        Box::pin(async move {
            let page = self.page()?;
            Ok(extract_title_from_html(&page.html))
        })
    }

    fn close(&mut self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            self.page = None;
            Ok(())
        })
    }
}

/// Image URLs for every element matching `selector`, resolved against `base`.
///
/// The first usable attribute of `src`, `data-src`, `data-original` is taken; inline
/// `data:` placeholders count as missing. Duplicates keep their first position.
pub fn extract_image_urls_from_html(
    html: &str,
    base: Option<&Url>,
    selector: &str,
) -> Result<Vec<String>> {
    use kuchiki::traits::*;

    let document = kuchiki::parse_html().one(html);
    let matches = document
        .select(selector)
        .map_err(|_| anyhow!("invalid CSS selector '{}'", selector))?;

    let mut urls: Vec<String> = Vec::new();
    for element in matches {
        let attrs = element.attributes.borrow();
        let Some(raw) = IMAGE_ATTRIBUTES
            .iter()
            .filter_map(|name| attrs.get(*name))
            .map(str::trim)
            .find(|value| !value.is_empty() && !value.starts_with("data:"))
        else {
            continue;
        };
        let resolved = match base {
            Some(base) => match base.join(raw) {
                Ok(url) => url.to_string(),
                Err(_) => continue,
            },
            None => raw.to_string(),
        };
        if !urls.contains(&resolved) {
            urls.push(resolved);
        }
    }
    Ok(urls)
}

pub fn extract_title_from_html(html: &str) -> Option<String> {
    use kuchiki::traits::*;

    let document = kuchiki::parse_html().one(html);
    let title = document.select_first("title").ok()?.as_node().text_contents();
    let title = title.trim();
    if title.is_empty() {
        None
    } else {
        Some(title.to_string())
    }
}
