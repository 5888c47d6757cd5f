use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

const MAX_SERVER_DOWN_RETRIES: u32 = 3;
const SERVER_DOWN_DELAY: Duration = Duration::from_secs(10);
const MAX_BACKOFF_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: u64 = 5;

/// Per-file retry bookkeeping for image downloads.
///
/// 521 is retried up to three times after a fixed 10s; 522 and 503 up to three times
/// after 5s, 10s, 20s. Every other status is final.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    server_down: u32,
    backoff: u32,
}

impl RetryState {
    /// Delay before the next attempt, or `None` when the file should be skipped.
    pub fn next_delay(&mut self, status: u16) -> Option<Duration> {
        match status {
            521 if self.server_down < MAX_SERVER_DOWN_RETRIES => {
                self.server_down += 1;
                Some(SERVER_DOWN_DELAY)
            }
            522 | 503 if self.backoff < MAX_BACKOFF_RETRIES => {
                let delay = Duration::from_secs(BACKOFF_BASE_SECS << self.backoff);
                self.backoff += 1;
                Some(delay)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadSummary {
    pub saved: Vec<PathBuf>,
    pub failed: Vec<FailedDownload>,
}

pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .with_context(|| "failed to build HTTP client")?;
        Ok(Self { client })
    }

    /// Downloads `urls` in order into `dest`. A file that cannot be fetched is recorded
    /// and skipped; only filesystem errors abort the batch.
    pub async fn download_all(&self, urls: &[String], dest: &Path) -> Result<DownloadSummary> {
        tokio::fs::create_dir_all(dest)
            .await
            .with_context(|| format!("failed to create {}", dest.display()))?;
        info!("downloading {} images to {}", urls.len(), dest.display());

        let mut summary = DownloadSummary::default();
        for (idx, url) in urls.iter().enumerate() {
            match self.fetch(url).await {
                Ok(bytes) => {
                    let path = dest.join(image_file_name(idx + 1, &bytes, url));
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    summary.saved.push(path);
                }
                Err(reason) => {
                    warn!("failed to download {}: {}", url, reason);
                    summary.failed.push(FailedDownload {
                        url: url.clone(),
                        reason,
                    });
                }
            }
        }
        info!(
            "download complete: {} saved, {} failed",
            summary.saved.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, String> {
        let mut retries = RetryState::default();
        loop {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|err| err.to_string())?;
            let status = response.status();
            if status.as_u16() == 200 {
                let bytes = response.bytes().await.map_err(|err| err.to_string())?;
                return Ok(bytes.to_vec());
            }
            match retries.next_delay(status.as_u16()) {
                Some(delay) => {
                    warn!(
                        "status {} for {}; retrying in {}s",
                        status.as_u16(),
                        url,
                        delay.as_secs()
                    );
                    sleep(delay).await;
                }
                None => return Err(format!("status {}", status.as_u16())),
            }
        }
    }
}

/// `image_007.png`: 1-based index, extension sniffed from the bytes, then guessed
/// from the URL.
pub fn image_file_name(index: usize, bytes: &[u8], url: &str) -> String {
    let ext = sniff_extension(bytes).unwrap_or_else(|| guess_extension(url));
    format!("image_{:03}.{}", index, ext)
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    let kind = infer::get(bytes)?;
    if kind.matcher_type() != infer::MatcherType::Image {
        return None;
    }
    Some(kind.extension())
}

fn guess_extension(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    if lower.contains("png") {
        "png"
    } else if lower.contains("jpeg") {
        "jpeg"
    } else if lower.contains("webp") {
        "webp"
    } else {
        "jpg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_down_retries_three_times_with_fixed_delay() {
        let mut state = RetryState::default();
        let delays: Vec<_> = (0..4).map(|_| state.next_delay(521)).collect();
        assert_eq!(
            delays,
            vec![
                Some(Duration::from_secs(10)),
                Some(Duration::from_secs(10)),
                Some(Duration::from_secs(10)),
                None
            ]
        );
    }

    #[test]
    fn overload_backs_off_exponentially() {
        let mut state = RetryState::default();
        assert_eq!(state.next_delay(522), Some(Duration::from_secs(5)));
        assert_eq!(state.next_delay(503), Some(Duration::from_secs(10)));
        assert_eq!(state.next_delay(522), Some(Duration::from_secs(20)));
        assert_eq!(state.next_delay(503), None);
        // the 521 budget is separate
        assert_eq!(state.next_delay(521), Some(Duration::from_secs(10)));
    }

    #[test]
    fn other_statuses_are_final() {
        let mut state = RetryState::default();
        assert_eq!(state.next_delay(404), None);
        assert_eq!(state.next_delay(500), None);
        assert_eq!(state.next_delay(403), None);
    }

    #[test]
    fn file_names_prefer_sniffed_type() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
        assert_eq!(image_file_name(1, &png, "https://x/a.jpg"), "image_001.png");
        assert_eq!(image_file_name(12, b"??", "https://x/b.WEBP?w=800"), "image_012.webp");
        assert_eq!(image_file_name(100, b"", "https://x/c"), "image_100.jpg");
    }
}
