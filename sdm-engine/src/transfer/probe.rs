//! Source probing
//!
//! A HEAD request discovers the total size (Content-Length) and whether the
//! server honors byte ranges (Accept-Ranges: bytes). Sources that answer
//! neither are downloaded as a single unranged stream.

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct ProbeResult {
    pub total_bytes: Option<i64>,
    pub accept_ranges: bool,
}

/// Probe `url` with a HEAD request
///
/// Probe failures (e.g. servers answering HEAD with 405) are not download
/// failures; they degrade the task to a single-stream fetch.
pub async fn probe(client: &reqwest::Client, url: &str) -> ProbeResult {
    match client.head(url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let total_bytes = resp
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<i64>().ok())
                .filter(|n| *n > 0);

            let accept_ranges = resp
                .headers()
                .get(ACCEPT_RANGES)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("bytes"))
                .unwrap_or(false);

            debug!(
                "probe {}: total_bytes={:?} accept_ranges={}",
                url, total_bytes, accept_ranges
            );

            ProbeResult {
                total_bytes,
                accept_ranges,
            }
        }
        Ok(resp) => {
            debug!("probe {} answered {}; using single stream", url, resp.status());
            ProbeResult {
                total_bytes: None,
                accept_ranges: false,
            }
        }
        Err(e) => {
            debug!("probe {} failed: {}; using single stream", url, e);
            ProbeResult {
                total_bytes: None,
                accept_ranges: false,
            }
        }
    }
}
