// src/fetch/mod.rs

use reqwest::Client;
use std::{path::Path, time::Duration};
use tokio::{fs, time::sleep};
use tracing::{info, warn};
use url::Url;

use crate::source::LoadError;

/// How many extra attempts a remote fetch gets, and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            delay: Duration::from_secs(1),
        }
    }
}

/// Where the source lives: a remote `http(s)` URL or a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Remote(Url),
    Local(String),
}

impl Location {
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Location::Remote(url),
            _ => Location::Local(raw.to_string()),
        }
    }
}

fn unreachable_source(location: impl ToString, err: impl ToString) -> LoadError {
    LoadError::Unreachable {
        location: location.to_string(),
        message: err.to_string(),
    }
}

async fn get_bytes(client: &Client, url: &Url) -> Result<Vec<u8>, reqwest::Error> {
    let bytes = client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    Ok(bytes.to_vec())
}

/// Fetch the raw bytes of the source, from the network or from disk.
#[tracing::instrument(level = "info", skip(client, policy))]
pub async fn fetch_source(
    client: &Client,
    location: &str,
    policy: RetryPolicy,
) -> Result<Vec<u8>, LoadError> {
    let url = match Location::parse(location) {
        Location::Local(path) => {
            let bytes = fs::read(Path::new(&path))
                .await
                .map_err(|e| unreachable_source(&path, e))?;
            info!(bytes = bytes.len(), "read local source");
            return Ok(bytes);
        }
        Location::Remote(url) => url,
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        match get_bytes(client, &url).await {
            Ok(bytes) => {
                info!(bytes = bytes.len(), attempt, "downloaded source");
                return Ok(bytes);
            }
            Err(e) if attempt <= policy.retries => {
                warn!(attempt, error = %e, "source download failed, retrying");
                sleep(policy.delay).await;
            }
            Err(e) => return Err(unreachable_source(&url, e)),
        }
    }
}

/// Blocking variant for synchronous callers; a single attempt, no retries.
pub fn fetch_source_blocking(location: &str, timeout: Duration) -> Result<Vec<u8>, LoadError> {
    match Location::parse(location) {
        Location::Local(path) => std::fs::read(&path).map_err(|e| unreachable_source(&path, e)),
        Location::Remote(url) => {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| unreachable_source(&url, e))?;
            let bytes = client
                .get(url.clone())
                .send()
                .and_then(|resp| resp.error_for_status())
                .and_then(|resp| resp.bytes())
                .map_err(|e| unreachable_source(&url, e))?;
            info!(bytes = bytes.len(), "downloaded source");
            Ok(bytes.to_vec())
        }
    }
}
