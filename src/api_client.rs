use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::PortfolioPayload;

static PAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{5}[0-9]{4}[A-Z]$").unwrap()
});

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Invalid PAN format")]
    InvalidPan,
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Upstream returned {0}")]
    Status(reqwest::StatusCode),
    #[error("Upstream returned an unreadable portfolio: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Trims and upper-cases a PAN, rejecting anything that is not `AAAAA9999A`.
pub fn normalize_pan(pan: &str) -> Result<String, UpstreamError> {
    let pan = pan.trim().to_uppercase();
    if PAN_RE.is_match(&pan) {
        Ok(pan)
    } else {
        Err(UpstreamError::InvalidPan)
    }
}

pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl UpstreamClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn get_client_portfolio(&self, pan: &str) -> Result<PortfolioPayload, UpstreamError> {
        let pan = normalize_pan(pan)?;
        let url = format!("{}/clients/{}/portfolio", self.base_url, pan);
        info!("Fetching portfolio from {}", url);

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!("Upstream {} answered {}", url, status);
            return Err(UpstreamError::Status(status));
        }

        let body = response.bytes().await?;
        let payload: PortfolioPayload = serde_json::from_slice(&body)?;
        info!("Upstream returned {} folios", payload.folios.len());
        Ok(payload)
    }
}
