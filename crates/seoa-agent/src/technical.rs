//! PageSpeed Insights based performance audit.

use anyhow::{Context, Result};
use seoa_crawler::Backoff;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::sleep;

use crate::config::PageSpeedConfig;

const MAX_OPPORTUNITIES: usize = 5;

const OPPORTUNITY_KINDS: [&str; 4] = ["insight", "byte-weight", "unused", "render-blocking"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreWebVitals {
    pub lcp: String,
    pub cls: String,
    pub tbt: String,
    pub si: String,
    pub fcp: String,
    pub lcp_seconds: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalAuditResult {
    pub url: String,
    pub performance_score: Option<u32>,
    pub mobile_friendly: Option<bool>,
    pub uses_https: Option<bool>,
    pub core_web_vitals: Option<CoreWebVitals>,
    pub top_opportunities: Vec<String>,
    pub error_message: Option<String>,
}

impl TechnicalAuditResult {
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            performance_score: None,
            mobile_friendly: None,
            uses_https: None,
            core_web_vitals: None,
            top_opportunities: Vec::new(),
            error_message: Some(error.into()),
        }
    }

    pub fn lcp_seconds(&self) -> Option<f64> {
        self.core_web_vitals.as_ref().and_then(|v| v.lcp_seconds)
    }
}

/// Why a single PageSpeed request failed, and whether asking again may help.
#[derive(Debug)]
enum Attempt {
    Retry(String),
    GiveUp(String),
}

pub struct TechnicalAuditor {
    client: reqwest::Client,
    config: PageSpeedConfig,
    backoff: Backoff,
}

impl TechnicalAuditor {
    pub fn new(config: PageSpeedConfig, backoff: Backoff) -> Result<Self> {
        if config.api_key.is_none() {
            log::warn!("No PageSpeed API key configured, requests will use the anonymous quota");
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            config,
            backoff,
        })
    }

    /// Runs the audit, retrying timeouts and server errors. Never fails,
    /// errors end up in `error_message`.
    pub async fn audit(&self, url: &str) -> TechnicalAuditResult {
        log::info!("Running technical audit for {url}");
        let retries = self.config.retries;
        let mut last_error = None;

        for attempt in 0..=retries {
            log::debug!("Requesting PageSpeed (attempt {})", attempt + 1);
            match self.request(url).await {
                Ok(data) => return parse_pagespeed(url, &data),
                Err(Attempt::Retry(e)) => {
                    log::warn!("PageSpeed attempt {} failed: {e}", attempt + 1);
                    last_error = Some(e);
                    if attempt < retries {
                        sleep(self.backoff.delay(attempt)).await;
                    }
                }
                Err(Attempt::GiveUp(e)) => {
                    log::warn!("PageSpeed failed: {e}");
                    last_error = Some(e);
                    break;
                }
            }
        }

        TechnicalAuditResult::failed(
            url,
            last_error.unwrap_or_else(|| "Unknown error after retries.".into()),
        )
    }

    async fn request(&self, url: &str) -> Result<Value, Attempt> {
        let mut params = vec![
            ("url", url),
            ("strategy", self.config.strategy.as_str()),
            ("category", "performance"),
        ];
        if let Some(key) = &self.config.api_key {
            params.push(("key", key.as_str()));
        }

        let resp = self
            .client
            .get(&self.config.endpoint)
            .query(&params)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            let msg = format!(
                "API request failed with status {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            );
            return Err(if status.is_client_error() {
                Attempt::GiveUp(msg)
            } else {
                Attempt::Retry(msg)
            });
        }

        resp.json().await.map_err(|e| self.classify(e))
    }

    fn classify(&self, err: reqwest::Error) -> Attempt {
        if err.is_timeout() {
            Attempt::Retry(format!(
                "API request timed out after {}s.",
                self.config.timeout_secs
            ))
        } else {
            Attempt::GiveUp(format!("An unexpected error occurred: {err}"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Lighthouse {
    #[serde(default)]
    audits: serde_json::Map<String, Value>,
    #[serde(default)]
    categories: serde_json::Map<String, Value>,
}

/// Turns a PageSpeed v5 response into the audit result.
pub fn parse_pagespeed(url: &str, data: &Value) -> TechnicalAuditResult {
    let lighthouse = data
        .get("lighthouseResult")
        .cloned()
        .and_then(|l| serde_json::from_value::<Lighthouse>(l).ok())
        .unwrap_or_default();
    let audits = &lighthouse.audits;

    let performance_score = lighthouse
        .categories
        .get("performance")
        .and_then(|p| p.get("score"))
        .and_then(Value::as_f64)
        .map(|s| (s * 100.0).round() as u32);

    let display = |key: &str| {
        audits
            .get(key)
            .and_then(|a| a.get("displayValue"))
            .and_then(Value::as_str)
            .unwrap_or("N/A")
            .to_string()
    };
    let passes = |key: &str| {
        audits
            .get(key)
            .and_then(|a| a.get("score"))
            .and_then(Value::as_f64)
            == Some(1.0)
    };

    let core_web_vitals = CoreWebVitals {
        lcp: display("largest-contentful-paint"),
        cls: display("cumulative-layout-shift"),
        tbt: display("total-blocking-time"),
        si: display("speed-index"),
        fcp: display("first-contentful-paint"),
        lcp_seconds: audits
            .get("largest-contentful-paint")
            .and_then(|a| a.get("numericValue"))
            .and_then(Value::as_f64)
            .map(|ms| ms / 1000.0),
    };

    let top_opportunities = audits
        .iter()
        .filter(|(key, _)| OPPORTUNITY_KINDS.iter().any(|k| key.contains(k)))
        .filter_map(|(_, audit)| {
            let score = audit.get("score").and_then(Value::as_f64)?;
            if score >= 0.9 {
                return None;
            }
            let title = audit.get("title").and_then(Value::as_str).unwrap_or_default();
            match audit.get("displayValue").and_then(Value::as_str) {
                Some(value) if !value.is_empty() => Some(format!("{title}: {value}")),
                _ => Some(title.to_string()),
            }
        })
        .take(MAX_OPPORTUNITIES)
        .collect();

    TechnicalAuditResult {
        url: url.to_string(),
        performance_score,
        mobile_friendly: Some(passes("viewport")),
        uses_https: Some(passes("is-on-https")),
        core_web_vitals: Some(core_web_vitals),
        top_opportunities,
        error_message: None,
    }
}
