use std::env;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use seoa_crawler::CrawlerConfig;
use serde::{Deserialize, Serialize};

pub const PAGESPEED_KEY_VAR: &str = "PAGESPEED_API_KEY";
pub const TAVILY_KEY_VAR: &str = "TAVILY_API_KEY";
pub const GOOGLE_KEY_VAR: &str = "GOOGLE_API_KEY";

/// Everything an audit run needs, usually read from a yaml file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfig {
    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub pagespeed: PageSpeedConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub pauses: PauseConfig,
}

impl AgentConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Couldn't open {}", path.display()))?;
        serde_yaml::from_reader(file).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Fills API keys missing from the file with the process environment,
    /// after loading a `.env` file when there is one.
    pub fn with_env(mut self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }
        fill_from_env(&mut self.pagespeed.api_key, PAGESPEED_KEY_VAR);
        fill_from_env(&mut self.search.api_key, TAVILY_KEY_VAR);
        fill_from_env(&mut self.llm.api_key, GOOGLE_KEY_VAR);
        self
    }
}

fn fill_from_env(slot: &mut Option<String>, var: &str) {
    if slot.as_deref().map_or(true, str::is_empty) {
        *slot = env::var(var).ok().filter(|v| !v.is_empty());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpeedConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_pagespeed_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_strategy")]
    pub strategy: String,

    #[serde(default = "default_pagespeed_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_pagespeed_retries")]
    pub retries: u32,
}

impl Default for PageSpeedConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: default_pagespeed_endpoint(),
            strategy: default_strategy(),
            timeout_secs: default_pagespeed_timeout_secs(),
            retries: default_pagespeed_retries(),
        }
    }
}

impl PageSpeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_pagespeed_endpoint() -> String {
    String::from("https://www.googleapis.com/pagespeedonline/v5/runPagespeed")
}

fn default_strategy() -> String {
    String::from("MOBILE")
}

fn default_pagespeed_timeout_secs() -> u64 {
    60
}

fn default_pagespeed_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_model() -> String {
    String::from("gemini-2.5-flash")
}

fn default_llm_timeout_secs() -> u64 {
    120
}

/// Pauses between consecutive calls to rate limited APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseConfig {
    #[serde(default = "default_after_keywords_ms")]
    pub after_keywords_ms: u64,

    #[serde(default = "default_after_search_ms")]
    pub after_search_ms: u64,

    #[serde(default = "default_after_rewrite_ms")]
    pub after_rewrite_ms: u64,

    #[serde(default = "default_between_sections_ms")]
    pub between_sections_ms: u64,
}

impl PauseConfig {
    pub fn none() -> Self {
        Self {
            after_keywords_ms: 0,
            after_search_ms: 0,
            after_rewrite_ms: 0,
            between_sections_ms: 0,
        }
    }
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            after_keywords_ms: default_after_keywords_ms(),
            after_search_ms: default_after_search_ms(),
            after_rewrite_ms: default_after_rewrite_ms(),
            between_sections_ms: default_between_sections_ms(),
        }
    }
}

fn default_after_keywords_ms() -> u64 {
    10_000
}

fn default_after_search_ms() -> u64 {
    5_000
}

fn default_after_rewrite_ms() -> u64 {
    2_000
}

fn default_between_sections_ms() -> u64 {
    3_000
}

/// Sleeps `ms` milliseconds, skipped entirely for zero.
pub(crate) async fn pause(ms: u64) {
    if ms > 0 {
        log::debug!("Pausing {ms}ms to respect API rate limits");
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}
