use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_throttle")]
    pub throttle: Throttle,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,

    #[serde(default = "default_on_dl_error")]
    pub on_dl_error: OnError,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            throttle: default_throttle(),
            max_retries: default_max_retries(),
            backoff: BackoffConfig::default(),
            accept_invalid_certs: default_accept_invalid_certs(),
            on_dl_error: default_on_dl_error(),
        }
    }
}

impl CrawlerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_user_agent() -> String {
    // Hosting providers rate-limit generic clients much more eagerly than crawlers
    String::from("Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)")
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_throttle() -> Throttle {
    Throttle::default()
}

fn default_max_retries() -> u32 {
    3
}

fn default_accept_invalid_certs() -> bool {
    true
}

fn default_on_dl_error() -> OnError {
    OnError::SkipAndLog
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum OnError {
    Fail,
    SkipAndLog,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Throttle {
    /// The maximum number of concurrent requests
    Concurrent(NonZeroUsize),
    /// The number of requests per second
    PerSecond(NonZeroUsize),
    /// The delay in seconds between requests
    Delay(f32),
}

impl Default for Throttle {
    fn default() -> Self {
        Self::Concurrent(NonZeroUsize::new(5).unwrap_or(NonZeroUsize::MIN))
    }
}

/// Exponential backoff settings applied between retries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    #[serde(default = "default_base_ms")]
    pub base_ms: u64,

    #[serde(default = "default_max_ms")]
    pub max_ms: u64,

    #[serde(default = "default_factor")]
    pub factor: f64,

    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: default_base_ms(),
            max_ms: default_max_ms(),
            factor: default_factor(),
            jitter: default_jitter(),
        }
    }
}

fn default_base_ms() -> u64 {
    500
}

fn default_max_ms() -> u64 {
    8_000
}

fn default_factor() -> f64 {
    2.0
}

fn default_jitter() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let conf: CrawlerConfig = serde_yaml::from_str(
            r#"
userAgent: TestBot
throttle: !PerSecond 2
backoff:
  baseMs: 10
"#,
        )
        .unwrap();

        assert_eq!(conf.user_agent, "TestBot");
        assert_eq!(conf.throttle, Throttle::PerSecond(2.try_into().unwrap()));
        assert_eq!(conf.backoff.base_ms, 10);
        assert_eq!(conf.backoff.max_ms, 8_000);
        assert_eq!(conf.max_retries, 3);
        assert_eq!(conf.on_dl_error, OnError::SkipAndLog);
    }
}
