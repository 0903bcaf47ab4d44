mod backoff;
mod config;
mod crawler;
mod error;
mod limiter;
mod page;
pub mod robots;

pub use backoff::Backoff;
pub use config::{BackoffConfig, CrawlerConfig, OnError, Throttle};
pub use crawler::WebCrawler;
pub use error::FetchError;
pub use limiter::{Limiter, Permit};
pub use page::{CrawlResult, Page};
pub use robots::{PathStatus, RobotsPolicy, SENSITIVE_PATHS};

pub use anyhow;
