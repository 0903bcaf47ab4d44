use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A successfully downloaded document.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    pub final_url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
    pub elapsed: Duration,
    pub attempts: u32,
}

/// Outcome of fetching one page, either the HTML or the reason it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlResult {
    pub url: String,
    pub status_code: u16,
    pub html_content: Option<String>,
    pub error_message: Option<String>,
    pub response_time_ms: u64,
    pub content_length: usize,
    pub attempts: u32,
}

impl CrawlResult {
    pub fn failed(
        url: impl Into<String>,
        err: &FetchError,
        attempts: u32,
        elapsed: Duration,
    ) -> Self {
        Self {
            url: url.into(),
            status_code: err.status_code(),
            html_content: None,
            error_message: Some(err.to_string()),
            response_time_ms: elapsed.as_millis() as u64,
            content_length: 0,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_message.is_none() && self.html_content.is_some()
    }

    /// The fetched HTML, only when the crawl succeeded.
    pub fn html(&self) -> Option<&str> {
        match (&self.error_message, &self.html_content) {
            (None, Some(html)) => Some(html),
            _ => None,
        }
    }
}

impl From<Page> for CrawlResult {
    fn from(page: Page) -> Self {
        Self {
            url: page.url,
            status_code: page.status,
            content_length: page.body.len(),
            html_content: Some(page.body),
            error_message: None,
            response_time_ms: page.elapsed.as_millis() as u64,
            attempts: page.attempts,
        }
    }
}
