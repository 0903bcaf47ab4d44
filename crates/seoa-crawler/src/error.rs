use std::time::Duration;

use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP Error: {reason}")]
    Status {
        status: u16,
        reason: String,
        retry_after: Option<Duration>,
    },
    #[error("Request timed out.")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Couldn't decode body: {0}")]
    Decode(String),
    #[error("An unexpected error occurred: {0}")]
    Other(String),
}

impl FetchError {
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>) -> Self {
        Self::Status {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
            retry_after,
        }
    }

    /// The status code reported in a `CrawlResult` for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            Self::Timeout => 408,
            _ => 500,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status == 429 || *status == 408 || (500..600).contains(status)
            }
            Self::Timeout | Self::Connect(_) => true,
            Self::InvalidUrl(_) | Self::Decode(_) | Self::Other(_) => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() {
            Self::InvalidUrl(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status, None)
        } else {
            Self::Other(e.to_string())
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
