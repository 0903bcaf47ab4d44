use std::future::Future;
use std::io::prelude::*;
use std::time::Duration;

use anyhow::{anyhow, Error, Result};
use flate2::read::GzDecoder;
use futures::{future, stream, StreamExt};
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, RETRY_AFTER,
};
use tokio::time::{sleep, Instant};

use crate::backoff::Backoff;
use crate::config::{CrawlerConfig, OnError, Throttle};
use crate::error::FetchError;
use crate::limiter::Limiter;
use crate::page::{CrawlResult, Page};

const DEFAULT_FAN_OUT: usize = 16;

/// HTTP fetcher shared by every stage that needs to download something.
#[derive(Debug, Clone)]
pub struct WebCrawler {
    client: reqwest::Client,
    config: CrawlerConfig,
    limiter: Limiter,
    backoff: Backoff,
}

impl WebCrawler {
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));

        let client = reqwest::ClientBuilder::new()
            .gzip(true)
            .deflate(true)
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            limiter: Limiter::new(config.throttle)?,
            backoff: config.backoff.into(),
            config,
        })
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Downloads `url`, retrying transient failures with backoff.
    pub async fn try_fetch(&self, url: &str) -> Result<Page, FetchError> {
        self.fetch_with_retries(url).await.0
    }

    /// Downloads `url` and never fails, errors end up in `error_message`.
    pub async fn fetch_page(&self, url: &str) -> CrawlResult {
        let started = Instant::now();
        let (res, attempts) = self.fetch_with_retries(url).await;
        match res {
            Ok(page) => {
                log::debug!("Fetched {url} ({} bytes, {attempts} attempt(s))", page.body.len());
                page.into()
            }
            Err(e) => {
                log::warn!("Couldn't fetch {url} after {attempts} attempt(s) got: {e}");
                CrawlResult::failed(url, &e, attempts, started.elapsed())
            }
        }
    }

    /// Fetches every url concurrently, bounded by the configured throttle.
    ///
    /// Results keep the input order. With `OnError::Fail` the first failed
    /// download aborts the whole batch.
    pub async fn fetch_all<I>(&self, urls: I) -> Result<Vec<CrawlResult>>
    where
        I: IntoIterator<Item = String>,
    {
        let stream = stream::iter(urls)
            .map(|url| async move {
                let started = Instant::now();
                let (res, attempts) = self.fetch_with_retries(&url).await;
                (url, res, attempts, started.elapsed())
            })
            .buffered(self.fan_out());

        match self.config.on_dl_error {
            OnError::Fail => {
                let mut err = Ok::<(), Error>(());
                let pages = stream
                    .map(|(url, res, _, _)| {
                        res.map(CrawlResult::from)
                            .map_err(|e| anyhow!("Couldn't fetch {url} got: {e}"))
                    })
                    .scan(&mut err, until_err)
                    .collect::<Vec<_>>()
                    .await;
                err?;
                Ok(pages)
            }
            OnError::SkipAndLog => {
                let pages = stream
                    .map(|(url, res, attempts, elapsed)| match res {
                        Ok(page) => page.into(),
                        Err(e) => {
                            log::warn!("Skipping URL: {url} got: {e}");
                            CrawlResult::failed(url, &e, attempts, elapsed)
                        }
                    })
                    .collect::<Vec<_>>()
                    .await;
                Ok(pages)
            }
        }
    }

    fn fan_out(&self) -> usize {
        match self.config.throttle {
            Throttle::Concurrent(n) => n.get(),
            Throttle::PerSecond(_) | Throttle::Delay(_) => DEFAULT_FAN_OUT,
        }
    }

    async fn fetch_with_retries(&self, url: &str) -> (Result<Page, FetchError>, u32) {
        let started = Instant::now();
        let mut retries = 0;
        loop {
            let res = {
                let _permit = self.limiter.acquire().await;
                self.download(url).await
            };
            match res {
                Ok(mut page) => {
                    page.attempts = retries + 1;
                    page.elapsed = started.elapsed();
                    return (Ok(page), retries + 1);
                }
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let wait = self.backoff.delay_for(retries, &e);
                    log::warn!(
                        "Retrying {url} in {wait:?} ({}/{}) got: {e}",
                        retries + 1,
                        self.config.max_retries
                    );
                    sleep(wait).await;
                    retries += 1;
                }
                Err(e) => return (Err(e), retries + 1),
            }
        }
    }

    async fn download(&self, url: &str) -> Result<Page, FetchError> {
        let started = Instant::now();
        let resp = self.client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::from_status(
                status,
                retry_after(resp.headers()),
            ));
        }

        let final_url = resp.url().to_string();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|c| c.to_str().ok())
            .map(String::from);

        let body = match content_type.as_deref() {
            Some(c) if c == "application/x-gzip" || c == "application/gzip" => {
                let compressed = resp.bytes().await?;
                let mut gz = GzDecoder::new(&compressed[..]);
                let mut body = String::new();
                gz.read_to_string(&mut body)?;
                body
            }
            _ => resp.text().await?,
        };

        Ok(Page {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            content_type,
            body,
            elapsed: started.elapsed(),
            attempts: 1,
        })
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn until_err<T, E>(
    err: &mut &mut Result<(), E>,
    item: Result<T, E>,
) -> impl Future<Output = Option<T>> {
    match item {
        Ok(item) => future::ready(Some(item)),
        Err(e) => {
            **err = Err(e);
            future::ready(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[tokio::test]
    async fn invalid_url_is_reported_not_raised() {
        let crawler = WebCrawler::new(CrawlerConfig::default()).unwrap();
        let res = crawler.fetch_page("not a url").await;

        assert!(!res.is_success());
        assert_eq!(res.status_code, 500);
        assert_eq!(res.attempts, 1);
        assert!(res.error_message.is_some());
    }

    #[test]
    fn infinite_throttle_delay_is_rejected() {
        let config = CrawlerConfig {
            throttle: Throttle::Delay(f32::INFINITY),
            ..Default::default()
        };
        assert!(WebCrawler::new(config).is_err());
    }
}
