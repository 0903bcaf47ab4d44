//! Crawlability checks: robots.txt coverage of sensitive paths and link hygiene.

use std::collections::BTreeMap;

use anyhow::{anyhow, Result};
use seoa_crawler::robots::unknown_paths;
use seoa_crawler::{PathStatus, RobotsPolicy, WebCrawler, SENSITIVE_PATHS};
use serde::{Deserialize, Serialize};
use sws_scraper::{Html, Selector};
use url::Url;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlingAuditResult {
    pub robots_status: BTreeMap<String, PathStatus>,
    pub js_links_count: usize,
    pub risky_external_links: Vec<String>,
    pub error_message: Option<String>,
}

impl CrawlingAuditResult {
    pub fn exposed_paths(&self) -> impl Iterator<Item = &str> {
        self.robots_status
            .iter()
            .filter(|(_, s)| **s == PathStatus::Allowed)
            .map(|(p, _)| p.as_str())
    }
}

#[derive(Debug, Default, PartialEq)]
struct LinkAudit {
    js_links: usize,
    risky: Vec<String>,
}

/// robots.txt group checked, the rules any crawler would follow.
const ROBOTS_AGENT: &str = "*";

pub struct CrawlingAuditor {
    url: String,
}

impl CrawlingAuditor {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub async fn run(&self, crawler: &WebCrawler, html: Option<&str>) -> CrawlingAuditResult {
        log::info!("Starting crawl audit for {}", self.url);

        let robots_status = match RobotsPolicy::fetch(crawler, &self.url, ROBOTS_AGENT).await {
            Ok(policy) => policy.check_paths(SENSITIVE_PATHS),
            Err(e) => {
                log::warn!("{e}");
                unknown_paths(SENSITIVE_PATHS)
            }
        };

        let mut result = CrawlingAuditResult {
            robots_status,
            ..Default::default()
        };

        match html {
            Some(html) if !html.is_empty() => match audit_links(&self.url, html) {
                Ok(links) => {
                    result.js_links_count = links.js_links;
                    result.risky_external_links = links.risky;
                }
                Err(e) => result.error_message = Some(format!("Audit failed: {e}")),
            },
            _ => result.error_message = Some("No HTML content provided to auditor.".into()),
        }
        result
    }
}

fn netloc(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Missing host in {url}"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn audit_links(page_url: &str, html: &str) -> Result<LinkAudit> {
    let domain = netloc(&Url::parse(page_url)?)?;
    let doc = Html::parse_document(html);
    let anchors =
        Selector::parse("a").map_err(|e| anyhow!("Invalid selector a got: {e:?}"))?;

    let mut audit = LinkAudit::default();
    for a in doc.select(anchors) {
        let (href, rel, onclick) = a
            .map_value(|v| {
                (
                    v.attr("href").unwrap_or_default().trim().to_string(),
                    v.attr("rel").unwrap_or_default().to_ascii_lowercase(),
                    v.attr("onclick").is_some(),
                )
            })
            .unwrap_or_default();

        if href.to_ascii_lowercase().starts_with("javascript:") || (href == "#" && onclick) {
            audit.js_links += 1;
        }

        let nofollow = rel.split_whitespace().any(|r| r == "nofollow");
        if href.starts_with("http") && !href.contains(&domain) && !nofollow {
            audit.risky.push(href);
        }
    }
    Ok(audit)
}
