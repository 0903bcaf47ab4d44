use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use texting_robots::Robot;
use url::Url;

use crate::crawler::WebCrawler;
use crate::error::FetchError;

/// Paths that should never be crawlable on a commercial site.
pub const SENSITIVE_PATHS: [&str; 5] = ["/login", "/admin", "/cart", "/checkout", "/account"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathStatus {
    #[serde(rename = "Blocked (Safe)")]
    Blocked,
    #[serde(rename = "Allowed (Risk)")]
    Allowed,
    #[serde(rename = "Unknown/Read Error")]
    Unknown,
}

impl fmt::Display for PathStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocked => f.write_str("Blocked (Safe)"),
            Self::Allowed => f.write_str("Allowed (Risk)"),
            Self::Unknown => f.write_str("Unknown/Read Error"),
        }
    }
}

/// Location of the robots.txt governing `page_url`.
pub fn robots_url(page_url: &str) -> Result<String> {
    let url = Url::parse(page_url)?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Missing host in {page_url}"))?;
    let robots = match url.port() {
        Some(port) => format!("{}://{host}:{port}/robots.txt", url.scheme()),
        None => format!("{}://{host}/robots.txt", url.scheme()),
    };
    Ok(robots)
}

/// Every path marked as unreadable, used when robots.txt couldn't be fetched.
pub fn unknown_paths<'a, I>(paths: I) -> BTreeMap<String, PathStatus>
where
    I: IntoIterator<Item = &'a str>,
{
    paths
        .into_iter()
        .map(|p| (p.to_string(), PathStatus::Unknown))
        .collect()
}

enum Rules {
    AllowAll,
    DisallowAll,
    Parsed(Robot),
}

/// Parsed robots.txt rules for one user agent.
pub struct RobotsPolicy {
    robots_url: String,
    base: Url,
    rules: Rules,
}

impl fmt::Debug for RobotsPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rules = match self.rules {
            Rules::AllowAll => "allow all",
            Rules::DisallowAll => "disallow all",
            Rules::Parsed(_) => "parsed",
        };
        f.debug_struct("RobotsPolicy")
            .field("robots_url", &self.robots_url)
            .field("rules", &rules)
            .finish()
    }
}

impl RobotsPolicy {
    /// Downloads and parses the robots.txt of `page_url`'s site.
    ///
    /// A robots.txt answered with 401 or 403 disallows everything, any other
    /// 4xx allows everything. Remaining failures are returned to the caller.
    pub async fn fetch(crawler: &WebCrawler, page_url: &str, agent: &str) -> Result<Self> {
        let robots_url = robots_url(page_url)?;
        match crawler.try_fetch(&robots_url).await {
            Ok(page) => Self::parse(page_url, agent, &page.body),
            Err(FetchError::Status { status, .. }) if status == 401 || status == 403 => {
                log::info!("{robots_url} is forbidden ({status}), assuming nothing is allowed");
                Self::disallow_all(page_url)
            }
            Err(FetchError::Status { status, .. }) if (400..500).contains(&status) => {
                log::info!("No robots.txt at {robots_url} ({status}), assuming all is allowed");
                Self::allow_all(page_url)
            }
            Err(e) => Err(anyhow!("Couldn't read {robots_url} got: {e}")),
        }
    }

    pub fn parse(page_url: &str, agent: &str, txt: &str) -> Result<Self> {
        let robot = Robot::new(agent, txt.as_bytes())
            .map_err(|e| anyhow!("Couldn't parse robots.txt for {page_url} got: {e}"))?;
        Ok(Self {
            robots_url: robots_url(page_url)?,
            base: Url::parse(page_url)?,
            rules: Rules::Parsed(robot),
        })
    }

    pub fn allow_all(page_url: &str) -> Result<Self> {
        Self::with_rules(page_url, Rules::AllowAll)
    }

    pub fn disallow_all(page_url: &str) -> Result<Self> {
        Self::with_rules(page_url, Rules::DisallowAll)
    }

    fn with_rules(page_url: &str, rules: Rules) -> Result<Self> {
        Ok(Self {
            robots_url: robots_url(page_url)?,
            base: Url::parse(page_url)?,
            rules,
        })
    }

    fn robot(&self) -> Option<&Robot> {
        match &self.rules {
            Rules::Parsed(robot) => Some(robot),
            Rules::AllowAll | Rules::DisallowAll => None,
        }
    }

    pub fn robots_url(&self) -> &str {
        &self.robots_url
    }

    /// Whether the agent may fetch `path_or_url`, relative paths are resolved
    /// against the audited page.
    pub fn is_allowed(&self, path_or_url: &str) -> bool {
        let robot = match &self.rules {
            Rules::AllowAll => return true,
            Rules::DisallowAll => return false,
            Rules::Parsed(robot) => robot,
        };
        match self.base.join(path_or_url) {
            Ok(url) => robot.allowed(url.as_str()),
            Err(_) => robot.allowed(path_or_url),
        }
    }

    /// `None` when absent or not a usable number of seconds.
    pub fn crawl_delay(&self) -> Option<Duration> {
        self.robot()
            .and_then(|r| r.delay)
            .and_then(|secs| Duration::try_from_secs_f32(secs).ok())
    }

    pub fn sitemaps(&self) -> &[String] {
        self.robot()
            .map(|r| r.sitemaps.as_slice())
            .unwrap_or_default()
    }

    /// Looks each path up in turn.
    pub fn check_paths<'a, I>(&self, paths: I) -> BTreeMap<String, PathStatus>
    where
        I: IntoIterator<Item = &'a str>,
    {
        paths
            .into_iter()
            .map(|path| {
                let status = if self.is_allowed(path) {
                    PathStatus::Allowed
                } else {
                    PathStatus::Blocked
                };
                (path.to_string(), status)
            })
            .collect()
    }
}
