//! On-page SEO signals extracted from already fetched HTML.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sws_scraper::{ElementRef, Html, Selector};
use url::Url;

pub const MISSING: &str = "Missing";

/// Only the first images are kept, enough to judge alt text coverage.
const MAX_IMAGES: usize = 20;

const ASSUMED_ROBOTS: &str = "Index/Follow (Assumed)";

/// Page metadata reported by the fetcher, preferred over what the HTML says.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub robots: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    pub alt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Links {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnPageResult {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: BTreeMap<String, Vec<String>>,
    pub body_text_length: usize,
    pub images: Vec<ImageInfo>,
    pub links: Links,
    pub canonical: String,
    pub robots: String,
    pub og_tags: String,
    pub schema: String,
    pub error_message: Option<String>,
}

impl OnPageResult {
    /// Empty result carrying `error` and the given marker for tag checks.
    pub fn failed(url: impl Into<String>, error: impl Into<String>, marker: &str) -> Self {
        Self {
            url: url.into(),
            title: None,
            meta_description: None,
            headings: BTreeMap::new(),
            body_text_length: 0,
            images: Vec::new(),
            links: Links::default(),
            canonical: marker.to_string(),
            robots: marker.to_string(),
            og_tags: marker.to_string(),
            schema: marker.to_string(),
            error_message: Some(error.into()),
        }
    }

    pub fn h1(&self) -> &[String] {
        self.headings.get("h1").map(Vec::as_slice).unwrap_or_default()
    }

    pub fn h2(&self) -> &[String] {
        self.headings.get("h2").map(Vec::as_slice).unwrap_or_default()
    }

    pub fn images_missing_alt(&self) -> usize {
        self.images
            .iter()
            .filter(|img| img.alt.as_deref().map_or(true, str::is_empty))
            .count()
    }

    pub fn has_canonical(&self) -> bool {
        !self.canonical.is_empty() && self.canonical != MISSING && self.canonical != "Error"
    }
}

pub struct OnPageAnalyzer<'a> {
    url: &'a str,
    html: Option<&'a str>,
    metadata: PageMetadata,
}

impl<'a> OnPageAnalyzer<'a> {
    pub fn new(url: &'a str, html: Option<&'a str>) -> Self {
        Self {
            url,
            html,
            metadata: PageMetadata::default(),
        }
    }

    pub fn with_metadata(mut self, metadata: PageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn analyze(&self) -> OnPageResult {
        let html = match self.html {
            Some(html) if !html.trim().is_empty() => html,
            _ => {
                return OnPageResult::failed(
                    self.url,
                    "Analysis Failed: No HTML content provided.",
                    MISSING,
                )
            }
        };

        log::debug!("Analyzing on-page signals of {}", self.url);
        match self.extract(html) {
            Ok(result) => result,
            Err(e) => OnPageResult::failed(self.url, format!("Parsing Error: {e}"), "Error"),
        }
    }

    fn extract(&self, html: &str) -> Result<OnPageResult> {
        let page_url = Url::parse(self.url)?;
        let doc = Html::parse_document(html);

        let title = non_empty(self.metadata.title.clone()).or_else(|| {
            first(&doc, "title")
                .ok()
                .flatten()
                .map(|t| collapse(&t.inner_text()))
        });
        let meta_description = match non_empty(self.metadata.description.clone()) {
            Some(desc) => Some(desc),
            None => first(&doc, r#"meta[name="description"]"#)?
                .map(|m| attr(&m, "content").unwrap_or_default().trim().to_string()),
        };

        let robots = match non_empty(self.metadata.robots.clone()) {
            Some(robots) => robots,
            None => first(&doc, r#"meta[name="robots"]"#)?
                .and_then(|m| attr(&m, "content"))
                .unwrap_or_else(|| ASSUMED_ROBOTS.to_string()),
        };

        let canonical = first(&doc, r#"link[rel~="canonical"]"#)?
            .and_then(|l| attr(&l, "href"))
            .unwrap_or_else(|| MISSING.to_string());

        let schema = if first(&doc, r#"script[type="application/ld+json"]"#)?.is_some() {
            "Detected (JSON-LD)".to_string()
        } else {
            MISSING.to_string()
        };

        Ok(OnPageResult {
            url: self.url.to_string(),
            title,
            meta_description,
            headings: headings(&doc)?,
            body_text_length: body_text(&doc)?.split_whitespace().count(),
            images: images(&doc)?,
            links: links(&doc, &page_url)?,
            canonical,
            robots,
            og_tags: open_graph(&doc)?,
            schema,
            error_message: None,
        })
    }
}

/// Visible body text, one space between text nodes.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    body_text(&doc).unwrap_or_default()
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid selector {css} got: {e:?}"))
}

fn select(doc: &Html, css: &str) -> Result<impl Iterator<Item = ElementRef>> {
    Ok(doc.select(selector(css)?))
}

fn first(doc: &Html, css: &str) -> Result<Option<ElementRef>> {
    Ok(select(doc, css)?.next())
}

fn attr(el: &ElementRef, name: &str) -> Option<String> {
    el.map_value(|v| v.attr(name).map(String::from)).flatten()
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn body_text(doc: &Html) -> Result<String> {
    let text = match first(doc, "body")? {
        Some(body) => body
            .text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        None => String::new(),
    };
    Ok(text)
}

fn headings(doc: &Html) -> Result<BTreeMap<String, Vec<String>>> {
    let mut headings = BTreeMap::new();
    for level in ["h1", "h2", "h3"] {
        let found = select(doc, level)?
            .map(|h| collapse(&h.inner_text()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>();
        if !found.is_empty() {
            headings.insert(level.to_string(), found);
        }
    }
    Ok(headings)
}

fn images(doc: &Html) -> Result<Vec<ImageInfo>> {
    let images = select(doc, "img")?
        .take(MAX_IMAGES)
        .filter_map(|img| {
            let src = attr(&img, "src").filter(|s| !s.trim().is_empty())?;
            Some(ImageInfo {
                src,
                alt: attr(&img, "alt"),
            })
        })
        .collect();
    Ok(images)
}

fn links(doc: &Html, page_url: &Url) -> Result<Links> {
    let mut internal = BTreeSet::new();
    let mut external = BTreeSet::new();

    for a in select(doc, "a[href]")? {
        let href = attr(&a, "href").unwrap_or_default();
        let href = href.trim();
        let lowered = href.to_ascii_lowercase();
        if href.is_empty()
            || lowered.starts_with("javascript:")
            || lowered.starts_with("mailto:")
            || lowered.starts_with("tel:")
        {
            continue;
        }

        let Ok(full) = page_url.join(href) else {
            log::debug!("Ignoring unresolvable link {href}");
            continue;
        };
        if same_site(page_url, &full) {
            internal.insert(full.to_string());
        } else {
            external.insert(full.to_string());
        }
    }

    Ok(Links {
        internal: internal.into_iter().collect(),
        external: external.into_iter().collect(),
    })
}

fn same_site(page: &Url, link: &Url) -> bool {
    page.host_str() == link.host_str()
        && page.port_or_known_default() == link.port_or_known_default()
}

fn open_graph(doc: &Html) -> Result<String> {
    let mut found = Vec::new();
    for (property, label) in [
        ("og:title", "title"),
        ("og:description", "desc"),
        ("og:image", "image"),
    ] {
        if first(doc, &format!(r#"meta[property="{property}"]"#))?.is_some() {
            found.push(label);
        }
    }

    let status = match found.len() {
        3 => "Perfect (All Main Tags Found)".to_string(),
        0 => MISSING.to_string(),
        _ => format!("Partial ({})", found.join(", ")),
    };
    Ok(status)
}
