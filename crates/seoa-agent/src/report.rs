//! Markdown audit report rendered from the collected stage results.

use std::fmt::{self, Write};

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::onpage::{OnPageResult, MISSING};
use crate::pipeline::AuditState;
use crate::strategy::{Priority, StrategyResult};
use crate::technical::TechnicalAuditResult;

const LCP_BUDGET_SECS: f64 = 2.5;
const GOOD_PERFORMANCE: u32 = 80;
const MAX_H2_LISTED: usize = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scorecard {
    pub good: usize,
    pub recommended: usize,
    pub critical: usize,
}

/// On-page score: 100 minus 10 for each missing basic.
pub fn seo_score(onpage: Option<&OnPageResult>, technical: Option<&TechnicalAuditResult>) -> u32 {
    let mut score = 100;
    let title = onpage.and_then(|o| o.title.as_deref()).unwrap_or_default();
    let meta = onpage
        .and_then(|o| o.meta_description.as_deref())
        .unwrap_or_default();
    let has_h1 = onpage.map_or(false, |o| !o.h1().is_empty());

    if title.is_empty() {
        score -= 10;
    }
    if meta.is_empty() {
        score -= 10;
    }
    if !has_h1 {
        score -= 10;
    }
    if technical.and_then(|t| t.uses_https) != Some(true) {
        score -= 10;
    }
    if technical.and_then(|t| t.mobile_friendly) == Some(false) {
        score -= 10;
    }
    score
}

/// Mean of the PageSpeed performance score (0 when unknown) and [`seo_score`].
pub fn overall_score(state: &AuditState) -> u32 {
    let technical = state.technical.as_ref();
    let perf = technical.and_then(|t| t.performance_score).unwrap_or(0);
    (perf + seo_score(state.onpage.as_ref(), technical)) / 2
}

pub fn scorecard(state: &AuditState) -> Scorecard {
    let mut card = Scorecard::default();
    let onpage = state.onpage.as_ref();
    let technical = state.technical.as_ref();

    let has_title = onpage.and_then(|o| o.title.as_deref()).map_or(false, |t| !t.is_empty());
    if has_title {
        card.good += 1;
    } else {
        card.critical += 1;
    }

    match technical.and_then(TechnicalAuditResult::lcp_seconds) {
        Some(lcp) if lcp > LCP_BUDGET_SECS => card.critical += 1,
        Some(lcp) if lcp < LCP_BUDGET_SECS => card.good += 1,
        _ => card.recommended += 1,
    }

    match technical.and_then(|t| t.performance_score) {
        Some(score) if score > GOOD_PERFORMANCE => card.good += 1,
        Some(_) => card.recommended += 1,
        None => {}
    }

    if technical.and_then(|t| t.uses_https) == Some(false) {
        card.critical += 1;
    }
    if technical.and_then(|t| t.mobile_friendly) == Some(false) {
        card.recommended += 1;
    }

    if let Some(o) = onpage.filter(|o| o.error_message.is_none()) {
        let improvements = [
            o.meta_description.as_deref().map_or(true, str::is_empty),
            o.h1().is_empty(),
            !o.has_canonical(),
            o.schema == MISSING,
            !o.og_tags.starts_with("Perfect"),
            o.images_missing_alt() > 0,
        ];
        card.recommended += improvements.iter().filter(|i| **i).count();
    }

    if let Some(audit) = &state.crawl_audit {
        card.recommended += audit.exposed_paths().count();
    }
    card
}

fn interpretation(score: u32) -> &'static str {
    match score {
        90..=u32::MAX => "Excellent",
        75..=89 => "Very Good",
        50..=74 => "Needs Improvement",
        _ => "Poor",
    }
}

const TITLE_BAND: (usize, usize) = (30, 60);
const META_BAND: (usize, usize) = (120, 160);

fn length_status(text: &str, (min, max): (usize, usize)) -> &'static str {
    match text.chars().count() {
        0 => "Missing",
        n if n < min => "Too Short",
        n if n > max => "Too Long",
        _ => "Good",
    }
}

fn or_missing(text: Option<&str>) -> &str {
    text.filter(|t| !t.is_empty()).unwrap_or("Missing")
}

/// Renders the report, fails when the page itself couldn't be fetched.
pub fn render(state: &AuditState, date: NaiveDate) -> Result<String> {
    let crawl = state
        .crawl
        .as_ref()
        .ok_or_else(|| anyhow!("page was never crawled"))?;
    if let Some(e) = &crawl.error_message {
        return Err(anyhow!("{e}"));
    }

    let mut out = String::new();
    write_report(&mut out, state, date)?;
    Ok(out)
}

fn write_report(out: &mut String, state: &AuditState, date: NaiveDate) -> fmt::Result {
    let url = &state.url;
    let onpage = state.onpage.as_ref();
    let technical = state.technical.as_ref();
    let research = state.research.as_ref();

    let title = onpage.and_then(|o| o.title.as_deref()).unwrap_or_default();
    let meta = onpage
        .and_then(|o| o.meta_description.as_deref())
        .unwrap_or_default();
    let overall = overall_score(state);
    let card = scorecard(state);

    writeln!(out, "# COMPREHENSIVE SEO AUDIT REPORT")?;
    writeln!(out, "**Target Website:** {url}")?;
    writeln!(out, "**Audit Date:** {}", date.format("%B %d, %Y"))?;
    writeln!(out, "\n---\n")?;

    writeln!(out, "## 1. Executive Summary\n")?;
    writeln!(
        out,
        "**Overall Score:** {overall}/100 ({})",
        interpretation(overall)
    )?;
    match technical.and_then(|t| t.performance_score) {
        Some(perf) => writeln!(out, "- Performance score: {perf}/100")?,
        None => writeln!(out, "- Performance score: not available")?,
    }
    writeln!(
        out,
        "- On-page score: {}/100",
        seo_score(onpage, technical)
    )?;
    writeln!(
        out,
        "- {} critical issue(s) need immediate attention.",
        card.critical
    )?;

    writeln!(out, "\n## 2. Scorecard Overview\n")?;
    writeln!(out, "| Category | Findings Count |")?;
    writeln!(out, "| :--- | :--- |")?;
    writeln!(out, "| **Good Results** | {} |", card.good)?;
    writeln!(out, "| **Recommended Improvements** | {} |", card.recommended)?;
    writeln!(out, "| **Critical Issues** | {} |", card.critical)?;

    writeln!(out, "\n## 3. Search Engine Visibility\n")?;
    writeln!(out, "> **{}**", or_missing(Some(title)))?;
    writeln!(out, "> {url}")?;
    writeln!(out, "> {}", or_missing(Some(meta)))?;

    writeln!(out, "\n## 4. On-Page SEO Analysis\n")?;
    if let Some(err) = onpage.and_then(|o| o.error_message.as_deref()) {
        writeln!(out, "On-page analysis failed: {err}\n")?;
    }
    writeln!(out, "### 4.1 Title Tag\n")?;
    writeln!(out, "- **Status:** {}", length_status(title, TITLE_BAND))?;
    writeln!(
        out,
        "- **Character Length:** {} characters (Optimal: {}-{} characters)",
        title.chars().count(),
        TITLE_BAND.0,
        TITLE_BAND.1
    )?;
    writeln!(out, "- **Current Content:** \"{}\"", or_missing(Some(title)))?;
    writeln!(out, "\n### 4.2 Meta Description\n")?;
    writeln!(out, "- **Status:** {}", length_status(meta, META_BAND))?;
    writeln!(
        out,
        "- **Character Length:** {} characters (Optimal: {}-{} characters)",
        meta.chars().count(),
        META_BAND.0,
        META_BAND.1
    )?;
    writeln!(out, "- **Current Content:** \"{}\"", or_missing(Some(meta)))?;
    writeln!(out, "\n### 4.3 Keyword Usage\n")?;
    match research {
        Some(r) if r.error_message.is_some() => writeln!(
            out,
            "- **Primary Keyword Identified:** N/A (research failed: {})",
            r.error_message.as_deref().unwrap_or_default()
        )?,
        _ => writeln!(
            out,
            "- **Primary Keyword Identified:** {}",
            research.and_then(|r| r.primary_keyword()).unwrap_or("N/A")
        )?,
    }
    if let Some(kw) = research.and_then(|r| r.keyword_analysis.as_ref()) {
        if !kw.secondary_keywords.is_empty() {
            writeln!(
                out,
                "- **Secondary Keywords:** {}",
                kw.secondary_keywords.join(", ")
            )?;
        }
    }

    writeln!(out, "\n## 5. Content Structure & Hierarchy\n")?;
    let h1s = onpage.map(OnPageResult::h1).unwrap_or_default();
    let h2s = onpage.map(OnPageResult::h2).unwrap_or_default();
    writeln!(out, "### 5.1 Heading Tags\n")?;
    let h1_status = match h1s.len() {
        0 => "Missing",
        1 => "Good",
        _ => "Multiple H1 Tags",
    };
    writeln!(out, "- **H1 Tag Status:** {h1_status}")?;
    writeln!(
        out,
        "- **Current H1:** \"{}\"",
        h1s.first().map(String::as_str).unwrap_or("No H1 Tag Found")
    )?;
    if let Some(o) = onpage {
        writeln!(out, "- **Word Count:** {}", o.body_text_length)?;
    }
    writeln!(out, "\n**Sub-heading Distribution (H2 Tags):**\n")?;
    if h2s.is_empty() {
        writeln!(out, "No H2 tags found.")?;
    } else {
        for h2 in h2s.iter().take(MAX_H2_LISTED) {
            writeln!(out, "- {h2}")?;
        }
    }
    writeln!(out, "\n### 5.2 Content Quality & Gaps\n")?;
    writeln!(
        out,
        "- **Competitor Count:** {}",
        research.map_or(0, |r| r.competitor_urls.len())
    )?;
    let gaps = research.map(|r| r.suggested_topics()).unwrap_or_default();
    writeln!(out, "\n**Identified Content Gaps:**\n")?;
    if gaps.is_empty() {
        writeln!(out, "No specific content gaps detected.")?;
    } else {
        for gap in gaps {
            writeln!(out, "- {gap}")?;
        }
    }

    writeln!(out, "\n## 6. Technical Infrastructure\n")?;
    let canonical = onpage.map_or(MISSING, |o| o.canonical.as_str());
    writeln!(out, "- **Canonical:** {canonical}")?;
    writeln!(
        out,
        "- **Robots Directives:** {}",
        onpage.map_or(MISSING, |o| o.robots.as_str())
    )?;
    writeln!(
        out,
        "- **Schema Markup:** {}",
        onpage.map_or(MISSING, |o| o.schema.as_str())
    )?;
    writeln!(
        out,
        "- **Open Graph:** {}",
        onpage.map_or(MISSING, |o| o.og_tags.as_str())
    )?;
    if let Some(o) = onpage {
        writeln!(
            out,
            "- **Links:** {} internal, {} external",
            o.links.internal.len(),
            o.links.external.len()
        )?;
    }
    if let Some(audit) = &state.crawl_audit {
        writeln!(out, "\n**robots.txt coverage of sensitive paths:**\n")?;
        for (path, status) in &audit.robots_status {
            writeln!(out, "- `{path}`: {status}")?;
        }
        writeln!(out, "- **JavaScript links:** {}", audit.js_links_count)?;
        writeln!(
            out,
            "- **External links without nofollow:** {}",
            audit.risky_external_links.len()
        )?;
        if let Some(err) = &audit.error_message {
            writeln!(out, "- **Crawl audit note:** {err}")?;
        }
    }

    writeln!(out, "\n## 7. Site Performance & Core Web Vitals\n")?;
    match technical {
        Some(t) if t.error_message.is_some() => writeln!(
            out,
            "Technical audit failed: {}",
            t.error_message.as_deref().unwrap_or_default()
        )?,
        Some(t) => {
            let (lcp, cls, tbt, fcp, si) = match &t.core_web_vitals {
                Some(v) => (
                    v.lcp.as_str(),
                    v.cls.as_str(),
                    v.tbt.as_str(),
                    v.fcp.as_str(),
                    v.si.as_str(),
                ),
                None => ("N/A", "N/A", "N/A", "N/A", "N/A"),
            };
            writeln!(out, "| Metric | Value |")?;
            writeln!(out, "| :--- | :--- |")?;
            writeln!(
                out,
                "| **Overall Performance Score** | {}/100 |",
                t.performance_score
                    .map_or_else(|| "N/A".to_string(), |s| s.to_string())
            )?;
            writeln!(out, "| **Largest Contentful Paint (LCP)** | {lcp} |")?;
            writeln!(out, "| **Cumulative Layout Shift (CLS)** | {cls} |")?;
            writeln!(out, "| **Total Blocking Time (TBT)** | {tbt} |")?;
            writeln!(out, "| **First Contentful Paint (FCP)** | {fcp} |")?;
            writeln!(out, "| **Speed Index** | {si} |")?;
            if !t.top_opportunities.is_empty() {
                writeln!(out, "\n**Optimization Opportunities:**\n")?;
                for opportunity in &t.top_opportunities {
                    writeln!(out, "- {opportunity}")?;
                }
            }
        }
        None => writeln!(out, "Technical audit not available.")?,
    }
    if let Some(crawl) = &state.crawl {
        writeln!(
            out,
            "\n- **Response Time:** {:.2}s",
            crawl.response_time_ms as f64 / 1000.0
        )?;
        writeln!(
            out,
            "- **Page Size:** {:.1} KB",
            crawl.content_length as f64 / 1024.0
        )?;
    }

    writeln!(out, "\n## 8. Security & Accessibility\n")?;
    let https = match technical.and_then(|t| t.uses_https) {
        Some(true) => "Secure",
        Some(false) => "Insecure",
        None => "Unknown",
    };
    writeln!(out, "- **HTTPS (SSL Certificate):** {https}")?;
    let mobile = match technical.and_then(|t| t.mobile_friendly) {
        Some(true) => "Yes",
        Some(false) => "No",
        None => "Unknown",
    };
    writeln!(out, "- **Mobile Friendly:** {mobile}")?;
    if let Some(o) = onpage {
        writeln!(out, "- **Total Images:** {}", o.images.len())?;
        writeln!(out, "- **Images Missing Alt Text:** {}", o.images_missing_alt())?;
    }

    writeln!(out, "\n## 9. Strategic Action Plan\n")?;
    let empty = StrategyResult::default();
    let strategy = state.strategy.as_ref().unwrap_or(&empty);
    if let Some(err) = &strategy.error_message {
        writeln!(out, "{err}\n")?;
    }
    for (priority, heading, fallback) in [
        (
            Priority::High,
            "High Priority (Critical Fixes)",
            "No critical high-priority issues found.",
        ),
        (
            Priority::Medium,
            "Medium Priority (Optimization)",
            "No medium-priority optimization suggested.",
        ),
        (
            Priority::Low,
            "Low Priority (Maintenance)",
            "No low-priority maintenance items.",
        ),
    ] {
        writeln!(out, "### {heading}\n")?;
        let mut any = false;
        for rec in strategy.with_priority(priority) {
            any = true;
            writeln!(
                out,
                "- **{}:** {} ({})",
                rec.category, rec.recommendation, rec.justification
            )?;
        }
        if !any {
            writeln!(out, "{fallback}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "## 10. Content Optimization\n")?;
    match &state.optimization {
        Some(opt) if opt.error_message.is_some() => writeln!(
            out,
            "{}",
            opt.error_message.as_deref().unwrap_or_default()
        )?,
        Some(opt) if opt.optimized_title_meta.is_some() || !opt.new_sections.is_empty() => {
            if let Some(meta) = &opt.optimized_title_meta {
                writeln!(out, "- **Suggested Title:** {}", meta.new_title)?;
                writeln!(
                    out,
                    "- **Suggested Meta Description:** {}",
                    meta.new_meta_description
                )?;
            }
            for section in &opt.new_sections {
                writeln!(out, "\n### {}\n", section.suggested_heading)?;
                writeln!(out, "{}", section.new_content_paragraph)?;
            }
        }
        _ => writeln!(out, "No content changes were generated.")?,
    }

    writeln!(out, "\n---\n*End of Report*")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use seoa_crawler::CrawlResult;

    use super::*;
    use crate::onpage::OnPageAnalyzer;
    use crate::strategy::Recommendation;
    use crate::technical::CoreWebVitals;

    fn crawled(url: &str) -> CrawlResult {
        CrawlResult {
            url: url.into(),
            status_code: 200,
            html_content: Some("<html></html>".into()),
            error_message: None,
            response_time_ms: 1500,
            content_length: 2048,
            attempts: 1,
        }
    }

    fn technical(score: u32, lcp: f64, https: bool) -> TechnicalAuditResult {
        TechnicalAuditResult {
            url: "https://shop.example.com/".into(),
            performance_score: Some(score),
            mobile_friendly: Some(true),
            uses_https: Some(https),
            core_web_vitals: Some(CoreWebVitals {
                lcp: format!("{lcp} s"),
                cls: "0.01".into(),
                tbt: "10 ms".into(),
                si: "1.0 s".into(),
                fcp: "0.8 s".into(),
                lcp_seconds: Some(lcp),
            }),
            top_opportunities: vec!["Reduce unused JavaScript".into()],
            error_message: None,
        }
    }

    fn state() -> AuditState {
        let html = r#"<html><head><title>Handmade Leather Boots for Every Season</title>
            <meta name="description" content="Boots built to last.">
            <link rel="canonical" href="https://shop.example.com/"></head>
            <body><h1>Boots</h1><h2>Care</h2></body></html>"#;
        let mut state = AuditState::new("https://shop.example.com/");
        state.crawl = Some(crawled(&state.url));
        state.onpage = Some(OnPageAnalyzer::new(&state.url, Some(html)).analyze());
        state.technical = Some(technical(92, 1.8, true));
        state
    }

    #[test]
    fn seo_score_deductions() {
        assert_eq!(seo_score(None, None), 60);

        let s = state();
        assert_eq!(seo_score(s.onpage.as_ref(), s.technical.as_ref()), 100);

        let mut t = technical(50, 3.0, false);
        t.mobile_friendly = Some(false);
        assert_eq!(seo_score(s.onpage.as_ref(), Some(&t)), 80);
    }

    #[test]
    fn overall_is_the_mean() {
        let mut s = state();
        assert_eq!(overall_score(&s), 96);

        s.technical = Some(TechnicalAuditResult::failed(&s.url, "timeout"));
        assert_eq!(overall_score(&s), 45);
    }

    #[test]
    fn scorecard_buckets() {
        let mut s = state();
        let card = scorecard(&s);
        assert_eq!(card.critical, 0);
        assert_eq!(card.good, 3);
        // schema and open graph missing
        assert_eq!(card.recommended, 2);

        s.technical = Some(technical(40, 4.2, false));
        s.onpage.as_mut().unwrap().title = None;
        let card = scorecard(&s);
        assert_eq!(card.critical, 3);
        assert_eq!(card.good, 0);
        assert_eq!(card.recommended, 3);
    }

    #[test]
    fn crawl_failure_means_no_report() {
        let mut s = state();
        s.crawl.as_mut().unwrap().error_message = Some("HTTP Error: Not Found".into());
        let err = render(&s, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap_err();
        assert_eq!(err.to_string(), "HTTP Error: Not Found");
    }

    #[test]
    fn renders_every_section() {
        let mut s = state();
        s.strategy = Some(StrategyResult {
            recommendations: vec![Recommendation {
                priority: Priority::Medium,
                category: "Content".into(),
                recommendation: "Add a care guide".into(),
                justification: "Competitors cover it".into(),
            }],
            error_message: None,
        });
        s.crawl_audit = Some(crate::crawl_audit::CrawlingAuditResult {
            robots_status: BTreeMap::from([(
                "/admin".to_string(),
                seoa_crawler::PathStatus::Blocked,
            )]),
            ..Default::default()
        });

        let report = render(&s, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap();

        assert!(report.starts_with("# COMPREHENSIVE SEO AUDIT REPORT\n"));
        assert!(report.contains("**Audit Date:** May 01, 2024"));
        assert!(report.contains("**Overall Score:** 96/100 (Excellent)"));
        assert!(report.contains("> **Handmade Leather Boots for Every Season**"));
        assert!(report.contains("- **Status:** Too Short\n- **Character Length:** 20"));
        assert!(report.contains("- **Current H1:** \"Boots\""));
        assert!(report.contains("- Care"));
        assert!(report.contains("- `/admin`: Blocked (Safe)"));
        assert!(report.contains("| **Largest Contentful Paint (LCP)** | 1.8 s |"));
        assert!(report.contains("- **HTTPS (SSL Certificate):** Secure"));
        assert!(report.contains("No critical high-priority issues found."));
        assert!(report.contains("- **Content:** Add a care guide (Competitors cover it)"));
        assert!(report.contains("No low-priority maintenance items."));
        assert!(report.contains("No content changes were generated."));
        assert!(report.contains("- **Page Size:** 2.0 KB"));
        assert!(report.ends_with("*End of Report*\n"));
    }

    #[test]
    fn score_labels() {
        assert_eq!(interpretation(100), "Excellent");
        assert_eq!(interpretation(75), "Very Good");
        assert_eq!(interpretation(50), "Needs Improvement");
        assert_eq!(interpretation(12), "Poor");
        assert_eq!(length_status("", TITLE_BAND), "Missing");
        assert_eq!(length_status(&"x".repeat(61), TITLE_BAND), "Too Long");
    }

    #[test]
    fn length_advice_matches_the_status() {
        let report = render(&state(), NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()).unwrap();
        assert!(report.contains("- **Status:** Good\n"));
        assert!(report.contains("39 characters (Optimal: 30-60 characters)"));
        assert!(report.contains("- **Status:** Too Short\n"));
        assert!(report.contains("20 characters (Optimal: 120-160 characters)"));
    }
}
