use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::llm::{generate_json, LanguageModel, LlmRequest};
use crate::onpage::OnPageResult;
use crate::research::MarketResearchReport;
use crate::technical::TechnicalAuditResult;

const TEMPERATURE: f32 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    #[serde(alias = "high", alias = "HIGH")]
    High,
    #[serde(alias = "medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "low", alias = "LOW")]
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("High"),
            Self::Medium => f.write_str("Medium"),
            Self::Low => f.write_str("Low"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub recommendation: String,
    pub justification: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyResult {
    pub recommendations: Vec<Recommendation>,
    pub error_message: Option<String>,
}

impl StrategyResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            recommendations: Vec::new(),
            error_message: Some(error.into()),
        }
    }

    pub fn with_priority(&self, priority: Priority) -> impl Iterator<Item = &Recommendation> {
        self.recommendations
            .iter()
            .filter(move |r| r.priority == priority)
    }
}

#[derive(Debug, Deserialize)]
struct SeoStrategy {
    recommendations: Vec<Recommendation>,
}

pub struct SeoStrategist<'a> {
    llm: &'a dyn LanguageModel,
}

impl<'a> SeoStrategist<'a> {
    pub fn new(llm: &'a dyn LanguageModel) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        onpage: Option<&OnPageResult>,
        technical: Option<&TechnicalAuditResult>,
        research: Option<&MarketResearchReport>,
    ) -> StrategyResult {
        log::info!("Generating SEO strategy");
        match self.try_generate(onpage, technical, research).await {
            Ok(recommendations) => StrategyResult {
                recommendations,
                error_message: None,
            },
            Err(e) => {
                log::warn!("Strategy generation failed: {e:#}");
                StrategyResult::failed(format!("Strategy Generation Failed: {e}"))
            }
        }
    }

    async fn try_generate(
        &self,
        onpage: Option<&OnPageResult>,
        technical: Option<&TechnicalAuditResult>,
        research: Option<&MarketResearchReport>,
    ) -> Result<Vec<Recommendation>> {
        let prompt = format!(
            "You are an expert SEO consultant. Review the audit data below and create a \
             prioritized action plan to improve the ranking of the page.\n\n\
             AUDIT DATA:\n{}\n\
             INSTRUCTIONS:\n\
             1. Put technical blockers (broken pages, slow LCP) and quick wins \
             (missing title, missing meta description) as High priority.\n\
             2. Be specific. Don't say \"Fix LCP\". Say \"Optimize hero image size to reduce LCP\".\n\
             3. When the market research shows missing topics, recommend creating \
             specific pages or sections (category Content).\n\
             4. Provide 5 to 10 distinct recommendations.",
            audit_context(onpage, technical, research)
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "recommendations": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "priority": { "type": "STRING", "enum": ["High", "Medium", "Low"] },
                            "category": {
                                "type": "STRING",
                                "description": "Content, Technical, On-Page, Title Tag, Meta Description or Backlinks"
                            },
                            "recommendation": { "type": "STRING" },
                            "justification": { "type": "STRING" }
                        },
                        "required": ["priority", "category", "recommendation", "justification"]
                    }
                }
            },
            "required": ["recommendations"]
        });

        let strategy: SeoStrategy =
            generate_json(self.llm, LlmRequest::new(prompt, TEMPERATURE).with_schema(schema))
                .await?;
        if strategy.recommendations.is_empty() {
            bail!("the model returned no recommendations");
        }
        Ok(strategy.recommendations)
    }
}

fn section(title: &str, summary: Option<String>) -> String {
    let body = summary.unwrap_or_else(|| String::from("Not available"));
    format!("=== {title} ===\n{body}\n")
}

fn or_missing(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("Missing")
}

fn technical_summary(tech: &TechnicalAuditResult) -> String {
    let vitals = tech.core_web_vitals.as_ref();
    let lcp = vitals.map_or("N/A", |v| v.lcp.as_str());
    let cls = vitals.map_or("N/A", |v| v.cls.as_str());
    let https = tech
        .uses_https
        .unwrap_or_else(|| tech.url.starts_with("https"));
    let mut lines = vec![
        format!(
            "- Performance Score: {}",
            tech.performance_score
                .map_or_else(|| "N/A".to_string(), |s| s.to_string())
        ),
        format!("- LCP: {lcp} | CLS: {cls}"),
        format!(
            "- Mobile Friendly: {}",
            tech.mobile_friendly
                .map_or_else(|| "Unknown".to_string(), |m| m.to_string())
        ),
        format!("- HTTPS: {}", if https { "Yes" } else { "No" }),
    ];
    if let Some(e) = &tech.error_message {
        lines.push(format!("- Audit Error: {e}"));
    }
    lines.join("\n")
}

fn onpage_summary(onpage: &OnPageResult) -> String {
    [
        format!("- Title: {}", or_missing(onpage.title.as_deref())),
        format!(
            "- Meta Description: {}",
            or_missing(onpage.meta_description.as_deref())
        ),
        format!("- H1 Tags: {:?}", onpage.h1()),
        format!("- Word Count: {}", onpage.body_text_length),
        format!("- Canonical: {}", onpage.canonical),
        format!("- Schema: {}", onpage.schema),
    ]
    .join("\n")
}

fn research_summary(research: &MarketResearchReport) -> String {
    let secondary = research
        .keyword_analysis
        .as_ref()
        .map(|k| k.secondary_keywords.join(", "))
        .unwrap_or_default();
    [
        format!(
            "- Primary Keyword: {}",
            research.primary_keyword().unwrap_or("N/A")
        ),
        format!("- Secondary Keywords: {secondary}"),
        format!(
            "- Missing Content Topics: {}",
            research.suggested_topics().join(", ")
        ),
        format!("- Competitors Analyzed: {}", research.competitor_urls.len()),
    ]
    .join("\n")
}

fn audit_context(
    onpage: Option<&OnPageResult>,
    technical: Option<&TechnicalAuditResult>,
    research: Option<&MarketResearchReport>,
) -> String {
    [
        section("TECHNICAL AUDIT", technical.map(technical_summary)),
        section("ON-PAGE ANALYSIS", onpage.map(onpage_summary)),
        section("MARKET RESEARCH", research.map(research_summary)),
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::onpage::OnPageAnalyzer;
    use crate::research::{ContentGapReport, KeywordReport};

    struct Canned {
        answer: Result<&'static str, &'static str>,
        prompt: Mutex<Option<LlmRequest>>,
    }

    #[async_trait]
    impl LanguageModel for Canned {
        async fn generate(&self, request: LlmRequest) -> Result<String> {
            *self.prompt.lock().unwrap() = Some(request);
            self.answer
                .map(String::from)
                .map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn canned(answer: Result<&'static str, &'static str>) -> Canned {
        Canned {
            answer,
            prompt: Mutex::default(),
        }
    }

    #[tokio::test]
    async fn parses_recommendations() {
        let llm = canned(Ok(r#"{"recommendations": [
            {"priority": "High", "category": "Technical", "recommendation": "Compress hero image", "justification": "LCP is 4.1 s"},
            {"priority": "low", "category": "Content", "recommendation": "Add a care guide", "justification": "Gap"}
        ]}"#));
        let technical = TechnicalAuditResult::failed("https://shop.example.com/", "timeout");

        let res = SeoStrategist::new(&llm)
            .generate(None, Some(&technical), None)
            .await;

        assert_eq!(res.error_message, None);
        assert_eq!(res.recommendations.len(), 2);
        assert_eq!(res.recommendations[1].priority, Priority::Low);
        assert_eq!(res.with_priority(Priority::High).count(), 1);

        let request = llm.prompt.lock().unwrap().take().unwrap();
        assert_eq!(request.temperature, 0.4);
        assert!(request.schema.is_some());
        assert!(request.prompt.contains("=== TECHNICAL AUDIT ===\n- Performance Score: N/A\n"));
        assert!(request.prompt.contains("- Audit Error: timeout"));
        assert!(request.prompt.contains("=== MARKET RESEARCH ===\nNot available"));
    }

    #[tokio::test]
    async fn prompt_summarizes_the_audits() {
        let llm = canned(Ok(r#"{"recommendations": [
            {"priority": "High", "category": "Title Tag", "recommendation": "Add a title", "justification": "Missing"}
        ]}"#));

        let html = r#"<html><head><link rel="canonical" href="https://shop.example.com/"></head>
            <body><h1>Leather boots</h1><p>Boots made by hand</p>
            <a href="/care">Care</a><a href="https://partner.example.org/">Partner</a>
            <img src="/a.jpg"></body></html>"#;
        let onpage = OnPageAnalyzer::new("https://shop.example.com/", Some(html)).analyze();

        let mut technical = TechnicalAuditResult::failed("https://shop.example.com/", "x");
        technical.error_message = None;
        technical.performance_score = Some(57);
        technical.mobile_friendly = Some(true);
        technical.uses_https = Some(true);

        let research = MarketResearchReport {
            keyword_analysis: Some(KeywordReport {
                primary_keyword: "leather boots".into(),
                secondary_keywords: vec!["boot care".into(), "handmade boots".into()],
            }),
            competitor_urls: vec!["https://rival.example.com/".into()],
            content_gap_analysis: Some(ContentGapReport {
                competitor_themes: vec![],
                suggested_topics: vec!["Waterproofing".into()],
            }),
            error_message: None,
        };

        SeoStrategist::new(&llm)
            .generate(Some(&onpage), Some(&technical), Some(&research))
            .await;
        let prompt = llm.prompt.lock().unwrap().take().unwrap().prompt;

        for line in [
            "- Performance Score: 57",
            "- LCP: N/A | CLS: N/A",
            "- Mobile Friendly: true",
            "- HTTPS: Yes",
            "- Title: Missing",
            "- Meta Description: Missing",
            "- H1 Tags: [\"Leather boots\"]",
            "- Canonical: https://shop.example.com/",
            "- Schema: Missing",
            "- Primary Keyword: leather boots",
            "- Secondary Keywords: boot care, handmade boots",
            "- Missing Content Topics: Waterproofing",
            "- Competitors Analyzed: 1",
        ] {
            assert!(prompt.contains(line), "{line} not in {prompt}");
        }
        assert!(prompt.contains("recommend creating specific pages or sections"));
        assert!(prompt.contains("as High priority"));
        assert!(!prompt.contains("\"links\""));
        assert!(!prompt.contains("partner.example.org"));
    }

    #[tokio::test]
    async fn failures_are_reported() {
        let res = SeoStrategist::new(&canned(Err("quota exceeded")))
            .generate(None, None, None)
            .await;
        assert_eq!(
            res.error_message.as_deref(),
            Some("Strategy Generation Failed: quota exceeded")
        );
        assert!(res.recommendations.is_empty());

        let res = SeoStrategist::new(&canned(Ok(r#"{"recommendations": []}"#)))
            .generate(None, None, None)
            .await;
        assert!(res.error_message.unwrap().contains("no recommendations"));
    }

    #[test]
    fn priority_labels() {
        assert_eq!(Priority::Medium.to_string(), "Medium");
        assert_eq!(
            serde_json::from_str::<Priority>("\"HIGH\"").unwrap(),
            Priority::High
        );
    }
}
