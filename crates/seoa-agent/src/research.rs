//! Keyword extraction, competitor lookup and content gap analysis.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{pause, PauseConfig};
use crate::llm::{generate_json, LanguageModel, LlmRequest};
use crate::search::{SearchDepth, SearchService};

const KEYWORD_CONTENT_CHARS: usize = 10_000;
const GAP_CONTENT_CHARS: usize = 5_000;
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordReport {
    pub primary_keyword: String,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentGapReport {
    #[serde(default)]
    pub competitor_themes: Vec<String>,
    #[serde(default)]
    pub suggested_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketResearchReport {
    pub keyword_analysis: Option<KeywordReport>,
    pub competitor_urls: Vec<String>,
    pub content_gap_analysis: Option<ContentGapReport>,
    pub error_message: Option<String>,
}

impl MarketResearchReport {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error_message: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn primary_keyword(&self) -> Option<&str> {
        self.keyword_analysis
            .as_ref()
            .map(|k| k.primary_keyword.as_str())
            .filter(|k| !k.is_empty())
    }

    pub fn suggested_topics(&self) -> &[String] {
        self.content_gap_analysis
            .as_ref()
            .map(|g| g.suggested_topics.as_slice())
            .unwrap_or_default()
    }
}

pub struct MarketResearcher<'a> {
    llm: &'a dyn LanguageModel,
    search: &'a dyn SearchService,
    max_results: usize,
    pauses: PauseConfig,
}

impl<'a> MarketResearcher<'a> {
    pub fn new(llm: &'a dyn LanguageModel, search: &'a dyn SearchService) -> Self {
        Self {
            llm,
            search,
            max_results: 3,
            pauses: PauseConfig::default(),
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_pauses(mut self, pauses: PauseConfig) -> Self {
        self.pauses = pauses;
        self
    }

    /// Never fails, a failing step leaves only `error_message` set.
    pub async fn research(&self, title: &str, page_text: &str) -> MarketResearchReport {
        match self.try_research(title, page_text).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Market research failed: {e:#}");
                MarketResearchReport::failed(e.to_string())
            }
        }
    }

    async fn try_research(&self, title: &str, page_text: &str) -> Result<MarketResearchReport> {
        log::info!("Identifying keywords");
        let keywords = self.identify_keywords(title, page_text).await?;
        if keywords.primary_keyword.trim().is_empty() {
            bail!("Could not determine a primary keyword.");
        }
        pause(self.pauses.after_keywords_ms).await;

        log::info!("Analyzing competitors for: {}", keywords.primary_keyword);
        let competitors = self
            .search
            .search(
                &format!("top blog posts about {}", keywords.primary_keyword),
                self.max_results,
                SearchDepth::Advanced,
            )
            .await?;
        let competitor_urls = competitors
            .iter()
            .filter(|c| !c.url.is_empty())
            .map(|c| c.url.clone())
            .collect();
        let snippets = competitors
            .iter()
            .map(|c| format!("URL: {}\nContent: {}", c.url, c.content))
            .collect::<Vec<_>>()
            .join("\n");
        pause(self.pauses.after_search_ms).await;

        log::info!("Calculating content gaps");
        let gaps = self.find_content_gaps(page_text, &snippets).await?;

        Ok(MarketResearchReport {
            keyword_analysis: Some(keywords),
            competitor_urls,
            content_gap_analysis: Some(gaps),
            error_message: None,
        })
    }

    async fn identify_keywords(&self, title: &str, page_text: &str) -> Result<KeywordReport> {
        let prompt = format!(
            "Analyze the webpage content. Identify 1 primary keyword and 3-5 secondary keywords.\n\n\
             Title: {title}\n\nContent: {}",
            truncate_chars(page_text, KEYWORD_CONTENT_CHARS)
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "primary_keyword": { "type": "STRING" },
                "secondary_keywords": { "type": "ARRAY", "items": { "type": "STRING" } }
            },
            "required": ["primary_keyword", "secondary_keywords"]
        });
        generate_json(self.llm, LlmRequest::new(prompt, TEMPERATURE).with_schema(schema)).await
    }

    async fn find_content_gaps(&self, page_text: &str, snippets: &str) -> Result<ContentGapReport> {
        let prompt = format!(
            "Compare my content with competitor snippets. What are they covering that I am missing?\n\n\
             My Content: {}\n\nCompetitor Content:\n{snippets}",
            truncate_chars(page_text, GAP_CONTENT_CHARS)
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "competitor_themes": { "type": "ARRAY", "items": { "type": "STRING" } },
                "suggested_topics": { "type": "ARRAY", "items": { "type": "STRING" } }
            },
            "required": ["competitor_themes", "suggested_topics"]
        });
        generate_json(self.llm, LlmRequest::new(prompt, TEMPERATURE).with_schema(schema)).await
    }
}

/// The first `max` characters of `text`, never splitting a code point.
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::search::SearchResult;

    /// Answers prompts in order and records them.
    struct Scripted {
        answers: Mutex<Vec<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(answers: Vec<Result<&str, &str>>) -> Self {
            Self {
                answers: Mutex::new(
                    answers
                        .into_iter()
                        .rev()
                        .map(|a| a.map(String::from).map_err(String::from))
                        .collect(),
                ),
                prompts: Mutex::default(),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for Scripted {
        async fn generate(&self, request: LlmRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.prompt);
            match self.answers.lock().unwrap().pop() {
                Some(Ok(answer)) => Ok(answer),
                Some(Err(e)) => Err(anyhow::anyhow!(e)),
                None => Err(anyhow::anyhow!("no more answers")),
            }
        }
    }

    struct Competitors(Mutex<Vec<String>>);

    #[async_trait]
    impl SearchService for Competitors {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
            depth: SearchDepth,
        ) -> Result<Vec<SearchResult>> {
            assert_eq!(max_results, 3);
            assert_eq!(depth, SearchDepth::Advanced);
            self.0.lock().unwrap().push(query.to_string());
            Ok(vec![SearchResult {
                title: "Boot care".into(),
                url: "https://rival.example.com/care".into(),
                content: "How to waterproof boots".into(),
                score: 0.9,
            }])
        }
    }

    #[tokio::test]
    async fn full_research() {
        let llm = Scripted::new(vec![
            Ok(r#"{"primary_keyword": "leather boots", "secondary_keywords": ["boot care"]}"#),
            Ok(r#"{"competitor_themes": ["care"], "suggested_topics": ["Waterproofing"]}"#),
        ]);
        let search = Competitors(Mutex::default());

        let report = MarketResearcher::new(&llm, &search)
            .with_pauses(PauseConfig::none())
            .research("Boots", "We sell boots")
            .await;

        assert_eq!(report.error_message, None);
        assert_eq!(report.primary_keyword(), Some("leather boots"));
        assert_eq!(report.competitor_urls, ["https://rival.example.com/care"]);
        assert_eq!(report.suggested_topics(), ["Waterproofing"]);
        assert_eq!(
            *search.0.lock().unwrap(),
            ["top blog posts about leather boots"]
        );

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("Title: Boots"));
        assert!(prompts[1].contains("URL: https://rival.example.com/care\nContent: How to waterproof boots"));
    }

    #[tokio::test]
    async fn empty_keyword_is_an_error() {
        let llm = Scripted::new(vec![Ok(r#"{"primary_keyword": " ", "secondary_keywords": []}"#)]);
        let search = Competitors(Mutex::default());

        let report = MarketResearcher::new(&llm, &search)
            .with_pauses(PauseConfig::none())
            .research("Boots", "We sell boots")
            .await;

        assert_eq!(
            report.error_message.as_deref(),
            Some("Could not determine a primary keyword.")
        );
        assert_eq!(report.keyword_analysis, None);
        assert!(search.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_gap_analysis_drops_partial_data() {
        let llm = Scripted::new(vec![
            Ok(r#"{"primary_keyword": "boots", "secondary_keywords": []}"#),
            Err("quota exceeded"),
        ]);
        let search = Competitors(Mutex::default());

        let report = MarketResearcher::new(&llm, &search)
            .with_pauses(PauseConfig::none())
            .research("Boots", "We sell boots")
            .await;

        assert_eq!(report.error_message.as_deref(), Some("quota exceeded"));
        assert!(report.competitor_urls.is_empty());
        assert_eq!(report.keyword_analysis, None);
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }
}
