use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{pause, PauseConfig};
use crate::llm::{generate_json, LanguageModel, LlmRequest};
use crate::onpage::OnPageResult;
use crate::research::MarketResearchReport;
use crate::strategy::{Recommendation, StrategyResult};

const TEMPERATURE: f32 = 0.7;
const MAX_NEW_SECTIONS: usize = 2;

const TITLE_CATEGORIES: [&str; 3] = ["Title Tag", "Meta Description", "On-Page"];
const GAP_VERBS: [&str; 4] = ["add", "gap", "create", "write"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedTitleMeta {
    pub new_title: String,
    pub new_meta_description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSection {
    pub suggested_heading: String,
    pub new_content_paragraph: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub optimized_title_meta: Option<OptimizedTitleMeta>,
    pub new_sections: Vec<ContentSection>,
    pub error_message: Option<String>,
}

impl OptimizationResult {
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error_message: Some(error.into()),
            ..Default::default()
        }
    }
}

fn is_title_rec(rec: &Recommendation) -> bool {
    TITLE_CATEGORIES.contains(&rec.category.as_str())
        || rec.recommendation.to_lowercase().contains("title")
}

fn is_gap_rec(rec: &Recommendation) -> bool {
    let text = rec.recommendation.to_lowercase();
    rec.category == "Content" && GAP_VERBS.iter().any(|v| text.contains(v))
}

pub struct SeoOptimizer<'a> {
    llm: &'a dyn LanguageModel,
    pauses: PauseConfig,
}

impl<'a> SeoOptimizer<'a> {
    pub fn new(llm: &'a dyn LanguageModel) -> Self {
        Self {
            llm,
            pauses: PauseConfig::default(),
        }
    }

    pub fn with_pauses(mut self, pauses: PauseConfig) -> Self {
        self.pauses = pauses;
        self
    }

    pub async fn optimize(
        &self,
        strategy: &StrategyResult,
        onpage: Option<&OnPageResult>,
        research: Option<&MarketResearchReport>,
    ) -> OptimizationResult {
        log::info!("Running content optimizer");
        let keyword = research
            .and_then(MarketResearchReport::primary_keyword)
            .unwrap_or("N/A");

        let title_recs = strategy
            .recommendations
            .iter()
            .filter(|r| is_title_rec(r))
            .collect::<Vec<_>>();
        let gap_recs = strategy
            .recommendations
            .iter()
            .filter(|r| is_gap_rec(r))
            .take(MAX_NEW_SECTIONS)
            .collect::<Vec<_>>();

        let mut result = OptimizationResult::default();

        if !title_recs.is_empty() {
            log::info!("Optimizing title and meta description");
            match self.rewrite_title_and_meta(&title_recs, onpage, keyword).await {
                Ok(meta) => result.optimized_title_meta = Some(meta),
                Err(e) => {
                    log::warn!("Title rewrite failed: {e:#}");
                    return OptimizationResult::failed(format!("Optimization Failed: {e}"));
                }
            }
            pause(self.pauses.after_rewrite_ms).await;
        }

        if !gap_recs.is_empty() {
            log::info!("Generating {} new content sections", gap_recs.len());
            for rec in gap_recs {
                pause(self.pauses.between_sections_ms).await;
                match self.generate_section(&rec.recommendation, keyword).await {
                    Ok(section) => result.new_sections.push(section),
                    Err(e) => log::warn!(
                        "Failed to generate section for {:?}: {e:#}",
                        rec.recommendation
                    ),
                }
            }
        }

        result
    }

    async fn rewrite_title_and_meta(
        &self,
        recs: &[&Recommendation],
        onpage: Option<&OnPageResult>,
        keyword: &str,
    ) -> Result<OptimizedTitleMeta> {
        let title = onpage.and_then(|o| o.title.as_deref()).unwrap_or_default();
        let meta = onpage
            .and_then(|o| o.meta_description.as_deref())
            .unwrap_or_default();
        let directives = recs
            .iter()
            .map(|r| format!("- {}", r.recommendation))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are an expert SEO copywriter. Rewrite the title and meta description for this page.\n\n\
             Original Title: {title}\n\
             Original Meta: {meta}\n\
             Target Keyword: {keyword}\n\n\
             Directives from Strategy:\n{directives}"
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "new_title": { "type": "STRING" },
                "new_meta_description": { "type": "STRING" }
            },
            "required": ["new_title", "new_meta_description"]
        });
        generate_json(self.llm, LlmRequest::new(prompt, TEMPERATURE).with_schema(schema)).await
    }

    async fn generate_section(&self, topic: &str, keyword: &str) -> Result<ContentSection> {
        let prompt = format!(
            "Write a new website content section (100-150 words) to fill a specific content gap.\n\n\
             Topic Requirement: \"{topic}\"\n\
             Target Keyword to include: \"{keyword}\"\n\
             Tone: Professional and informative."
        );
        let schema = json!({
            "type": "OBJECT",
            "properties": {
                "suggested_heading": { "type": "STRING" },
                "new_content_paragraph": { "type": "STRING" }
            },
            "required": ["suggested_heading", "new_content_paragraph"]
        });
        generate_json(self.llm, LlmRequest::new(prompt, TEMPERATURE).with_schema(schema)).await
    }
}
