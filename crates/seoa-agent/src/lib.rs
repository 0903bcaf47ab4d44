mod config;
pub mod crawl_audit;
pub mod graph;
pub mod llm;
pub mod onpage;
pub mod optimizer;
mod pipeline;
pub mod report;
pub mod research;
pub mod search;
pub mod strategy;
pub mod technical;

pub use config::{
    AgentConfig, LlmConfig, PageSpeedConfig, PauseConfig, SearchConfig, GOOGLE_KEY_VAR,
    PAGESPEED_KEY_VAR, TAVILY_KEY_VAR,
};
pub use crawl_audit::{CrawlingAuditResult, CrawlingAuditor};
pub use graph::{Graph, NodeKind};
pub use llm::{GeminiClient, LanguageModel, LlmRequest};
pub use onpage::{OnPageAnalyzer, OnPageResult, PageMetadata};
pub use optimizer::{OptimizationResult, SeoOptimizer};
pub use pipeline::{AuditState, Pipeline, Services};
pub use research::{MarketResearchReport, MarketResearcher};
pub use search::{NoopSearchService, SearchDepth, SearchResult, SearchService, TavilyClient};
pub use strategy::{Priority, Recommendation, SeoStrategist, StrategyResult};
pub use technical::{TechnicalAuditResult, TechnicalAuditor};

pub use seoa_crawler;
