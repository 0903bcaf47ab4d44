//! Runs the audit graph one wave at a time.

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use seoa_crawler::{Backoff, CrawlResult, WebCrawler};
use serde::{Deserialize, Serialize};

use crate::config::{AgentConfig, GOOGLE_KEY_VAR};
use crate::crawl_audit::{CrawlingAuditResult, CrawlingAuditor};
use crate::graph::{Graph, NodeKind};
use crate::llm::{GeminiClient, LanguageModel, UnconfiguredModel};
use crate::onpage::{page_text, OnPageAnalyzer, OnPageResult, MISSING};
use crate::optimizer::{OptimizationResult, SeoOptimizer};
use crate::report;
use crate::research::{MarketResearchReport, MarketResearcher};
use crate::search::{NoopSearchService, SearchService, TavilyClient};
use crate::strategy::{Priority, SeoStrategist, StrategyResult};
use crate::technical::{TechnicalAuditResult, TechnicalAuditor};

/// Everything known about the audited page, filled in as stages complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditState {
    pub url: String,
    pub messages: Vec<String>,
    pub crawl: Option<CrawlResult>,
    pub technical: Option<TechnicalAuditResult>,
    pub onpage: Option<OnPageResult>,
    pub crawl_audit: Option<CrawlingAuditResult>,
    pub research: Option<MarketResearchReport>,
    pub strategy: Option<StrategyResult>,
    pub optimization: Option<OptimizationResult>,
    pub report: Option<String>,
}

impl AuditState {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// The fetched HTML, when the crawl succeeded.
    pub fn html(&self) -> Option<&str> {
        self.crawl.as_ref().and_then(CrawlResult::html)
    }
}

/// What one node adds to the state.
#[derive(Debug, Default)]
struct StateUpdate {
    crawl: Option<CrawlResult>,
    technical: Option<TechnicalAuditResult>,
    onpage: Option<OnPageResult>,
    crawl_audit: Option<CrawlingAuditResult>,
    research: Option<MarketResearchReport>,
    strategy: Option<StrategyResult>,
    optimization: Option<OptimizationResult>,
    report: Option<String>,
    message: Option<String>,
}

impl StateUpdate {
    fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn apply(self, state: &mut AuditState) {
        if self.crawl.is_some() {
            state.crawl = self.crawl;
        }
        if self.technical.is_some() {
            state.technical = self.technical;
        }
        if self.onpage.is_some() {
            state.onpage = self.onpage;
        }
        if self.crawl_audit.is_some() {
            state.crawl_audit = self.crawl_audit;
        }
        if self.research.is_some() {
            state.research = self.research;
        }
        if self.strategy.is_some() {
            state.strategy = self.strategy;
        }
        if self.optimization.is_some() {
            state.optimization = self.optimization;
        }
        if self.report.is_some() {
            state.report = self.report;
        }
        state.messages.extend(self.message);
    }
}

/// External collaborators of the pipeline.
pub struct Services {
    pub crawler: WebCrawler,
    pub technical: TechnicalAuditor,
    pub llm: Arc<dyn LanguageModel>,
    pub search: Arc<dyn SearchService>,
}

impl Services {
    pub fn from_config(config: &AgentConfig) -> Result<Self> {
        let crawler = WebCrawler::new(config.crawler.clone())?;
        let technical =
            TechnicalAuditor::new(config.pagespeed.clone(), Backoff::from(config.crawler.backoff))?;

        let llm: Arc<dyn LanguageModel> = match &config.llm.api_key {
            Some(key) => Arc::new(GeminiClient::new(
                key.as_str(),
                config.llm.model.as_str(),
                config.llm.timeout(),
            )?),
            None => {
                log::warn!("{GOOGLE_KEY_VAR} is not set, LLM stages will be skipped");
                Arc::new(UnconfiguredModel {
                    key_var: GOOGLE_KEY_VAR,
                })
            }
        };
        let search: Arc<dyn SearchService> = match &config.search.api_key {
            Some(key) => Arc::new(TavilyClient::new(key.as_str())?),
            None => Arc::new(NoopSearchService),
        };

        Ok(Self {
            crawler,
            technical,
            llm,
            search,
        })
    }
}

pub struct Pipeline {
    config: AgentConfig,
    services: Services,
    waves: Vec<Vec<NodeKind>>,
}

impl Pipeline {
    pub fn new(config: AgentConfig, services: Services) -> Result<Self> {
        Self::with_graph(config, services, &Graph::audit())
    }

    pub fn with_graph(config: AgentConfig, services: Services, graph: &Graph) -> Result<Self> {
        let waves = graph.waves()?;
        Ok(Self {
            config,
            services,
            waves,
        })
    }

    pub fn waves(&self) -> &[Vec<NodeKind>] {
        &self.waves
    }

    /// Audits `url`. Stage failures are recorded in the state, never raised.
    pub async fn run(&self, url: &str) -> AuditState {
        let mut state = AuditState::new(url);
        for wave in &self.waves {
            log::debug!(
                "Running {}",
                wave.iter().map(NodeKind::name).collect::<Vec<_>>().join(", ")
            );
            let updates = join_all(wave.iter().map(|node| self.run_node(*node, &state))).await;
            for update in updates {
                update.apply(&mut state);
            }
        }
        state
    }

    async fn run_node(&self, node: NodeKind, state: &AuditState) -> StateUpdate {
        log::info!("Running {node} for {}", state.url);
        match node {
            NodeKind::Crawler => self.crawl(state).await,
            NodeKind::Auditor => self.technical_audit(state).await,
            NodeKind::OnpageAnalyzer => self.analyze_onpage(state),
            NodeKind::CrawlAuditor => self.audit_crawling(state).await,
            NodeKind::MarketResearcher => self.research(state).await,
            NodeKind::Strategist => self.strategize(state).await,
            NodeKind::Optimizer => self.optimize(state).await,
            NodeKind::Reporter => self.report(state),
            NodeKind::Start | NodeKind::End => StateUpdate::default(),
        }
    }

    async fn crawl(&self, state: &AuditState) -> StateUpdate {
        let crawl = self.services.crawler.fetch_page(&state.url).await;
        let message = match &crawl.error_message {
            None => format!(
                "Successfully crawled {}. Content is ready for audit.",
                state.url
            ),
            Some(e) => format!("Failed to crawl {}. Error: {e}", state.url),
        };
        StateUpdate {
            crawl: Some(crawl),
            ..Default::default()
        }
        .message(message)
    }

    async fn technical_audit(&self, state: &AuditState) -> StateUpdate {
        let audit = self.services.technical.audit(&state.url).await;
        let message = match &audit.error_message {
            Some(e) => format!("Technical audit failed: {e}"),
            None => format!(
                "Technical audit complete. Performance Score: {}/100. LCP: {}.",
                audit
                    .performance_score
                    .map_or_else(|| "N/A".to_string(), |s| s.to_string()),
                audit
                    .core_web_vitals
                    .as_ref()
                    .map_or("N/A", |v| v.lcp.as_str())
            ),
        };
        StateUpdate {
            technical: Some(audit),
            ..Default::default()
        }
        .message(message)
    }

    fn analyze_onpage(&self, state: &AuditState) -> StateUpdate {
        let Some(html) = state.html() else {
            let error = "Skipping analysis: No HTML content available from crawl.";
            return StateUpdate {
                onpage: Some(OnPageResult::failed(&state.url, error, MISSING)),
                ..Default::default()
            }
            .message(error);
        };

        let res = OnPageAnalyzer::new(&state.url, Some(html)).analyze();
        let message = match &res.error_message {
            Some(e) => format!("On-Page Analysis failed: {e}"),
            None => format!(
                "On-Page Analysis Complete.\n\
                 - Title Length: {} chars\n\
                 - H1 Tags Found: {}\n\
                 - Images without Alt Text: {}\n\
                 - Internal Links: {}\n\
                 - External Links: {}\n\
                 - Advanced SEO: Canonical ({}), Robots ({}), OG Tags ({}), Schema ({})",
                res.title.as_deref().map_or(0, |t| t.chars().count()),
                res.h1().len(),
                res.images_missing_alt(),
                res.links.internal.len(),
                res.links.external.len(),
                if res.has_canonical() { "Present" } else { MISSING },
                res.robots,
                res.og_tags,
                res.schema,
            ),
        };
        StateUpdate {
            onpage: Some(res),
            ..Default::default()
        }
        .message(message)
    }

    async fn audit_crawling(&self, state: &AuditState) -> StateUpdate {
        let res = CrawlingAuditor::new(&state.url)
            .run(&self.services.crawler, state.html())
            .await;
        let message = match &res.error_message {
            Some(e) => format!("Crawl audit incomplete: {e}"),
            None => format!(
                "Crawl audit complete. {} sensitive path(s) crawlable, {} JavaScript link(s), \
                 {} external link(s) without nofollow.",
                res.exposed_paths().count(),
                res.js_links_count,
                res.risky_external_links.len()
            ),
        };
        StateUpdate {
            crawl_audit: Some(res),
            ..Default::default()
        }
        .message(message)
    }

    async fn research(&self, state: &AuditState) -> StateUpdate {
        let Some(html) = state.html() else {
            let error = "Skipping research: No HTML content available.";
            return StateUpdate {
                research: Some(MarketResearchReport::failed(error)),
                ..Default::default()
            }
            .message(error);
        };

        let text = page_text(html);
        let title = state
            .onpage
            .as_ref()
            .and_then(|o| o.title.clone())
            .unwrap_or_else(|| state.url.clone());

        let services = &self.services;
        let report = MarketResearcher::new(services.llm.as_ref(), services.search.as_ref())
            .with_max_results(self.config.search.max_results)
            .with_pauses(self.config.pauses)
            .research(&title, &text)
            .await;
        let message = match &report.error_message {
            Some(e) => format!("Market research failed: {e}"),
            None => format!(
                "Market research complete. Primary keyword: {}. {} competitor(s) found.",
                report.primary_keyword().unwrap_or("N/A"),
                report.competitor_urls.len()
            ),
        };
        StateUpdate {
            research: Some(report),
            ..Default::default()
        }
        .message(message)
    }

    async fn strategize(&self, state: &AuditState) -> StateUpdate {
        let onpage = state.onpage.as_ref().filter(|o| o.error_message.is_none());
        let strategy = match onpage {
            None => StrategyResult::failed("Skipping strategy: No on-page analysis available."),
            Some(onpage) => {
                SeoStrategist::new(self.services.llm.as_ref())
                    .generate(
                        Some(onpage),
                        state.technical.as_ref(),
                        state.research.as_ref(),
                    )
                    .await
            }
        };
        let message = match &strategy.error_message {
            Some(e) => e.clone(),
            None => format!(
                "Strategy generated with {} recommendation(s), {} high priority.",
                strategy.recommendations.len(),
                strategy.with_priority(Priority::High).count()
            ),
        };
        StateUpdate {
            strategy: Some(strategy),
            ..Default::default()
        }
        .message(message)
    }

    async fn optimize(&self, state: &AuditState) -> StateUpdate {
        let strategy = state.strategy.as_ref().filter(|s| s.error_message.is_none());
        let res = match strategy {
            None => OptimizationResult::failed("Skipping optimization: No strategy available."),
            Some(strategy) => {
                SeoOptimizer::new(self.services.llm.as_ref())
                    .with_pauses(self.config.pauses)
                    .optimize(strategy, state.onpage.as_ref(), state.research.as_ref())
                    .await
            }
        };
        let message = match &res.error_message {
            Some(e) => e.clone(),
            None => format!(
                "Optimization complete. Title rewritten: {}. {} new section(s).",
                if res.optimized_title_meta.is_some() { "yes" } else { "no" },
                res.new_sections.len()
            ),
        };
        StateUpdate {
            optimization: Some(res),
            ..Default::default()
        }
        .message(message)
    }

    fn report(&self, state: &AuditState) -> StateUpdate {
        let today = chrono::Local::now().date_naive();
        match report::render(state, today) {
            Ok(markdown) => StateUpdate {
                report: Some(markdown),
                ..Default::default()
            }
            .message(format!(
                "Report generated for {}. Overall score: {}/100.",
                state.url,
                report::overall_score(state)
            )),
            Err(e) => StateUpdate::default().message(format!("Report Failed: {e}")),
        }
    }
}
