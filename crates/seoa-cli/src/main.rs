use std::fs;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::{env, io};

use anyhow::{anyhow, bail, Context};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use seoa_agent::{AgentConfig, OnPageAnalyzer, Pipeline, Services};
use seoa_crawler::{CrawlerConfig, OnError, RobotsPolicy, Throttle, WebCrawler, SENSITIVE_PATHS};
use tokio::runtime;

/// SEO audit agent
#[derive(Debug, Parser)]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: SubCommand,
}

#[derive(Debug, clap::Subcommand)]
pub enum SubCommand {
    #[command(name = "audit")]
    Audit(AuditArgs),
    #[command(name = "fetch")]
    Fetch(FetchArgs),
    #[command(name = "onpage")]
    Onpage(OnpageArgs),
    #[command(name = "robots")]
    Robots(RobotsArgs),
    #[command(hide = true)]
    Completion,
}

/// Crawler settings shared by every subcommand that downloads pages
#[derive(Debug, clap::Args)]
pub struct CrawlerArgs {
    /// Override crawler's user agent
    #[arg(long)]
    pub user_agent: Option<String>,
    /// Override crawler's number of retries on transient errors
    #[arg(long)]
    pub max_retries: Option<u32>,
    /// Override crawler's maximum concurrent page downloads
    #[arg(long)]
    pub concurrent_downloads: Option<NonZeroUsize>,
    /// Override crawler's download error handling strategy
    #[arg(value_enum, long)]
    pub on_dl_error: Option<OnError>,
}

impl CrawlerArgs {
    fn apply(&self, conf: &mut CrawlerConfig) {
        if let Some(user_agent) = &self.user_agent {
            conf.user_agent = user_agent.to_string();
        }
        if let Some(max_retries) = self.max_retries {
            conf.max_retries = max_retries;
        }
        if let Some(concurrent_downloads) = self.concurrent_downloads {
            conf.throttle = Throttle::Concurrent(concurrent_downloads);
        }
        if let Some(on_dl_error) = self.on_dl_error {
            conf.on_dl_error = on_dl_error;
        }
    }
}

/// Run the full audit of a page and write the Markdown report
#[derive(Debug, clap::Args)]
pub struct AuditArgs {
    /// The page to audit
    #[arg(long, short)]
    pub url: String,
    /// Optional yaml configuration file
    #[arg(env = "SEOA_CONFIG", long)]
    pub config: Option<PathBuf>,
    /// Write the report to this file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,
    /// Output the whole audit state as json instead of the report
    #[arg(long)]
    pub json: bool,
    #[command(flatten)]
    pub crawler: CrawlerArgs,
    /// When quiet no logs are outputted
    #[arg(long, short)]
    pub quiet: bool,
}

impl TryFrom<&AuditArgs> for AgentConfig {
    type Error = anyhow::Error;

    fn try_from(args: &AuditArgs) -> Result<Self, Self::Error> {
        let mut conf = match &args.config {
            Some(path) => AgentConfig::from_yaml_file(path)?,
            None => AgentConfig::default(),
        };
        args.crawler.apply(&mut conf.crawler);
        Ok(conf.with_env())
    }
}

pub fn audit(args: AuditArgs) -> anyhow::Result<()> {
    let conf = AgentConfig::try_from(&args)?;
    let services = Services::from_config(&conf)?;
    let pipeline = Pipeline::new(conf, services)?;

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let state = rt.block_on(pipeline.run(&args.url));
    for message in &state.messages {
        log::info!("{message}");
    }

    let out = if args.json {
        serde_json::to_string_pretty(&state)?
    } else {
        match &state.report {
            Some(report) => report.clone(),
            None => bail!(
                "No report for {}: {}",
                args.url,
                state.messages.last().map_or("unknown error", String::as_str)
            ),
        }
    };
    match args.output {
        Some(path) => fs::write(&path, out)
            .with_context(|| format!("Couldn't write {}", path.display()))?,
        None => println!("{out}"),
    }
    Ok(())
}

/// Fetch pages through the crawler and print one status line per page
#[derive(Debug, clap::Args)]
pub struct FetchArgs {
    /// Pages to download
    #[arg(long, short, required = true)]
    pub url: Vec<String>,
    #[command(flatten)]
    pub crawler: CrawlerArgs,
}

pub fn fetch(args: FetchArgs) -> anyhow::Result<()> {
    let mut conf = CrawlerConfig::default();
    args.crawler.apply(&mut conf);
    let crawler = WebCrawler::new(conf)?;

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let results = rt.block_on(crawler.fetch_all(args.url))?;
    for res in results {
        match &res.error_message {
            None => println!(
                "{} {} {} bytes {} ms",
                res.status_code, res.url, res.content_length, res.response_time_ms
            ),
            Some(e) => println!("{} {} {e}", res.status_code, res.url),
        }
    }
    Ok(())
}

/// Analyze the on-page signals of a single page and print them as json
#[derive(Debug, clap::Args)]
#[command(group = clap::ArgGroup::new("page").required(true))]
pub struct OnpageArgs {
    /// A local html page to analyze
    #[arg(group = "page", long)]
    pub file: Option<PathBuf>,
    /// A distant html page to analyze
    #[arg(group = "page", long)]
    pub url: Option<String>,
    /// Custom user agent to download the page
    #[arg(long, conflicts_with = "file")]
    pub ua: Option<String>,
}

pub fn onpage(args: OnpageArgs) -> anyhow::Result<()> {
    let (page, location) = if let Some(url) = args.url {
        let mut conf = CrawlerConfig::default();
        if let Some(ua) = args.ua {
            conf.user_agent = ua;
        }
        let crawler = WebCrawler::new(conf)?;
        let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
        let page = rt.block_on(crawler.try_fetch(&url))?;
        (page.body, page.final_url)
    } else if let Some(path) = args.file {
        let page = fs::read_to_string(&path)
            .with_context(|| format!("Couldn't read {}", path.display()))?;
        let location = url::Url::from_file_path(fs::canonicalize(&path)?)
            .map_err(|_| anyhow!("Invalid file path {}", path.display()))?;
        (page, location.to_string())
    } else {
        bail!("Missing `url` or `file`");
    };

    let res = OnPageAnalyzer::new(&location, Some(page.as_str())).analyze();
    println!("{}", serde_json::to_string_pretty(&res)?);
    Ok(())
}

/// Check which sensitive paths a site's robots.txt leaves crawlable
#[derive(Debug, clap::Args)]
pub struct RobotsArgs {
    /// Any page of the site
    #[arg(long, short)]
    pub url: String,
    /// Paths to check, defaults to common sensitive paths
    #[arg(long, short)]
    pub path: Vec<String>,
    /// The robots.txt user agent group to follow
    #[arg(long, default_value = "*")]
    pub agent: String,
}

pub fn robots(args: RobotsArgs) -> anyhow::Result<()> {
    let crawler = WebCrawler::new(CrawlerConfig::default())?;
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    let policy = rt.block_on(RobotsPolicy::fetch(&crawler, &args.url, &args.agent))?;

    let status = if args.path.is_empty() {
        policy.check_paths(SENSITIVE_PATHS)
    } else {
        policy.check_paths(args.path.iter().map(String::as_str))
    };
    println!("{}", policy.robots_url());
    for (path, status) in status {
        println!("{path}\t{status}");
    }
    if let Some(delay) = policy.crawl_delay() {
        println!("Crawl-delay\t{}s", delay.as_secs_f32());
    }
    for sitemap in policy.sitemaps() {
        println!("Sitemap\t{sitemap}");
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.cmd {
        SubCommand::Audit(args) => {
            if !args.quiet {
                env::set_var("RUST_LOG", "seoa_agent=info,seoa_crawler=warn");
                env_logger::init();
            }
            audit(args)
        }
        SubCommand::Fetch(args) => {
            env::set_var("RUST_LOG", "seoa_crawler=warn");
            env_logger::init();
            fetch(args)
        }
        SubCommand::Onpage(args) => {
            env::set_var("RUST_LOG", "seoa_agent=warn,seoa_crawler=warn");
            env_logger::init();
            onpage(args)
        }
        SubCommand::Robots(args) => {
            env::set_var("RUST_LOG", "seoa_crawler=warn");
            env_logger::init();
            robots(args)
        }
        SubCommand::Completion => {
            generate(Shell::Bash, &mut Args::command(), "seoa", &mut io::stdout());
            Ok(())
        }
    }
}
