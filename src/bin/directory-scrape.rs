use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use directory_scraper::schema::business_directory_extended_fields;
use directory_scraper::{
    walk_pages, Record, ScrapeConfig, ScrapeReply, ScrapeRequest, Scraper, WalkOptions,
};

#[derive(Parser)]
#[command(name = "directory-scrape", about = "Scrape business listings from a paginated directory")]
struct Cli {
    /// Listing page URL
    url: String,

    /// Page to start from (counter pagination)
    #[arg(short, long)]
    page: Option<String>,

    /// Follow pagination for up to this many pages
    #[arg(short = 'n', long, default_value = "1")]
    max_pages: usize,

    /// JSON config file (site profile and browser settings)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Also extract location, description and category
    #[arg(long)]
    extended: bool,

    /// Show the browser window
    #[arg(long)]
    headful: bool,

    /// Launch Chrome without its sandbox (containers)
    #[arg(long)]
    no_sandbox: bool,

    /// Print one JSON array of all records instead of one response per page
    #[arg(long)]
    records_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ScrapeConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScrapeConfig::default(),
    };
    if cli.extended {
        config.site.schema = business_directory_extended_fields();
    }
    if cli.headful {
        config.session.headless = false;
    }
    if cli.no_sandbox {
        config.session.no_sandbox = true;
    }

    let scraper = Scraper::from_config(config).context("invalid scrape config")?;

    let mut pairs = vec![("url", cli.url.clone())];
    if let Some(page) = &cli.page {
        pairs.push(("page", page.clone()));
    }
    let start = match ScrapeRequest::from_query(pairs).into_fetch_request() {
        Ok(start) => start,
        Err(e) => {
            let reply = ScrapeReply::from_result(Err(e));
            println!("{}", reply.to_json()?);
            anyhow::bail!("invalid request");
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, tearing down browser");
            on_signal.cancel();
        }
    });

    let options = WalkOptions::default()
        .with_max_pages(cli.max_pages.max(1))
        .with_cancel(cancel);

    let mut pages = Box::pin(walk_pages(&scraper, start, options));
    let mut records: Vec<Record> = Vec::new();
    let mut failed = false;

    while let Some(page) = pages.next().await {
        failed |= page.is_err();
        if cli.records_only {
            match page {
                Ok(page) => records.extend(page.records),
                Err(e) => warn!("stopping walk: {}", e),
            }
        } else {
            println!("{}", ScrapeReply::from_result(page).to_json()?);
        }
    }

    if cli.records_only {
        info!("{} records total", records.len());
        println!("{}", serde_json::to_string_pretty(&records)?);
    }

    if failed {
        anyhow::bail!("scrape failed");
    }
    Ok(())
}
