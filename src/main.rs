//! src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

use skin_arb_bot::arbitrage::{ArbitrageEngine, EngineParams};
use skin_arb_bot::catalog::CatalogStore;
use skin_arb_bot::common::config::ConfigManager;
use skin_arb_bot::common::shutdown::{shutdown_channel, Shutdown};
use skin_arb_bot::execution::{RunStatus, ScraperRunner};
use skin_arb_bot::markets::types::SourceTag;
use skin_arb_bot::markets::ScraperDeps;
use skin_arb_bot::net::metrics::MetricsRegistry;
use skin_arb_bot::net::{HttpClient, ProxyPool};
use skin_arb_bot::telemetry::init_telemetry;

#[derive(Parser)]
#[command(name = "skin_arb_bot", about = "CS:GO marketplace aggregator and arbitrage finder")]
struct Cli {
    /// Directory holding settings.json / scrapers.json
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run marketplace scrapers and persist their catalogs
    Scrape {
        /// Comma-separated source tags (default: every known source)
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        /// Re-run each scraper on its configured interval
        #[arg(long)]
        forever: bool,
        /// Force proxy usage on, regardless of settings
        #[arg(long)]
        proxy: bool,
    },
    /// One arbitrage pass over the current catalog
    Arbitrage {
        #[arg(long)]
        mode: Option<String>,
        #[arg(long)]
        min_ratio: Option<f64>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Full pipeline: scrape forever plus periodic arbitrage passes
    Run {
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
        #[arg(long)]
        proxy: bool,
    },
    /// Show catalog freshness and the latest opportunity snapshot
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = Arc::new(
        ConfigManager::load(&cli.config_dir)
            .map_err(|e| anyhow!("fatal configuration error: {e}"))?,
    );
    let metrics = init_telemetry(&config.settings().log_level);
    info!("skin_arb_bot starting");

    let (shutdown_handle, shutdown) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            shutdown_handle.trigger();
        }
    });

    let catalog = Arc::new(CatalogStore::new(config.settings().data_dir.clone())?);
    let engine = ArbitrageEngine::new(catalog.clone(), metrics.clone());

    match cli.command {
        Command::Scrape {
            sources,
            forever,
            proxy,
        } => {
            let tags = resolve_sources(&sources)?;
            let deps = build_deps(&config, catalog, shutdown.clone(), proxy).await?;
            let runner = ScraperRunner::new(deps.clone(), metrics);

            let outcome = if forever {
                runner.run_forever(&tags).await;
                Ok(())
            } else {
                let reports = runner.run_once(&tags).await;
                report_summary(&reports);
                if reports.iter().all(|r| r.status == RunStatus::Error) {
                    Err(anyhow!("every selected scraper failed"))
                } else {
                    Ok(())
                }
            };
            if let Some(pool) = deps.http.proxy_pool() {
                pool.close();
            }
            outcome?;
        }
        Command::Arbitrage {
            mode,
            min_ratio,
            min_price,
            max_results,
        } => {
            let mut params = EngineParams::from_settings(&config.settings().engine);
            if let Some(mode) = mode {
                params.mode = mode.parse().map_err(|e: String| anyhow!(e))?;
            }
            if let Some(v) = min_ratio {
                params.min_ratio = v;
            }
            if let Some(v) = min_price {
                params.min_price = v;
            }
            if let Some(v) = max_results {
                params.max_results = v;
            }

            let opportunities = engine.run(&params)?;
            println!(
                "{} opportunities (mode: {}, min ratio {:.1}%):",
                opportunities.len(),
                params.mode,
                params.min_ratio * 100.0
            );
            for (i, opp) in opportunities.iter().take(15).enumerate() {
                println!(
                    "{:>2}. {:<55} buy ${:<9.2} on {:<12} net ${:<9.2} profit {:>6.1}%",
                    i + 1,
                    opp.name,
                    opp.buy_price,
                    opp.buy_source.to_string(),
                    opp.reference_net_price,
                    opp.profit_ratio * 100.0
                );
            }
        }
        Command::Run { sources, proxy } => {
            let tags = resolve_sources(&sources)?;
            let deps = build_deps(&config, catalog, shutdown.clone(), proxy).await?;
            let runner = ScraperRunner::new(deps.clone(), metrics);
            let params = EngineParams::from_settings(&config.settings().engine);
            let engine_interval =
                std::time::Duration::from_secs(config.settings().engine.interval_seconds);

            let engine_shutdown = shutdown.clone();
            let engine_loop = async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(engine_interval) => {
                            if let Err(e) = engine.run(&params) {
                                error!("arbitrage pass failed: {e}");
                            }
                        }
                        _ = engine_shutdown.cancelled() => break,
                    }
                }
            };

            tokio::join!(runner.run_forever(&tags), engine_loop);
            if let Some(pool) = deps.http.proxy_pool() {
                pool.close();
            }
        }
        Command::Status => {
            use strum::IntoEnumIterator;
            println!("catalog: {}", catalog.data_dir().display());
            for tag in SourceTag::iter().filter(|t| *t != SourceTag::SteamNameids) {
                match catalog.snapshot_info(tag) {
                    Some(info) => println!(
                        "  {:<14} {:>8} items   {}",
                        tag.to_string(),
                        info.total_items,
                        info.captured_at.as_deref().unwrap_or("(no timestamp)")
                    ),
                    None => println!("  {:<14} (no snapshot)", tag.to_string()),
                }
            }
            let name_ids = catalog.load_name_ids();
            println!("  name-ids: {} resolved", name_ids.len());

            let snapshot: skin_arb_bot::arbitrage::OpportunitySnapshot = catalog
                .read_json(skin_arb_bot::catalog::OPPORTUNITIES_FILE)
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_default();
            match &snapshot.current {
                Some(current) => println!(
                    "opportunities: {} current ({} mode), {} history entries, updated {}",
                    current.total_opportunities,
                    current.mode,
                    snapshot.history.len(),
                    snapshot.last_updated.as_deref().unwrap_or("never")
                ),
                None => println!("opportunities: none computed yet"),
            }
        }
    }

    info!("skin_arb_bot shutting down");
    Ok(())
}

fn resolve_sources(specs: &[String]) -> Result<Vec<SourceTag>> {
    if specs.is_empty() {
        use strum::IntoEnumIterator;
        return Ok(SourceTag::iter().collect());
    }
    specs
        .iter()
        .map(|raw| {
            SourceTag::from_str(raw.trim())
                .map_err(|_| anyhow!("unknown source '{}'", raw.trim()))
        })
        .collect()
}

async fn build_deps(
    config: &Arc<ConfigManager>,
    catalog: Arc<CatalogStore>,
    shutdown: Shutdown,
    force_proxy: bool,
) -> Result<ScraperDeps> {
    let use_proxy = force_proxy || config.settings().use_proxy;
    let proxy_pool = if use_proxy {
        Some(Arc::new(build_proxy_pool(config).await?))
    } else {
        None
    };

    let http = Arc::new(HttpClient::new(
        config.clone(),
        proxy_pool,
        Arc::new(MetricsRegistry::new()),
        shutdown.clone(),
    )?);

    Ok(ScraperDeps {
        http,
        config: config.clone(),
        catalog,
        shutdown,
    })
}

async fn build_proxy_pool(config: &ConfigManager) -> Result<ProxyPool> {
    let proxy_settings = &config.settings().proxy;
    if let Some(path) = &proxy_settings.proxy_file {
        return ProxyPool::from_file(path)
            .with_context(|| format!("loading proxy list {}", path.display()));
    }
    let credentials = config.proxy_credentials().ok_or_else(|| {
        anyhow!(
            "proxies enabled but no provider credentials; set BOT_PROXY_AUTH_TOKEN and \
             BOT_PROXY_ORDER_TOKEN (or configure proxy.proxy_file)"
        )
    })?;
    ProxyPool::init(proxy_settings, credentials)
        .await
        .context("initializing proxy pools")
}

fn report_summary(reports: &[skin_arb_bot::execution::RunReport]) {
    let ok = reports
        .iter()
        .filter(|r| r.status == RunStatus::Success)
        .count();
    let partial = reports
        .iter()
        .filter(|r| r.status == RunStatus::Partial)
        .count();
    let failed = reports
        .iter()
        .filter(|r| r.status == RunStatus::Error)
        .count();
    let items: usize = reports.iter().map(|r| r.items).sum();

    info!("run complete: {ok} ok, {partial} partial, {failed} failed, {items} items");
    for report in reports {
        match &report.error {
            Some(err) => warn!(
                "  {}: {:?} after {:.1}s: {err}",
                report.source, report.status, report.duration_secs
            ),
            None => info!(
                "  {}: {:?}, {} items in {:.1}s",
                report.source, report.status, report.items, report.duration_secs
            ),
        }
    }
}
