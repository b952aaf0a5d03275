mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rfpscan_dashboard::{AutoRefresh, Dashboard, DashboardConfig, DashboardView};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "rfpscan")]
#[command(about = "RFPScan operator dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch once and print crawler status and the latest opportunities.
    Status,
    /// Refresh on the configured interval until Ctrl-C.
    Watch,
    /// Start a crawl. Without an id the primary source is crawled.
    Trigger { source_id: Option<Uuid> },
    /// Run the web dashboard.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging()?;
    let config = DashboardConfig::from_env().context("loading dashboard config")?;

    match cli.command.unwrap_or(Commands::Status) {
        Commands::Status => {
            let dashboard = Dashboard::connect(config)?;
            let refreshed = dashboard.refresh().await;
            print_view(&dashboard.view_at(Utc::now()).await);
            refreshed.context("refreshing dashboard")?;
        }
        Commands::Watch => {
            info!(
                backend = %config.api_base_url,
                interval_secs = config.refresh_interval_secs,
                "watching dashboard"
            );
            let dashboard = Arc::new(Dashboard::connect(config)?);
            let mut cycles = dashboard.subscribe();
            let _ = dashboard.refresh().await;
            print_summary(&dashboard.view_at(Utc::now()).await);
            let refresher = AutoRefresh::start(Arc::clone(&dashboard)).await?;
            loop {
                tokio::select! {
                    changed = cycles.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        print_summary(&dashboard.view_at(Utc::now()).await);
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("stopping dashboard watch");
                        break;
                    }
                }
            }
            refresher.shutdown().await?;
        }
        Commands::Trigger { source_id } => {
            let dashboard = Arc::new(Dashboard::connect(config)?);
            // Only gates the request; an explicit id is sent even if this fails.
            if let Err(err) = dashboard.refresh().await {
                warn!(error = %err, "dashboard refresh before trigger failed");
            }
            let created = dashboard
                .trigger_crawl(source_id, Utc::now())
                .await
                .context("triggering crawl")?;
            println!(
                "crawl triggered: session_id={} source={} ({}) status={}",
                created.session_id, created.source_name, created.source_id, created.status
            );
            if let Some(message) = created.message {
                println!("{message}");
            }
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.web_port);
            info!(port, backend = %config.api_base_url, "starting web dashboard");
            let dashboard = Arc::new(Dashboard::connect(config)?);
            rfpscan_web::serve(dashboard, port).await?;
        }
    }

    Ok(())
}

fn print_summary(view: &DashboardView) {
    let trigger = if view.crawl.can_trigger {
        "trigger available"
    } else {
        "trigger unavailable"
    };
    println!(
        "[{}] crawler {} ({}), last run {}; {} opportunities, {} due this week",
        view.generated_at.format("%H:%M:%S"),
        view.crawl.status.label,
        trigger,
        view.crawl.last_run,
        view.stats.total_opportunities,
        view.stats.deadlines_this_week,
    );
    if let Some(banner) = &view.banner {
        println!("  ! {banner}");
    }
}

fn print_view(view: &DashboardView) {
    print_summary(view);
    if let Some(source) = &view.crawl.source_name {
        println!("primary source: {source}");
    }
    println!(
        "sources active: {}/{}",
        view.stats.active_sources, view.stats.total_sources
    );
    println!();
    println!("{:<14} {:<16} {:<18} TITLE", "CATEGORY", "DEADLINE", "LOCATION");
    for row in &view.opportunities.items {
        let deadline = if row.deadline.urgent {
            format!("{} !", row.deadline.text)
        } else {
            row.deadline.text.clone()
        };
        println!(
            "{:<14} {:<16} {:<18} {}",
            row.category, deadline, row.location, row.title
        );
    }
    println!(
        "page {} of {} ({} total)",
        view.opportunities.page,
        view.opportunities.total_pages.max(1),
        view.opportunities.total
    );
}
