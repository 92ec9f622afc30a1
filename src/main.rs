use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use listing_watcher::notifications::EmailNotifier;
use listing_watcher::scraper::ListingScraper;
use listing_watcher::storage::SqliteStorage;
use listing_watcher::web::{create_router, AppState};
use listing_watcher::{AppConfig, Monitor, MonitorScheduler, SubscriptionService};

#[derive(Parser)]
#[command(
    name = "listing-watcher",
    version,
    about = "Watches classified-ad listings for price changes and removal"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring scheduler and the subscription API
    Serve,
    /// Run a single monitoring pass, print its report and exit
    CheckOnce,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let (writer, _guard) = tracing_appender::non_blocking(std::io::stdout());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("listing_watcher=debug".parse()?),
        )
        .with_writer(writer)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    if config.metrics.enabled {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics.port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!("Prometheus exporter listening on {}", addr);
    }

    let storage = Arc::new(SqliteStorage::connect(&config.database).await?);
    let fetcher = Arc::new(ListingScraper::new(&config.fetcher)?);
    let notifier = Arc::new(EmailNotifier::new(&config.notifications.smtp)?);

    let monitor = Arc::new(Monitor::new(
        storage.clone(),
        fetcher.clone(),
        notifier.clone(),
        config.monitoring.clone(),
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckOnce => {
            let report = monitor.try_run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Serve => {
            info!("Starting Listing Watcher...");

            let mut scheduler = MonitorScheduler::new(Arc::clone(&monitor)).await?;
            scheduler.start().await?;

            let subscriptions = Arc::new(SubscriptionService::new(
                storage,
                fetcher,
                notifier,
                config.server.base_url.clone(),
            ));
            let app = create_router(
                AppState { subscriptions, monitor },
                Duration::from_secs(config.server.request_timeout),
            );

            let addr = (config.server.host.as_str(), config.server.port);
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!("Listening on {}", listener.local_addr()?);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!("Failed to listen for shutdown signal: {}", e);
                    }
                })
                .await?;

            info!("Shutting down...");
            scheduler.shutdown().await?;
        }
    }

    Ok(())
}
