//! self-check: probes the app it is deployed next to and records the results.
//!
//! ```text
//! self-check serve --config /etc/self-check/config.toml
//! self-check analyze --start 2024-06-01T00:00:00Z --end 2024-06-02T00:00:00Z --app my-app
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use selfcheck::store::{self, register_instance_with_retry, save_with_retry, update_instance_with_retry};
use selfcheck::{BackoffSchedule, GapQuery, GapRecord, Instance, RetryQueue, RunContext, Store};
use tracing::{error, info, warn};

mod config;
mod error;
mod probes;
mod routes;
mod state;

use config::Config;
use error::AppError;
use state::AppState;

#[derive(Parser)]
#[command(name = "self-check", version, about = "App platform self-check")]
struct Cli {
    /// TOML configuration file; environment variables take precedence.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve /health and /check and run periodic checks (default).
    Serve,
    /// Print the longest gap between stored checks per app as CSV.
    Analyze {
        /// Window start (RFC 3339).
        #[arg(long, value_parser = parse_timestamp)]
        start: DateTime<Utc>,

        /// Window end (RFC 3339), inclusive.
        #[arg(long, value_parser = parse_timestamp)]
        end: DateTime<Utc>,

        /// Restrict to these app IDs. Repeatable.
        #[arg(long = "app")]
        apps: Vec<String>,
    },
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc)).map_err(|e| e.to_string())
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logger::init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await?,
        Command::Analyze { start, end, apps } => analyze(config, start, end, apps).await?,
    }
    Ok(())
}

/// Cancel `root` on Ctrl-C.
fn cancel_on_interrupt(root: &RunContext) {
    let root = root.clone();
    actix_web::rt::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => {
                error!(error = %e, "listening for interrupt");
                return;
            }
        }
        root.cancel();
    });
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok().map(|h| h.trim().to_string()))
        .unwrap_or_else(|| "unknown".into())
}

async fn serve(config: Config) -> Result<(), AppError> {
    info!("\n{config}");

    let root = RunContext::background();
    cancel_on_interrupt(&root);

    let store = store::open(&config.database.url, config.database.auth_token.as_deref()).await?;
    let queue = RetryQueue::with_dying_breath(config.checks.dying_breath);
    let schedule = BackoffSchedule::default();

    let mut instance = Instance::new(hostname(), Utc::now()).with_labels(config.instance.labels.clone());
    instance.app_id = config.instance.app_id.clone();
    register_instance_with_retry(&queue, &root, store.clone(), instance.clone(), &schedule);

    let orchestrator = Arc::new(probes::build_orchestrator(&config.checks, instance.clone()).await?);

    let periodic = config.checks.interval.map(|interval| {
        info!(interval = %humantime::format_duration(interval), "periodic checks enabled");
        let orchestrator = orchestrator.clone();
        let ctx = root.clone();
        let (queue, store, schedule) = (queue.clone(), store.clone(), schedule.clone());
        tokio::spawn(async move {
            let save_ctx = ctx.clone();
            orchestrator
                .run_periodic(ctx, interval, move |result| {
                    save_with_retry(&queue, &save_ctx, store.clone(), result, &schedule);
                })
                .await;
        })
    });

    let state = AppState { orchestrator, store: store.clone(), root: root.clone() };
    let addr = SocketAddr::new(config.server.bind_addr.parse::<IpAddr>()?, config.server.port);
    info!(%addr, "starting server");
    let server = HttpServer::new(move || App::new().app_data(web::Data::new(state.clone())).configure(routes::routes))
        .disable_signals()
        .shutdown_timeout(1)
        .bind(addr)?
        .run();

    let handle = server.handle();
    let stopper = root.clone();
    actix_web::rt::spawn(async move {
        stopper.done().await;
        handle.stop(true).await;
    });

    let served = server.await;
    root.cancel();

    if let Some(periodic) = periodic {
        if let Err(e) = periodic.await {
            warn!(error = %e, "periodic checks ended abnormally");
        }
    }

    instance.stopped_at = Some(Utc::now());
    update_instance_with_retry(&queue, &RunContext::background(), store.clone(), instance, &schedule);
    queue.shutdown().await;

    if let Err(e) = store.close().await {
        error!(error = %e, "closing store");
    }
    served?;
    info!("stopped");
    Ok(())
}

async fn analyze(
    config: Config,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    apps: Vec<String>,
) -> Result<(), AppError> {
    let root = RunContext::background();
    cancel_on_interrupt(&root);

    let store: Arc<dyn Store> = store::open(&config.database.url, config.database.auth_token.as_deref()).await?;
    let query = GapQuery::new(start, end).with_apps(apps);
    let analyzed = store
        .analyze_longest_gap_per_app(&root, &query, &mut |record: GapRecord| println!("{}", record.to_csv_line()))
        .await;

    if let Err(e) = store.close().await {
        warn!(error = %e, "closing store");
    }
    Ok(analyzed?)
}
