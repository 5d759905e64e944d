//! Tributo pipeline runner.
//!
//! Loads configuration, runs one retrieve-flatten-reconcile cycle, and
//! exports the tables, the balance, and the run report. The session token
//! for the download service is consumed from the environment
//! (`TRIBUTO_SAT_TOKEN`); obtaining it is the authentication collaborator's
//! job.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tributo_core::pipeline::coordinator::{Coordinator, RunParams};
use tributo_core::retrieval::machine::PollPolicy;
use tributo_registry::{HttpRegistryClient, StaticTokenProvider};
use tributo_shared::AppConfig;
use tributo_store::{TableStore, export_tables};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tributo=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;
    let params = RunParams::from_config(&config)?;
    info!(
        rfc = %params.rfc,
        range = %params.range,
        period = %params.period,
        "configuration loaded"
    );

    // Wire the registry client, the table store, and the coordinator
    let token = std::env::var("TRIBUTO_SAT_TOKEN").unwrap_or_default();
    let client = HttpRegistryClient::new(
        config.registry.clone(),
        StaticTokenProvider::new(token),
    )?;
    let store = Arc::new(TableStore::new());
    let coordinator = Coordinator::new(
        Arc::new(client),
        Arc::clone(&store),
        PollPolicy::from(&config.retry),
    );

    // Ctrl-C cancels in-flight sub-ranges; finished work is kept
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("cancellation requested");
                cancel.cancel();
            }
        }
    });

    // Run one full cycle
    let report = coordinator.run(&params, &cancel).await?;

    // Export artifacts: one CSV per table, the balance, and the report
    let export_dir = Path::new(&config.output.export_dir);
    export_tables(&store, export_dir, &report.balance)?;
    std::fs::write(
        export_dir.join("report.json"),
        serde_json::to_vec_pretty(&report)?,
    )?;

    for outcome in report.failed_subranges() {
        warn!(
            range = %outcome.range,
            state = ?outcome.state,
            "sub-range did not complete; resubmit it in a new run"
        );
    }
    info!(
        documents = report.documents_flattened,
        failures = report.flatten_failures.len(),
        owed = %report.balance.owed(),
        creditable = %report.balance.creditable(),
        net = %report.balance.net(),
        "run finished"
    );

    Ok(())
}
