//! One-shot reconciliation sweep.
//!
//! Runs the same sweep the server schedules, once, and prints the report as
//! JSON. Useful after changing the lock list.

use lockgate_server::config::GateConfig;
use lockgate_server::db;
use lockgate_server::state::Collaborators;

use super::CommandError;

/// Reconcile every known member and print the report.
pub async fn run() -> Result<(), CommandError> {
    let config = GateConfig::from_env()?;
    let pool = db::create_pool(&config.database_url).await?;

    let sweeper = Collaborators::production(&config, pool)?.sweeper(&config);
    let report = sweeper.sweep().await;

    tracing::info!(
        checked = report.checked,
        failed = report.failed,
        "Sweep finished"
    );

    #[allow(clippy::print_stdout)]
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}
