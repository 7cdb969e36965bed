//! Vote ledger service binary

use std::sync::Arc;
use votes_core::{AdminList, Config, ExternalHooks, InMemoryOwnership, ManualClock, VoteLedger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("starting VoteRail votes server");

    // Load configuration
    let config = Config::from_env()?;

    // Skeleton collaborator wiring; a deployment replaces these with the
    // host's asset registry, admin gate, and block clock.
    let hooks = ExternalHooks {
        ownership: Arc::new(InMemoryOwnership::new()),
        admin: Arc::new(AdminList::new()),
        clock: Arc::new(ManualClock::starting_at(1)),
        observer: None,
    };

    let ledger = VoteLedger::open(config, hooks).await?;
    tracing::info!("vote ledger opened");

    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down vote ledger");
    ledger.shutdown().await?;
    Ok(())
}
