use std::sync::Arc;

use tracing::{info, warn};

use slotwise::config::Config;
use slotwise::directory::InMemoryDirectory;
use slotwise::engine::Engine;
use slotwise::notify::NotifyHub;

/// Open the data directory, replay the log, report on it and compact if it has grown.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    let engine = Engine::open(
        &config,
        Arc::new(InMemoryDirectory::new()),
        Arc::new(NotifyHub::new()),
    )?;

    info!("slotwise opened {}", config.wal_path().display());
    info!("  policy: {:?}", engine.policy());
    info!("  replayed records: {}", engine.replayed_records());

    let issues = engine.audit().await;
    if issues.is_empty() {
        info!("audit clean");
    } else {
        for issue in &issues {
            warn!("audit: {issue}");
        }
        warn!("audit found {} issue(s)", issues.len());
    }

    if engine.replayed_records() as u64 > config.compact_threshold {
        engine.compact_wal().await?;
        info!(
            "compacted WAL ({} records > threshold {})",
            engine.replayed_records(),
            config.compact_threshold
        );
    }
    Ok(())
}
