use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::{Engine, EngineError};

/// Background task that rewrites the journal once `threshold` appends have
/// accumulated since the last compaction. Checks every `period`.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("journal compaction failed: {e}");
        }
    }
}

/// Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    let appends = engine.journal_appends_since_compact().await;
    if appends < threshold {
        debug!(appends, threshold, "compaction not due");
        return Ok(false);
    }
    engine.compact_journal().await?;
    Ok(true)
}
