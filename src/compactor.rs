use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that compacts the WAL once enough appends have piled up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = maybe_compact(&engine, threshold).await {
            tracing::error!("WAL compaction failed: {e}");
        }
    }
}

/// Compact when at least `threshold` appends happened since the last compaction.
/// Returns whether a compaction ran.
pub async fn maybe_compact(engine: &Engine, threshold: u64) -> Result<bool, EngineError> {
    if threshold == 0 {
        return Ok(false);
    }
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return Ok(false);
    }
    engine.compact_wal().await?;
    metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
    info!("compacted WAL after {appends} appends");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::engine::InMemoryStore;
    use std::path::PathBuf;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("shareit_test_compactor");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn engine(name: &str) -> Engine {
        Engine::open(
            test_wal_path(name),
            Arc::new(InMemoryStore::new()),
            Arc::new(FixedClock::new(1_704_067_200_000)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let engine = engine("threshold.wal");
        for i in 0..3 {
            engine
                .create_user(format!("u{i}"), format!("u{i}@example.com"))
                .await
                .unwrap();
        }

        assert!(!maybe_compact(&engine, 4).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 3);

        assert!(maybe_compact(&engine, 3).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(engine.list_users().len(), 3);
    }

    #[tokio::test]
    async fn zero_threshold_disables() {
        let engine = engine("disabled.wal");
        engine
            .create_user("Ann".into(), "ann@example.com".into())
            .await
            .unwrap();
        assert!(!maybe_compact(&engine, 0).await.unwrap());
        assert_eq!(engine.wal_appends_since_compact().await, 1);
    }
}
