//! Bounded-batch collection with independent per-target failure
//!
//! Targets are fetched `batch_size` at a time. Each task owns its target and
//! returns its rows; rows are folded into the accumulator only once the task
//! has finished, so no state is shared between in-flight fetches. A failing
//! target is retried with backoff when the error is transient and is then
//! recorded as a `FetchFailure`; its siblings are unaffected. A task that
//! panics is recorded the same way, with error kind `panic`.

use super::retry::ExponentialBackoff;
use super::source::{FetchError, FetchTarget, StatsSource};
use crate::ingest_core::RawRow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{self, JoinError, JoinSet};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchFailure {
    pub entity_id: String,
    pub period: i32,
    pub error_kind: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl FetchFailure {
    pub fn from_error(target: &FetchTarget, error: &FetchError) -> Self {
        Self {
            entity_id: target.entity_id.clone(),
            period: target.period,
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// Task died before producing a result
    pub fn from_join_error(target: &FetchTarget, error: &JoinError) -> Self {
        let error_kind = if error.is_panic() { "panic" } else { "aborted" };
        Self {
            entity_id: target.entity_id.clone(),
            period: target.period,
            error_kind: error_kind.to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 5_000,
        }
    }
}

#[derive(Debug, Default)]
pub struct CollectionReport {
    pub rows: Vec<RawRow>,
    pub failures: Vec<FetchFailure>,
    pub succeeded: usize,
}

impl CollectionReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failures.len()
    }
}

async fn fetch_with_retry(
    source: Arc<dyn StatsSource>,
    target: FetchTarget,
    config: CollectorConfig,
) -> Result<Vec<RawRow>, FetchError> {
    let mut backoff = ExponentialBackoff::new(
        config.initial_backoff_ms,
        config.max_backoff_ms,
        config.max_retries,
    );

    loop {
        match source.fetch_rows(&target).await {
            Ok(rows) => return Ok(rows),
            Err(e) if e.is_transient() => {
                log::warn!(
                    "⚠️  {} fetch {}/{} failed: {}",
                    source.source_name(),
                    target.entity_id,
                    target.period,
                    e
                );
                if backoff.sleep().await.is_err() {
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch every target in batches of `config.batch_size`
///
/// Never fails as a whole: each target either contributes rows or a
/// `FetchFailure` entry.
pub async fn collect_batched(
    source: Arc<dyn StatsSource>,
    targets: Vec<FetchTarget>,
    config: CollectorConfig,
) -> CollectionReport {
    let batch_size = config.batch_size.max(1);
    let mut report = CollectionReport::default();

    log::info!(
        "🚀 Collecting {} targets from {} ({} at a time)",
        targets.len(),
        source.source_name(),
        batch_size
    );

    for batch in targets.chunks(batch_size) {
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<task::Id, FetchTarget> = HashMap::new();
        for target in batch {
            let handle = tasks.spawn(fetch_with_retry(Arc::clone(&source), target.clone(), config));
            pending.insert(handle.id(), target.clone());
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, result) = match joined {
                Ok((id, result)) => (id, Ok(result)),
                Err(join_error) => (join_error.id(), Err(join_error)),
            };
            let Some(target) = pending.remove(&id) else {
                log::error!("❌ Fetch task {} finished with no known target", id);
                continue;
            };

            match result {
                Ok(Ok(rows)) => {
                    report.succeeded += 1;
                    report.rows.extend(rows);
                }
                Ok(Err(e)) => {
                    log::error!(
                        "❌ {} fetch {}/{} gave up: {}",
                        source.source_name(),
                        target.entity_id,
                        target.period,
                        e
                    );
                    report.failures.push(FetchFailure::from_error(&target, &e));
                }
                Err(join_error) => {
                    log::error!(
                        "❌ Fetch task {}/{} died: {}",
                        target.entity_id,
                        target.period,
                        join_error
                    );
                    report
                        .failures
                        .push(FetchFailure::from_join_error(&target, &join_error));
                }
            }
        }
    }

    log::info!(
        "✅ Collected {} rows ({} ok, {} failed)",
        report.rows.len(),
        report.succeeded,
        report.failures.len()
    );
    report
}
