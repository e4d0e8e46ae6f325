//! Request-level counters and daily rollups. A pure sink: the scheduler and
//! HTTP handlers push completed-request facts in; nothing here drives
//! behavior elsewhere.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::{PersistentStore, StoreError};

/// Rolling retention window for [`DailyStatistics`] rows.
const RETENTION_DAYS: i64 = 90;

/// Errors produced by [`StatsStore`] operations.
#[derive(Debug, Error)]
pub enum StatsStoreError {
    /// Underlying persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-model request/cost counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ModelCounters {
    /// Requests attributed to this model.
    pub count: u64,
    /// Total cost attributed to this model.
    pub cost_usd: f64,
}

/// One day's rollup, keyed externally by its `YYYY-MM-DD` date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyStatistics {
    /// Calendar date this row covers.
    pub date: NaiveDate,
    /// Total requests recorded.
    pub total: u64,
    /// Requests that completed successfully.
    pub successful: u64,
    /// Requests that failed (including timeouts).
    pub failed: u64,
    /// Total input tokens across all requests.
    pub total_input_tokens: u64,
    /// Total output tokens across all requests.
    pub total_output_tokens: u64,
    /// Total cost across all requests.
    pub total_cost_usd: f64,
    /// Per-model counters.
    pub models: HashMap<String, ModelCounters>,
}

impl DailyStatistics {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            total: 0,
            successful: 0,
            failed: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_usd: 0.0,
            models: HashMap::new(),
        }
    }
}

/// Process-wide totals, derived on read from the persisted per-day rows
/// rather than kept as a second redundant document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateStatistics {
    /// Total requests across all recorded days.
    pub total_requests: u64,
    /// Total input tokens across all recorded days.
    pub total_input_tokens: u64,
    /// Total output tokens across all recorded days.
    pub total_output_tokens: u64,
    /// Total cost across all recorded days.
    pub total_cost_usd: f64,
    /// Per-model counters, summed across all recorded days.
    pub models: HashMap<String, ModelCounters>,
}

/// A single completed (or failed) executor invocation, as reported by the
/// scheduler or a sync HTTP handler.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Executor model identifier, if known.
    pub model: Option<String>,
    /// Input tokens consumed, if reported.
    pub input_tokens: u64,
    /// Output tokens produced, if reported.
    pub output_tokens: u64,
    /// Cost incurred, if reported.
    pub cost_usd: f64,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StatsDocument {
    daily: Vec<DailyStatistics>,
}

/// Persistent statistics sink backed by a single `statistics.json`
/// document.
pub struct StatsStore {
    store: PersistentStore<StatsDocument>,
}

impl StatsStore {
    /// Open (or initialize) the statistics store at `path`.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StatsStoreError> {
        Ok(Self {
            store: PersistentStore::open(path).await?,
        })
    }

    /// Record one completed request, rolling it into today's row and
    /// purging rows older than [`RETENTION_DAYS`] in the same transaction.
    pub async fn record_request(&self, record: RequestRecord) -> Result<(), StatsStoreError> {
        let today = Utc::now().date_naive();
        self.store
            .with_lock(|doc| {
                let row = match doc.daily.iter_mut().find(|row| row.date == today) {
                    Some(row) => row,
                    None => {
                        doc.daily.push(DailyStatistics::new(today));
                        doc.daily.last_mut().expect("just pushed")
                    }
                };

                row.total += 1;
                if record.success {
                    row.successful += 1;
                } else {
                    row.failed += 1;
                }
                row.total_input_tokens += record.input_tokens;
                row.total_output_tokens += record.output_tokens;
                row.total_cost_usd += record.cost_usd;

                if let Some(model) = record.model {
                    let entry = row.models.entry(model).or_default();
                    entry.count += 1;
                    entry.cost_usd += record.cost_usd;
                }

                let cutoff = today - chrono::Duration::days(RETENTION_DAYS);
                doc.daily.retain(|row| row.date >= cutoff);
            })
            .await?;
        Ok(())
    }

    /// Fetch the persisted daily rollups, most recent first.
    pub async fn daily(&self) -> Vec<DailyStatistics> {
        let mut daily = self.store.read().await.daily;
        daily.sort_by(|a, b| b.date.cmp(&a.date));
        daily
    }

    /// Derive process-wide totals from the persisted per-day rows.
    pub async fn aggregate(&self) -> AggregateStatistics {
        let doc = self.store.read().await;
        let mut aggregate = AggregateStatistics::default();
        for row in &doc.daily {
            aggregate.total_requests += row.total;
            aggregate.total_input_tokens += row.total_input_tokens;
            aggregate.total_output_tokens += row.total_output_tokens;
            aggregate.total_cost_usd += row.total_cost_usd;
            for (model, counters) in &row.models {
                let entry = aggregate.models.entry(model.clone()).or_default();
                entry.count += counters.count;
                entry.cost_usd += counters.cost_usd;
            }
        }
        aggregate
    }
}
