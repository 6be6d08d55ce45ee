//! Usage recorder over the shared store
//!
//! Daily counters under `usage:<YYYY-MM-DD>:<metric>`.

use chrono::{NaiveDate, Utc};
use platform::kv::{KvResult, KvStore};
use std::sync::Arc;
use std::time::Duration;

use crate::application::usage::UsageTally;
use crate::domain::repository::UsageRecorder;

/// Counters outlive a week of reporting
const RETENTION: Duration = Duration::from_secs(8 * 24 * 60 * 60);

pub struct KvUsageRecorder<K: KvStore> {
    store: Arc<K>,
}

impl<K: KvStore> Clone for KvUsageRecorder<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K: KvStore> KvUsageRecorder<K> {
    pub fn new(store: Arc<K>) -> Self {
        Self { store }
    }
}

/// Non-zero metrics of a tally, keyed for `day`
pub fn usage_increments(day: NaiveDate, tally: &UsageTally) -> Vec<(String, i64)> {
    let metrics = [
        ("requests", 1),
        ("model_calls", i64::from(tally.model_calls)),
        ("input_tokens", tally.input_tokens as i64),
        ("output_tokens", tally.output_tokens as i64),
        ("web_searches", i64::from(tally.web_searches)),
        ("graph_traversals", i64::from(tally.graph_traversals)),
        ("budget_exhausted", i64::from(tally.budget_exhausted)),
    ];
    metrics
        .into_iter()
        .filter(|(_, by)| *by > 0)
        .map(|(metric, by)| (format!("usage:{}:{metric}", day.format("%Y-%m-%d")), by))
        .collect()
}

impl<K: KvStore + Sync> UsageRecorder for KvUsageRecorder<K> {
    async fn record(&self, tally: &UsageTally) -> KvResult<()> {
        for (key, by) in usage_increments(Utc::now().date_naive(), tally) {
            self.store.incr_with_expiry(&key, by, RETENTION).await?;
        }
        Ok(())
    }
}
