use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::daemon::storage::{
    entities::AppAggregateEntity,
    record_event::{EventKind, RawEvent},
};

/// Groups a drained batch by app. Apps without activity don't get a row, so an empty batch
/// yields no rows at all.
pub fn aggregate_batch(
    batch: &[RawEvent],
    flushed_at: DateTime<Utc>,
    hour: u32,
) -> Vec<AppAggregateEntity> {
    let mut per_app = BTreeMap::<Arc<str>, (u64, u64)>::new();
    for event in batch {
        let counters = per_app.entry(event.app.clone()).or_default();
        match event.kind {
            EventKind::Key => counters.0 += 1,
            EventKind::Click => counters.1 += 1,
        }
    }

    per_app
        .into_iter()
        .map(|(app_name, (keystrokes, clicks))| AppAggregateEntity {
            timestamp: flushed_at,
            hour,
            app_name,
            keystrokes,
            clicks,
        })
        .collect()
}
