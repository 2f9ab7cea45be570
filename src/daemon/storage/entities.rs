use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record_event::{EventKind, RawEvent};

/// Row of the raw log (`keystroke_log`). Clicks are kept next to keystrokes so that aggregates
/// can always be recomputed from the raw log.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct RawEventEntity {
    /// Monotonically increasing surrogate key.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "key_kind")]
    pub kind: EventKind,
    pub key_pressed: Arc<str>,
    pub app_name: Arc<str>,
}

fn key_kind() -> EventKind {
    EventKind::Key
}

impl RawEventEntity {
    pub fn from_event(id: u64, event: RawEvent) -> Self {
        Self {
            id,
            timestamp: event.timestamp,
            kind: event.kind,
            key_pressed: event.payload,
            app_name: event.app,
        }
    }
}

/// Row of the aggregate log (`activity_log`). One row per flush cycle and app with non-zero
/// activity.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct AppAggregateEntity {
    /// Time of the flush that produced the row.
    pub timestamp: DateTime<Utc>,
    /// Local hour of the flush, 0..23.
    pub hour: u32,
    pub app_name: Arc<str>,
    pub keystrokes: u64,
    pub clicks: u64,
}

/// Entities that can be selected by time range.
pub trait Timestamped {
    fn timestamp(&self) -> DateTime<Utc>;
}

impl Timestamped for RawEventEntity {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Timestamped for AppAggregateEntity {
    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
