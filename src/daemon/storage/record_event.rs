use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Key,
    Click,
}

/// One captured keyboard or pointer action, attributed to the application that was in the
/// foreground when it happened. Created by a capture producer and handed to the
/// [EventBuffer](crate::daemon::buffer::EventBuffer); never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    /// Canonical key name for [EventKind::Key], empty for [EventKind::Click].
    pub payload: Arc<str>,
    pub app: Arc<str>,
}

impl RawEvent {
    pub fn key(timestamp: DateTime<Utc>, payload: impl Into<Arc<str>>, app: Arc<str>) -> Self {
        Self {
            timestamp,
            kind: EventKind::Key,
            payload: payload.into(),
            app,
        }
    }

    pub fn click(timestamp: DateTime<Utc>, app: Arc<str>) -> Self {
        Self {
            timestamp,
            kind: EventKind::Click,
            payload: "".into(),
            app,
        }
    }
}
