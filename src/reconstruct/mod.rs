//! Turns the raw key log back into readable text. Events are cut into fixed windows of local
//! time, and the keys of each app inside a window are replayed separately.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::daemon::storage::{entities::RawEventEntity, record_event::EventKind};

pub mod export;
pub mod replay;
pub mod windowing;

/// Text typed into one app during one window. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextSegment {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub app: Arc<str>,
    pub text: String,
}

struct OpenWindow<'a> {
    start: DateTime<Utc>,
    /// Keys per app, apps in order of their first key.
    apps: Vec<(Arc<str>, Vec<&'a str>)>,
}

/// Segments a day of events. `events` must be ordered by time. Click events are skipped. Output
/// is ordered by window, and inside a window by the first key of each app.
#[instrument(skip(events, tz), fields(events = events.len()))]
pub fn segment_events<Tz: TimeZone>(
    events: &[RawEventEntity],
    width: Duration,
    tz: &Tz,
) -> Vec<TextSegment> {
    let mut segments = vec![];
    let mut open: Option<OpenWindow> = None;

    for event in events.iter().filter(|e| e.kind == EventKind::Key) {
        let start = windowing::window_start(event.timestamp, width, tz);
        if open.as_ref().is_some_and(|window| window.start != start) {
            if let Some(finished) = open.take() {
                close_window(finished, width, tz, &mut segments);
            }
        }
        let window = open.get_or_insert_with(|| OpenWindow {
            start,
            apps: vec![],
        });

        let key = &*event.key_pressed;
        match window.apps.iter_mut().find(|(app, _)| *app == event.app_name) {
            Some((_, keys)) => keys.push(key),
            None => window.apps.push((event.app_name.clone(), vec![key])),
        }
    }
    if let Some(finished) = open {
        close_window(finished, width, tz, &mut segments);
    }

    debug!("Reconstructed {} segments", segments.len());
    segments
}

fn close_window<Tz: TimeZone>(
    window: OpenWindow,
    width: Duration,
    tz: &Tz,
    segments: &mut Vec<TextSegment>,
) {
    let end = windowing::window_end(window.start, width, tz);
    for (app, keys) in window.apps {
        let text = replay::replay(keys);
        if text.is_empty() {
            continue;
        }
        segments.push(TextSegment {
            start: window.start,
            end,
            app,
            text,
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::daemon::storage::{entities::RawEventEntity, record_event::EventKind};

    use super::segment_events;

    pub(crate) fn key(id: u64, at: DateTime<Utc>, key: &str, app: &str) -> RawEventEntity {
        RawEventEntity {
            id,
            timestamp: at,
            kind: EventKind::Key,
            key_pressed: key.into(),
            app_name: Arc::from(app),
        }
    }

    pub(crate) fn typed(
        start: DateTime<Utc>,
        first_id: u64,
        keys: &[&str],
        app: &str,
    ) -> Vec<RawEventEntity> {
        keys.iter()
            .enumerate()
            .map(|(i, k)| key(first_id + i as u64, start + Duration::seconds(i as i64), k, app))
            .collect()
    }

    #[test]
    fn apps_are_replayed_separately_per_window() {
        let nine = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();
        let mut events = vec![
            key(1, nine, "h", "editor"),
            key(2, nine + Duration::seconds(1), "x", "chat"),
            key(3, nine + Duration::seconds(2), "i", "editor"),
            key(4, nine + Duration::seconds(3), "backspace", "chat"),
            key(5, nine + Duration::seconds(4), "k", "chat"),
        ];
        events.extend(typed(nine + Duration::minutes(31), 6, &["o", "k"], "editor"));

        let segments = segment_events(&events, Duration::minutes(30), &Utc);

        let summary = segments
            .iter()
            .map(|s| (s.start, s.app.as_ref(), s.text.as_str()))
            .collect::<Vec<_>>();
        let half_past = nine + Duration::minutes(30);
        assert_eq!(
            summary,
            [
                (nine, "editor", "hi"),
                (nine, "chat", "k"),
                (half_past, "editor", "ok")
            ]
        );
        assert_eq!(segments[0].end, half_past);
    }

    #[test]
    fn windows_without_text_are_dropped() {
        let nine = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();
        let mut events = typed(nine, 1, &["shift", "ctrl", "left", "page_up"], "editor");
        events.extend(typed(nine + Duration::hours(1), 5, &["a", "backspace"], "editor"));
        events.extend(typed(nine + Duration::hours(2), 7, &["b"], "editor"));

        let segments = segment_events(&events, Duration::minutes(30), &Utc);

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "b");
        assert_eq!(segments[0].start, nine + Duration::hours(2));
    }

    #[test]
    fn clicks_do_not_split_or_produce_text() {
        let nine = Utc.with_ymd_and_hms(2026, 1, 8, 9, 0, 0).unwrap();
        let mut events = typed(nine, 1, &["o", "k"], "editor");
        events.push(RawEventEntity {
            id: 3,
            timestamp: nine + Duration::seconds(5),
            kind: EventKind::Click,
            key_pressed: "".into(),
            app_name: "browser".into(),
        });

        let segments = segment_events(&events, Duration::minutes(30), &Utc);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].app.as_ref(), "editor");
    }
}
