use std::future::{self, Future};

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use futures::{stream, Stream, StreamExt, TryStreamExt};
use tracing::error;

use crate::{
    daemon::storage::{
        activity_storage::ActivityStorage,
        entities::{AppAggregateEntity, RawEventEntity, Timestamped},
    },
    utils::time::day_bounds,
};

/// Half-open range of time `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// The calendar day `date` of timezone `tz`.
    pub fn day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        let (start, end) = day_bounds(tz, date);
        Self { start, end }
    }

    fn contains(&self, moment: DateTime<Utc>) -> bool {
        self.start <= moment && moment < self.end
    }

    /// UTC dates of the storage files that can hold records of the range.
    fn utc_days(&self) -> (NaiveDate, NaiveDate) {
        let last = self.end - Duration::nanoseconds(1);
        (self.start.date_naive(), last.date_naive())
    }
}

/// Extracts records inside `range`, reading one storage file per UTC day. Files are fetched a few
/// at a time through streams and records come out in file order.
pub fn extract_between<'a, T, F, Fut>(
    range: TimeRange,
    fetch: F,
) -> impl Stream<Item = Result<T>> + 'a
where
    T: Timestamped + 'a,
    F: Fn(NaiveDate) -> Fut + 'a,
    Fut: Future<Output = Result<Vec<T>>> + 'a,
{
    let (first, last) = range.utc_days();

    date_range(first, last)
        .map(move |day| {
            let data = fetch(day);
            async move { (day, data.await) }
        })
        .buffered(4)
        .flat_map(|(day, data)| match data {
            Ok(data) => stream::iter(data).map(Ok).boxed_local(),
            Err(e) => {
                error!("Failed to process file {day} {e}");
                stream::once(future::ready(Err(e))).boxed_local()
            }
        })
        .try_filter(move |record| future::ready(range.contains(record.timestamp())))
}

/// Returns a stream of dates between start (inclusive) and end (inclusive).
fn date_range(start: NaiveDate, end: NaiveDate) -> impl Stream<Item = NaiveDate> {
    stream::unfold(Some(start), move |current| {
        future::ready(match current {
            Some(day) if day <= end => Some((day, day.succ_opt())),
            _ => None,
        })
    })
}

/// Raw events of `range` ordered by time, ties broken by id.
pub async fn raw_events_between(
    storage: &impl ActivityStorage,
    range: TimeRange,
) -> Result<Vec<RawEventEntity>> {
    let mut events = extract_between(range, move |day| storage.raw_for(day))
        .try_collect::<Vec<_>>()
        .await?;
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));
    Ok(events)
}

pub async fn aggregates_between(
    storage: &impl ActivityStorage,
    range: TimeRange,
) -> Result<Vec<AppAggregateEntity>> {
    extract_between(range, move |day| storage.aggregates_for(day))
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::daemon::storage::{
        activity_storage::{ActivityStorage, JsonlActivityStorage},
        record_event::RawEvent,
    };

    use super::{raw_events_between, TimeRange};

    #[tokio::test]
    async fn local_day_spans_two_utc_files() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonlActivityStorage::open(dir.path().to_path_buf()).await?;
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let utc = |d, h, m| Utc.with_ymd_and_hms(2026, 1, d, h, m, 0).unwrap();

        storage
            .append_raw(vec![
                RawEvent::key(utc(7, 20, 59), "x", "editor".into()),
                RawEvent::key(utc(7, 21, 0), "a", "editor".into()),
                RawEvent::key(utc(8, 9, 0), "c", "editor".into()),
                RawEvent::key(utc(8, 20, 59), "d", "editor".into()),
                RawEvent::key(utc(8, 21, 0), "y", "editor".into()),
            ])
            .await?;
        // Written later, but earlier in time.
        storage
            .append_raw(vec![RawEvent::key(utc(7, 23, 0), "b", "editor".into())])
            .await?;

        let date = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();
        let events = raw_events_between(&storage, TimeRange::day(date, &tz)).await?;

        let keys = events
            .iter()
            .map(|e| e.key_pressed.as_ref())
            .collect::<Vec<_>>();
        assert_eq!(keys, ["a", "b", "c", "d"]);
        assert!(events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(
            events.last().map(|e| e.timestamp),
            Some(utc(8, 21, 0) - Duration::minutes(1))
        );
        Ok(())
    }

    #[tokio::test]
    async fn day_without_files_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = JsonlActivityStorage::open(dir.path().to_path_buf()).await?;
        let date = NaiveDate::from_ymd_opt(2026, 1, 8).unwrap();

        assert!(raw_events_between(&storage, TimeRange::day(date, &Utc))
            .await?
            .is_empty());
        Ok(())
    }
}
