use std::sync::{Mutex, MutexGuard, PoisonError};

use super::storage::record_event::RawEvent;

/// Accumulates captured events between flushes. Producers call [EventBuffer::record] and the
/// flusher takes everything at once with [EventBuffer::drain_and_reset]; both only hold the lock
/// for a push or a swap.
///
/// The buffer is unbounded. Between two flushes it holds every event captured in the interval,
/// so a pathological input rate grows it without limit until the next flush. That risk is
/// accepted: realistic rates stay far below it for the default interval.
#[derive(Default)]
pub struct EventBuffer {
    events: Mutex<Vec<RawEvent>>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: RawEvent) {
        self.lock().push(event);
    }

    /// Returns every buffered event and leaves the buffer empty. An event recorded concurrently
    /// either lands in the returned batch or stays for the next drain.
    pub fn drain_and_reset(&self) -> Vec<RawEvent> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<RawEvent>> {
        // A panic while holding the lock can't leave a Vec half pushed, so the data is still
        // usable.
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Barrier},
        thread,
    };

    use chrono::{Duration, TimeZone, Utc};

    use crate::daemon::storage::record_event::RawEvent;

    use super::EventBuffer;

    fn numbered(producer: usize, index: usize) -> RawEvent {
        RawEvent::key(
            Utc.with_ymd_and_hms(2026, 1, 8, 10, 0, 0).unwrap() + Duration::milliseconds(index as i64),
            format!("{producer}:{index}"),
            "app".into(),
        )
    }

    #[test]
    fn drain_returns_everything_and_resets() {
        let buffer = EventBuffer::new();
        buffer.record(numbered(0, 0));
        buffer.record(numbered(0, 1));

        let drained = buffer.drain_and_reset();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].payload.as_ref(), "0:0");
        assert!(buffer.is_empty());
        assert!(buffer.drain_and_reset().is_empty());
    }

    #[test]
    fn concurrent_records_are_never_lost_or_duplicated() {
        const PRODUCERS: usize = 8;
        const PER_PRODUCER: usize = 2_000;

        let buffer = Arc::new(EventBuffer::new());
        let start = Arc::new(Barrier::new(PRODUCERS + 1));

        let producers = (0..PRODUCERS)
            .map(|producer| {
                let buffer = buffer.clone();
                let start = start.clone();
                thread::spawn(move || {
                    start.wait();
                    for index in 0..PER_PRODUCER {
                        buffer.record(numbered(producer, index));
                    }
                })
            })
            .collect::<Vec<_>>();

        start.wait();
        let mut batches = vec![];
        for _ in 0..50 {
            batches.push(buffer.drain_and_reset());
            thread::yield_now();
        }
        for producer in producers {
            producer.join().unwrap();
        }
        batches.push(buffer.drain_and_reset());

        let all = batches.into_iter().flatten().collect::<Vec<_>>();
        assert_eq!(all.len(), PRODUCERS * PER_PRODUCER);
        let unique = all
            .iter()
            .map(|v| v.payload.to_string())
            .collect::<HashSet<_>>();
        assert_eq!(unique.len(), all.len());
    }

    #[test]
    fn per_producer_order_is_kept() {
        let buffer = Arc::new(EventBuffer::new());
        let handles = (0..2)
            .map(|producer| {
                let buffer = buffer.clone();
                thread::spawn(move || {
                    for index in 0..500 {
                        buffer.record(numbered(producer, index));
                    }
                })
            })
            .collect::<Vec<_>>();
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = buffer.drain_and_reset();
        for producer in 0..2 {
            let prefix = format!("{producer}:");
            let indices = drained
                .iter()
                .filter_map(|v| v.payload.strip_prefix(&prefix))
                .map(|v| v.parse::<usize>().unwrap())
                .collect::<Vec<_>>();
            assert_eq!(indices, (0..500).collect::<Vec<_>>());
        }
    }
}
