//! The flusher periodically moves everything captured so far into the durable log. One cycle is
//! `Idle -> Draining -> Aggregating -> Persisting -> Idle` and cycles never overlap.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument};

use crate::utils::clock::Clock;

use super::{buffer::EventBuffer, storage::activity_storage::ActivityStorage};

pub mod aggregate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Draining,
    Aggregating,
    Persisting,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlushReport {
    pub events: usize,
    pub aggregates: usize,
    pub persisted: bool,
}

pub struct PeriodicFlusher<S> {
    buffer: Arc<EventBuffer>,
    storage: S,
    clock: Box<dyn Clock>,
    interval: Duration,
    shutdown: CancellationToken,
    state: FlushState,
}

impl<S: ActivityStorage> PeriodicFlusher<S> {
    pub fn new(
        buffer: Arc<EventBuffer>,
        storage: S,
        clock: Box<dyn Clock>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            storage,
            clock,
            interval,
            shutdown,
            state: FlushState::Idle,
        }
    }

    pub fn state(&self) -> FlushState {
        self.state
    }

    /// Runs the flush loop. Cancellation triggers one last cycle so that nothing still in the
    /// buffer is lost on a clean shutdown.
    pub async fn run(mut self) -> Result<()> {
        let mut flush_point = self.clock.instant();
        loop {
            flush_point += self.interval;

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Flushing remaining events before shutdown");
                    self.flush_once().await;
                    return Ok(())
                }
                _ = self.clock.sleep_until(flush_point) => ()
            }

            self.flush_once()
                .instrument(info_span!("Flush cycle"))
                .await;

            // A cycle that overran the interval pushes the schedule instead of piling up ticks.
            let now = self.clock.instant();
            if flush_point < now {
                debug!("Flush overran its interval by {:?}", now - flush_point);
                flush_point = now;
            }
        }
    }

    /// Executes a single drain-aggregate-persist cycle. A persistence failure drops the drained
    /// batch after logging it.
    pub async fn flush_once(&mut self) -> FlushReport {
        self.state = FlushState::Draining;
        let batch = self.buffer.drain_and_reset();
        if batch.is_empty() {
            debug!("Nothing to flush");
            self.state = FlushState::Idle;
            return FlushReport {
                persisted: true,
                ..Default::default()
            };
        }

        self.state = FlushState::Aggregating;
        let flushed_at = self.clock.time();
        let rows = aggregate::aggregate_batch(&batch, flushed_at, self.clock.local_hour());
        let mut report = FlushReport {
            events: batch.len(),
            aggregates: rows.len(),
            persisted: false,
        };

        self.state = FlushState::Persisting;
        // Raw events go first, aggregates can be recomputed from them.
        let result = match self.storage.append_raw(batch).await {
            Ok(_) => self.storage.append_aggregates(rows).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!(
                    "Flushed {} events into {} aggregates",
                    report.events, report.aggregates
                );
                report.persisted = true;
            }
            Err(e) => {
                error!("Dropping {} events, persisting failed {e:?}", report.events);
            }
        }

        self.state = FlushState::Idle;
        report
    }
}
