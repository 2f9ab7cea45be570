//! Capture turns hook notifications into attributed [RawEvent]s. Two producers run concurrently,
//! one per input device. Both resolve the foreground app for every event and append to the shared
//! [EventBuffer]. Neither of them ever touches storage.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::daemon::{buffer::EventBuffer, storage::record_event::RawEvent};

use attribution::AppAttribution;
use input::{KeyPress, PointerClick};

pub mod attribution;
pub mod input;

/// Running totals since the daemon started. Informational only, the durable counts are the
/// aggregate log.
#[derive(Default, Debug)]
pub struct CaptureCounters {
    pub keys: AtomicU64,
    pub clicks: AtomicU64,
}

pub struct CaptureCoordinator {
    buffer: Arc<EventBuffer>,
    attribution: AppAttribution,
    counters: Arc<CaptureCounters>,
    shutdown: CancellationToken,
}

impl CaptureCoordinator {
    pub fn new(
        buffer: Arc<EventBuffer>,
        attribution: AppAttribution,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            buffer,
            attribution,
            counters: Default::default(),
            shutdown,
        }
    }

    pub fn counters(&self) -> Arc<CaptureCounters> {
        self.counters.clone()
    }

    /// Runs both producers until shutdown is requested or their sources close. Events that were
    /// already queued when shutdown arrives are still recorded so the final flush sees them.
    pub async fn run(
        self,
        keys: mpsc::Receiver<KeyPress>,
        clicks: mpsc::Receiver<PointerClick>,
    ) -> Result<()> {
        let key_producer = tokio::spawn(run_key_producer(
            keys,
            self.buffer.clone(),
            self.attribution.clone(),
            self.counters.clone(),
            self.shutdown.clone(),
        ));
        let pointer_producer = tokio::spawn(run_pointer_producer(
            clicks,
            self.buffer.clone(),
            self.attribution.clone(),
            self.counters.clone(),
            self.shutdown.clone(),
        ));

        let (key_result, pointer_result) = tokio::join!(key_producer, pointer_producer);
        if let Err(e) = &key_result {
            error!("Key producer failed {e:?}");
        }
        if let Err(e) = &pointer_result {
            error!("Pointer producer failed {e:?}");
        }

        info!(
            "Capture stopped after {} keys and {} clicks",
            self.counters.keys.load(Ordering::Relaxed),
            self.counters.clicks.load(Ordering::Relaxed)
        );
        key_result?;
        pointer_result?;
        Ok(())
    }
}

async fn resolve_app(attribution: &AppAttribution) -> Arc<str> {
    let attribution = attribution.clone();
    match tokio::task::spawn_blocking(move || attribution.resolve()).await {
        Ok(app) => app,
        Err(e) => {
            error!("Foreground lookup panicked {e:?}");
            attribution::UNKNOWN_APP.into()
        }
    }
}

/// Waits for the next item, or for shutdown. After shutdown only items that are already queued
/// are returned.
async fn next_or_drain<T>(
    receiver: &mut mpsc::Receiver<T>,
    shutdown: &CancellationToken,
) -> Option<T> {
    if shutdown.is_cancelled() {
        return receiver.try_recv().ok();
    }
    tokio::select! {
        biased;
        item = receiver.recv() => item,
        _ = shutdown.cancelled() => receiver.try_recv().ok(),
    }
}

async fn run_key_producer(
    mut keys: mpsc::Receiver<KeyPress>,
    buffer: Arc<EventBuffer>,
    attribution: AppAttribution,
    counters: Arc<CaptureCounters>,
    shutdown: CancellationToken,
) {
    while let Some(press) = next_or_drain(&mut keys, &shutdown).await {
        counters.keys.fetch_add(1, Ordering::Relaxed);
        let app = resolve_app(&attribution).await;
        debug!("Key {} in {app}", press.key);
        buffer.record(RawEvent::key(press.at, press.key, app));
    }
    keys.close();
}

async fn run_pointer_producer(
    mut clicks: mpsc::Receiver<PointerClick>,
    buffer: Arc<EventBuffer>,
    attribution: AppAttribution,
    counters: Arc<CaptureCounters>,
    shutdown: CancellationToken,
) {
    while let Some(click) = next_or_drain(&mut clicks, &shutdown).await {
        counters.clicks.fetch_add(1, Ordering::Relaxed);
        let app = resolve_app(&attribution).await;
        debug!("Click in {app}");
        buffer.record(RawEvent::click(click.at, app));
    }
    clicks.close();
}
