use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike, Utc};
use tokio::time::Instant;

/// Represents an entity responsible for providing time to the daemon. Capture stamps events with
/// [Clock::time] and the flusher paces itself with [Clock::sleep_until], so tests can swap in a
/// clock anchored at a known date.
#[async_trait]
pub trait Clock: Sync + Send + 'static {
    fn time(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant;

    async fn sleep_until(&self, instant: Instant);

    /// Hour of the day (0..23) in the local timezone. Used for the `hour` column of the
    /// aggregate log.
    fn local_hour(&self) -> u32 {
        self.time().with_timezone(&Local).hour()
    }
}

#[derive(Clone, Copy)]
pub struct DefaultClock;

#[async_trait]
impl Clock for DefaultClock {
    fn time(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}
