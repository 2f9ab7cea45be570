use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::window_api::ForegroundResolver;

/// App events are attributed to when the foreground lookup fails.
pub const UNKNOWN_APP: &str = "Unknown";

struct AttributionState {
    resolver: Box<dyn ForegroundResolver>,
    last: Option<(Instant, Arc<str>)>,
}

/// Shared handle to the foreground resolver used by both producers. A resolved app is reused for
/// `debounce` since focus changes far less often than keys are pressed.
#[derive(Clone)]
pub struct AppAttribution {
    state: Arc<Mutex<AttributionState>>,
    debounce: Duration,
}

impl AppAttribution {
    pub fn new(resolver: Box<dyn ForegroundResolver>, debounce: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(AttributionState {
                resolver,
                last: None,
            })),
            debounce,
        }
    }

    /// Returns the app in the foreground. Blocks for the duration of the platform lookup and
    /// never fails: lookup errors give [UNKNOWN_APP].
    pub fn resolve(&self) -> Arc<str> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();

        if let Some((resolved_at, app)) = &state.last {
            if now.duration_since(*resolved_at) < self.debounce {
                return app.clone();
            }
        }

        match state.resolver.current_app() {
            Ok(app) => {
                debug!("Foreground app is {app}");
                state.last = Some((now, app.clone()));
                app
            }
            Err(e) => {
                warn!("Failed to resolve foreground app {e:?}");
                state.last = None;
                UNKNOWN_APP.into()
            }
        }
    }
}
