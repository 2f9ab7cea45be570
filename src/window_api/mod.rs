//! Resolves which application owns the focused window. Lookups block, capture runs them on the
//! blocking pool. [GenericForegroundResolver] picks the platform
//! implementation at compile time.

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Result};

/// Intended to serve as a contract every host platform must implement.
#[cfg_attr(test, mockall::automock)]
pub trait ForegroundResolver: Send {
    /// Name of the application currently in the foreground, e.g. `firefox` or `Terminal`.
    fn current_app(&mut self) -> Result<Arc<str>>;
}

/// Serves as a cross-compatible [ForegroundResolver] implementation.
pub struct GenericForegroundResolver {
    inner: Box<dyn ForegroundResolver>,
}

impl GenericForegroundResolver {
    pub fn new() -> Result<Self> {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                use win::WindowsForegroundResolver;
                Ok(Self {
                    inner: Box::new(WindowsForegroundResolver::new()),
                })
            }
            else if #[cfg(feature = "x11")] {
                use x11::X11ForegroundResolver;
                Ok(Self {
                    inner: Box::new(X11ForegroundResolver::new()?),
                })
            }
            else if #[cfg(target_os = "macos")] {
                use macos::MacForegroundResolver;
                Ok(Self {
                    inner: Box::new(MacForegroundResolver),
                })
            }
            else {
                // Lets the daemon run on hosts without a resolver. Every event is attributed to
                // the unknown app.
                Ok(Self {
                    inner: Box::new(UnsupportedResolver),
                })
            }
        }
    }
}

impl ForegroundResolver for GenericForegroundResolver {
    fn current_app(&mut self) -> Result<Arc<str>> {
        self.inner.current_app()
    }
}

struct UnsupportedResolver;

impl ForegroundResolver for UnsupportedResolver {
    fn current_app(&mut self) -> Result<Arc<str>> {
        Err(anyhow!(
            "No foreground resolver was compiled in. Enable the x11 or win feature"
        ))
    }
}

/// Reduces a full executable path to its file name. `/usr/bin/nvim` becomes `nvim`.
pub fn clean_process_name(value: &str) -> String {
    Path::new(value)
        .file_name()
        .map(|v| v.to_string_lossy().to_string())
        .unwrap_or_else(|| value.to_string())
}
