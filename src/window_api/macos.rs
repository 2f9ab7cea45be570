use std::{process::Command, sync::Arc};

use anyhow::{anyhow, Result};
use tracing::instrument;

use super::ForegroundResolver;

const FRONTMOST_APP_SCRIPT: &str = r#"tell application "System Events"
    set frontApp to name of first application process whose frontmost is true
end tell"#;

/// Asks System Events for the frontmost application through `osascript`. Spawns a process per
/// lookup, which is why capture debounces lookups.
pub struct MacForegroundResolver;

impl ForegroundResolver for MacForegroundResolver {
    #[instrument(skip(self))]
    fn current_app(&mut self) -> Result<Arc<str>> {
        let output = Command::new("osascript")
            .args(["-e", FRONTMOST_APP_SCRIPT])
            .output()?;
        if !output.status.success() {
            return Err(anyhow!(
                "osascript failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() {
            return Err(anyhow!("osascript returned no application"));
        }
        Ok(name.into())
    }
}
