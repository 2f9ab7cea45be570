//! Settings shared by the daemon and the CLI. They are read from `config.json` in the
//! application directory; every field has a default so the file is optional.

use std::{io::ErrorKind, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LeafGrouping {
    /// One Layer-1 node per application, with the app name as label.
    PerApp,
    /// One Layer-1 node per text segment.
    PerSegment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub flush_interval_secs: u64,
    pub window_minutes: u32,
    pub attribution_debounce_ms: u64,
    pub channel_capacity: usize,
    pub leaf_grouping: LeafGrouping,
    pub summarizer: SummarizerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            flush_interval_secs: 60,
            window_minutes: 30,
            attribution_debounce_ms: 250,
            channel_capacity: 1024,
            leaf_grouping: LeafGrouping::PerApp,
            summarizer: SummarizerSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `dir/config.json`. A missing file means defaults.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No settings at {path:?}, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs.max(1))
    }

    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.window_minutes.max(1) as i64)
    }

    pub fn attribution_debounce(&self) -> Duration {
        Duration::from_millis(self.attribution_debounce_ms)
    }
}

/// Sampling parameters of a single kind of request to the chat backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummarizerSettings {
    /// OpenAI-compatible chat completions endpoint.
    pub base_url: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub attempts: u32,
    pub timeout_secs: u64,
    pub refine: CallSettings,
    pub extract: CallSettings,
    pub merge: CallSettings,
    /// Assignment of concepts to the merged categories.
    pub map: CallSettings,
    pub root: CallSettings,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1/chat/completions".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key_env: "GROQ_API_KEY".into(),
            attempts: 2,
            timeout_secs: 60,
            refine: CallSettings {
                temperature: 0.3,
                max_tokens: 4096,
            },
            extract: CallSettings {
                temperature: 0.5,
                max_tokens: 256,
            },
            merge: CallSettings {
                temperature: 0.5,
                max_tokens: 512,
            },
            map: CallSettings {
                temperature: 0.3,
                max_tokens: 512,
            },
            root: CallSettings {
                temperature: 0.7,
                max_tokens: 64,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{LeafGrouping, Settings, CONFIG_FILE_NAME};

    #[test]
    fn missing_file_gives_defaults() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(Settings::load(dir.path())?, Settings::default());
        Ok(())
    }

    #[test]
    fn partial_file_overrides_only_given_fields() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"{ "window_minutes": 15, "leaf_grouping": "per_segment", "summarizer": { "attempts": 5 } }"#,
        )?;
        let settings = Settings::load(dir.path())?;
        assert_eq!(settings.window_minutes, 15);
        assert_eq!(settings.leaf_grouping, LeafGrouping::PerSegment);
        assert_eq!(settings.summarizer.attempts, 5);
        assert_eq!(settings.flush_interval_secs, 60);
        assert_eq!(settings.summarizer.model, "llama-3.3-70b-versatile");
        Ok(())
    }

    #[test]
    fn unknown_fields_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), r#"{ "flush_every": 3 }"#)?;
        assert!(Settings::load(dir.path()).is_err());
        Ok(())
    }
}
