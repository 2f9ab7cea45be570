//! Line protocol between the host's input hooks and the daemon. Each line is one event:
//!
//! ```text
//! key a
//! key shift
//! key space
//! click
//! click left
//! ```
//!
//! Lines are stamped on arrival and split into the key and pointer channels.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{keys::canonical_key_name, utils::clock::Clock};

/// Key-down reported by the keyboard hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Arc<str>,
    pub at: DateTime<Utc>,
}

/// Button press reported by the pointer hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerClick {
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Key(String),
    Click,
}

pub fn parse_input_line(line: &str) -> Option<InputLine> {
    let line = line.trim_end_matches(['\n', '\r']);
    if let Some(key) = line.strip_prefix("key ") {
        return canonical_key_name(key).map(InputLine::Key);
    }
    match line.split_whitespace().next() {
        Some("click") => Some(InputLine::Click),
        _ => None,
    }
}

/// How to react when the input reaches its end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfInput {
    /// Stop capture. Used for stdin.
    Stop,
    /// Wait for more lines, like `tail -f`. Used for files and FIFOs that hooks append to.
    Follow(Duration),
}

/// Feeds the producers' channels from a line source. Returns when the input ends, a producer
/// hangs up, or shutdown is requested. Dropping the senders on return stops the producers.
///
/// In follow mode a line is only handled once its newline arrived, so a hook that flushed half a
/// line is waited for. Lines that are not utf-8 are skipped.
pub async fn pump_lines(
    mut reader: impl AsyncBufRead + Unpin,
    end_of_input: EndOfInput,
    keys: mpsc::Sender<KeyPress>,
    clicks: mpsc::Sender<PointerClick>,
    clock: Box<dyn Clock>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut pending = vec![];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            read = reader.read_until(b'\n', &mut pending) => read?,
        };

        if pending.last() != Some(&b'\n') {
            match end_of_input {
                EndOfInput::Stop if pending.is_empty() => {
                    info!("Input ended, stopping capture");
                    return Ok(());
                }
                // Last line of the input without a newline.
                EndOfInput::Stop => {}
                EndOfInput::Follow(poll) => {
                    tokio::select! {
                        _ = shutdown.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(poll) => continue,
                    }
                }
            }
        }

        let sent = match std::str::from_utf8(&pending) {
            Ok(line) => dispatch_line(line, &keys, &clicks, clock.as_ref()).await,
            Err(e) => {
                warn!(
                    "Skipping input line that is not utf-8 {:?}: {e}",
                    String::from_utf8_lossy(&pending)
                );
                true
            }
        };
        pending.clear();
        if !sent {
            debug!("Producers are gone, stopping input");
            return Ok(());
        }
    }
}

/// Returns false once the receiving producer is gone.
async fn dispatch_line(
    line: &str,
    keys: &mpsc::Sender<KeyPress>,
    clicks: &mpsc::Sender<PointerClick>,
    clock: &dyn Clock,
) -> bool {
    let at = clock.time();
    match parse_input_line(line) {
        Some(InputLine::Key(key)) => keys
            .send(KeyPress {
                key: key.into(),
                at,
            })
            .await
            .is_ok(),
        Some(InputLine::Click) => clicks.send(PointerClick { at }).await.is_ok(),
        None => {
            if !line.trim().is_empty() {
                warn!("Skipping malformed input line {:?}", line);
            }
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, time::Duration};

    use anyhow::Result;
    use tempfile::NamedTempFile;
    use tokio::{io::BufReader, sync::mpsc};
    use tokio_util::sync::CancellationToken;

    use crate::utils::clock::DefaultClock;

    use super::{parse_input_line, pump_lines, EndOfInput, InputLine, KeyPress};

    async fn collect_keys(mut receiver: mpsc::Receiver<KeyPress>) -> Vec<String> {
        let mut keys = vec![];
        while let Some(key) = receiver.recv().await {
            keys.push(key.key.to_string());
        }
        keys
    }

    #[test]
    fn lines_are_parsed_into_events() {
        assert_eq!(parse_input_line("key a\n"), Some(InputLine::Key("a".into())));
        assert_eq!(parse_input_line("key  "), Some(InputLine::Key("space".into())));
        assert_eq!(
            parse_input_line("key Key.backspace\r\n"),
            Some(InputLine::Key("backspace".into()))
        );
        assert_eq!(parse_input_line("click left"), Some(InputLine::Click));
        assert_eq!(parse_input_line("click"), Some(InputLine::Click));
        assert_eq!(parse_input_line("key A "), Some(InputLine::Key("A".into())));
        assert_eq!(parse_input_line("key "), None);
        assert_eq!(parse_input_line("scroll 3"), None);
    }

    #[tokio::test]
    async fn pump_splits_keys_and_clicks() -> Result<()> {
        let input = "key h\nkey i\nclick\nnonsense\nkey enter\n";
        let (key_tx, mut key_rx) = mpsc::channel(16);
        let (click_tx, mut click_rx) = mpsc::channel(16);

        pump_lines(
            input.as_bytes(),
            EndOfInput::Stop,
            key_tx,
            click_tx,
            Box::new(DefaultClock),
            CancellationToken::new(),
        )
        .await?;

        let mut keys = vec![];
        while let Some(key) = key_rx.recv().await {
            keys.push(key.key.to_string());
        }
        assert_eq!(keys, ["h", "i", "enter"]);
        assert!(click_rx.recv().await.is_some());
        assert!(click_rx.recv().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn follow_mode_stops_on_shutdown() -> Result<()> {
        let (key_tx, _key_rx) = mpsc::channel(16);
        let (click_tx, _click_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        let (result, _) = tokio::join!(
            pump_lines(
                "key a\n".as_bytes(),
                EndOfInput::Follow(Duration::from_millis(10)),
                key_tx,
                click_tx,
                Box::new(DefaultClock),
                shutdown,
            ),
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                stop.cancel();
            }
        );
        result
    }

    #[tokio::test]
    async fn lines_that_are_not_utf8_are_skipped() -> Result<()> {
        let (key_tx, key_rx) = mpsc::channel(16);
        let (click_tx, _click_rx) = mpsc::channel(16);

        pump_lines(
            &b"key a\nkey \xff\nkey b\n"[..],
            EndOfInput::Stop,
            key_tx,
            click_tx,
            Box::new(DefaultClock),
            CancellationToken::new(),
        )
        .await?;

        assert_eq!(collect_keys(key_rx).await, ["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn last_line_without_newline_is_read_on_stop() -> Result<()> {
        let (key_tx, key_rx) = mpsc::channel(16);
        let (click_tx, _click_rx) = mpsc::channel(16);

        pump_lines(
            "key a\nkey b".as_bytes(),
            EndOfInput::Stop,
            key_tx,
            click_tx,
            Box::new(DefaultClock),
            CancellationToken::new(),
        )
        .await?;

        assert_eq!(collect_keys(key_rx).await, ["a", "b"]);
        Ok(())
    }

    #[tokio::test]
    async fn follow_mode_waits_for_the_rest_of_a_line() -> Result<()> {
        let mut input = NamedTempFile::new()?;
        input.write_all(b"key a\nkey sh")?;
        input.flush()?;
        let reader = BufReader::new(tokio::fs::File::open(input.path()).await?);

        let (key_tx, key_rx) = mpsc::channel(16);
        let (click_tx, _click_rx) = mpsc::channel(16);
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        let (result, appended) = tokio::join!(
            pump_lines(
                reader,
                EndOfInput::Follow(Duration::from_millis(10)),
                key_tx,
                click_tx,
                Box::new(DefaultClock),
                shutdown,
            ),
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                input.write_all(b"ift\nkey b\n")?;
                input.flush()?;
                tokio::time::sleep(Duration::from_millis(100)).await;
                stop.cancel();
                anyhow::Ok(input)
            }
        );
        result?;
        appended?;

        assert_eq!(collect_keys(key_rx).await, ["a", "shift", "b"]);
        Ok(())
    }
}
