use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use buffer::EventBuffer;
use capture::{
    attribution::AppAttribution,
    input::{pump_lines, EndOfInput, KeyPress, PointerClick},
    CaptureCoordinator,
};
use flush::PeriodicFlusher;
use storage::activity_storage::{ActivityStorage, JsonlActivityStorage};
use tokio::{
    io::{AsyncBufRead, BufReader},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    config::Settings,
    utils::clock::{Clock, DefaultClock},
    window_api::{ForegroundResolver, GenericForegroundResolver},
};

pub mod args;
pub mod buffer;
pub mod capture;
pub mod flush;
pub mod shutdown;
pub mod storage;

/// Directory inside the application directory that holds the durable log.
pub const RECORDS_DIR: &str = "records";
const INPUT_FILE: &str = "input";
const FOLLOW_POLL_INTERVAL: Duration = Duration::from_millis(250);

type InputReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, input: Option<PathBuf>) -> Result<()> {
    let settings = Settings::load(&dir)?;
    let storage = JsonlActivityStorage::open(dir.join(RECORDS_DIR)).await?;
    let resolver = GenericForegroundResolver::new()?;
    let (reader, end_of_input) = open_input(&dir, input).await?;

    std::env::set_current_dir("/")?;

    let shutdown_token = CancellationToken::new();
    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        run_pipeline(
            &settings,
            reader,
            end_of_input,
            Box::new(resolver),
            storage,
            DefaultClock,
            shutdown_token,
        ),
    );
    result
}

async fn open_input(dir: &Path, input: Option<PathBuf>) -> Result<(InputReader, EndOfInput)> {
    let path = match input {
        Some(path) if path.as_os_str() == "-" => {
            info!("Reading input events from stdin");
            return Ok((
                Box::new(BufReader::new(tokio::io::stdin())),
                EndOfInput::Stop,
            ));
        }
        Some(path) => std::path::absolute(path)?,
        None => dir.join(INPUT_FILE),
    };

    if !path.exists() {
        tokio::fs::File::create(&path)
            .await
            .with_context(|| format!("Failed to create input file {}", path.display()))?;
    }
    info!("Following input events in {path:?}");
    let file = tokio::fs::File::open(&path)
        .await
        .with_context(|| format!("Failed to open input {}", path.display()))?;
    Ok((
        Box::new(BufReader::new(file)),
        EndOfInput::Follow(FOLLOW_POLL_INTERVAL),
    ))
}

/// Runs input, capture and the flusher until `shutdown` is cancelled or the input ends. The
/// flusher has its own token that is only cancelled after capture stopped, so its final cycle
/// sees every captured event.
async fn run_pipeline(
    settings: &Settings,
    reader: InputReader,
    end_of_input: EndOfInput,
    resolver: Box<dyn ForegroundResolver>,
    storage: impl ActivityStorage,
    clock: impl Clock + Clone,
    shutdown: CancellationToken,
) -> Result<()> {
    let (key_sender, key_receiver) = mpsc::channel::<KeyPress>(settings.channel_capacity.max(1));
    let (click_sender, click_receiver) =
        mpsc::channel::<PointerClick>(settings.channel_capacity.max(1));

    let buffer = Arc::new(EventBuffer::new());
    let attribution = AppAttribution::new(resolver, settings.attribution_debounce());
    let coordinator = CaptureCoordinator::new(buffer.clone(), attribution, shutdown.clone());

    let flush_token = CancellationToken::new();
    let flusher = PeriodicFlusher::new(
        buffer,
        storage,
        Box::new(clock.clone()),
        settings.flush_interval(),
        flush_token.clone(),
    );

    let (input_result, capture_result, flush_result) = tokio::join!(
        pump_lines(
            reader,
            end_of_input,
            key_sender,
            click_sender,
            Box::new(clock),
            shutdown.clone(),
        ),
        async {
            let result = coordinator.run(key_receiver, click_receiver).await;
            flush_token.cancel();
            shutdown.cancel();
            result
        },
        flusher.run(),
    );

    if let Err(e) = &input_result {
        error!("Input module got an error {e:?}");
    }
    if let Err(e) = &capture_result {
        error!("Capture module got an error {e:?}");
    }
    if let Err(e) = &flush_result {
        error!("Flush module got an error {e:?}");
    }
    info!("Daemon stopped");

    input_result.and(capture_result).and(flush_result)
}
