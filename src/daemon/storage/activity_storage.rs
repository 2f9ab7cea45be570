use std::{
    collections::BTreeMap,
    future::Future,
    io::ErrorKind,
    ops::Deref,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::{fs::operations::seek_line_backwards, utils::time::date_to_record_name};

use super::{
    entities::{AppAggregateEntity, RawEventEntity},
    record_event::RawEvent,
};

const RAW_DIR: &str = "raw";
const ACTIVITY_DIR: &str = "activity";

/// Interface for abstracting the durable log. There are 2 append-only relations: the raw log with
/// every captured event and the aggregate log with per app counters. Both are partitioned by UTC
/// day.
pub trait ActivityStorage {
    /// Appends events to the raw log, assigning each of them the next surrogate id.
    fn append_raw(
        &self,
        events: Vec<RawEvent>,
    ) -> impl Future<Output = Result<Vec<RawEventEntity>>> + Send;

    fn append_aggregates(
        &self,
        rows: Vec<AppAggregateEntity>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Retrieves the raw log of a UTC day.
    fn raw_for(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<RawEventEntity>>> + Send;

    /// Retrieves the aggregate log of a UTC day.
    fn aggregates_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<AppAggregateEntity>>> + Send;
}

impl<T: Deref + Sync> ActivityStorage for T
where
    T::Target: ActivityStorage + Sync,
{
    fn append_raw(
        &self,
        events: Vec<RawEvent>,
    ) -> impl Future<Output = Result<Vec<RawEventEntity>>> + Send {
        self.deref().append_raw(events)
    }

    fn append_aggregates(
        &self,
        rows: Vec<AppAggregateEntity>,
    ) -> impl Future<Output = Result<()>> + Send {
        self.deref().append_aggregates(rows)
    }

    fn raw_for(&self, date: NaiveDate) -> impl Future<Output = Result<Vec<RawEventEntity>>> + Send {
        self.deref().raw_for(date)
    }

    fn aggregates_for(
        &self,
        date: NaiveDate,
    ) -> impl Future<Output = Result<Vec<AppAggregateEntity>>> + Send {
        self.deref().aggregates_for(date)
    }
}

/// The main realization of [ActivityStorage]. Every relation is a directory of JSON-lines files,
/// one file per UTC day.
pub struct JsonlActivityStorage {
    raw_dir: PathBuf,
    activity_dir: PathBuf,
    next_id: AtomicU64,
}

impl JsonlActivityStorage {
    /// Opens the log in `dir`. Ids continue from the highest id of the latest raw file.
    pub async fn open(dir: PathBuf) -> Result<Self> {
        let raw_dir = dir.join(RAW_DIR);
        let activity_dir = dir.join(ACTIVITY_DIR);
        std::fs::create_dir_all(&raw_dir)?;
        std::fs::create_dir_all(&activity_dir)?;

        let last_id = match latest_record_file(&raw_dir)? {
            Some(path) => last_id_in(&path).await?,
            None => None,
        };
        debug!("Opened activity storage in {dir:?}, last id {last_id:?}");

        Ok(Self {
            raw_dir,
            activity_dir,
            next_id: AtomicU64::new(last_id.map_or(1, |v| v + 1)),
        })
    }

    fn raw_path(&self, date: NaiveDate) -> PathBuf {
        self.raw_dir.join(date_to_record_name(date))
    }

    fn activity_path(&self, date: NaiveDate) -> PathBuf {
        self.activity_dir.join(date_to_record_name(date))
    }
}

impl ActivityStorage for JsonlActivityStorage {
    async fn append_raw(&self, events: Vec<RawEvent>) -> Result<Vec<RawEventEntity>> {
        if events.is_empty() {
            return Ok(vec![]);
        }
        let first_id = self
            .next_id
            .fetch_add(events.len() as u64, Ordering::SeqCst);

        let entities = events
            .into_iter()
            .zip(first_id..)
            .map(|(event, id)| RawEventEntity::from_event(id, event))
            .collect::<Vec<_>>();

        let mut by_day = BTreeMap::<NaiveDate, Vec<&RawEventEntity>>::new();
        for entity in &entities {
            by_day
                .entry(entity.timestamp.date_naive())
                .or_default()
                .push(entity);
        }
        for (date, rows) in by_day {
            append_lines(&self.raw_path(date), rows).await?;
        }

        Ok(entities)
    }

    async fn append_aggregates(&self, rows: Vec<AppAggregateEntity>) -> Result<()> {
        let mut by_day = BTreeMap::<NaiveDate, Vec<&AppAggregateEntity>>::new();
        for row in &rows {
            by_day.entry(row.timestamp.date_naive()).or_default().push(row);
        }
        for (date, rows) in by_day {
            append_lines(&self.activity_path(date), rows).await?;
        }
        Ok(())
    }

    async fn raw_for(&self, date: NaiveDate) -> Result<Vec<RawEventEntity>> {
        read_lines(&self.raw_path(date)).await
    }

    async fn aggregates_for(&self, date: NaiveDate) -> Result<Vec<AppAggregateEntity>> {
        read_lines(&self.activity_path(date)).await
    }
}

/// Writes all rows in one locked append so concurrent readers never see half of a batch.
async fn append_lines<T: Serialize>(path: &Path, rows: Vec<&T>) -> Result<()> {
    let mut buffer = Vec::<u8>::new();
    for row in rows {
        serde_json::to_writer(&mut buffer, row)?;
        buffer.push(b'\n');
    }

    let mut file = File::options()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await?;

    // Semi-safe acquire-release for a file
    file.lock_exclusive()?;
    let result = async {
        // A write cut off by a crash leaves the file without a trailing new line. Starting a
        // new line keeps that damage to the torn row.
        if !ends_with_new_line(&mut file).await? {
            buffer.insert(0, b'\n');
        }
        file.write_all(&buffer).await?;
        file.flush().await?;
        file.sync_data().await
    }
    .await;
    file.unlock_async().await?;
    result?;
    Ok(())
}

async fn ends_with_new_line(file: &mut File) -> std::result::Result<bool, std::io::Error> {
    if file.metadata().await?.len() == 0 {
        return Ok(true);
    }
    file.seek(std::io::SeekFrom::End(-1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    async fn extract<T: DeserializeOwned>(path: &Path) -> std::result::Result<Vec<T>, std::io::Error> {
        debug!("Extracting {path:?}");
        let file = File::open(path).await?;
        file.lock_shared()?;
        let mut reader = BufReader::new(file);
        let mut line = vec![];
        let mut rows = vec![];
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line).await? == 0 {
                break;
            }
            // A torn write can cut a multibyte character, such rows are skipped like bad json.
            let Ok(v) = std::str::from_utf8(&line) else {
                warn!(
                    "During parsing in path {:?} found a row that is not utf-8: {}",
                    path,
                    String::from_utf8_lossy(&line)
                );
                continue;
            };
            if v.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(v) {
                Ok(v) => rows.push(v),
                Err(e) => {
                    // ignore illegal values. Might happen after shutdowns
                    warn!(
                        "During parsing in path {:?} found illegal json string {}:  {e}",
                        path, &v
                    )
                }
            }
        }

        reader.into_inner().unlock_async().await?;

        Ok(rows)
    }

    match extract(path).await {
        Ok(s) => Ok(s),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
        Err(e) => Err(e)?,
    }
}

/// Finds the file of the most recent day in a record directory.
fn latest_record_file(dir: &Path) -> Result<Option<PathBuf>> {
    let mut latest: Option<(NaiveDate, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(date) = name
            .to_str()
            .and_then(|v| NaiveDate::parse_from_str(v, "%Y-%m-%d").ok())
        else {
            continue;
        };
        if latest.as_ref().map_or(true, |(current, _)| *current < date) {
            latest = Some((date, entry.path()));
        }
    }
    Ok(latest.map(|v| v.1))
}

/// Reads the id of the last row. Falls back to scanning the whole file if the last line was cut
/// off by a crash.
async fn last_id_in(path: &Path) -> Result<Option<u64>> {
    let mut file = File::open(path).await?;
    file.lock_shared()?;
    let result = async {
        file.seek(std::io::SeekFrom::End(0)).await?;
        seek_line_backwards(&mut file, &mut vec![0; 1024]).await?;
        let mut last_line = String::new();
        file.read_to_string(&mut last_line).await?;
        Ok::<_, std::io::Error>(last_line)
    }
    .await;
    file.unlock_async().await?;
    let last_line = result?;

    if last_line.trim().is_empty() {
        return Ok(None);
    }
    match serde_json::from_str::<RawEventEntity>(last_line.trim()) {
        Ok(v) => Ok(Some(v.id)),
        Err(e) => {
            warn!("Last raw record in {path:?} was corrupted {e}");
            let rows = read_lines::<RawEventEntity>(path).await?;
            Ok(rows.iter().map(|v| v.id).max())
        }
    }
}
