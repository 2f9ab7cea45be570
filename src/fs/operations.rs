use std::path::Path;

use anyhow::{anyhow, Result};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt};

/// Moves backwards in a file to beginning of a previous line.
/// Used to read the last row of an append-only record file without reading all of it.
pub async fn seek_line_backwards(
    file: &mut (impl AsyncSeek + AsyncRead + Unpin),
    buffer: &mut [u8],
) -> Result<(), io::Error> {
    // We skip first new line that is right before the buffer, so that reading doesn't get stuck.
    // For example: need_to_read_this\nwe_are_here_now\n
    let mut need_to_skip = 1usize;
    loop {
        let leftover = file.stream_position().await?;
        if leftover == 0 {
            return Ok(());
        }
        let next_chunk = u64::min(leftover, buffer.len() as u64) as usize;
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;

        file.read_exact(&mut buffer[..next_chunk]).await?;
        let iter = buffer[..next_chunk].iter().rev().enumerate();
        let iter = iter.skip(need_to_skip);
        for (index, value) in iter {
            if *value == b'\n' {
                file.seek(std::io::SeekFrom::Current(-(index as i64)))
                    .await?;
                return Ok(());
            }
        }

        need_to_skip = need_to_skip.saturating_sub(1);
        file.seek(std::io::SeekFrom::Current(-(next_chunk as i64)))
            .await?;
    }
}

/// Replaces `path` with `content` so that readers see either the old file or the complete new
/// one. The content goes to a sibling temporary file which is then renamed over the target.
pub async fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("{path:?} has no parent directory"))?;
    tokio::fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("{path:?} has no file name"))?;
    let mut temporary_name = file_name.to_os_string();
    temporary_name.push(".partial");
    let temporary = parent.join(temporary_name);

    let mut file = tokio::fs::File::create(&temporary).await?;
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temporary, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;

    use tempfile::{tempdir, tempfile};
    use tokio::io::{AsyncReadExt, AsyncSeekExt};

    use crate::fs::operations::{seek_line_backwards, write_atomically};

    const RECORDS: &str = "{\"id\":1}\n\
                           {\"id\":2}\n\
                           {\"id\":3}\n";

    async fn last_line(file: &mut tokio::fs::File, buffer_size: usize) -> Result<String> {
        file.seek(std::io::SeekFrom::End(0)).await?;
        seek_line_backwards(file, vec![0; buffer_size].as_mut_slice()).await?;
        let mut line = String::new();
        file.read_to_string(&mut line).await?;
        Ok(line)
    }

    #[tokio::test]
    async fn test_last_record_is_found() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(RECORDS.as_bytes())?;
        let mut file = tokio::fs::File::from_std(file);

        assert_eq!(last_line(&mut file, 1024).await?, "{\"id\":3}\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_last_record_with_small_buffer() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(RECORDS.as_bytes())?;
        let mut file = tokio::fs::File::from_std(file);

        assert_eq!(last_line(&mut file, 2).await?, "{\"id\":3}\n");
        Ok(())
    }

    #[tokio::test]
    async fn test_torn_last_record_is_returned_as_is() -> Result<()> {
        let mut file = tempfile()?;
        file.write_all(RECORDS.as_bytes())?;
        file.write_all(b"{\"id\":")?;
        let mut file = tokio::fs::File::from_std(file);

        assert_eq!(last_line(&mut file, 1024).await?, "{\"id\":");
        Ok(())
    }

    #[tokio::test]
    async fn test_seek_line_backwards_empty() -> Result<()> {
        let file = tempfile()?;
        let mut file = tokio::fs::File::from_std(file);

        assert_eq!(last_line(&mut file, 1024).await?, "");
        assert_eq!(file.stream_position().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_content() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("artifact.json");

        write_atomically(&path, b"first").await?;
        write_atomically(&path, b"second").await?;

        assert_eq!(tokio::fs::read_to_string(&path).await?, "second");
        assert_eq!(std::fs::read_dir(path.parent().unwrap())?.count(), 1);
        Ok(())
    }
}
