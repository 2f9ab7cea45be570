use anyhow::Result;

/// The daemon runs capture producers and the flusher side by side, foreground lookups go to the
/// blocking pool.
pub fn multi_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}
