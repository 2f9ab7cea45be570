use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Detects signals sent to the process, or internal cancellation when capture stops by itself.
/// Cancels `cancelation` in every case, so the rest of the daemon can wind down.
///
/// On Windows detached processes can't detect signals sent to them, there `stop` kills the
/// process instead.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
        },
        _ = terminate => {
            info!("Received terminate, shutting down");
        },
        _ = cancelation.cancelled() => (),
    };
    cancelation.cancel();
}
