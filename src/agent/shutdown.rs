use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Detects signals sent to the process. Cancels `cancelation` on the first interrupt.
///
/// Returns early if `cancelation` gets cancelled by someone else, so the agent can stop without a
/// signal.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down tracker");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
