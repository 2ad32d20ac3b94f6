use std::future::Future;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Run a service in a supervised tokio task.
///
/// The service is restarted with a linear backoff when it returns an error
/// or panics; the backoff counter resets once a run survives a minute.
/// A clean exit or cancellation ends supervision.
pub fn spawn_supervised<F, Fut>(name: String, factory: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut retries: u32 = 0;
        loop {
            info!("[supervisor] starting {}", name);
            let started = Instant::now();

            match tokio::spawn(factory()).await {
                Ok(Ok(())) => {
                    info!("[supervisor] {} exited cleanly", name);
                    return;
                }
                Ok(Err(e)) => error!("[supervisor] {} failed: {:#}", name, e),
                Err(e) if e.is_panic() => error!("[supervisor] {} panicked", name),
                Err(_) => {
                    warn!("[supervisor] {} cancelled", name);
                    return;
                }
            }

            retries = if started.elapsed() > Duration::from_secs(60) {
                1
            } else {
                retries + 1
            };
            let backoff = Duration::from_millis(250 * u64::from(retries.min(40)));
            tokio::time::sleep(backoff).await;
        }
    })
}
