//! Background task supervision
//!
//! An uncaught fault in any background task must not terminate the process,
//! so every long-running loop is spawned through this wrapper: a panicked
//! task is logged and restarted after a short delay. A task that returns
//! normally (its channel closed during shutdown) is left alone.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

const RESTART_DELAY: Duration = Duration::from_secs(1);

pub fn spawn_supervised<F, Fut>(name: &'static str, mut factory: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match tokio::spawn(factory()).await {
                Ok(()) => break,
                Err(e) => {
                    error!("{} task failed: {}; restarting", name, e);
                    tokio::time::sleep(RESTART_DELAY).await;
                }
            }
        }
    })
}
