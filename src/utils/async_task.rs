use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::error;

use crate::Result;

/// Doubling delay between `base` and `max`, reset after a success.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    base: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub(crate) fn new(
        base: Duration,
        max: Duration,
    ) -> Self {
        Self {
            base,
            max,
            current: None,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.base,
            Some(d) => d.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    pub(crate) fn reset(&mut self) {
        self.current = None;
    }
}

/// Sleeps for `delay` unless shutdown is signalled first.
///
/// Returns `true` when shutdown was signalled.
pub(crate) async fn sleep_or_shutdown(
    delay: Duration,
    shutdown: &mut watch::Receiver<()>,
) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = sleep(delay) => false,
    }
}

// Helper function to spawn tasks and track their JoinHandles
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
    handles: Option<&mut Vec<JoinHandle<()>>>,
) where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    let handle = tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    });

    if let Some(h) = handles {
        h.push(handle);
    }
}
