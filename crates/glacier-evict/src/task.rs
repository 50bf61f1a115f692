use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

/// A periodic blocking job running on the tokio runtime.
///
/// Each iteration runs on the blocking pool. Stopping waits for the
/// iteration in flight, if any, to finish.
pub struct BackgroundTask {
    name: &'static str,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Must be called from within a tokio runtime.
    pub fn spawn<F>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let job = Arc::new(job);
        let handle = tokio::spawn(async move {
            info!(task = name, period = ?period, "background task started");
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        let job = Arc::clone(&job);
                        if let Err(e) = tokio::task::spawn_blocking(move || (*job)()).await {
                            error!(task = name, error = %e, "background iteration failed");
                        }
                    }
                }
            }
            info!(task = name, "background task stopped");
        });
        Self {
            name,
            shutdown,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!(task = self.name, error = %e, "background task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let task = BackgroundTask::spawn("counter", Duration::from_millis(5), move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(task.name(), "counter");
        tokio::time::sleep(Duration::from_millis(60)).await;
        task.stop().await;

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 2, "ran {after_stop} times");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test]
    async fn dropping_the_handle_ends_the_loop() {
        let task = BackgroundTask::spawn("noop", Duration::from_millis(5), || {});
        let BackgroundTask { shutdown, handle, .. } = task;
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
