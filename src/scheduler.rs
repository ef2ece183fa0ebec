//! Generic named-job interval runner (SPEC_FULL.md §4.9), hosting the
//! sweeper and any future periodic diagnostics. Grounded on
//! `app/scheduler_manager.py` and the teacher's weak-ref self-cleaning
//! background task pattern — each job is its own cancellable tokio task,
//! not its own OS thread.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct Job {
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Missed-fire policy: skip to the next window, never backlog-execute.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, Job>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub async fn add(&self, id: impl Into<String>, interval: Duration, job: JobFn) {
        let id = id.into();
        let cancel = CancellationToken::new();
        let paused = Arc::new(AtomicBool::new(false));

        let task_cancel = cancel.clone();
        let task_paused = paused.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if !task_paused.load(Ordering::SeqCst) {
                            job().await;
                        }
                    }
                }
            }
        });

        let mut jobs = self.jobs.lock().await;
        if let Some(old) = jobs.insert(id, Job { cancel, paused, handle }) {
            old.cancel.cancel();
            old.handle.abort();
        }
    }

    pub async fn remove(&self, id: &str) {
        if let Some(job) = self.jobs.lock().await.remove(id) {
            job.cancel.cancel();
        }
    }

    pub async fn pause(&self, id: &str) {
        if let Some(job) = self.jobs.lock().await.get(id) {
            job.paused.store(true, Ordering::SeqCst);
        }
    }

    pub async fn resume(&self, id: &str) {
        if let Some(job) = self.jobs.lock().await.get(id) {
            job.paused.store(false, Ordering::SeqCst);
        }
    }

    pub async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        for (_, job) in jobs.drain() {
            job.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn job_fires_on_interval() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        scheduler
            .add(
                "test",
                Duration::from_millis(10),
                Arc::new(move || {
                    let count = count_clone.clone();
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await;
        tokio::time::sleep(Duration::from_millis(55)).await;
        scheduler.shutdown().await;
        assert!(count.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn pause_stops_firing() {
        let scheduler = Scheduler::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        scheduler
            .add(
                "test",
                Duration::from_millis(10),
                Arc::new(move || {
                    let count = count_clone.clone();
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await;
        scheduler.pause("test").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        scheduler.shutdown().await;
    }
}
