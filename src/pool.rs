//! # Worker Pool Module
//!
//! Esecutore a concorrenza limitata per le fasi hash, delete e convert.
//!
//! ## Responsabilità:
//! - Coda di job limitata (`tokio::sync::mpsc`) consumata da N worker task
//! - Canale dei risultati verso un singolo controller
//! - Il controller possiede il contatore di progresso e chiama l'observer
//! - Errori e panic vengono catturati al confine del singolo item
//! - Cancellazione: i worker vengono abortiti, i processi figli uccisi al drop
//!
//! ## Garanzie:
//! - Nessun ordine garantito sui risultati
//! - Il contatore di progresso è strettamente monotono
//! - Il fallimento di un item non interrompe gli altri
//!
//! ## Esempio:
//! ```rust,ignore
//! let pool = WorkerPool::new(config.workers);
//! let report = pool.run(tracks, |t| async move { hash(t).await }, &progress, &shutdown).await;
//! for failure in &report.failures {
//!     reporter.error(format!("{:#}", failure.error));
//! }
//! ```

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receives progress updates; invoked from the pool controller
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, completed: usize, total: usize);
}

impl<F> ProgressObserver for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn on_progress(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Observer that ignores every update
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// One item that failed, identified by its position in the input list
#[derive(Debug)]
pub struct ItemFailure {
    pub index: usize,
    pub error: anyhow::Error,
}

/// Outcome of a pool run
#[derive(Debug)]
pub struct PoolReport<R> {
    pub total: usize,
    pub completed: usize,
    pub results: Vec<R>,
    pub failures: Vec<ItemFailure>,
    pub cancelled: bool,
}

impl<R> PoolReport<R> {
    fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            results: Vec::with_capacity(total),
            failures: Vec::new(),
            cancelled: false,
        }
    }
}

/// Available CPU parallelism, 1 when unknown
pub fn available_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Default worker count: CPUs + 1
pub fn default_workers() -> usize {
    available_parallelism() + 1
}

/// Upper bound on the worker count
pub fn sensible_cap() -> usize {
    available_parallelism() * 4
}

/// Bounded-concurrency executor
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    /// Runs `min(requested, sensible_cap())` workers, at least one
    pub fn new(requested: usize) -> Self {
        Self {
            workers: requested.clamp(1, sensible_cap().max(1)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Apply `op` to every item and collect results and failures
    pub async fn run<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        op: F,
        observer: &dyn ProgressObserver,
        shutdown: &CancellationToken,
    ) -> PoolReport<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let total = items.len();
        let mut report = PoolReport::new(total);
        if total == 0 {
            return report;
        }

        let workers = self.workers.min(total);
        let (job_tx, job_rx) = mpsc::channel::<(usize, T)>(workers * 2);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, anyhow::Result<R>)>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        let op = Arc::new(op);
        let mut tasks = JoinSet::new();

        // feeder
        tasks.spawn(async move {
            for job in items.into_iter().enumerate() {
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
        });

        for worker in 0..workers {
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            let op = Arc::clone(&op);
            tasks.spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some((index, item)) = next else { break };

                    let outcome = AssertUnwindSafe(async { (*op)(item).await })
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| {
                            Err(anyhow::anyhow!("worker panicked: {}", panic_message(&panic)))
                        });

                    if results.send((index, outcome)).is_err() {
                        break;
                    }
                }
                debug!("Worker {} drained the queue", worker);
            });
        }
        drop(result_tx);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                next = result_rx.recv() => {
                    let Some((index, outcome)) = next else { break };
                    match outcome {
                        Ok(value) => report.results.push(value),
                        Err(error) => report.failures.push(ItemFailure { index, error }),
                    }
                    report.completed += 1;
                    observer.on_progress(report.completed, total);
                }
            }
        }

        if report.cancelled {
            debug!(
                "Pool cancelled after {}/{} items, abandoning in-flight work",
                report.completed, total
            );
        }
        tasks.shutdown().await;
        report
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
