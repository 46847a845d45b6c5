//! Fixed-size worker pool with a bounded task queue and per-task fault
//! isolation.
//!
//! Tasks are opaque futures handed over through a bounded channel; nothing
//! else crosses the scheduler/pool boundary. A panic inside one task is
//! caught at the pool boundary and must never take down the worker or stall
//! sibling tasks. `stop` waits for tasks already being executed; tasks still
//! sitting in the queue are dropped, not drained.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// A unit of work: one rule evaluation plus its rescheduling tail.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub const DEFAULT_WORKERS: usize = 10;

/// Bound on tasks waiting for a free worker.
pub const QUEUE_CAPACITY: usize = 100;

/// Fixed-size pool of workers consuming a bounded task queue.
pub struct WorkerPool {
    num_workers: usize,
    tx: mpsc::Sender<Task>,
    rx: Mutex<Option<mpsc::Receiver<Task>>>,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(num_workers: usize) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            num_workers,
            tx,
            rx: Mutex::new(Some(rx)),
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the workers. Calling `start` on an already started pool is a
    /// no-op.
    pub fn start(&self) {
        let Some(rx) = self.rx.lock().expect("pool lock poisoned").take() else {
            debug!("worker pool already started");
            return;
        };

        let rx = Arc::new(AsyncMutex::new(rx));
        let mut workers = self.workers.lock().expect("pool lock poisoned");
        for worker_id in 0..self.num_workers {
            let rx = rx.clone();
            let shutdown_rx = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(worker_loop(worker_id, rx, shutdown_rx)));
        }
        debug!(workers = self.num_workers, "worker pool started");
    }

    /// Enqueue a task without blocking. Returns `false` when the task was
    /// discarded: the pool is stopping, or the queue is full.
    pub fn submit(&self, task: Task) -> bool {
        if *self.shutdown_tx.borrow() {
            debug!("worker pool stopping; task discarded");
            return false;
        }

        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(capacity = QUEUE_CAPACITY, "worker pool queue full; task discarded");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Signal termination and wait for the currently executing tasks to
    /// return. Queued-but-undispatched tasks are dropped.
    pub async fn stop(&self) {
        let _ = self.shutdown_tx.send(true);

        let workers = {
            let mut guard = self.workers.lock().expect("pool lock poisoned");
            std::mem::take(&mut *guard)
        };
        for handle in workers {
            let _ = handle.await;
        }
        debug!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    rx: Arc<AsyncMutex<mpsc::Receiver<Task>>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let task = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => None,
                task = rx.recv() => task,
            }
        };

        match task {
            Some(task) => run_isolated(worker_id, task).await,
            None => break,
        }
    }
}

/// Execute one task, containing any panic at this boundary so the worker
/// keeps serving subsequent tasks.
async fn run_isolated(worker_id: usize, task: Task) {
    if let Err(err) = tokio::spawn(task).await {
        if err.is_panic() {
            error!(worker_id, error = %err, "task panicked; worker continues");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn wait_for(done: &AtomicUsize, expected: usize) {
        for _ in 0..200 {
            if done.load(Ordering::SeqCst) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {expected} completed tasks, saw {}",
            done.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let pool = WorkerPool::new(3);
        pool.start();

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..9 {
            let (active, peak, done) = (active.clone(), peak.clone(), done.clone());
            let submitted = pool.submit(Box::pin(async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            }));
            assert!(submitted);
        }

        wait_for(&done, 9).await;
        assert!(peak.load(Ordering::SeqCst) <= 3);
        pool.stop().await;
    }

    #[tokio::test]
    async fn submit_after_stop_discards_the_task() {
        let pool = WorkerPool::new(2);
        pool.start();
        pool.stop().await;

        let ran = Arc::new(AtomicUsize::new(0));
        let ran_clone = ran.clone();
        let submitted = pool.submit(Box::pin(async move {
            ran_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(!submitted);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_kill_the_worker() {
        let pool = WorkerPool::new(1);
        pool.start();

        assert!(pool.submit(Box::pin(async {
            panic!("malformed rule");
        })));

        let done = Arc::new(AtomicUsize::new(0));
        let done_clone = done.clone();
        assert!(pool.submit(Box::pin(async move {
            done_clone.fetch_add(1, Ordering::SeqCst);
        })));

        wait_for(&done, 1).await;
        pool.stop().await;
    }

    #[tokio::test]
    async fn stop_waits_for_in_flight_tasks() {
        let pool = WorkerPool::new(1);
        pool.start();

        let done = Arc::new(AtomicUsize::new(0));
        let done_clone = done.clone();
        assert!(pool.submit(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            done_clone.fetch_add(1, Ordering::SeqCst);
        })));

        // Let the worker pick the task up before stopping.
        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.stop().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn queued_tasks_are_dropped_on_stop() {
        let pool = WorkerPool::new(1);
        pool.start();

        let first_done = Arc::new(AtomicUsize::new(0));
        let first_clone = first_done.clone();
        assert!(pool.submit(Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            first_clone.fetch_add(1, Ordering::SeqCst);
        })));

        let queued_ran = Arc::new(AtomicUsize::new(0));
        let queued_clone = queued_ran.clone();
        assert!(pool.submit(Box::pin(async move {
            queued_clone.fetch_add(1, Ordering::SeqCst);
        })));

        tokio::time::sleep(Duration::from_millis(20)).await;
        pool.stop().await;

        assert_eq!(first_done.load(Ordering::SeqCst), 1);
        assert_eq!(queued_ran.load(Ordering::SeqCst), 0);
    }
}
