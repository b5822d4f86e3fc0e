//! The worker pool.
//!
//! A fixed-size pool of worker threads draining a shared FIFO queue of
//! [`Task`]s. Submission is non-blocking; workers sleep on a condition
//! variable until the queue is non-empty or shutdown is requested. Shutdown
//! is cooperative: no new tasks are accepted, the in-flight queue drains,
//! and workers exit. A task receives the pool in `run` so it can enqueue
//! further tasks; a task must never `join` its own pool from within `run`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;

/// A unit of work for the pool.
pub trait Task: Send + Sync {
    /// Runs the task. Further tasks may be enqueued on `pool`.
    fn run(&self, pool: &Arc<WorkerPool>);
}

/// Lifecycle state of the pool, observable for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Starting,
    Ready,
    Processing,
    Draining,
    Shutdown,
}

const STATE_STARTING: u8 = 0;
const STATE_READY: u8 = 1;
const STATE_PROCESSING: u8 = 2;
const STATE_DRAINING: u8 = 3;
const STATE_SHUTDOWN: u8 = 4;

struct PoolInner {
    queue: VecDeque<Arc<dyn Task>>,
    shutdown: bool,
}

/// Fixed-size pool of worker threads over a shared FIFO queue.
pub struct WorkerPool {
    inner: Mutex<PoolInner>,
    work_ready: Condvar,
    state: AtomicU8,
    active: AtomicUsize,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Starts a pool with `threads` workers.
    pub fn start(threads: usize) -> Arc<WorkerPool> {
        let pool = Arc::new(WorkerPool {
            inner: Mutex::new(PoolInner {
                queue: VecDeque::new(),
                shutdown: false,
            }),
            work_ready: Condvar::new(),
            state: AtomicU8::new(STATE_STARTING),
            active: AtomicUsize::new(0),
            workers: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_pool = Arc::clone(&pool);
            let handle = std::thread::Builder::new()
                .name(format!("reqgraph-worker-{index}"))
                .spawn(move || worker_loop(worker_pool))
                .unwrap_or_else(|e| {
                    // Thread spawn failing at startup leaves the pool
                    // smaller; the queue still drains through the rest.
                    tracing::error!("failed to spawn pool worker: {e}");
                    std::thread::spawn(|| {})
                });
            handles.push(handle);
        }
        *lock(&pool.workers) = handles;
        pool.state.store(STATE_READY, Ordering::SeqCst);
        pool
    }

    /// Enqueues a task. Non-blocking. Tasks submitted after `shutdown` are
    /// dropped.
    pub fn enqueue(self: &Arc<Self>, task: Arc<dyn Task>) {
        {
            let mut inner = lock(&self.inner);
            if inner.shutdown {
                tracing::warn!("task enqueued after shutdown was dropped");
                return;
            }
            inner.queue.push_back(task);
        }
        self.work_ready.notify_one();
    }

    /// Returns true if the queue currently holds work.
    pub fn has_work(&self) -> bool {
        !lock(&self.inner).queue.is_empty()
    }

    /// Requests shutdown: no new tasks are accepted, workers drain the
    /// queue once more and exit. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = lock(&self.inner);
            if inner.shutdown {
                return;
            }
            inner.shutdown = true;
        }
        self.state.store(STATE_DRAINING, Ordering::SeqCst);
        self.work_ready.notify_all();
    }

    /// Blocks until all workers exit. Must not be called from a task
    /// running on this pool.
    pub fn join(&self) {
        let handles = std::mem::take(&mut *lock(&self.workers));
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("pool worker panicked");
            }
        }
        self.state.store(STATE_SHUTDOWN, Ordering::SeqCst);
    }

    /// Current pool state.
    pub fn state(&self) -> PoolState {
        match self.state.load(Ordering::SeqCst) {
            STATE_STARTING => PoolState::Starting,
            STATE_READY => PoolState::Ready,
            STATE_PROCESSING => PoolState::Processing,
            STATE_DRAINING => PoolState::Draining,
            _ => PoolState::Shutdown,
        }
    }

    fn next_task(&self) -> Option<Arc<dyn Task>> {
        lock(&self.inner).queue.pop_front()
    }

    fn is_shutdown(&self) -> bool {
        lock(&self.inner).shutdown
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn drain(pool: &Arc<WorkerPool>) {
    while let Some(task) = pool.next_task() {
        if pool.state.load(Ordering::SeqCst) == STATE_READY {
            pool.state.store(STATE_PROCESSING, Ordering::SeqCst);
        }
        pool.active.fetch_add(1, Ordering::SeqCst);
        task.run(pool);
        pool.active.fetch_sub(1, Ordering::SeqCst);
    }
    if pool.state.load(Ordering::SeqCst) == STATE_PROCESSING
        && pool.active.load(Ordering::SeqCst) == 0
    {
        pool.state.store(STATE_READY, Ordering::SeqCst);
    }
}

fn worker_loop(pool: Arc<WorkerPool>) {
    loop {
        drain(&pool);
        let inner = lock(&pool.inner);
        if inner.shutdown {
            break;
        }
        // The predicate guards against spurious wakeups.
        let _inner = pool
            .work_ready
            .wait_while(inner, |i| !i.shutdown && i.queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
    }
    // Drain once more after shutdown so in-flight work completes.
    drain(&pool);
    debug_assert!(pool.is_shutdown());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountTask {
        counter: Arc<AtomicUsize>,
    }

    impl Task for CountTask {
        fn run(&self, _pool: &Arc<WorkerPool>) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct SpawnTask {
        counter: Arc<AtomicUsize>,
        remaining: usize,
    }

    impl Task for SpawnTask {
        fn run(&self, pool: &Arc<WorkerPool>) {
            self.counter.fetch_add(1, Ordering::SeqCst);
            if self.remaining > 0 {
                pool.enqueue(Arc::new(SpawnTask {
                    counter: Arc::clone(&self.counter),
                    remaining: self.remaining - 1,
                }));
            }
        }
    }

    #[test]
    fn runs_all_enqueued_tasks() {
        let pool = WorkerPool::start(4);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..64 {
            pool.enqueue(Arc::new(CountTask {
                counter: Arc::clone(&counter),
            }));
        }
        pool.shutdown();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 64);
        assert_eq!(pool.state(), PoolState::Shutdown);
    }

    #[test]
    fn tasks_can_enqueue_further_tasks() {
        let pool = WorkerPool::start(2);
        let counter = Arc::new(AtomicUsize::new(0));
        pool.enqueue(Arc::new(SpawnTask {
            counter: Arc::clone(&counter),
            remaining: 9,
        }));
        // Give the chain a moment to unfold before draining.
        while counter.load(Ordering::SeqCst) < 10 {
            std::thread::sleep(Duration::from_millis(5));
        }
        pool.shutdown();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn shutdown_is_idempotent_and_drains() {
        let pool = WorkerPool::start(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            pool.enqueue(Arc::new(CountTask {
                counter: Arc::clone(&counter),
            }));
        }
        pool.shutdown();
        pool.shutdown();
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }

    #[test]
    fn enqueue_after_shutdown_is_dropped() {
        let pool = WorkerPool::start(1);
        pool.shutdown();
        let counter = Arc::new(AtomicUsize::new(0));
        pool.enqueue(Arc::new(CountTask {
            counter: Arc::clone(&counter),
        }));
        pool.join();
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
