//! Single-consumer worker queue.
//!
//! The transport needs the same shape in three places — the dismiss queue,
//! the consumer receive queue, and the producer-receiver queue — so it is
//! implemented once and parameterized over the task type. A dedicated
//! worker thread drains a FIFO guarded by a lock and condition variable;
//! the handler runs with the lock released, so enqueueing never waits on
//! in-flight work.
//!
//! Shutdown ordering matters: [`TaskQueue::stop`] clears pending tasks and
//! flips the stop flag under the lock, wakes the worker, and joins it
//! before returning, so the worker can never touch the queue's
//! synchronization primitives after they are gone.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

struct State<T> {
    queue: VecDeque<T>,
    stopping: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    changed: Condvar,
}

/// Cloneable enqueue-only handle, safe to hand to bus callbacks.
pub struct QueueHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> QueueHandle<T> {
    /// Push one task and wake the worker. Returns `false` (dropping the
    /// task) once the queue is stopping.
    pub fn enqueue(&self, task: T) -> bool {
        let mut state = self.shared.state.lock();
        if state.stopping {
            debug!("queue is stopping, task dropped");
            return false;
        }
        state.queue.push_back(task);
        self.shared.changed.notify_one();
        true
    }
}

/// A FIFO drained by one dedicated worker thread.
pub struct TaskQueue<T> {
    shared: Arc<Shared<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Spawn the worker thread and start accepting tasks.
    pub fn start<F>(name: &str, mut handler: F) -> Self
    where
        F: FnMut(T) + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                stopping: false,
            }),
            changed: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                let mut state = worker_shared.state.lock();
                loop {
                    while let Some(task) = state.queue.pop_front() {
                        // Handler work may block (session joins, method
                        // calls); release the lock around it.
                        drop(state);
                        handler(task);
                        state = worker_shared.state.lock();
                    }
                    // The stop flag may have flipped while the handler ran
                    // unlocked; re-check before waiting.
                    if state.stopping {
                        break;
                    }
                    worker_shared.changed.wait(&mut state);
                }
            })
            .expect("failed to spawn task queue worker");

        Self {
            shared,
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> QueueHandle<T> {
        QueueHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn enqueue(&self, task: T) -> bool {
        self.handle().enqueue(task)
    }

    /// Discard pending tasks, wake the worker, and join it. Idempotent.
    pub fn stop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            let dropped = state.queue.len();
            state.queue.clear();
            state.stopping = true;
            if dropped > 0 {
                warn!(dropped, "queue stopped with tasks still pending");
            }
            self.shared.changed.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl<T> Drop for TaskQueue<T> {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.queue.clear();
            state.stopping = true;
            self.shared.changed.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, predicate: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if predicate() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        predicate()
    }

    #[test]
    fn tasks_are_processed_in_fifo_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let queue = TaskQueue::start("test-fifo", move |n: u32| {
            seen2.lock().push(n);
        });

        for n in 0..100 {
            assert!(queue.enqueue(n));
        }
        assert!(wait_until(Duration::from_secs(5), || seen.lock().len() == 100));
        assert_eq!(&*seen.lock(), &(0..100).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_enqueues_all_complete() {
        let processed = Arc::new(AtomicUsize::new(0));
        let processed2 = processed.clone();
        let queue = Arc::new(TaskQueue::start("test-concurrent", move |_task: usize| {
            processed2.fetch_add(1, Ordering::SeqCst);
        }));

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let handle = queue.handle();
                thread::spawn(move || {
                    for n in 0..50 {
                        assert!(handle.enqueue(t * 50 + n));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert!(wait_until(Duration::from_secs(5), || {
            processed.load(Ordering::SeqCst) == 400
        }));
    }

    #[test]
    fn stop_discards_pending_and_joins() {
        let gate = Arc::new((Mutex::new(false), Condvar::new()));
        let gate2 = gate.clone();
        let processed = Arc::new(AtomicUsize::new(0));
        let processed2 = processed.clone();

        let mut queue = TaskQueue::start("test-stop", move |_task: u32| {
            processed2.fetch_add(1, Ordering::SeqCst);
            // Hold the first task until stop() has queued more behind it.
            let (lock, cv) = &*gate2;
            let mut open = lock.lock();
            while !*open {
                cv.wait(&mut open);
            }
        });

        queue.enqueue(1);
        assert!(wait_until(Duration::from_secs(5), || {
            processed.load(Ordering::SeqCst) == 1
        }));
        queue.enqueue(2);
        queue.enqueue(3);

        let stopper = thread::spawn(move || {
            queue.stop();
            queue
        });
        // Let stop() clear the backlog, then release the stuck handler.
        thread::sleep(Duration::from_millis(50));
        {
            let (lock, cv) = &*gate;
            *lock.lock() = true;
            cv.notify_all();
        }
        let queue = stopper.join().unwrap();

        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert!(!queue.enqueue(4));
    }
}
