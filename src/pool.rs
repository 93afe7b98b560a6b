//! Implementation of the thread pool itself.

use std::{
    collections::VecDeque,
    fmt, io,
    sync::{atomic::Ordering, Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
};

use once_cell::sync::Lazy;

use crate::{error::PoolStoppedError, task::Task, worker::Worker};

#[cfg(target_has_atomic = "64")]
pub(crate) type AtomicCounter = std::sync::atomic::AtomicU64;

#[cfg(not(target_has_atomic = "64"))]
pub(crate) type AtomicCounter = std::sync::atomic::AtomicU32;

static CORE_COUNT: Lazy<usize> = Lazy::new(|| num_cpus::get().max(1));

fn detected_core_count() -> usize {
    *CORE_COUNT
}

/// A builder for constructing a customized [`ThreadPool`].
///
/// # Examples
///
/// ```
/// let custom_pool = threadcap::ThreadPool::builder()
///     .name("my-pool")
///     .size(2)
///     .build();
/// # custom_pool.shutdown();
/// ```
#[derive(Debug)]
pub struct Builder {
    name: Option<String>,
    size: Option<usize>,
    stack_size: Option<usize>,
    core_count: fn() -> usize,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            name: None,
            size: None,
            stack_size: None,
            core_count: detected_core_count,
        }
    }
}

impl Builder {
    /// Set a custom thread name for threads spawned by this thread pool.
    ///
    /// # Panics
    ///
    /// Panics if the name contains null bytes (`\0`).
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::builder().name("my-pool").build();
    /// # pool.shutdown();
    /// ```
    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        let name = name.into();

        if name.as_bytes().contains(&0) {
            panic!("thread pool name must not contain null bytes");
        }

        self.name = Some(name);
        self
    }

    /// Set the number of threads to be managed by this thread pool.
    ///
    /// The pool always has a fixed number of threads, all spawned up front
    /// when the pool is created and kept alive until the pool is shut down.
    /// A size of `0` (or not setting a size at all) means one thread per
    /// available CPU core.
    ///
    /// # Examples
    ///
    /// ```
    /// // Create a thread pool with exactly 2 threads.
    /// let pool = threadcap::ThreadPool::builder().size(2).build();
    /// assert_eq!(pool.threads(), 2);
    /// # pool.shutdown();
    /// ```
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the size of the stack (in bytes) for threads in this thread pool.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// enforces a larger minimum stack size.
    ///
    /// The stack size if not specified will be the default size for new Rust
    /// threads, currently 2 MiB. This can also be overridden by setting the
    /// `RUST_MIN_STACK` environment variable if not specified in code.
    ///
    /// # Examples
    ///
    /// ```
    /// // Worker threads will have a stack size of at least 32 KiB.
    /// let pool = threadcap::ThreadPool::builder().stack_size(32 * 1024).build();
    /// # pool.shutdown();
    /// ```
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    /// Override how the pool determines the number of available CPU cores.
    ///
    /// The core count is consulted only when no explicit non-zero
    /// [`size`](Builder::size) is set. The default queries the operating
    /// system once and caches the result. Overriding it makes pool sizing
    /// deterministic, which is mainly useful in tests.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::builder().core_count(|| 3).build();
    /// assert_eq!(pool.threads(), 3);
    /// # pool.shutdown();
    /// ```
    pub fn core_count(mut self, f: fn() -> usize) -> Self {
        self.core_count = f;
        self
    }

    /// Create a thread pool according to the configuration set with this
    /// builder.
    ///
    /// # Panics
    ///
    /// Panics if a worker thread could not be spawned. Use
    /// [`try_build`](Builder::try_build) to handle spawn failures instead.
    pub fn build(self) -> ThreadPool {
        self.try_build().expect("failed to spawn worker thread")
    }

    /// Create a thread pool according to the configuration set with this
    /// builder, returning an error if a worker thread could not be spawned.
    ///
    /// On failure, any workers spawned so far are shut down and joined before
    /// the error is returned; no threads are leaked.
    pub fn try_build(self) -> io::Result<ThreadPool> {
        let size = match self.size {
            Some(size) if size > 0 => size,
            _ => (self.core_count)(),
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                executing: 0,
                live_workers: 0,
                stop: false,
            }),
            work_available: Condvar::new(),
            barrier: Condvar::new(),
            completed_tasks: Default::default(),
            panicked_tasks: Default::default(),
        });

        let mut handles = Vec::with_capacity(size);

        for _ in 0..size {
            let mut builder = thread::Builder::new();

            if let Some(name) = self.name.as_ref() {
                builder = builder.name(name.clone());
            }

            if let Some(stack_size) = self.stack_size {
                builder = builder.stack_size(stack_size);
            }

            // Register the worker before spawning it so that `threads` and
            // the shutdown accounting never lag behind the spawn.
            shared.state.lock().unwrap().live_workers += 1;

            let worker = Worker::new(shared.clone());

            match builder.spawn(move || worker.run()) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    shared.state.lock().unwrap().live_workers -= 1;

                    // Tear down the workers spawned so far.
                    ThreadPool {
                        shared,
                        workers: Mutex::new(handles),
                    }
                    .shutdown();

                    return Err(e);
                }
            }
        }

        Ok(ThreadPool {
            shared,
            workers: Mutex::new(handles),
        })
    }
}

/// A fixed-size thread pool executing fire-and-forget tasks on a group of
/// long-lived threads.
///
/// All worker threads are spawned when the pool is created and stay alive
/// until the pool is shut down; submitting a task never spawns a thread.
/// Submitted tasks go into a shared FIFO queue that idle workers pull from,
/// so submission is cheap and non-blocking while execution is bounded by the
/// pool size.
///
/// Tasks are fire-and-forget: no value or error is returned to the submitter.
/// Anything a task wants to communicate must go through a side channel the
/// submitter arranges, such as a channel sender or shared memory. A task that
/// panics is contained at the worker boundary; the worker survives and the
/// panic is only visible through [`panicked_tasks`](ThreadPool::panicked_tasks).
///
/// # Shutdown
///
/// [`shutdown`](ThreadPool::shutdown) stops the pool gracefully: new
/// submissions are rejected, but every task already in the queue is still
/// executed before the workers exit. Dropping the pool performs the same
/// shutdown, so queued work is never silently discarded.
///
/// # Monitoring
///
/// Each pool instance provides methods for gathering various statistics on
/// the pool's usage, such as the number of queued and running tasks. While
/// these methods provide the most up-to-date numbers upon invocation, they
/// should not be used for controlling program behavior since they can become
/// immediately outdated due to the live nature of the pool.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(0)
    }
}

impl ThreadPool {
    /// Create a new thread pool with a fixed number of worker threads.
    ///
    /// A size of `0` means one worker per available CPU core.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::new(2);
    ///
    /// pool.submit(|| {
    ///     // some expensive computation
    /// }).unwrap();
    ///
    /// pool.shutdown();
    /// ```
    pub fn new(size: usize) -> Self {
        Self::builder().size(size).build()
    }

    /// Get a builder for creating a customized thread pool.
    #[inline]
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Get the number of worker threads currently alive in the pool.
    ///
    /// This equals the configured pool size for the entire life of the pool
    /// and drops to zero once the pool has shut down.
    pub fn threads(&self) -> usize {
        self.shared.state.lock().unwrap().live_workers
    }

    /// Get the number of tasks queued for execution, but not yet started.
    ///
    /// Note that the number returned may become immediately outdated after
    /// invocation.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::{sync::mpsc, thread::sleep, time::Duration};
    ///
    /// // Create a pool with just one thread.
    /// let pool = threadcap::ThreadPool::new(1);
    ///
    /// // Nothing is queued yet.
    /// assert_eq!(pool.queued_tasks(), 0);
    ///
    /// // Occupy the only worker with a task that waits for us.
    /// let (tx, rx) = mpsc::channel();
    /// pool.submit(move || {
    ///     rx.recv().unwrap();
    /// }).unwrap();
    ///
    /// // Wait a little for the task to start.
    /// sleep(Duration::from_millis(50));
    ///
    /// // Enqueue some more tasks.
    /// let count = 4;
    /// for _ in 0..count {
    ///     pool.submit(|| {
    ///         // work to do
    ///     }).unwrap();
    /// }
    ///
    /// // The tasks are still in the queue because the only worker is busy.
    /// assert_eq!(pool.queued_tasks(), count);
    ///
    /// tx.send(()).unwrap();
    /// pool.wait();
    /// ```
    pub fn queued_tasks(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Get the number of tasks currently being executed by workers.
    ///
    /// Note that the number returned may become immediately outdated after
    /// invocation.
    pub fn running_tasks(&self) -> usize {
        self.shared.state.lock().unwrap().executing
    }

    /// Get the number of tasks completed (successfully or otherwise) by this
    /// pool since it was created.
    ///
    /// Note that the number returned may become immediately outdated after
    /// invocation.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::new(2);
    /// assert_eq!(pool.completed_tasks(), 0);
    ///
    /// pool.submit(|| {}).unwrap();
    /// pool.wait();
    /// assert_eq!(pool.completed_tasks(), 1);
    /// # pool.shutdown();
    /// ```
    #[allow(clippy::useless_conversion)]
    pub fn completed_tasks(&self) -> u64 {
        self.shared.completed_tasks.load(Ordering::Relaxed).into()
    }

    /// Get the number of tasks that have panicked since the pool was created.
    ///
    /// Note that the number returned may become immediately outdated after
    /// invocation.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::new(1);
    /// assert_eq!(pool.panicked_tasks(), 0);
    ///
    /// pool.submit(|| {
    ///     panic!("this task panics");
    /// }).unwrap();
    ///
    /// pool.wait();
    /// assert_eq!(pool.panicked_tasks(), 1);
    /// # pool.shutdown();
    /// ```
    #[allow(clippy::useless_conversion)]
    pub fn panicked_tasks(&self) -> u64 {
        self.shared.panicked_tasks.load(Ordering::Relaxed).into()
    }

    /// Submit a closure to be executed by the thread pool.
    ///
    /// The task is appended to the pool's FIFO queue and will be picked up by
    /// the first worker to become idle. Tasks submitted from the same thread
    /// are dequeued in submission order, though tasks running on different
    /// workers may complete in any order.
    ///
    /// # Errors
    ///
    /// If the pool has begun shutting down, the closure is rejected and
    /// returned inside the error without having been queued or run.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::mpsc;
    ///
    /// let pool = threadcap::ThreadPool::new(2);
    /// let (tx, rx) = mpsc::channel();
    ///
    /// pool.submit(move || {
    ///     tx.send(2 + 2).unwrap();
    /// }).unwrap();
    ///
    /// assert_eq!(rx.recv().unwrap(), 4);
    /// # pool.shutdown();
    /// ```
    ///
    /// After shutdown, submissions fail and the closure can be recovered:
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::new(1);
    /// pool.shutdown();
    ///
    /// let closure = pool.submit(|| println!("hello")).unwrap_err().into_inner();
    ///
    /// // The pool never ran it, but we still can.
    /// closure();
    /// ```
    pub fn submit<F>(&self, f: F) -> Result<(), PoolStoppedError<F>>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.shared.state.lock().unwrap();

        // Checking the stop flag and enqueueing happen under the same lock
        // acquisition, so a task can never slip into the queue after shutdown
        // has started draining it.
        if state.stop {
            return Err(PoolStoppedError(f));
        }

        state.queue.push_back(Task::new(f));

        // Broadcast rather than single wake: several workers may be idle and
        // each must re-check the queue instead of assuming exclusive wake-up.
        self.shared.work_available.notify_all();

        Ok(())
    }

    /// Block the current thread until the pool becomes quiescent.
    ///
    /// Quiescent means that no task is executing and the queue is empty. All
    /// tasks submitted strictly before this call are guaranteed to have
    /// completed once it returns; no guarantee is made about tasks submitted
    /// concurrently with the call itself. If the pool is shutting down, this
    /// instead blocks until every worker has exited.
    ///
    /// The pool remains usable afterward, making this a flush barrier rather
    /// than a shutdown.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{
    ///     atomic::{AtomicUsize, Ordering},
    ///     Arc,
    /// };
    ///
    /// let pool = threadcap::ThreadPool::new(4);
    /// let counter = Arc::new(AtomicUsize::new(0));
    ///
    /// for _ in 0..10 {
    ///     let counter = counter.clone();
    ///     pool.submit(move || {
    ///         counter.fetch_add(1, Ordering::SeqCst);
    ///     }).unwrap();
    /// }
    ///
    /// pool.wait();
    /// assert_eq!(counter.load(Ordering::SeqCst), 10);
    /// # pool.shutdown();
    /// ```
    pub fn wait(&self) {
        let mut state = self.shared.state.lock().unwrap();

        loop {
            let draining = !state.stop && (state.executing > 0 || !state.queue.is_empty());
            let stopping = state.stop && state.live_workers > 0;

            if !draining && !stopping {
                break;
            }

            state = self.shared.barrier.wait(state).unwrap();
        }
    }

    /// Shut down the thread pool and block until all queued tasks have
    /// completed and all worker threads have stopped.
    ///
    /// New submissions are rejected as soon as shutdown begins, but shutdown
    /// is a drain, not a cancel: every task already queued is still executed
    /// before its worker exits. Worker threads are joined before this method
    /// returns, so afterward no pool thread remains runnable.
    ///
    /// Calling `shutdown` more than once has no further effect. Dropping the
    /// pool without calling `shutdown` performs the same sequence.
    ///
    /// # Examples
    ///
    /// ```
    /// let pool = threadcap::ThreadPool::new(4);
    ///
    /// pool.submit(|| {
    ///     // queued before shutdown, so guaranteed to run
    /// }).unwrap();
    ///
    /// pool.shutdown();
    /// assert_eq!(pool.threads(), 0);
    /// assert_eq!(pool.completed_tasks(), 1);
    /// ```
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock().unwrap();

            if !state.stop {
                state.stop = true;
                log::trace!("pool shutdown requested");

                // Wake every idle worker so it can re-evaluate: with the
                // queue empty it exits, otherwise it keeps draining first.
                self.shared.work_available.notify_all();
            }
        }

        // The ordering here is the correctness-critical part: signal, then
        // wait for the drain to finish, then join. Nothing is torn down while
        // a worker could still reference it.
        self.wait();

        let handles: Vec<_> = self.workers.lock().unwrap().drain(..).collect();

        for handle in handles {
            if handle.join().is_err() {
                log::error!("worker thread panicked outside of a task");
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.threads())
            .field("queued_tasks", &self.queued_tasks())
            .field("running_tasks", &self.running_tasks())
            .field("completed_tasks", &self.completed_tasks())
            .finish()
    }
}

/// Thread pool state shared by the owner and the worker threads.
///
/// All coordination goes through `state` and the two condition variables:
/// `work_available` wakes idle workers when a task is enqueued or shutdown
/// begins, and `barrier` wakes `wait` callers when the pool reaches
/// quiescence or the last worker exits.
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    pub(crate) work_available: Condvar,
    pub(crate) barrier: Condvar,
    pub(crate) completed_tasks: AtomicCounter,
    pub(crate) panicked_tasks: AtomicCounter,
}

/// Lock-guarded pool state.
///
/// Invariants, holding whenever the lock is released:
/// `executing <= live_workers`; `live_workers` only ever decreases once
/// `stop` is set; `stop` is set at most once and never cleared.
pub(crate) struct State {
    pub(crate) queue: VecDeque<Task>,
    pub(crate) executing: usize,
    pub(crate) live_workers: usize,
    pub(crate) stop: bool,
}
