use std::sync::{atomic::Ordering, Arc};

use crate::{pool::Shared, task::Task};

/// A worker thread belonging to a thread pool.
///
/// Every worker runs the same loop: block until a task is available or the
/// pool begins shutting down, pull the head task from the queue, execute it
/// with the lock released, then report completion. Once the stop flag is set
/// and the queue has been drained, the worker exits. Workers never abandon
/// queued work: a task enqueued before shutdown began is always executed.
pub(crate) struct Worker {
    shared: Arc<Shared>,
}

impl Worker {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Main worker loop.
    pub(crate) fn run(self) {
        log::trace!("worker thread started");

        while let Some(task) = self.next_task() {
            self.execute(task);
        }

        log::trace!("worker thread exiting");
    }

    /// Block until a task can be dequeued, or return `None` once the pool is
    /// stopping and the queue is empty.
    ///
    /// The exit branch decrements the live worker count and notifies the
    /// barrier inside the same critical section, so a caller blocked in
    /// `wait` can never observe the count out of step with this thread's
    /// decision to exit.
    fn next_task(&self) -> Option<Task> {
        let mut state = self.shared.state.lock().unwrap();

        loop {
            if let Some(task) = state.queue.pop_front() {
                state.executing += 1;
                return Some(task);
            }

            // Queue is empty. Leave only if the pool is stopping; otherwise
            // go back to sleep until a submitter broadcasts.
            if state.stop {
                state.live_workers -= 1;
                self.shared.barrier.notify_all();
                return None;
            }

            state = self.shared.work_available.wait(state).unwrap();
        }
    }

    /// Run a task body with the lock released, then record its completion.
    fn execute(&self, task: Task) {
        let result = task.run();

        self.shared.completed_tasks.fetch_add(1, Ordering::Relaxed);

        if result.is_err() {
            self.shared.panicked_tasks.fetch_add(1, Ordering::Relaxed);
            log::trace!("task panicked, worker continues");
        }

        let mut state = self.shared.state.lock().unwrap();
        state.executing -= 1;

        // If this was the last in-flight task and nothing is queued, the pool
        // has reached quiescence; wake anyone blocked in `wait`. During
        // shutdown the barrier is notified from the exit branch instead.
        if !state.stop && state.executing == 0 && state.queue.is_empty() {
            self.shared.barrier.notify_all();
        }
    }
}
