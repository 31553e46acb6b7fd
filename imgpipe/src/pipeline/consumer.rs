//! The consumer-facing serial context.
//!
//! Listener callbacks and display mutations run here, one at a time, in the
//! order they were posted. Stages running on blocking workers never call a
//! listener directly; they post a closure through a [`ConsumerHandle`].
//!
//! ```text
//! worker ──post──┐
//! worker ──post──┼──► [unbounded queue] ──► ConsumerQueue::run (one task) ──► listener
//! worker ──post──┘
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::mpsc;
use tracing::{debug, error};

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Creates a connected handle/queue pair.
pub fn consumer_channel() -> (ConsumerHandle, ConsumerQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConsumerHandle { tx }, ConsumerQueue { rx })
}

/// Posts callbacks onto the consumer context. Cheap to clone.
#[derive(Clone)]
pub struct ConsumerHandle {
    tx: mpsc::UnboundedSender<Callback>,
}

impl ConsumerHandle {
    /// Queues `callback`. Returns false if the consumer context has shut down,
    /// in which case the callback is dropped without running.
    pub fn post<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.tx.send(Box::new(callback)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of the consumer context.
pub struct ConsumerQueue {
    rx: mpsc::UnboundedReceiver<Callback>,
}

impl ConsumerQueue {
    /// Runs callbacks until every handle has been dropped.
    pub async fn run(mut self) {
        debug!("Consumer context started");
        while let Some(callback) = self.rx.recv().await {
            run_callback(callback);
        }
        debug!("Consumer context stopped");
    }

    /// Runs every callback that is already queued and returns how many ran.
    ///
    /// For driving the consumer context by hand, e.g. from a UI loop.
    pub fn run_pending(&mut self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            run_callback(callback);
            ran += 1;
        }
        ran
    }
}

fn run_callback(callback: Callback) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!("Consumer callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callbacks_run_in_post_order() {
        let (handle, mut queue) = consumer_channel();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = Arc::clone(&seen);
            assert!(handle.post(move || seen.lock().unwrap().push(i)));
        }
        assert_eq!(queue.run_pending(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_post_after_queue_dropped() {
        let (handle, queue) = consumer_channel();
        drop(queue);
        assert!(handle.is_closed());
        assert!(!handle.post(|| {}));
    }

    #[test]
    fn test_panicking_callback_does_not_stop_queue() {
        let (handle, mut queue) = consumer_channel();
        let ran = Arc::new(Mutex::new(false));
        handle.post(|| panic!("listener bug"));
        let flag = Arc::clone(&ran);
        handle.post(move || *flag.lock().unwrap() = true);
        assert_eq!(queue.run_pending(), 2);
        assert!(*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn test_run_exits_when_handles_dropped() {
        let (handle, queue) = consumer_channel();
        let count = Arc::new(Mutex::new(0));
        let c = Arc::clone(&count);
        handle.post(move || *c.lock().unwrap() += 1);
        drop(handle);
        queue.run().await;
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
