use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::time::delay_queue;
use tokio_util::time::DelayQueue;
use tracing::debug;
use tracing::trace;

use super::RateLimiter;
use crate::metrics::WORKQUEUE_ADDS;
use crate::metrics::WORKQUEUE_DEPTH;
use crate::metrics::WORKQUEUE_RETRIES;

#[derive(Default)]
struct QueueState {
    /// Keys ready to be handed out, in insertion order
    queue: VecDeque<String>,
    /// Keys that need processing: queued, or re-added while in flight
    dirty: HashSet<String>,
    /// Keys handed out by `get` and not yet `done`
    processing: HashSet<String>,
    shutting_down: bool,
}

/// A deduplicating, rate-limited queue of object keys.
///
/// A key is handed to at most one consumer at a time: re-adding a key that
/// is being processed only marks it dirty, and `done` puts it back.
pub struct WorkQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter>,
    delayed_tx: Mutex<Option<mpsc::UnboundedSender<(String, Duration)>>>,
}

impl WorkQueue {
    /// Creates the queue and its delaying loop.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        name: impl Into<String>,
        rate_limiter: impl RateLimiter,
    ) -> Arc<Self> {
        let (delayed_tx, delayed_rx) = mpsc::unbounded_channel();
        let queue = Arc::new(Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            rate_limiter: Box::new(rate_limiter),
            delayed_tx: Mutex::new(Some(delayed_tx)),
        });
        tokio::spawn(waiting_loop(Arc::downgrade(&queue), delayed_rx));
        queue
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Marks `key` as needing processing.
    pub fn add(
        &self,
        key: &str,
    ) {
        {
            let mut state = self.state.lock();
            if state.shutting_down || state.dirty.contains(key) {
                return;
            }
            WORKQUEUE_ADDS.with_label_values(&[&self.name]).inc();
            state.dirty.insert(key.to_string());
            if state.processing.contains(key) {
                trace!(queue = %self.name, key, "key in flight, marked dirty");
                return;
            }
            state.queue.push_back(key.to_string());
            self.update_depth(&state);
        }
        self.notify.notify_one();
    }

    /// Blocks until a key is available.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    self.update_depth(&state);
                    return Some(key);
                }
                if state.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Releases `key` after processing; requeues it if it was re-added meanwhile.
    pub fn done(
        &self,
        key: &str,
    ) {
        {
            let mut state = self.state.lock();
            state.processing.remove(key);
            if !state.dirty.contains(key) {
                return;
            }
            state.queue.push_back(key.to_string());
            self.update_depth(&state);
        }
        self.notify.notify_one();
    }

    /// Adds `key` once `delay` has elapsed.
    ///
    /// When the key is already waiting, the earlier deadline wins.
    pub fn add_after(
        &self,
        key: &str,
        delay: Duration,
    ) {
        if self.shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if let Some(tx) = self.delayed_tx.lock().as_ref() {
            let _ = tx.send((key.to_string(), delay));
        }
    }

    /// Adds `key` after the rate limiter allows it.
    pub fn add_rate_limited(
        &self,
        key: &str,
    ) {
        let delay = self.rate_limiter.when(key);
        WORKQUEUE_RETRIES.with_label_values(&[&self.name]).inc();
        debug!(queue = %self.name, key, ?delay, "rate limited requeue");
        self.add_after(key, delay);
    }

    /// Stops tracking failures of `key`.
    pub fn forget(
        &self,
        key: &str,
    ) {
        self.rate_limiter.forget(key);
    }

    pub fn num_requeues(
        &self,
        key: &str,
    ) -> u32 {
        self.rate_limiter.num_requeues(key)
    }

    /// Rejects further adds and lets blocked consumers drain the queue.
    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        self.delayed_tx.lock().take();
        self.notify.notify_waiters();
        debug!(queue = %self.name, "work queue shutting down");
    }

    pub fn shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    /// Number of keys ready to be retrieved.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update_depth(
        &self,
        state: &QueueState,
    ) {
        WORKQUEUE_DEPTH
            .with_label_values(&[&self.name])
            .set(state.queue.len() as i64);
    }
}

/// Holds delayed keys until their deadline, then adds them to the queue.
async fn waiting_loop(
    queue: Weak<WorkQueue>,
    mut rx: mpsc::UnboundedReceiver<(String, Duration)>,
) {
    let mut delayed: DelayQueue<String> = DelayQueue::new();
    let mut pending: HashMap<String, (delay_queue::Key, Instant)> = HashMap::new();

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some((key, delay)) = msg else {
                    break;
                };
                let deadline = Instant::now() + delay;
                if let Some((slot, at)) = pending.get_mut(&key) {
                    if deadline < *at {
                        delayed.reset_at(slot, deadline);
                        *at = deadline;
                    }
                } else {
                    let slot = delayed.insert_at(key.clone(), deadline);
                    pending.insert(key, (slot, deadline));
                }
            }
            Some(expired) = delayed.next(), if !delayed.is_empty() => {
                let key = expired.into_inner();
                pending.remove(&key);
                match queue.upgrade() {
                    Some(q) => q.add(&key),
                    None => break,
                }
            }
        }
    }
    trace!("work queue waiting loop stopped");
}
