//! The bounded ingestion buffer.

use std::collections::VecDeque;
use std::sync::Arc;

use bronze_core::ApiCaller;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub(crate) type Inbound = (Vec<u8>, Arc<dyn ApiCaller>);

/// A bounded FIFO of raw events waiting for dispatch.
///
/// When full, pushing drops the oldest queued event. A single drain task
/// pops in arrival order.
pub(crate) struct EventRing {
    queue: Mutex<VecDeque<Inbound>>,
    capacity: usize,
    notify: Notify,
    cancel: CancellationToken,
}

impl EventRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn push(&self, payload: Vec<u8>, caller: Arc<dyn ApiCaller>) {
        {
            let mut queue = self.queue.lock();
            if queue.len() >= self.capacity && queue.pop_front().is_some() {
                warn!(capacity = self.capacity, "event ring full, dropped oldest event");
            }
            queue.push_back((payload, caller));
        }
        self.notify.notify_one();
    }

    /// Waits for the next event. Returns `None` once closed.
    pub async fn pop(&self) -> Option<Inbound> {
        loop {
            if let Some(inbound) = self.queue.lock().pop_front() {
                return Some(inbound);
            }
            tokio::select! {
                () = self.notify.notified() => {}
                () = self.cancel.cancelled() => return None,
            }
        }
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }
}
