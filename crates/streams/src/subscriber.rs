//! Stream subscribers

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::event::StreamEvent;

/// Counter for unique subscriber ids across all providers
static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Sending half of one subscriber's bounded buffer
#[derive(Debug)]
pub(crate) struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Arc<StreamEvent>>,
}

/// What `try_send` did with an event
pub(crate) enum SendOutcome {
    Delivered,
    /// Buffer full; the subscriber is too slow and must be closed
    Slow,
    /// Receiver already dropped; the subscriber just needs cleanup
    Gone,
}

impl Subscriber {
    pub(crate) fn new(tx: mpsc::Sender<Arc<StreamEvent>>) -> Self {
        Self {
            id: SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub(crate) fn try_send(&self, event: Arc<StreamEvent>) -> SendOutcome {
        match self.tx.try_send(event) {
            Ok(()) => SendOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Slow,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::Gone,
        }
    }
}

/// Receiving half handed to the SSE connection
#[derive(Debug)]
pub struct Subscription {
    pub(crate) id: u64,
    pub(crate) rx: mpsc::Receiver<Arc<StreamEvent>>,
}

impl Subscription {
    /// Unique id of this subscriber
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the stream is closed (environment
    /// removed, provider closed, or this subscriber fell behind)
    pub async fn recv(&mut self) -> Option<Arc<StreamEvent>> {
        self.rx.recv().await
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<Arc<StreamEvent>> {
        self.rx.try_recv().ok()
    }
}
