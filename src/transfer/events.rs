//! Per-transfer event multiplexer
//!
//! Events are appended to a log held in a `watch` channel. Each subscriber
//! keeps its own cursor into that log, so late subscribers replay everything
//! from the start event on and every subscriber observes every event in
//! order. A subscription ends right after the terminal event.

use crate::types::TransferEvent;
use futures::Stream;
use tokio::sync::watch;

/// Append-only event log with any number of subscribers
#[derive(Debug)]
pub struct EventQueue {
    log: watch::Sender<Vec<TransferEvent>>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create an empty log
    pub fn new() -> Self {
        let (log, _) = watch::channel(Vec::new());
        Self { log }
    }

    /// Append an event and wake every subscriber
    pub fn push(&self, event: TransferEvent) {
        self.log.send_modify(|events| events.push(event));
    }

    /// Number of events produced so far
    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    /// Whether no event has been produced yet
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the terminal event has been produced
    pub fn is_closed(&self) -> bool {
        self.log
            .borrow()
            .last()
            .is_some_and(TransferEvent::is_terminal)
    }

    /// Copy of every event produced so far
    pub fn snapshot(&self) -> Vec<TransferEvent> {
        self.log.borrow().clone()
    }

    /// Start reading from the first event
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            log: self.log.subscribe(),
            cursor: 0,
            finished: false,
        }
    }
}

/// One subscriber's position in an [`EventQueue`]
#[derive(Debug)]
pub struct Subscription {
    log: watch::Receiver<Vec<TransferEvent>>,
    cursor: usize,
    finished: bool,
}

impl Subscription {
    /// Next event, or `None` once the terminal event has been delivered
    ///
    /// Also returns `None` if the queue is dropped before a terminal event.
    pub async fn next(&mut self) -> Option<TransferEvent> {
        if self.finished {
            return None;
        }
        loop {
            let next = self.log.borrow_and_update().get(self.cursor).cloned();
            if let Some(event) = next {
                self.cursor += 1;
                self.finished = event.is_terminal();
                return Some(event);
            }
            if self.log.changed().await.is_err() {
                self.finished = true;
                return None;
            }
        }
    }

    /// Convert into a `Stream` that ends after the terminal event
    pub fn into_stream(self) -> impl Stream<Item = TransferEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.next().await?;
            Some((event, subscription))
        })
    }
}
