//! Publish/subscribe fan-out
//!
//! Every subscriber owns a bounded mailbox. Publishing never waits: when a
//! mailbox is full the event is dropped for that subscriber only. A dropped
//! `Update` heals itself on the next tick, which sends a fresh full list.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use crate::events::Event;

pub type SubscriptionId = u64;

struct Mailbox {
    id: SubscriptionId,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Receiving end of one subscriber's mailbox
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Arc<Event>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event. `None` once the bus released this mailbox.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Next queued event, if any
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently queued
    pub fn drain(&mut self) -> Vec<Arc<Event>> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Fan-out of events to all live subscriptions
pub struct EventBus {
    mailboxes: RwLock<Vec<Mailbox>>,
    capacity: usize,
    next_id: AtomicU64,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl EventBus {
    /// Create a bus whose mailboxes hold `capacity` events each
    pub fn new(capacity: usize) -> Self {
        Self {
            mailboxes: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(0),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a fresh mailbox
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.mailboxes.write().push(Mailbox { id, sender });
        debug!("Subscription {} registered", id);
        Subscription { id, receiver }
    }

    /// Release a mailbox. Nothing published afterwards reaches it.
    pub fn unsubscribe(&self, subscription: Subscription) {
        self.remove(subscription.id);
        // Receiver dropped here, closing the channel
    }

    fn remove(&self, id: SubscriptionId) {
        let mut mailboxes = self.mailboxes.write();
        let before = mailboxes.len();
        mailboxes.retain(|m| m.id != id);
        if mailboxes.len() < before {
            debug!("Subscription {} released", id);
        }
    }

    /// Offer `event` to every live mailbox without waiting.
    /// Returns the number of mailboxes that accepted it.
    pub fn publish(&self, event: Event) -> usize {
        let event_type = event.event_type();
        let event = Arc::new(event);
        let mut accepted = 0;
        let mut closed = Vec::new();

        {
            let mailboxes = self.mailboxes.read();
            for mailbox in mailboxes.iter() {
                match mailbox.sender.try_send(Arc::clone(&event)) {
                    Ok(()) => accepted += 1,
                    Err(TrySendError::Full(_)) => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        trace!("Mailbox {} full, dropped {}", mailbox.id, event_type);
                    }
                    Err(TrySendError::Closed(_)) => closed.push(mailbox.id),
                }
            }
        }

        // Receivers dropped without unsubscribing
        for id in closed {
            self.remove(id);
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(accepted as u64, Ordering::Relaxed);
        accepted
    }

    pub fn subscriber_count(&self) -> usize {
        self.mailboxes.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::game::constants::net::MAILBOX_CAPACITY)
    }
}
