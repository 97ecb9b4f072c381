use std::collections::{HashMap, VecDeque};

/// Cancellation handle returned by [`EventBus::subscribe`]. Dropping the
/// handle without calling `unsubscribe` leaves the subscription live (and its
/// backlog retained), which is a caller bug the bus cannot detect.
#[derive(Debug, PartialEq, Eq)]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Typed single-threaded publish/subscribe channel.
///
/// Delivery contract: every subscription sees every message emitted after it
/// was created, in emission order. Messages emitted while no subscription
/// exists are retained and handed to the first subscription that appears, so
/// nothing is dropped for lack of subscribers. Messages consumed by every
/// live subscription are compacted away.
pub struct EventBus<M: Clone> {
    log: VecDeque<M>,
    base_seq: u64,
    cursors: HashMap<u64, u64>,
    next_subscription_id: u64,
}

impl<M: Clone> Default for EventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Clone> EventBus<M> {
    pub fn new() -> Self {
        Self {
            log: VecDeque::new(),
            base_seq: 0,
            cursors: HashMap::new(),
            next_subscription_id: 0,
        }
    }

    pub fn subscribe(&mut self) -> Subscription {
        let id = self.next_subscription_id;
        self.next_subscription_id = self.next_subscription_id.saturating_add(1);
        // The first subscriber inherits the orphan backlog; later subscribers
        // start at the live tail.
        let cursor = if self.cursors.is_empty() {
            self.base_seq
        } else {
            self.end_seq()
        };
        self.cursors.insert(id, cursor);
        Subscription { id }
    }

    pub fn unsubscribe(&mut self, subscription: Subscription) {
        self.cursors.remove(&subscription.id);
        self.compact();
    }

    pub fn emit(&mut self, message: M) {
        self.log.push_back(message);
    }

    /// Drains every message this subscription has not yet seen.
    pub fn poll(&mut self, subscription: &Subscription) -> Vec<M> {
        let end = self.end_seq();
        let Some(cursor) = self.cursors.get_mut(&subscription.id) else {
            return Vec::new();
        };
        let start = *cursor;
        *cursor = end;
        let first = (start - self.base_seq) as usize;
        let last = (end - self.base_seq) as usize;
        let drained = self.log.range(first..last).cloned().collect();
        self.compact();
        drained
    }

    /// Messages currently retained (emitted but not yet consumed by every
    /// subscription, or orphaned with no subscription at all).
    pub fn retained_len(&self) -> usize {
        self.log.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.cursors.len()
    }

    fn end_seq(&self) -> u64 {
        self.base_seq + self.log.len() as u64
    }

    fn compact(&mut self) {
        let Some(min_cursor) = self.cursors.values().copied().min() else {
            // No subscriptions: keep the backlog for whoever subscribes next.
            return;
        };
        while self.base_seq < min_cursor {
            self.log.pop_front();
            self.base_seq += 1;
        }
    }
}
