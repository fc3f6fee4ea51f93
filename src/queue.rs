//! Traffic held back until the session is ready.

use std::collections::VecDeque;

use crate::protocol::{ClientMessage, Inbound};

/// Default bound on queued items.
pub const DEFAULT_PENDING_QUEUE_CAPACITY: usize = 1024;

/// An item waiting for the ready state.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingItem {
    /// Received from the server before ready.
    Inbound(Inbound),
    /// Requested by the consumer before ready.
    Outbound(ClientMessage),
}

/// Bounded FIFO of [`PendingItem`]s.
#[derive(Debug, Clone)]
pub struct PendingQueue {
    items: VecDeque<PendingItem>,
    capacity: usize,
}

impl PendingQueue {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append an item. When full the item is handed back unqueued.
    pub fn push(&mut self, item: PendingItem) -> Result<(), PendingItem> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Take everything queued so far, oldest first, leaving the queue empty.
    ///
    /// Items pushed while the drained batch is being processed land in the
    /// fresh queue behind nothing older, so arrival order is preserved.
    pub fn drain(&mut self) -> VecDeque<PendingItem> {
        std::mem::take(&mut self.items)
    }

    /// Remove queued outbound commands matching `superseded`, keeping the
    /// order of everything else. Returns how many were removed.
    pub fn discard_outbound(&mut self, superseded: impl Fn(&ClientMessage) -> bool) -> usize {
        let before = self.items.len();
        self.items.retain(|item| match item {
            PendingItem::Outbound(message) => !superseded(message),
            PendingItem::Inbound(_) => true,
        });
        before - self.items.len()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn chat(n: usize) -> PendingItem {
        PendingItem::Outbound(ClientMessage::Chat {
            message: n.to_string(),
        })
    }

    #[test]
    fn drains_in_arrival_order() {
        let mut queue = PendingQueue::new(8);
        for n in 0..3 {
            queue.push(chat(n)).unwrap();
        }
        let drained: Vec<_> = queue.drain().into_iter().collect();
        assert_eq!(drained, vec![chat(0), chat(1), chat(2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn requeue_during_drain_keeps_order() {
        let mut queue = PendingQueue::new(8);
        for n in 0..3 {
            queue.push(chat(n)).unwrap();
        }
        let mut batch = queue.drain();
        // First item processed, then the state regresses and the rest go
        // back through the queueing path.
        batch.pop_front();
        for item in batch {
            queue.push(item).unwrap();
        }
        queue.push(chat(3)).unwrap();
        let drained: Vec<_> = queue.drain().into_iter().collect();
        assert_eq!(drained, vec![chat(1), chat(2), chat(3)]);
    }

    #[test]
    fn full_queue_returns_item() {
        let mut queue = PendingQueue::new(1);
        queue.push(chat(0)).unwrap();
        assert_eq!(queue.push(chat(1)), Err(chat(1)));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn discarding_outbound_keeps_everything_else_in_order() {
        let mut queue = PendingQueue::new(8);
        let inbound = PendingItem::Inbound(Inbound::Other {
            opcode: "n".into(),
            payload: serde_json::json!({ "m": "n" }),
        });
        queue
            .push(PendingItem::Outbound(ClientMessage::SetRoom {
                room: "jazz".into(),
            }))
            .unwrap();
        queue.push(inbound.clone()).unwrap();
        queue.push(chat(1)).unwrap();

        assert_eq!(queue.discard_outbound(ClientMessage::is_queueable), 1);
        let left: Vec<_> = queue.drain().into_iter().collect();
        assert_eq!(left, vec![inbound, chat(1)]);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut queue = PendingQueue::new(0);
        assert!(queue.push(chat(0)).is_ok());
    }
}
