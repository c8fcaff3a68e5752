//! Outward notifications for a peer layer. The ledger pushes these onto
//! crossbeam channels handed out by `Ledger::subscribe`.

use crate::blockchain::ChainKind;
use crate::crypto::Sha256Hash;
use crate::transaction::Transaction;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    BlockAppended {
        chain: ChainKind,
        hash: Sha256Hash,
        height: u64,
    },
    /// A signed transaction that was not mined locally.
    TransactionCreated(Transaction),
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<LedgerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<LedgerEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Delivers to every live subscriber; dropped receivers are forgotten.
    pub fn publish(&self, event: LedgerEvent) {
        self.subscribers
            .lock()
            .retain(|sub| sub.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        let event = LedgerEvent::BlockAppended {
            chain: ChainKind::Products,
            hash: [1u8; 32],
            height: 3,
        };
        bus.publish(event.clone());

        assert_eq!(kept.try_recv().unwrap(), event);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
