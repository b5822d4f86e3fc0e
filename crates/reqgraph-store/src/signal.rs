//! Event fan-out for task observability.
//!
//! [`Signal`] is a small multi-subscriber notification primitive over
//! `std::sync::mpsc`: tasks emit events, every live subscriber's channel
//! receives a clone. Subscribers that dropped their receiver are pruned on
//! the next emit.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, PoisonError};

/// Multi-subscriber event signal.
#[derive(Debug)]
pub struct Signal<T: Clone + Send> {
    senders: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone + Send> Default for Signal<T> {
    fn default() -> Self {
        Signal {
            senders: Mutex::new(Vec::new()),
        }
    }
}

impl<T: Clone + Send> Signal<T> {
    pub fn new() -> Self {
        Signal::default()
    }

    /// Registers a subscriber and returns its receiving end.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = channel();
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Sends the event to every live subscriber, pruning dead ones.
    pub fn emit(&self, event: T) {
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_sees_every_event() {
        let signal = Signal::new();
        let a = signal.subscribe();
        let b = signal.subscribe();
        signal.emit(1);
        signal.emit(2);
        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(b.try_iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let signal = Signal::new();
        let rx = signal.subscribe();
        drop(rx);
        signal.emit(7);
        let rx = signal.subscribe();
        signal.emit(8);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![8]);
    }
}
