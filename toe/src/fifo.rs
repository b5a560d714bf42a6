//! Bounded queues between the processes.
//!
//! Queues between the tables and the engines stall: a producer checks for room before it consumes
//! its own input, and a push into a full stalling queue is reported as an internal error. Queues
//! towards the application drop on overflow and count what they dropped.
use core::cell::Cell;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

use crate::error::InternalError;

/// What happens to a value pushed into a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overflow {
    /// The producer must wait, overflowing is a bug.
    Stall,
    /// The value is discarded and counted.
    Drop,
}

/// A bounded first-in first-out queue with an overflow policy.
pub struct Fifo<T> {
    name: &'static str,
    overflow: Overflow,
    sender: Sender<T>,
    receiver: Receiver<T>,
    dropped: Cell<u64>,
}

impl<T> Fifo<T> {
    /// A queue whose producer waits for room.
    pub fn stall(name: &'static str, depth: usize) -> Self {
        Self::with_policy(name, depth, Overflow::Stall)
    }

    /// A queue that discards values pushed while it is full.
    pub fn lossy(name: &'static str, depth: usize) -> Self {
        Self::with_policy(name, depth, Overflow::Drop)
    }

    fn with_policy(name: &'static str, depth: usize, overflow: Overflow) -> Self {
        let (sender, receiver) = bounded(depth);
        Fifo {
            name,
            overflow,
            sender,
            receiver,
            dropped: Cell::new(0),
        }
    }

    /// Append a value.
    pub fn push(&self, value: T) -> Result<(), InternalError> {
        // The receiver lives in `self`, a send only fails on a full queue.
        match self.sender.try_send(value) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => match self.overflow {
                Overflow::Stall => Err(InternalError::QueueFull(self.name)),
                Overflow::Drop => {
                    self.dropped.set(self.dropped.get() + 1);
                    net_debug!("queue {} full, dropped an entry", self.name);
                    Ok(())
                },
            },
        }
    }

    /// Take the oldest value.
    pub fn pop(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Check that `count` values can be pushed without overflowing.
    pub fn has_room(&self, count: usize) -> bool {
        match self.sender.capacity() {
            Some(capacity) => self.len() + count <= capacity,
            None => true,
        }
    }

    /// The number of values discarded so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.get()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_reports_overflow() {
        let fifo = Fifo::stall("test", 2);
        fifo.push(1).unwrap();
        fifo.push(2).unwrap();
        assert!(fifo.is_full());
        assert!(!fifo.has_room(1));
        assert_eq!(fifo.push(3), Err(InternalError::QueueFull("test")));
        assert_eq!(fifo.pop(), Some(1));
        assert_eq!(fifo.pop(), Some(2));
        assert_eq!(fifo.pop(), None);
    }

    #[test]
    fn drop_counts() {
        let fifo = Fifo::lossy("notifications", 1);
        fifo.push('a').unwrap();
        fifo.push('b').unwrap();
        fifo.push('c').unwrap();
        assert_eq!(fifo.dropped(), 2);
        assert_eq!(fifo.pop(), Some('a'));
        assert!(fifo.is_empty());
    }
}
