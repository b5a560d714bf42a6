//! Per-session deadlines ordered in a min-heap.
//!
//! Each session has at most one live deadline. Rescheduling or cancelling does not search the
//! heap, the old heap entry is left in place and skipped when it surfaces because its generation
//! no longer matches. Once stale entries outnumber the live ones the heap is rebuilt.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::InternalError;
use crate::table::{PerSession, SessionId};
use crate::time::{Expiration, Instant};

#[derive(Debug, Clone, Copy)]
struct Live {
    at: Instant,
    generation: u64,
}

/// A set of session deadlines, popped in order of expiry.
#[derive(Debug)]
pub struct DeadlineQueue {
    heap: BinaryHeap<Reverse<(Instant, u64, SessionId)>>,
    live: PerSession<Option<Live>>,
    /// Sessions with a deadline.
    scheduled: usize,
    generation: u64,
}

impl DeadlineQueue {
    pub fn new(max_sessions: usize) -> Self {
        DeadlineQueue {
            heap: BinaryHeap::new(),
            live: PerSession::new(max_sessions, None),
            scheduled: 0,
            generation: 0,
        }
    }

    /// Set the deadline of a session, replacing any previous one.
    pub fn schedule(&mut self, session: SessionId, at: Instant) -> Result<(), InternalError> {
        self.generation += 1;
        let live = self.live.get_mut(session)?;
        if live.is_none() {
            self.scheduled += 1;
        }
        *live = Some(Live { at, generation: self.generation });
        self.heap.push(Reverse((at, self.generation, session)));
        self.compact();
        Ok(())
    }

    /// Remove the deadline of a session, if any.
    pub fn cancel(&mut self, session: SessionId) -> Result<(), InternalError> {
        if self.live.get_mut(session)?.take().is_some() {
            self.scheduled -= 1;
            self.compact();
        }
        Ok(())
    }

    /// The live deadline of a session.
    pub fn deadline(&self, session: SessionId) -> Result<Option<Instant>, InternalError> {
        Ok(self.live.get(session)?.map(|live| live.at))
    }

    /// The earliest live deadline.
    pub fn next(&mut self) -> Expiration {
        self.discard_stale();
        self.heap.peek().map(|Reverse((at, _, _))| *at).into()
    }

    /// Remove and return a session whose deadline is not after `now`.
    ///
    /// Sessions expiring at the same instant are returned in the order they were scheduled.
    pub fn pop_expired(&mut self, now: Instant) -> Option<SessionId> {
        self.discard_stale();
        match self.heap.peek() {
            Some(Reverse((at, _, _))) if *at <= now => (),
            _ => return None,
        }
        let Reverse((_, _, session)) = self.heap.pop()?;
        if let Ok(live) = self.live.get_mut(session) {
            if live.take().is_some() {
                self.scheduled -= 1;
            }
        }
        Some(session)
    }

    /// Number of heap entries, live or not.
    pub fn entries(&self) -> usize {
        self.heap.len()
    }

    fn is_current(live: &PerSession<Option<Live>>, generation: u64, session: SessionId) -> bool {
        match live.get(session) {
            Ok(Some(live)) => live.generation == generation,
            _ => false,
        }
    }

    fn compact(&mut self) {
        let stale = self.heap.len() - self.scheduled;
        if stale <= self.scheduled {
            return;
        }
        let live = &self.live;
        let entries: Vec<_> = core::mem::take(&mut self.heap)
            .into_vec()
            .into_iter()
            .filter(|Reverse((_, generation, session))| Self::is_current(live, *generation, *session))
            .collect();
        self.heap = BinaryHeap::from(entries);
    }

    fn discard_stale(&mut self) {
        while let Some(&Reverse((_, generation, session))) = self.heap.peek() {
            if Self::is_current(&self.live, generation, session) {
                break;
            }
            self.heap.pop();
        }
    }
}
