use crate::app::Notification;
use crate::config::Config;
use crate::error::Result;
use crate::event::Event;
use crate::link::Links;
use crate::stats::bump;
use crate::storage::DeadlineQueue;
use crate::table::{PerSession, SessionId, StateRequest, TcpState};
use crate::time::{Duration, Expiration, Instant};
use super::{RetransmitClear, RetransmitKind, RetransmitSet};

#[derive(Debug, Clone, Copy)]
struct Entry {
    retries: u8,
    active: bool,
    kind: RetransmitKind,
}

impl Default for Entry {
    fn default() -> Self {
        Entry { retries: 0, active: false, kind: RetransmitKind::Data }
    }
}

/// The outcome of an expired retransmit timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Send again.
    Retry(Event),
    /// Retries are exhausted, the session is closed.
    Abort { session: SessionId, kind: RetransmitKind },
}

/// Retransmission timeouts with escalating backoff and bounded retries.
#[derive(Debug)]
pub struct RetransmitTimer {
    entries: PerSession<Entry>,
    queue: DeadlineQueue,
    schedule: Vec<Duration>,
    max_retries: u8,
}

impl RetransmitTimer {
    pub fn new(config: &Config) -> Self {
        RetransmitTimer {
            entries: PerSession::new(config.max_sessions, Entry::default()),
            queue: DeadlineQueue::new(config.max_sessions),
            schedule: config.retransmit_schedule.clone(),
            max_retries: config.max_retries,
        }
    }

    fn timeout(&self, retries: u8) -> Duration {
        let last = self.schedule.len().saturating_sub(1);
        self.schedule.get(usize::from(retries).min(last)).cloned().unwrap_or_default()
    }

    /// Arm the timer of a session if it is not running.
    pub fn set(&mut self, set: RetransmitSet, now: Instant) -> Result<()> {
        let entry = *self.entries.get(set.session)?;
        if entry.active {
            return Ok(());
        }
        let at = now + self.timeout(entry.retries);
        *self.entries.get_mut(set.session)? = Entry { active: true, kind: set.kind, ..entry };
        self.queue.schedule(set.session, at)?;
        Ok(())
    }

    /// Stop the timer, or restart it for the remaining data.
    pub fn clear(&mut self, clear: RetransmitClear, now: Instant) -> Result<()> {
        let first = self.timeout(0);
        let entry = self.entries.get_mut(clear.session)?;
        entry.retries = 0;
        if clear.stop {
            entry.active = false;
            self.queue.cancel(clear.session)?;
        } else if entry.active {
            self.queue.schedule(clear.session, now + first)?;
        }
        Ok(())
    }

    /// Process one expired timer.
    pub fn expire(&mut self, now: Instant) -> Result<Option<Expiry>> {
        let session = match self.queue.pop_expired(now) {
            Some(session) => session,
            None => return Ok(None),
        };

        let max_retries = self.max_retries;
        let entry = self.entries.get_mut(session)?;
        entry.active = false;
        if entry.retries < max_retries {
            entry.retries += 1;
            net_debug!("session {} retransmission {} of {:?}", session, entry.retries, entry.kind);
            let event = match entry.kind {
                RetransmitKind::Syn => Event::Syn { session, retry: true },
                RetransmitKind::SynAck => Event::SynAck { session, retry: true },
                RetransmitKind::Fin | RetransmitKind::Data => Event::Retransmit { session, fast: false },
            };
            Ok(Some(Expiry::Retry(event)))
        } else {
            entry.retries = 0;
            net_debug!("session {} aborted after {} retransmissions", session, max_retries);
            Ok(Some(Expiry::Abort { session, kind: entry.kind }))
        }
    }

    /// The number of retransmissions since the last acknowledgement.
    pub fn retries(&self, session: SessionId) -> Result<u8> {
        Ok(self.entries.get(session)?.retries)
    }

    pub fn next_deadline(&mut self) -> Expiration {
        self.queue.next()
    }

    /// One round: a command of the receive engine ahead of one of the transmit engine, then one
    /// expiry.
    pub(crate) fn poll(&mut self, links: &Links, now: Instant) -> Result<()> {
        if let Some(clear) = links.rt_clear.pop() {
            self.clear(clear, now)?;
        }

        if let Some(set) = links.rt_set.pop() {
            self.set(set, now)?;
        }

        let room = !links.timer_events.is_full()
            && !links.timer_close.is_full()
            && !links.connect_failed.is_full()
            && !links.timer_notify.is_full();
        if !room {
            return Ok(());
        }

        match self.expire(now)? {
            Some(Expiry::Retry(event)) => {
                bump(&links.counters.retransmissions);
                links.timer_events.push(event)?;
            },
            Some(Expiry::Abort { session, kind }) => {
                bump(&links.counters.aborted);
                links.timer_close.push(StateRequest::write(session, TcpState::Closed))?;
                match kind {
                    RetransmitKind::Syn => links.connect_failed.push(session)?,
                    _ => links.timer_notify.push(Notification::TimedOut { session })?,
                }
            },
            None => (),
        }

        Ok(())
    }
}
