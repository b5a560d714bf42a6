use crate::config::{Config, ProbeEvent};
use crate::error::Result;
use crate::event::Event;
use crate::link::Links;
use crate::storage::DeadlineQueue;
use crate::table::SessionId;
use crate::time::{Duration, Expiration, Instant};

/// Probes a peer that closed its window.
///
/// The transmit engine sets the timer when pending data is blocked by the peer's window, the
/// receive engine clears it when an acknowledgement opens the window again.
#[derive(Debug)]
pub struct ProbeTimer {
    queue: DeadlineQueue,
    interval: Duration,
    event: ProbeEvent,
}

impl ProbeTimer {
    pub fn new(config: &Config) -> Self {
        ProbeTimer {
            queue: DeadlineQueue::new(config.max_sessions),
            interval: config.probe_interval,
            event: config.probe_event,
        }
    }

    /// Start probing unless already scheduled.
    pub fn set(&mut self, session: SessionId, now: Instant) -> Result<()> {
        if self.queue.deadline(session)?.is_none() {
            self.queue.schedule(session, now + self.interval)?;
        }
        Ok(())
    }

    pub fn clear(&mut self, session: SessionId) -> Result<()> {
        self.queue.cancel(session)?;
        Ok(())
    }

    /// The event of one expired probe.
    pub fn expire(&mut self, now: Instant) -> Option<Event> {
        let session = self.queue.pop_expired(now)?;
        net_trace!("probe of session {} due", session);
        Some(match self.event {
            ProbeEvent::Transmit => Event::Tx { session },
            ProbeEvent::Retransmit => Event::Retransmit { session, fast: false },
        })
    }

    pub fn next_deadline(&mut self) -> Expiration {
        self.queue.next()
    }

    pub(crate) fn poll(&mut self, links: &Links, now: Instant) -> Result<()> {
        if let Some(session) = links.probe_clear.pop() {
            self.clear(session)?;
        }

        if let Some(session) = links.probe_set.pop() {
            self.set(session, now)?;
        }

        if !links.timer_events.is_full() {
            if let Some(event) = self.expire(now) {
                links.timer_events.push(event)?;
            }
        }

        Ok(())
    }
}
