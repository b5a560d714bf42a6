use crate::config::{Config, ACK_LADDER_LEN};
use crate::error::Result;
use crate::link::Links;
use crate::stats::bump;
use crate::storage::DeadlineQueue;
use crate::table::{PerSession, SessionId};
use crate::time::{Duration, Expiration, Instant};
use super::Event;

/// Coalesces delayed acknowledgements.
///
/// The first delayable acknowledgement of a session waits for the first rung of the ladder. Each
/// further one while it waits climbs a rung and may only move the deadline earlier. Any other
/// event for the session carries the acknowledgement and clears the pending one.
#[derive(Debug)]
pub struct AckDelayer {
    counts: PerSession<u8>,
    pending: DeadlineQueue,
    ladder: [Duration; ACK_LADDER_LEN],
    nodelay: bool,
}

impl AckDelayer {
    pub fn new(config: &Config) -> Self {
        AckDelayer {
            counts: PerSession::new(config.max_sessions, 0),
            pending: DeadlineQueue::new(config.max_sessions),
            ladder: config.ack_delay,
            nodelay: config.nodelay,
        }
    }

    /// Delay an acknowledgement of `session`.
    pub fn delay(&mut self, session: SessionId, now: Instant) -> Result<()> {
        let count = self.counts.get_mut(session)?;
        match self.pending.deadline(session)? {
            None => {
                *count = 0;
                self.pending.schedule(session, now + self.ladder[0])?;
            },
            Some(current) => {
                *count = (*count + 1).min(ACK_LADDER_LEN as u8 - 1);
                let candidate = now + self.ladder[usize::from(*count)];
                if candidate < current {
                    self.pending.schedule(session, candidate)?;
                }
            },
        }
        Ok(())
    }

    /// Forget the pending acknowledgement of `session`.
    pub fn clear(&mut self, session: SessionId) -> Result<()> {
        *self.counts.get_mut(session)? = 0;
        self.pending.cancel(session)?;
        Ok(())
    }

    /// The pending deadline of a session.
    pub fn deadline(&self, session: SessionId) -> Result<Option<Instant>> {
        Ok(self.pending.deadline(session)?)
    }

    pub fn next_deadline(&mut self) -> Expiration {
        self.pending.next()
    }

    pub(crate) fn poll(&mut self, links: &Links, now: Instant) -> Result<()> {
        if let Some(session) = links.ack_cancel.pop() {
            self.clear(session)?;
        }

        if !links.tx_events.is_full() {
            if let Some(event) = links.events.pop() {
                bump(&links.credits.events_read);
                self.forward(event, links, now)?;
            }
        }

        if !links.tx_events.is_full() {
            if let Some(session) = self.pending.pop_expired(now) {
                *self.counts.get_mut(session)? = 0;
                net_trace!("delayed ack of session {} due", session);
                links.tx_events.push(Event::Ack { session })?;
                bump(&links.credits.acks_written);
            }
        }

        Ok(())
    }

    fn forward(&mut self, event: Event, links: &Links, now: Instant) -> Result<()> {
        match event {
            Event::Ack { session } if !self.nodelay => self.delay(session, now),
            event => {
                if let Some(session) = event.session() {
                    self.clear(session)?;
                }
                links.tx_events.push(event)?;
                bump(&links.credits.acks_written);
                Ok(())
            },
        }
    }
}
