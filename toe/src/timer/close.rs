use crate::config::Config;
use crate::error::Result;
use crate::link::Links;
use crate::storage::DeadlineQueue;
use crate::table::{SessionId, StateRequest, TcpState};
use crate::time::{Duration, Expiration, Instant};

/// Closes sessions that lingered in `TIME_WAIT` long enough.
#[derive(Debug)]
pub struct CloseTimer {
    queue: DeadlineQueue,
    time_wait: Duration,
}

impl CloseTimer {
    pub fn new(config: &Config) -> Self {
        CloseTimer {
            queue: DeadlineQueue::new(config.max_sessions),
            time_wait: config.time_wait,
        }
    }

    pub fn set(&mut self, session: SessionId, now: Instant) -> Result<()> {
        self.queue.schedule(session, now + self.time_wait)?;
        Ok(())
    }

    pub fn expire(&mut self, now: Instant) -> Option<SessionId> {
        self.queue.pop_expired(now)
    }

    pub fn next_deadline(&mut self) -> Expiration {
        self.queue.next()
    }

    pub(crate) fn poll(&mut self, links: &Links, now: Instant) -> Result<()> {
        if let Some(session) = links.close_set.pop() {
            self.set(session, now)?;
        }

        if !links.timer_close.is_full() {
            if let Some(session) = self.expire(now) {
                net_trace!("session {} leaves TIME_WAIT", session);
                links.timer_close.push(StateRequest::write(session, TcpState::Closed))?;
            }
        }

        Ok(())
    }
}
