use crate::error::Result;
use crate::link::Links;
use crate::stats::bump;

/// Merges the three event sources into the queue of the ack delayer.
///
/// The receive engine always goes first. Timer events, then application events, are taken only
/// when the credits show that the stages behind are drained.
#[derive(Debug, Default)]
pub struct EventEngine;

impl EventEngine {
    pub fn new() -> Self {
        EventEngine
    }

    pub(crate) fn poll(&mut self, links: &Links) -> Result<()> {
        if links.events.is_full() {
            return Ok(());
        }

        let event = match links.rx_events.pop() {
            Some(event) => Some(event),
            None if links.credits.drained() => {
                links.timer_events.pop().or_else(|| links.app_events.pop())
            },
            None => None,
        };

        if let Some(event) = event {
            net_trace!("event {:?}", event);
            links.events.push(event)?;
            bump(&links.credits.events_written);
        }

        Ok(())
    }
}
