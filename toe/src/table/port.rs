//! The port table.
//!
//! Static ports below `0x8000` are opened for listening by the application, dynamic ports above
//! are handed out for active opens and returned when their session is released. Both halves are
//! bitmaps that are swept clean once before the table answers any request.
use crate::error::{InternalError, Result};
use crate::link::Links;

/// The first port of the dynamic range.
pub const FIRST_EPHEMERAL_PORT: u16 = 0x8000;

const RANGE: usize = 1 << 15;
const WORDS: usize = RANGE / 64;

/// The state of a local port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Nobody accepts segments on this port.
    Closed,
    /// A static port opened by the application.
    Listening,
    /// A dynamic port in use by an active open.
    Active,
}

#[derive(Debug)]
struct Bitmap {
    words: Vec<u64>,
    swept: usize,
}

impl Bitmap {
    fn new() -> Self {
        // Start dirty so the sweep has something to clear after a reset.
        Bitmap { words: vec![!0; WORDS], swept: 0 }
    }

    fn sweep(&mut self, step: usize) -> bool {
        let end = (self.swept + step).min(WORDS);
        self.words[self.swept..end].iter_mut().for_each(|word| *word = 0);
        self.swept = end;
        self.is_ready()
    }

    fn is_ready(&self) -> bool {
        self.swept == WORDS
    }

    fn get(&self, offset: usize) -> bool {
        self.words[offset / 64] & (1 << (offset % 64)) != 0
    }

    fn set(&mut self, offset: usize, value: bool) {
        let mask = 1 << (offset % 64);
        if value {
            self.words[offset / 64] |= mask;
        } else {
            self.words[offset / 64] &= !mask;
        }
    }
}

/// Listening and ephemeral ports.
#[derive(Debug)]
pub struct PortTable {
    listening: Bitmap,
    ephemeral: Bitmap,
    /// Number of dynamic ports that may be handed out.
    usable: usize,
    cursor: usize,
    sweep_step: usize,
}

impl PortTable {
    pub fn new(usable: usize, sweep_step: usize) -> Self {
        PortTable {
            listening: Bitmap::new(),
            ephemeral: Bitmap::new(),
            usable: usable.min(RANGE),
            cursor: 0,
            sweep_step,
        }
    }

    /// Continue the initial sweep, returns the merged ready signal.
    pub fn sweep(&mut self) -> bool {
        let listening = self.listening.sweep(self.sweep_step);
        let ephemeral = self.ephemeral.sweep(self.sweep_step);
        listening && ephemeral
    }

    pub fn is_ready(&self) -> bool {
        self.listening.is_ready() && self.ephemeral.is_ready()
    }

    /// Open a static port for listening, dynamic ports are refused.
    pub fn open_listen(&mut self, port: u16) -> bool {
        if port == 0 || port >= FIRST_EPHEMERAL_PORT {
            net_debug!("refusing to listen on port {}", port);
            return false;
        }
        self.listening.set(usize::from(port), true);
        true
    }

    /// Hand out the next free dynamic port in round-robin order.
    pub fn free_ephemeral(&mut self) -> Option<u16> {
        for step in 0..self.usable {
            let offset = (self.cursor + step) % self.usable;
            if !self.ephemeral.get(offset) {
                self.ephemeral.set(offset, true);
                self.cursor = (offset + 1) % self.usable;
                return Some(FIRST_EPHEMERAL_PORT + offset as u16);
            }
        }
        None
    }

    /// The state of any port, routed on its high bit.
    pub fn query(&self, port: u16) -> PortState {
        if port < FIRST_EPHEMERAL_PORT {
            if self.listening.get(usize::from(port)) {
                PortState::Listening
            } else {
                PortState::Closed
            }
        } else if self.ephemeral.get(usize::from(port - FIRST_EPHEMERAL_PORT)) {
            PortState::Active
        } else {
            PortState::Closed
        }
    }

    /// Return a dynamic port to the free pool.
    pub fn close(&mut self, port: u16) -> Result<()> {
        if port < FIRST_EPHEMERAL_PORT {
            return Err(InternalError::StaticPortRelease(port).into());
        }
        self.ephemeral.set(usize::from(port - FIRST_EPHEMERAL_PORT), false);
        Ok(())
    }

    /// One round: finish the sweep, then one request of each kind in arrival order of kinds.
    pub(crate) fn poll(&mut self, links: &Links) -> Result<()> {
        if !self.is_ready() {
            if self.sweep() {
                net_debug!("port table ready");
            }
            return Ok(());
        }

        if !links.port_query_rsp.is_full() {
            if let Some(port) = links.port_query_req.pop() {
                links.port_query_rsp.push(self.query(port))?;
            }
        }

        if !links.listen_rsp.is_full() {
            if let Some(port) = links.listen_req.pop() {
                links.listen_rsp.push(self.open_listen(port))?;
            }
        }

        if !links.free_port_rsp.is_full() {
            if links.free_port_req.pop().is_some() {
                links.free_port_rsp.push(self.free_ephemeral())?;
            }
        }

        if let Some(port) = links.port_release.pop() {
            self.close(port)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(usable: usize) -> PortTable {
        let mut table = PortTable::new(usable, WORDS);
        assert!(table.sweep());
        table
    }

    #[test]
    fn sweep_takes_several_rounds() {
        let mut table = PortTable::new(8, WORDS / 4);
        assert!(!table.sweep());
        assert!(!table.sweep());
        assert!(!table.sweep());
        assert!(table.sweep());
        assert_eq!(table.query(80), PortState::Closed);
    }

    #[test]
    fn listen_and_query() {
        let mut table = ready(8);
        assert!(table.open_listen(80));
        assert!(!table.open_listen(0x8001));
        assert_eq!(table.query(80), PortState::Listening);
        // Querying is idempotent.
        assert_eq!(table.query(80), PortState::Listening);
        assert_eq!(table.query(81), PortState::Closed);
    }

    #[test]
    fn ephemeral_round_robin() {
        let mut table = ready(2);
        assert_eq!(table.free_ephemeral(), Some(0x8000));
        assert_eq!(table.free_ephemeral(), Some(0x8001));
        assert_eq!(table.free_ephemeral(), None);
        assert_eq!(table.query(0x8001), PortState::Active);

        table.close(0x8000).unwrap();
        assert_eq!(table.query(0x8000), PortState::Closed);
        assert_eq!(table.free_ephemeral(), Some(0x8000));
    }

    #[test]
    fn closing_static_port_is_an_error() {
        let mut table = ready(2);
        table.open_listen(80);
        assert!(table.close(80).is_err());
        assert_eq!(table.query(80), PortState::Listening);
    }
}
