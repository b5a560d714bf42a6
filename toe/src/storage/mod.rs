//! Buffer memory and timer bookkeeping.
//!
//! Payload bytes never travel through the tables. The receive engine stores segment payload in a
//! per-session circular region, the receive interface reads it back for the application. The
//! application interface stores outbound bytes that the transmit engine later fetches. Both
//! directions are addressed by the low bits of the sequence number.
use core::fmt;

use crate::error::{Error, InternalError, Result};
use crate::table::SessionId;
use crate::wire::TcpSeqNumber;

mod deadline;

pub use self::deadline::DeadlineQueue;

/// The largest circular region of a session, bounded by the unscaled TCP window.
pub const MAX_REGION_SIZE: usize = 1 << 16;

/// Which of the two buffers of a session is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Bytes received from the network, waiting for the application.
    Rx,
    /// Bytes accepted from the application, waiting for acknowledgement.
    Tx,
}

/// The start of one memory command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferAddress {
    pub direction: Direction,
    pub session: SessionId,
    /// Offset into the region of the session.
    pub offset: usize,
}

impl fmt::Display for BufferAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {}+{:#x}", self.direction, self.session, self.offset)
    }
}

/// The memory holding the circular regions of all sessions.
///
/// A single command never crosses the end of a region. Accesses that would wrap are split by the
/// engines into two commands, see [`read_circular`] and [`write_circular`].
///
/// [`read_circular`]: fn.read_circular.html
/// [`write_circular`]: fn.write_circular.html
pub trait BufferMemory {
    /// Fill `buf` with the bytes stored at `address`.
    fn read(&self, address: BufferAddress, buf: &mut [u8]) -> Result<()>;

    /// Store `data` at `address`.
    fn write(&mut self, address: BufferAddress, data: &[u8]) -> Result<()>;
}

/// Memory backed by two contiguous host allocations.
pub struct RingMemory {
    region: usize,
    rx: Vec<u8>,
    tx: Vec<u8>,
}

impl RingMemory {
    /// Allocate `region` bytes per session and direction.
    pub fn new(max_sessions: usize, region: usize) -> Self {
        RingMemory {
            region,
            rx: vec![0; max_sessions * region],
            tx: vec![0; max_sessions * region],
        }
    }

    fn range(&self, address: BufferAddress, len: usize) -> Result<core::ops::Range<usize>> {
        if address.offset + len > self.region {
            return Err(InternalError::MemoryRange { offset: address.offset, len }.into());
        }
        let start = address.session.index() * self.region + address.offset;
        if start + len > self.rx.len() {
            return Err(Error::Memory(address));
        }
        Ok(start..start + len)
    }
}

impl BufferMemory for RingMemory {
    fn read(&self, address: BufferAddress, buf: &mut [u8]) -> Result<()> {
        let range = self.range(address, buf.len())?;
        let memory = match address.direction {
            Direction::Rx => &self.rx,
            Direction::Tx => &self.tx,
        };
        buf.copy_from_slice(&memory[range]);
        Ok(())
    }

    fn write(&mut self, address: BufferAddress, data: &[u8]) -> Result<()> {
        let range = self.range(address, data.len())?;
        let memory = match address.direction {
            Direction::Rx => &mut self.rx,
            Direction::Tx => &mut self.tx,
        };
        memory[range].copy_from_slice(data);
        Ok(())
    }
}

/// Split a circular access of `len` bytes at `start` into at most two linear pieces.
fn split(start: TcpSeqNumber, len: usize, region: usize) -> [(usize, usize); 2] {
    let offset = start.offset(region);
    let first = len.min(region - offset);
    [(offset, first), (0, len - first)]
}

/// Read `buf.len()` bytes of a session's region starting at sequence number `start`.
pub fn read_circular<M: BufferMemory + ?Sized>(
    memory: &M,
    direction: Direction,
    session: SessionId,
    start: TcpSeqNumber,
    region: usize,
    buf: &mut [u8],
) -> Result<()> {
    let [(offset, first), (_, second)] = split(start, buf.len(), region);
    let (head, tail) = buf.split_at_mut(first);
    memory.read(BufferAddress { direction, session, offset }, head)?;
    if second > 0 {
        memory.read(BufferAddress { direction, session, offset: 0 }, tail)?;
    }
    Ok(())
}

/// Write `data` into a session's region starting at sequence number `start`.
pub fn write_circular<M: BufferMemory + ?Sized>(
    memory: &mut M,
    direction: Direction,
    session: SessionId,
    start: TcpSeqNumber,
    region: usize,
    data: &[u8],
) -> Result<()> {
    let [(offset, first), (_, second)] = split(start, data.len(), region);
    memory.write(BufferAddress { direction, session, offset }, &data[..first])?;
    if second > 0 {
        memory.write(BufferAddress { direction, session, offset: 0 }, &data[first..])?;
    }
    Ok(())
}
