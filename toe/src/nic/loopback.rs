//! Two engines on one simulated link.
use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::stack::Toe;
use crate::storage::BufferMemory;
use crate::time::Instant;
use super::PrngLoss;

/// One direction of a [`Loopback`](struct.Loopback.html).
///
/// Frames taken from the sender wait here until the receiver accepts them.
#[derive(Debug, Default)]
pub struct Wire {
    in_flight: VecDeque<Vec<u8>>,
    loss: PrngLoss,
    captured: Option<Vec<Vec<u8>>>,
    delivered: u64,
    lost: u64,
}

/// A software link between two engines.
///
/// Frames move between the engines in the order they were sent, each direction may lose frames
/// according to its own [`PrngLoss`](struct.PrngLoss.html).
#[derive(Debug, Default)]
pub struct Loopback {
    to_right: Wire,
    to_left: Wire,
}

impl Wire {
    /// Replace the loss simulation.
    pub fn set_loss(&mut self, loss: PrngLoss) {
        self.loss = loss;
    }

    /// Start keeping a copy of every frame entering the wire, lost ones included.
    pub fn capture(&mut self) {
        self.captured.get_or_insert_with(Vec::new);
    }

    /// Take the frames captured so far.
    pub fn take_captured(&mut self) -> Vec<Vec<u8>> {
        self.captured.as_mut().map(core::mem::take).unwrap_or_default()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn lost(&self) -> u64 {
        self.lost
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    fn pull<M: BufferMemory>(&mut self, from: &mut Toe<M>) {
        while let Some(frame) = from.transmit_frame() {
            if let Some(captured) = self.captured.as_mut() {
                captured.push(frame.clone());
            }
            if self.loss.next() {
                net_trace!("loopback lost a frame of {} bytes", frame.len());
                self.lost += 1;
            } else {
                self.in_flight.push_back(frame);
            }
        }
    }

    fn push<M: BufferMemory>(&mut self, to: &mut Toe<M>) -> Result<()> {
        while let Some(frame) = self.in_flight.pop_front() {
            match to.receive_frame(frame.clone()) {
                Ok(()) => self.delivered += 1,
                Err(Error::Backpressure) => {
                    self.in_flight.push_front(frame);
                    break;
                },
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

impl Loopback {
    /// A link that loses nothing.
    pub fn new() -> Self {
        Loopback::default()
    }

    /// A link with loss in both directions.
    pub fn lossy(to_right: PrngLoss, to_left: PrngLoss) -> Self {
        let mut link = Loopback::new();
        link.to_right.set_loss(to_right);
        link.to_left.set_loss(to_left);
        link
    }

    /// The direction from the left to the right engine.
    pub fn to_right(&mut self) -> &mut Wire {
        &mut self.to_right
    }

    /// The direction from the right to the left engine.
    pub fn to_left(&mut self) -> &mut Wire {
        &mut self.to_left
    }

    /// Move frames in both directions, as far as the receivers accept them.
    pub fn exchange<L, R>(&mut self, left: &mut Toe<L>, right: &mut Toe<R>) -> Result<()>
    where
        L: BufferMemory,
        R: BufferMemory,
    {
        self.to_right.pull(left);
        self.to_left.pull(right);
        self.to_right.push(right)?;
        self.to_left.push(left)
    }

    /// Poll both engines once at `now`, then exchange frames.
    pub fn step<L, R>(&mut self, left: &mut Toe<L>, right: &mut Toe<R>, now: Instant) -> Result<()>
    where
        L: BufferMemory,
        R: BufferMemory,
    {
        left.poll(now)?;
        right.poll(now)?;
        self.exchange(left, right)
    }

    /// Step until both engines are settled and nothing is on the link, at most `max_rounds` times.
    ///
    /// Returns whether that state was reached.
    pub fn settle<L, R>(
        &mut self,
        left: &mut Toe<L>,
        right: &mut Toe<R>,
        now: Instant,
        max_rounds: usize,
    ) -> Result<bool>
    where
        L: BufferMemory,
        R: BufferMemory,
    {
        for _ in 0..max_rounds {
            if self.is_quiet(left, right, now) {
                return Ok(true);
            }
            self.step(left, right, now)?;
        }
        Ok(self.is_quiet(left, right, now))
    }

    fn is_quiet<L, R>(&self, left: &mut Toe<L>, right: &mut Toe<R>, now: Instant) -> bool
    where
        L: BufferMemory,
        R: BufferMemory,
    {
        self.to_right.is_empty()
            && self.to_left.is_empty()
            && left.is_settled(now)
            && right.is_settled(now)
    }
}
