//! The protocol core of a TCP offload engine.
//!
//! ## Overview
//!
//! The engine terminates TCP over IPv4 for many concurrent sessions. It is built from small
//! processes, each owning one table or doing one step of segment processing, that talk only
//! through bounded queues:
//!
//! 1. [Session tables](table/index.html): the four-tuple lookup, ports, connection states and the
//!    sequence state of both directions.
//! 2. [Timers](timer/index.html): retransmission, zero window probes and `TIME_WAIT`.
//! 3. [Events](event/index.html): everything that asks for a segment to be sent, with delayed
//!    acknowledgements coalesced.
//! 4. [Engines](engine/index.html): inbound segment processing and outbound segment generation.
//! 5. [Application interfaces](app/index.html): listen, connect, send, receive and close.
//!
//! Payload never passes through the tables. It is written to and read from a per-session
//! circular [buffer memory](storage/index.html) addressed by sequence number.
//!
//! ## Driving the engine
//!
//! A [`Toe`] does nothing on its own. Each call to [`Toe::poll`] gives every process one turn in a
//! fixed order at the time passed in. Frames and application requests are queued in between
//! calls and results are collected afterwards. Nothing in here reads a clock, spawns a thread or
//! blocks, so a test can replay any exchange exactly. The [`nic`](nic/index.html) module connects
//! two engines over a simulated link.
//!
//! ```
//! use toe::{AppRequest, Config, Toe};
//! use toe::time::Instant;
//!
//! let mut toe = Toe::new(Config::default()).unwrap();
//! toe.settle(Instant::ZERO, 1_000).unwrap();
//! toe.submit(AppRequest::Listen { port: 80 }).unwrap();
//! toe.settle(Instant::ZERO, 100).unwrap();
//! assert!(toe.next_response().is_some());
//! ```
//!
//! [`Toe`]: struct.Toe.html
//! [`Toe::poll`]: struct.Toe.html#method.poll
#[macro_use] mod macros;

pub mod app;
pub mod config;
pub mod engine;
mod error;
pub mod event;
mod fifo;
mod link;
pub mod nic;
mod stack;
mod stats;
pub mod storage;
pub mod table;
pub mod time;
pub mod timer;
pub mod wire;

#[cfg(test)]
mod tests;

pub use self::app::{AppRequest, AppResponse, ConnectStatus, Notification, Received, SendStatus};
pub use self::config::Config;
pub use self::error::{Error, InternalError, Result};
pub use self::stack::Toe;
pub use self::stats::Statistics;
pub use self::table::{FourTuple, SessionId, TcpState};
