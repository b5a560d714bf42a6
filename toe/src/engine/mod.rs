//! The segment engines.
//!
//! The [`RxEngine`] validates inbound frames and applies the TCP state machine, the [`TxEngine`]
//! turns events into outbound frames. Neither holds per-session state of its own: everything
//! lives in the tables and is read for each segment.
//!
//! [`RxEngine`]: struct.RxEngine.html
//! [`TxEngine`]: struct.TxEngine.html
mod isn;
mod rx;
mod tx;

pub use self::isn::IsnGenerator;
pub use self::rx::RxEngine;
pub use self::tx::TxEngine;
