//! Software links between engines.
//!
//! The engine consumes and produces raw IPv4 frames, it does not care how they travel. The
//! [`Loopback`] connects two engines directly and may lose frames on purpose, which is how the
//! end-to-end tests and the demo run.
//!
//! [`Loopback`]: struct.Loopback.html
mod loopback;
mod loss;

pub use self::loopback::{Loopback, Wire};
pub use self::loss::{PrngLoss, Xoroshiro256};
