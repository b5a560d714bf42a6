//! Initial sequence numbers as recommended by RFC 6528.
//!
//! The keyed hash is SipHash-2-4, see
//!
//! > SipHash: a fast short-input PRF, Jean-Philippe Aumasson and Daniel J. Bernstein
use core::convert::TryInto;

use crate::table::FourTuple;
use crate::time::Instant;
use crate::wire::TcpSeqNumber;

/// Derives initial sequence numbers from the connection and a clock.
///
/// > ISN = M + SipHash-2-4(secretkey, localip, localport, remoteip, remoteport)
///
/// where `M` advances once every 4 milliseconds.
#[derive(Clone)]
pub struct IsnGenerator {
    keys: (u64, u64),
}

// The SipHash initialization constants, as ASCII text.
const IV: [&[u8; 8]; 4] = [
    b"somepseu",
    b"dorandom",
    b"lygenera",
    b"tedbytes"];

struct State {
    v0: u64,
    v1: u64,
    v2: u64,
    v3: u64,
}

impl IsnGenerator {
    /// Derive a key from the standard `RandomState`.
    ///
    /// The hashes of `0u64` and `1u64` under one freshly seeded hasher form the key.
    pub fn from_std_hash() -> Self {
        use std::collections::hash_map::RandomState;
        use std::hash::{BuildHasher, Hasher};

        let hash = RandomState::new().build_hasher();
        let tag = |value: u64| {
            let mut hash = hash.clone();
            hash.write_u64(value);
            hash.finish()
        };

        IsnGenerator { keys: (tag(0), tag(1)) }
    }

    /// Use a fixed secret key, for reproducible sequence numbers.
    pub fn from_secret_key_bytes(bytes: [u8; 16]) -> Self {
        let (a, b) = bytes.split_at(8);
        let a = a.try_into().map(u64::from_le_bytes).unwrap_or_default();
        let b = b.try_into().map(u64::from_le_bytes).unwrap_or_default();
        IsnGenerator { keys: (a, b) }
    }

    /// The initial sequence number of a connection at `time`.
    pub fn get_isn(&self, connection: FourTuple, time: Instant) -> TcpSeqNumber {
        let mut state = State::init(self.keys.0, self.keys.1);
        let m = u64::from(u32::from(connection.local))
            | u64::from(u32::from(connection.remote)) << 32;
        let p = u64::from(connection.local_port)
            | u64::from(connection.remote_port) << 16
            // Message length = 12
            | 12_u64 << 56;
        state.absorb(m);
        state.absorb(p);
        let hash = state.finalize();

        TcpSeqNumber(hash as i32) + (time.total_millis() / 4) as usize
    }
}

impl core::fmt::Debug for IsnGenerator {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("IsnGenerator { .. }")
    }
}

impl State {
    const SIP_C: usize = 2;
    const SIP_D: usize = 4;

    fn init(k0: u64, k1: u64) -> Self {
        State {
            v0: u64::from_be_bytes(*IV[0]) ^ k0,
            v1: u64::from_be_bytes(*IV[1]) ^ k1,
            v2: u64::from_be_bytes(*IV[2]) ^ k0,
            v3: u64::from_be_bytes(*IV[3]) ^ k1,
        }
    }

    fn round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(13);
        self.v1 ^= self.v0;
        self.v0 = self.v0.rotate_left(32);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(16);
        self.v3 ^= self.v2;
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v3 = self.v3.rotate_left(21);
        self.v3 ^= self.v0;
        self.v2 = self.v2.wrapping_add(self.v1);
        self.v1 = self.v1.rotate_left(17);
        self.v1 ^= self.v2;
        self.v2 = self.v2.rotate_left(32);
    }

    /// Process one 8-byte block. The caller absorbs the length block last.
    fn absorb(&mut self, m: u64) {
        self.v3 ^= m;
        (0..Self::SIP_C).for_each(|_| self.round());
        self.v0 ^= m;
    }

    fn finalize(mut self) -> u64 {
        self.v2 ^= 0xff;
        (0..Self::SIP_D).for_each(|_| self.round());
        self.v0 ^ self.v1 ^ self.v2 ^ self.v3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Ipv4Address;

    /// Appendix A of the SipHash paper.
    #[test]
    fn paper_test_vector() {
        let k0 = u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes());
        let k1 = u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes());

        let mut state = State::init(k0, k1);
        state.absorb(u64::from_le_bytes(0x0001020304050607_u64.to_be_bytes()));
        state.absorb(u64::from_le_bytes(0x08090a0b0c0d0e0f_u64.to_be_bytes()));

        assert_eq!(state.finalize(), 0xa129ca6149be45e5);
    }

    fn tuple(remote_port: u16) -> FourTuple {
        FourTuple {
            local: Ipv4Address::new(10, 0, 0, 1),
            local_port: 0x8000,
            remote: Ipv4Address::new(10, 0, 0, 2),
            remote_port,
        }
    }

    #[test]
    fn clock_advances_isn() {
        let isn = IsnGenerator::from_secret_key_bytes([7; 16]);
        let early = isn.get_isn(tuple(80), Instant::ZERO);
        assert_eq!(isn.get_isn(tuple(80), Instant::from_millis(3)), early);
        assert_eq!(isn.get_isn(tuple(80), Instant::from_millis(40)), early + 10);
        assert_ne!(isn.get_isn(tuple(81), Instant::ZERO), early);
    }
}
