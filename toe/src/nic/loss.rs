//! Simulated frame loss.

/// Deterministic pseudo-random loss.
///
/// Simulates uniform losses and burst losses. The latter work as a pulse: frames may only be lost
/// while the countdown is below the threshold.
#[derive(Copy, Clone, Debug, Hash)]
pub struct PrngLoss {
    /// Frames are only lost while `count` is below this.
    pub threshold: u32,
    /// Countdown through one pulse.
    pub count: u32,
    /// Value of `count` after it passed `0`.
    pub reset: u32,
    /// Loss rate as a (0, 32)-bit fixed point number.
    ///
    /// Or `None` for no loss at all, which can be used to temporarily turn loss off.
    pub lossrate: Option<u32>,
    /// The current prng state, the seed at the start.
    pub prng: Xoroshiro256,
}

/// The Xoroshiro256** generator.
#[derive(Copy, Clone, Debug, Hash)]
pub struct Xoroshiro256 {
    state: [u64; 4],
}

impl PrngLoss {
    /// Never lose a frame.
    pub fn none() -> Self {
        PrngLoss::uniform(None, 0)
    }

    /// Lose frames independently of each other.
    pub fn uniform(rate: Option<u32>, seed: u64) -> Self {
        PrngLoss {
            threshold: 1,
            count: 0,
            reset: 0,
            lossrate: rate,
            prng: Xoroshiro256::new(seed),
        }
    }

    /// Lose `high` frames out of every `length`.
    pub fn pulsed(high: u32, length: u32) -> Self {
        assert!(length > 0, "Pulse length must not be zero");
        assert!(high <= length, "Length of high signals must be shorter than total length");
        PrngLoss {
            threshold: high,
            count: length - 1,
            reset: length - 1,
            lossrate: Some(u32::max_value()),
            prng: Xoroshiro256::new(0),
        }
    }

    /// Decide the fate of the next frame, `true` if it is lost.
    pub fn next(&mut self) -> bool {
        let in_window = self.count < self.threshold;
        let fate = self.lossrate.map_or(false, |rate| self.roll() <= rate);
        self.count = self.count.checked_sub(1).unwrap_or(self.reset);
        fate && in_window
    }

    fn roll(&mut self) -> u32 {
        (self.prng.next() & u64::from(!0u32)) as u32
    }
}

impl Default for PrngLoss {
    fn default() -> Self {
        PrngLoss::none()
    }
}

impl Xoroshiro256 {
    pub fn new(seed: u64) -> Self {
        Xoroshiro256 {
            state: [seed, 0, 0, 0],
        }
    }

    pub fn next(&mut self) -> u64 {
        let s = &mut self.state;
        let result = s[1]
            .wrapping_mul(5)
            .rotate_left(7)
            .wrapping_mul(9);

        let t = s[1] << 17;

        s[2] ^= s[0];
        s[3] ^= s[1];
        s[1] ^= s[2];
        s[0] ^= s[3];

        s[2] ^= t;
        s[3] = s[3].rotate_left(45);

        result
    }
}
