//! Engine configuration.
use crate::error::{Error, Result};
use crate::storage::MAX_REGION_SIZE;
use crate::time::Duration;
use crate::wire::Ipv4Address;

/// Number of rungs of the delayed acknowledgement ladder.
pub const ACK_LADDER_LEN: usize = 9;

/// The event raised when the probe timer of a session expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    /// Try to send pending data, as if the application pushed again.
    Transmit,
    /// Retransmit from the oldest unacknowledged byte, a single byte into a closed window.
    Retransmit,
}

/// Parameters of a [`Toe`](../struct.Toe.html).
///
/// Start from `Config::default()` and change what is needed, `Toe::new` validates the result.
#[derive(Debug, Clone)]
pub struct Config {
    /// The address all sessions are bound to.
    pub local_addr: Ipv4Address,
    /// Number of concurrent sessions, the size of every per-session table.
    pub max_sessions: usize,
    /// Largest payload of an outbound segment, announced in the SYN options.
    pub mss: u16,
    /// Bytes of circular buffer per session and direction, a power of two.
    pub buffer_size: usize,
    /// Capacity of every internal queue.
    pub queue_depth: usize,
    /// Timeouts of successive retransmissions, the last entry repeats.
    pub retransmit_schedule: Vec<Duration>,
    /// Retransmissions before a session is aborted.
    pub max_retries: u8,
    /// Interval of the zero window probe.
    pub probe_interval: Duration,
    /// What an expired probe timer raises.
    pub probe_event: ProbeEvent,
    /// Time spent in `TIME_WAIT` before the session is released.
    pub time_wait: Duration,
    /// Delays of coalesced acknowledgements, indexed by how many were coalesced already.
    pub ack_delay: [Duration; ACK_LADDER_LEN],
    /// Acknowledge every segment immediately.
    pub nodelay: bool,
    /// Keep sending after the peer closed its side, until the application closes.
    pub half_close: bool,
    /// How many ports of the dynamic range are handed out for active opens.
    pub ephemeral_ports: usize,
    /// Congestion window of a fresh session, in segments.
    pub initial_window: u16,
    /// Slow start threshold of a fresh session.
    pub initial_ssthresh: u32,
    /// Port table words cleared per poll during the initial sweep.
    pub port_sweep_step: usize,
    /// Key of the initial sequence number hash, random if absent.
    pub isn_key: Option<[u8; 16]>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            local_addr: Ipv4Address::new(10, 0, 0, 1),
            max_sessions: 64,
            mss: 1460,
            buffer_size: MAX_REGION_SIZE,
            queue_depth: 64,
            retransmit_schedule: [1, 3, 6, 12, 30].iter()
                .map(|&secs| Duration::from_secs(secs))
                .collect(),
            max_retries: 4,
            probe_interval: Duration::from_millis(100),
            probe_event: ProbeEvent::Retransmit,
            time_wait: Duration::from_secs(60),
            ack_delay: [
                Duration::from_millis(100),
                Duration::from_millis(64),
                Duration::from_millis(32),
                Duration::from_millis(16),
                Duration::from_millis(8),
                Duration::from_millis(4),
                Duration::from_millis(2),
                Duration::from_millis(1),
                Duration::from_millis(0),
            ],
            nodelay: false,
            half_close: false,
            ephemeral_ports: 1 << 15,
            initial_window: 2,
            initial_ssthresh: 0xffff,
            port_sweep_step: 64,
            isn_key: None,
        }
    }
}

impl Config {
    /// Check the internal consistency of all parameters.
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 || self.max_sessions > usize::from(u16::max_value()) {
            return Err(Error::Config("session count must be within 1..=65535"));
        }
        if !self.buffer_size.is_power_of_two() || self.buffer_size > MAX_REGION_SIZE {
            return Err(Error::Config("buffer size must be a power of two of at most 64 KiB"));
        }
        if self.mss == 0 || usize::from(self.mss) >= self.buffer_size {
            return Err(Error::Config("mss must be positive and smaller than the buffer"));
        }
        if self.queue_depth < 4 {
            return Err(Error::Config("queues need room for at least four entries"));
        }
        if self.retransmit_schedule.is_empty() {
            return Err(Error::Config("retransmit schedule is empty"));
        }
        if self.retransmit_schedule.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(Error::Config("retransmit schedule must not decrease"));
        }
        if self.ack_delay.windows(2).any(|pair| pair[0] < pair[1]) {
            return Err(Error::Config("acknowledgement delays must not increase"));
        }
        if self.ephemeral_ports == 0 || self.ephemeral_ports > 1 << 15 {
            return Err(Error::Config("ephemeral port count must be within 1..=32768"));
        }
        if self.initial_window == 0 || self.port_sweep_step == 0 {
            return Err(Error::Config("initial window and sweep step must be positive"));
        }
        Ok(())
    }

    /// The window advertised by a session with an empty receive buffer.
    pub(crate) fn max_window(&self) -> u16 {
        (self.buffer_size - 1) as u16
    }
}
