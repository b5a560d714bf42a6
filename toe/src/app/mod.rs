//! The application interfaces.
//!
//! Applications talk to the engine through [`AppRequest`]s and collect [`AppResponse`]s,
//! [`Notification`]s and [`Received`] data. None of these calls block: every request is answered
//! by a later response, which may be observed after some calls to [`Toe::poll`].
//!
//! The transmit interface handles opens, closes and sends, the receive interface handles listens
//! and reads and forwards notifications.
//!
//! [`AppRequest`]: enum.AppRequest.html
//! [`AppResponse`]: enum.AppResponse.html
//! [`Notification`]: enum.Notification.html
//! [`Received`]: struct.Received.html
//! [`Toe::poll`]: ../struct.Toe.html#method.poll
use crate::table::{FourTuple, SessionId};
use crate::wire::Ipv4Address;

mod rx;
mod tx;

pub use self::rx::RxAppInterface;
pub use self::tx::TxAppInterface;

/// A request of the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppRequest {
    /// Accept connections on a static port.
    Listen { port: u16 },
    /// Open a connection from an ephemeral port.
    Connect { remote: Ipv4Address, port: u16 },
    /// Queue data on an open connection.
    ///
    /// The request is accepted whole or not at all.
    Send { session: SessionId, data: Vec<u8> },
    /// Read up to `max_len` bytes received in order.
    Receive { session: SessionId, max_len: usize },
    /// Send a FIN once all queued data was sent.
    Close { session: SessionId },
}

/// The outcome of an active open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectStatus {
    Established,
    /// All ephemeral ports are in use.
    NoFreePort,
    /// All session ids are in use.
    NoFreeSession,
    /// The SYN went unanswered through all retries.
    TimedOut,
    /// The peer reset, or the session was not closed.
    Refused,
}

/// The outcome of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SendStatus {
    Ok,
    /// The data does not fit the free transmit buffer.
    NoSpace,
    /// The connection does not accept data.
    NoConnection,
}

/// A response to an [`AppRequest`](enum.AppRequest.html).
///
/// `Receive` requests are answered by [`Received`](struct.Received.html) data, `Close` requests
/// are not answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppResponse {
    Listen { port: u16, ok: bool },
    Connect {
        session: Option<SessionId>,
        remote: Ipv4Address,
        port: u16,
        status: ConnectStatus,
    },
    Send {
        session: SessionId,
        accepted: usize,
        /// The free transmit buffer after this request.
        max_writable: usize,
        status: SendStatus,
    },
}

/// Asynchronous news about a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// A passive open completed.
    Accepted { session: SessionId, tuple: FourTuple },
    /// New data is available in order.
    Data { session: SessionId, len: usize },
    /// The peer sent its FIN.
    PeerClosed { session: SessionId },
    /// The peer reset the connection.
    Reset { session: SessionId },
    /// Retransmissions were exhausted and the session closed.
    TimedOut { session: SessionId },
}

/// Data read for a `Receive` request, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub session: SessionId,
    pub data: Vec<u8>,
}

/// The receive engine's verdict on an active open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct OpenStatus {
    pub session: SessionId,
    pub status: ConnectStatus,
}

/// Requests of the connection setup path of the transmit interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectRequest {
    Open { remote: Ipv4Address, port: u16 },
    Close(SessionId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SendRequest {
    pub session: SessionId,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RxRequest {
    Listen(u16),
    Receive { session: SessionId, max_len: usize },
}
