use core::fmt;

/// The error type for parsing of inbound frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the minimum header, or a length field claims more data than
    /// the frame holds.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    WrongChecksum,

    /// An incoming packet could not be recognized and was dropped.
    ///
    /// E.g. an IPv4 packet carrying a protocol other than TCP.
    Unrecognized,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: a TCP segment with both SYN and FIN flags set; a header length smaller than the
    /// fixed header.
    Malformed,

    /// Parsing depends on a feature that is not implemented, such as IP fragmentation.
    Unsupported,
}

/// The result type for packet parsing.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Unrecognized  => write!(f, "unrecognized packet"),
            Error::Malformed     => write!(f, "malformed packet"),
            Error::Unsupported   => write!(f, "unsupported feature"),
        }
    }
}

impl std::error::Error for Error {}
