//! Parsing and emission of the IPv4 and TCP headers handled by the engines.
//!
//! Only what the protocol core needs is modelled: an option-less IPv4 header and a TCP header
//! whose sole emitted option is the maximum segment size. Checksums are always verified on input
//! and always filled on output.
pub(crate) mod checksum;
mod error;
mod ipv4;
mod tcp;

pub use std::net::Ipv4Addr as Ipv4Address;

pub use self::error::{Error, Result};

pub use self::ipv4::{
    Protocol as IpProtocol,
    Repr as Ipv4Repr,
    HEADER_LEN as IPV4_HEADER_LEN,
};

pub use self::tcp::{
    Flags as TcpFlags,
    Repr as TcpRepr,
    SeqNumber as TcpSeqNumber,
    HEADER_LEN as TCP_HEADER_LEN,
};

/// A byte range of a header field.
pub(crate) type Field = core::ops::Range<usize>;
