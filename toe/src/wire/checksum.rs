//! RFC 1071 internet checksum.
//!
//! Partial sums are accumulated over separate pieces of a segment (pseudo header, header, payload)
//! and folded into the final complement only once at the end.
use byteorder::{ByteOrder, NetworkEndian};

use super::{IpProtocol, Ipv4Address};

fn propagate_carries(word: u32) -> u16 {
    let sum = (word >> 16) + (word & 0xffff);
    ((sum >> 16) as u16) + (sum as u16)
}

/// Compute an RFC 1071 compliant checksum (without the final complement).
pub(crate) fn data(mut data: &[u8]) -> u16 {
    let mut accum = 0;

    // Sum 32-byte chunks separately so the accumulator can not overflow on jumbo payloads.
    const CHUNK_SIZE: usize = 32;
    while data.len() >= CHUNK_SIZE {
        let mut chunk = 0u32;
        let mut d = &data[..CHUNK_SIZE];
        while d.len() >= 2 {
            chunk += NetworkEndian::read_u16(d) as u32;
            d = &d[2..];
        }
        accum = u32::from(propagate_carries(accum + chunk));
        data = &data[CHUNK_SIZE..];
    }

    while data.len() >= 2 {
        accum += NetworkEndian::read_u16(data) as u32;
        data = &data[2..];
    }

    // The odd trailing byte is padded with zero.
    if let Some(&value) = data.first() {
        accum += (value as u32) << 8;
    }

    propagate_carries(accum)
}

/// Combine several RFC 1071 compliant checksums.
pub(crate) fn combine(checksums: &[u16]) -> u16 {
    let mut accum: u32 = 0;
    for &word in checksums {
        accum += word as u32;
    }
    propagate_carries(accum)
}

/// Compute the IPv4 pseudo header checksum.
pub(crate) fn pseudo_header(
    src_addr: Ipv4Address,
    dst_addr: Ipv4Address,
    protocol: IpProtocol,
    length: u16,
) -> u16 {
    let mut proto_len = [0u8; 4];
    proto_len[1] = protocol.into();
    NetworkEndian::write_u16(&mut proto_len[2..4], length);

    combine(&[
        data(&src_addr.octets()),
        data(&dst_addr.octets()),
        data(&proto_len[..]),
    ])
}
