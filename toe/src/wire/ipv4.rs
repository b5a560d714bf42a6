use byteorder::{ByteOrder, NetworkEndian};

use super::{checksum, Error, Ipv4Address, Result};

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    pub enum Protocol(u8) {
        /// Internet control message protocol.
        Icmp = 0x01,
        /// Transmission control protocol.
        Tcp = 0x06,
        /// User datagram protocol.
        Udp = 0x11,
    }
}

mod field {
    use crate::wire::Field;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const DSCP_ECN: usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
}

/// Length of an IPv4 header without options, which is the only one ever emitted.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

const FLAG_MORE_FRAGS: u16 = 0x2000;
const FLAG_DONT_FRAG: u16 = 0x4000;
const FRAG_OFFSET_MASK: u16 = 0x1fff;

/// A high-level representation of an IPv4 header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_addr:    Ipv4Address,
    pub dst_addr:    Ipv4Address,
    pub protocol:    Protocol,
    pub payload_len: usize,
    pub hop_limit:   u8,
}

impl Repr {
    /// Parse an IPv4 datagram, returning the representation and the payload it carries.
    ///
    /// The header checksum is always verified.
    pub fn parse(buffer: &[u8]) -> Result<(Repr, &[u8])> {
        if buffer.len() < HEADER_LEN { return Err(Error::Truncated) }
        if buffer[field::VER_IHL] >> 4 != 4 { return Err(Error::Malformed) }

        let header_len = usize::from(buffer[field::VER_IHL] & 0x0f) * 4;
        if header_len < HEADER_LEN { return Err(Error::Malformed) }
        let total_len = usize::from(NetworkEndian::read_u16(&buffer[field::LENGTH]));
        if total_len < header_len { return Err(Error::Malformed) }
        if buffer.len() < total_len { return Err(Error::Truncated) }

        if checksum::data(&buffer[..header_len]) != !0 { return Err(Error::WrongChecksum) }

        let flg_off = NetworkEndian::read_u16(&buffer[field::FLG_OFF]);
        if flg_off & FLAG_MORE_FRAGS != 0 || flg_off & FRAG_OFFSET_MASK != 0 {
            return Err(Error::Unsupported)
        }

        let repr = Repr {
            src_addr: Ipv4Address::from(NetworkEndian::read_u32(&buffer[field::SRC_ADDR])),
            dst_addr: Ipv4Address::from(NetworkEndian::read_u32(&buffer[field::DST_ADDR])),
            protocol: Protocol::from(buffer[field::PROTOCOL]),
            payload_len: total_len - header_len,
            hop_limit: buffer[field::TTL],
        };

        Ok((repr, &buffer[header_len..total_len]))
    }

    /// Return the length of the header that will be emitted from this representation.
    pub fn buffer_len(&self) -> usize {
        HEADER_LEN
    }

    /// Emit the header into the start of `buffer`, including its checksum.
    ///
    /// The buffer must be at least `HEADER_LEN` bytes long.
    pub fn emit(&self, buffer: &mut [u8]) {
        let header = &mut buffer[..HEADER_LEN];
        header[field::VER_IHL] = 0x40 | (HEADER_LEN / 4) as u8;
        header[field::DSCP_ECN] = 0;
        NetworkEndian::write_u16(&mut header[field::LENGTH], (HEADER_LEN + self.payload_len) as u16);
        NetworkEndian::write_u16(&mut header[field::IDENT], 0);
        NetworkEndian::write_u16(&mut header[field::FLG_OFF], FLAG_DONT_FRAG);
        header[field::TTL] = self.hop_limit;
        header[field::PROTOCOL] = self.protocol.into();
        NetworkEndian::write_u16(&mut header[field::CHECKSUM], 0);
        NetworkEndian::write_u32(&mut header[field::SRC_ADDR], self.src_addr.into());
        NetworkEndian::write_u32(&mut header[field::DST_ADDR], self.dst_addr.into());

        let sum = !checksum::data(header);
        NetworkEndian::write_u16(&mut header[field::CHECKSUM], sum);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    static PACKET_BYTES: [u8; 30] = [
        0x45, 0x00, 0x00, 0x1e,
        0x01, 0x02, 0x62, 0x03,
        0x1a, 0x01, 0xd5, 0x6e,
        0x11, 0x12, 0x13, 0x14,
        0x21, 0x22, 0x23, 0x24,
        0xaa, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00,
        0x00, 0xff,
    ];

    fn packet_repr() -> Repr {
        Repr {
            src_addr: Ipv4Address::new(0x11, 0x12, 0x13, 0x14),
            dst_addr: Ipv4Address::new(0x21, 0x22, 0x23, 0x24),
            protocol: Protocol::Icmp,
            payload_len: 10,
            hop_limit: 64,
        }
    }

    #[test]
    fn emitted_header_verifies() {
        let repr = packet_repr();
        let mut bytes = vec![0xa5; repr.buffer_len() + repr.payload_len];
        repr.emit(&mut bytes);
        let (parsed, payload) = Repr::parse(&bytes).unwrap();
        assert_eq!(parsed, repr);
        assert_eq!(payload.len(), 10);
    }

    #[test]
    fn fragments_unsupported() {
        // Flags 0x6203 carry a fragment offset.
        let mut bytes = PACKET_BYTES;
        bytes[10] = 0;
        bytes[11] = 0;
        let sum = !checksum::data(&bytes[..HEADER_LEN]);
        NetworkEndian::write_u16(&mut bytes[10..12], sum);
        assert_eq!(Repr::parse(&bytes), Err(Error::Unsupported));
    }

    #[test]
    fn corrupted_checksum() {
        let repr = packet_repr();
        let mut bytes = vec![0; repr.buffer_len() + repr.payload_len];
        repr.emit(&mut bytes);
        bytes[field::TTL] ^= 0x01;
        assert_eq!(Repr::parse(&bytes), Err(Error::WrongChecksum));
    }

    #[test]
    fn truncated() {
        assert_eq!(Repr::parse(&PACKET_BYTES[..12]), Err(Error::Truncated));
        // Total length claims more than the buffer holds.
        assert_eq!(Repr::parse(&PACKET_BYTES[..25]), Err(Error::Truncated));
    }
}
