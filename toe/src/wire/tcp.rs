use core::{cmp, fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{checksum, Error, IpProtocol, Ipv4Address, Result};

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>. Sequence numbers
/// do not have a discontiguity when compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl SeqNumber {
    /// The later of two sequence numbers in circular order.
    pub fn max(self, other: Self) -> Self {
        if self < other { other } else { self }
    }

    /// The earlier of two sequence numbers in circular order.
    pub fn min(self, other: Self) -> Self {
        if self < other { self } else { other }
    }

    /// The low bits used to address a circular buffer of `size` bytes, a power of two.
    pub fn offset(self, size: usize) -> usize {
        (self.0 as u32 as usize) & (size - 1)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as u32 as i32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as u32 as i32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

impl ops::Sub for SeqNumber {
    type Output = usize;

    /// The forward distance from `rhs` to `self` in sequence space.
    ///
    /// Callers compare first when `rhs` may lie ahead, the distance is modular otherwise.
    fn sub(self, rhs: SeqNumber) -> usize {
        self.0.wrapping_sub(rhs.0) as u32 as usize
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

/// A set of tcp flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub u16);

macro_rules! flag_accessors {
    ($($get:ident, $set:ident = $bit:path;)*) => {
        impl Flags {
            $(
                #[inline]
                pub fn $get(self) -> bool {
                    self.0 & $bit != 0
                }

                #[inline]
                pub fn $set(&mut self, value: bool) {
                    if value { self.0 |= $bit } else { self.0 &= !$bit }
                }
            )*
        }
    };
}

flag_accessors! {
    fin, set_fin = field::FLG_FIN;
    syn, set_syn = field::FLG_SYN;
    rst, set_rst = field::FLG_RST;
    psh, set_psh = field::FLG_PSH;
    ack, set_ack = field::FLG_ACK;
}

impl Flags {
    /// The number of sequence numbers occupied by control flags.
    pub fn sequence_len(self) -> usize {
        usize::from(self.syn()) + usize::from(self.fin())
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &(set, name) in &[
            (self.syn(), "SYN"),
            (self.fin(), "FIN"),
            (self.rst(), "RST"),
            (self.psh(), "PSH"),
            (self.ack(), "ACK"),
        ] {
            if set {
                write!(f, " {}", name)?;
            }
        }
        Ok(())
    }
}

mod field {
    use crate::wire::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) const FLG_FIN: u16 = 0x001;
    pub(crate) const FLG_SYN: u16 = 0x002;
    pub(crate) const FLG_RST: u16 = 0x004;
    pub(crate) const FLG_PSH: u16 = 0x008;
    pub(crate) const FLG_ACK: u16 = 0x010;

    pub(crate) const OPT_END: u8 = 0x00;
    pub(crate) const OPT_NOP: u8 = 0x01;
    pub(crate) const OPT_MSS: u8 = 0x02;
}

/// Length of a TCP header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// Length of the only option ever emitted, the maximum segment size.
const MSS_OPTION_LEN: usize = 4;

/// A high-level representation of a TCP segment header.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port:     u16,
    pub dst_port:     u16,
    pub flags:        Flags,
    pub seq_number:   SeqNumber,
    pub ack_number:   Option<SeqNumber>,
    pub window_len:   u16,
    pub max_seg_size: Option<u16>,
    pub payload_len:  usize,
}

impl Repr {
    /// Parse a segment carried in an IPv4 datagram from `src_addr` to `dst_addr`.
    ///
    /// Returns the header representation and the payload. The checksum covers the pseudo header
    /// and is always verified.
    pub fn parse<'a>(
        buffer: &'a [u8],
        src_addr: Ipv4Address,
        dst_addr: Ipv4Address,
    ) -> Result<(Repr, &'a [u8])> {
        if buffer.len() < HEADER_LEN { return Err(Error::Truncated) }
        let raw_flags = NetworkEndian::read_u16(&buffer[field::FLAGS]);
        let header_len = usize::from(raw_flags >> 12) * 4;
        if header_len < HEADER_LEN { return Err(Error::Malformed) }
        if buffer.len() < header_len { return Err(Error::Truncated) }

        let src_port = NetworkEndian::read_u16(&buffer[field::SRC_PORT]);
        let dst_port = NetworkEndian::read_u16(&buffer[field::DST_PORT]);
        if src_port == 0 || dst_port == 0 { return Err(Error::Malformed) }

        let pseudo = checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, buffer.len() as u16);
        if checksum::combine(&[pseudo, checksum::data(buffer)]) != !0 {
            return Err(Error::WrongChecksum)
        }

        let flags = Flags(raw_flags & 0x1ff);
        if flags.syn() && flags.fin() { return Err(Error::Malformed) }
        let ack_number = if flags.ack() {
            Some(SeqNumber(NetworkEndian::read_i32(&buffer[field::ACK_NUM])))
        } else {
            None
        };

        let mut max_seg_size = None;
        let mut options = &buffer[HEADER_LEN..header_len];
        while let Some(&kind) = options.first() {
            match kind {
                field::OPT_END => break,
                field::OPT_NOP => options = &options[1..],
                kind => {
                    let length = usize::from(*options.get(1).ok_or(Error::Truncated)?);
                    if length < 2 { return Err(Error::Malformed) }
                    let data = options.get(2..length).ok_or(Error::Truncated)?;
                    match (kind, length) {
                        (field::OPT_MSS, 4) => max_seg_size = Some(NetworkEndian::read_u16(data)),
                        (field::OPT_MSS, _) => return Err(Error::Malformed),
                        // Window scaling, SACK and timestamps are not negotiated.
                        _ => (),
                    }
                    options = &options[length..];
                }
            }
        }

        let payload = &buffer[header_len..];
        let repr = Repr {
            src_port,
            dst_port,
            flags,
            seq_number: SeqNumber(NetworkEndian::read_i32(&buffer[field::SEQ_NUM])),
            ack_number,
            window_len: NetworkEndian::read_u16(&buffer[field::WIN_SIZE]),
            max_seg_size,
            payload_len: payload.len(),
        };

        Ok((repr, payload))
    }

    /// Return the length of the header that will be emitted from this representation.
    pub fn header_len(&self) -> usize {
        match self.max_seg_size {
            Some(_) => HEADER_LEN + MSS_OPTION_LEN,
            None => HEADER_LEN,
        }
    }

    /// Return the number of sequence numbers this segment occupies.
    pub fn sequence_len(&self) -> usize {
        self.payload_len + self.flags.sequence_len()
    }

    /// Emit the header into `buffer`, whose tail after the header already holds the payload.
    ///
    /// The checksum is accumulated over the pseudo header, the header and the payload and folded
    /// once at the end.
    pub fn emit(&self, buffer: &mut [u8], src_addr: Ipv4Address, dst_addr: Ipv4Address) {
        let header_len = self.header_len();
        let mut flags = self.flags;
        flags.set_ack(self.ack_number.is_some());

        NetworkEndian::write_u16(&mut buffer[field::SRC_PORT], self.src_port);
        NetworkEndian::write_u16(&mut buffer[field::DST_PORT], self.dst_port);
        NetworkEndian::write_i32(&mut buffer[field::SEQ_NUM], self.seq_number.0);
        NetworkEndian::write_i32(&mut buffer[field::ACK_NUM], self.ack_number.unwrap_or_default().0);
        NetworkEndian::write_u16(&mut buffer[field::FLAGS], ((header_len as u16 / 4) << 12) | flags.0);
        NetworkEndian::write_u16(&mut buffer[field::WIN_SIZE], self.window_len);
        NetworkEndian::write_u16(&mut buffer[field::CHECKSUM], 0);
        NetworkEndian::write_u16(&mut buffer[field::URGENT], 0);

        if let Some(mss) = self.max_seg_size {
            let option = &mut buffer[HEADER_LEN..HEADER_LEN + MSS_OPTION_LEN];
            option[0] = field::OPT_MSS;
            option[1] = MSS_OPTION_LEN as u8;
            NetworkEndian::write_u16(&mut option[2..], mss);
        }

        let segment_len = header_len + self.payload_len;
        let pseudo = checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, segment_len as u16);
        let header = checksum::data(&buffer[..header_len]);
        let payload = checksum::data(&buffer[header_len..segment_len]);
        let sum = !checksum::combine(&[pseudo, header, payload]);
        NetworkEndian::write_u16(&mut buffer[field::CHECKSUM], sum);
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={}{} seq={}", self.src_port, self.dst_port, self.flags, self.seq_number)?;
        if let Some(ack) = self.ack_number {
            write!(f, " ack={}", ack)?;
        }
        write!(f, " win={} len={}", self.window_len, self.payload_len)?;
        if let Some(mss) = self.max_seg_size {
            write!(f, " mss={}", mss)?;
        }
        Ok(())
    }
}
