use core::{cmp, fmt, ops};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Result};

/// The longest option block a header can carry.
pub const MAX_OPTION_LEN: usize = 40;

/// The most SACK blocks a single option can carry.
pub const MAX_SACK_BLOCKS: usize = 4;

/// A TCP sequence number.
///
/// A sequence number is a monotonically advancing integer modulo 2<sup>32</sup>.
/// Sequence numbers do not have a discontiguity when compared pairwise across a signed overflow.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub i32);

impl SeqNumber {
    /// Create a sequence number from its unsigned wire representation.
    pub fn from_u32(value: u32) -> Self {
        SeqNumber(value as i32)
    }

    /// The unsigned wire representation.
    pub fn to_u32(self) -> u32 {
        self.0 as u32
    }

    /// The later of two sequence numbers.
    pub fn max(self, other: Self) -> Self {
        if self >= other { self } else { other }
    }

    /// The earlier of two sequence numbers.
    pub fn min(self, other: Self) -> Self {
        if self <= other { self } else { other }
    }

    /// The number of bytes from `earlier` up to `self`, zero if `earlier` is not before `self`.
    pub fn saturating_since(self, earlier: Self) -> u32 {
        let diff = self - earlier;
        if diff > 0 { diff as u32 } else { 0 }
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0 as u32)
    }
}

impl ops::Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as i32))
    }
}

impl ops::Sub<u32> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as i32))
    }
}

impl ops::AddAssign<u32> for SeqNumber {
    fn add_assign(&mut self, rhs: u32) {
        *self = *self + rhs;
    }
}

impl ops::SubAssign<u32> for SeqNumber {
    fn sub_assign(&mut self, rhs: u32) {
        *self = *self - rhs;
    }
}

/// The signed distance between two sequence numbers.
impl ops::Sub for SeqNumber {
    type Output = i32;

    fn sub(self, rhs: SeqNumber) -> i32 {
        self.0.wrapping_sub(rhs.0)
    }
}

impl cmp::PartialOrd for SeqNumber {
    fn partial_cmp(&self, other: &SeqNumber) -> Option<cmp::Ordering> {
        self.0.wrapping_sub(other.0).partial_cmp(&0)
    }
}

/// A set of tcp flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Flags(pub u16);

impl Flags {
    /// No more data from sender.
    pub const FIN: Flags = Flags(field::FLG_FIN);
    /// Synchronize sequence numbers.
    pub const SYN: Flags = Flags(field::FLG_SYN);
    /// Reset the connection.
    pub const RST: Flags = Flags(field::FLG_RST);
    /// Push function.
    pub const PSH: Flags = Flags(field::FLG_PSH);
    /// Acknowledgment field significant.
    pub const ACK: Flags = Flags(field::FLG_ACK);
    /// Urgent pointer field significant.
    pub const URG: Flags = Flags(field::FLG_URG);
    /// ECN echo.
    pub const ECE: Flags = Flags(field::FLG_ECE);
    /// Congestion window reduced.
    pub const CWR: Flags = Flags(field::FLG_CWR);
    /// ECN nonce sum.
    pub const NS: Flags = Flags(field::FLG_NS);

    /// The empty flag set.
    pub fn empty() -> Self {
        Flags(0)
    }

    /// Check if all flags of `other` are set.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check if any flag of `other` is set.
    pub fn intersects(self, other: Flags) -> bool {
        self.0 & other.0 != 0
    }

    /// Set all flags of `other`.
    pub fn insert(&mut self, other: Flags) {
        self.0 |= other.0;
    }

    /// Clear all flags of `other`.
    pub fn remove(&mut self, other: Flags) {
        self.0 &= !other.0;
    }

    /// Return the FIN flag.
    #[inline]
    pub fn fin(self) -> bool {
        self.contains(Flags::FIN)
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(self) -> bool {
        self.contains(Flags::SYN)
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(self) -> bool {
        self.contains(Flags::RST)
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(self) -> bool {
        self.contains(Flags::PSH)
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(self) -> bool {
        self.contains(Flags::ACK)
    }

    /// Return the URG flag.
    #[inline]
    pub fn urg(self) -> bool {
        self.contains(Flags::URG)
    }

    /// Return the ECE flag.
    #[inline]
    pub fn ece(self) -> bool {
        self.contains(Flags::ECE)
    }

    /// Return the CWR flag.
    #[inline]
    pub fn cwr(self) -> bool {
        self.contains(Flags::CWR)
    }

    /// Return the length of a control flag, in terms of sequence space.
    pub fn sequence_len(self) -> u32 {
        u32::from(self.syn()) + u32::from(self.fin())
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for Flags {
    fn bitor_assign(&mut self, rhs: Flags) {
        self.insert(rhs)
    }
}

impl ops::BitAnd for Flags {
    type Output = Flags;

    fn bitand(self, rhs: Flags) -> Flags {
        Flags(self.0 & rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Flags, &str); 8] = [
            (Flags::SYN, "syn"), (Flags::FIN, "fin"), (Flags::RST, "rst"), (Flags::PSH, "psh"),
            (Flags::ACK, "ack"), (Flags::URG, "urg"), (Flags::ECE, "ece"), (Flags::CWR, "cwr"),
        ];
        let mut first = true;
        for &(flag, name) in NAMES.iter() {
            if self.contains(flag) {
                if !first { f.write_str("|")?; }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The two ECN bits of the enclosing IP header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EcnCodepoint {
    /// Not ECN-capable transport.
    NotEct,
    /// ECN-capable transport, codepoint 1.
    Ect1,
    /// ECN-capable transport, codepoint 0.
    Ect0,
    /// Congestion experienced.
    Ce,
}

impl EcnCodepoint {
    /// Decode from the low two bits of the traffic class.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => EcnCodepoint::NotEct,
            0b01 => EcnCodepoint::Ect1,
            0b10 => EcnCodepoint::Ect0,
            _ => EcnCodepoint::Ce,
        }
    }

    /// The bit representation in the traffic class.
    pub fn bits(self) -> u8 {
        match self {
            EcnCodepoint::NotEct => 0b00,
            EcnCodepoint::Ect1 => 0b01,
            EcnCodepoint::Ect0 => 0b10,
            EcnCodepoint::Ce => 0b11,
        }
    }
}

impl Default for EcnCodepoint {
    fn default() -> Self {
        EcnCodepoint::NotEct
    }
}

mod field {
    #![allow(non_snake_case)]

    use crate::wire::field::Field;

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
    pub(crate) const FLG_URG: u16 = 0x020;
    pub(crate) const FLG_ECE: u16 = 0x040;
    pub(crate) const FLG_CWR: u16 = 0x080;
    pub(crate) const FLG_NS:  u16 = 0x100;
}

enum_with_unknown! {
    /// The kind byte of an option.
    #[derive(Clone, Copy)]
    pub doc enum OptionKind(u8) {
        /// End of the option list.
        End = 0,
        /// Padding.
        Nop = 1,
        /// Maximum segment size.
        MaxSegmentSize = 2,
        /// Window scale shift.
        WindowScale = 3,
        /// Selective acknowledgement permitted.
        SackPermitted = 4,
        /// Selective acknowledgement blocks.
        Sack = 5,
        /// Timestamps.
        Timestamp = 8,
    }
}

/// One contiguous block of a selective acknowledgement, `[start, end)`.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub struct SackBlock {
    /// The first sequence number of the block.
    pub start: SeqNumber,
    /// The sequence number following the last byte of the block.
    pub end: SeqNumber,
}

/// A representation of a single TCP option.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TcpOption<'a> {
    /// The end of the list, remaining bytes are padding.
    EndOfList,
    /// A single byte of padding between options.
    NoOperation,
    /// The largest segment the sender is willing to receive.
    MaxSegmentSize(u16),
    /// The shift count of the sender's receive window.
    WindowScale(u8),
    /// The sender can receive selective acknowledgements.
    SackPermitted,
    /// Selective acknowledgement of up to four blocks.
    SackRange([Option<SackBlock>; MAX_SACK_BLOCKS]),
    /// A timestamp value and echo reply.
    Timestamp {
        /// The sender's clock.
        tsval: u32,
        /// The echoed timestamp of the peer.
        tsecr: u32,
    },
    /// Any other option, skipped by length.
    Unknown {
        /// The kind byte.
        kind: u8,
        /// The data following the length byte.
        data: &'a [u8],
    },
}

impl<'a> TcpOption<'a> {
    /// Parse the first option of the buffer, returning the remaining bytes.
    pub fn parse(buffer: &'a [u8]) -> Result<(&'a [u8], TcpOption<'a>)> {
        let (length, option);
        match OptionKind::from(*buffer.get(0).ok_or(Error::Truncated)?) {
            OptionKind::End => {
                length = 1;
                option = TcpOption::EndOfList;
            }
            OptionKind::Nop => {
                length = 1;
                option = TcpOption::NoOperation;
            }
            kind => {
                length = *buffer.get(1).ok_or(Error::Truncated)? as usize;
                if length < 2 {
                    return Err(Error::Malformed);
                }
                let data = buffer.get(2..length).ok_or(Error::Truncated)?;
                option = match (kind, length) {
                    (OptionKind::MaxSegmentSize, 4) =>
                        TcpOption::MaxSegmentSize(NetworkEndian::read_u16(data)),
                    (OptionKind::WindowScale, 3) =>
                        TcpOption::WindowScale(data[0]),
                    (OptionKind::SackPermitted, 2) =>
                        TcpOption::SackPermitted,
                    (OptionKind::Timestamp, 10) => TcpOption::Timestamp {
                        tsval: NetworkEndian::read_u32(&data[0..4]),
                        tsecr: NetworkEndian::read_u32(&data[4..8]),
                    },
                    (OptionKind::Sack, n) if n >= 10 && (n - 2) % 8 == 0 => {
                        let mut blocks = [None; MAX_SACK_BLOCKS];
                        // RFC 2018: each block is a pair of 32-bit unsigned integers in network
                        // byte order. More than four cannot fit into 40 bytes of options.
                        for (block, raw) in blocks.iter_mut().zip(data.chunks_exact(8)) {
                            *block = Some(SackBlock {
                                start: SeqNumber::from_u32(NetworkEndian::read_u32(&raw[0..4])),
                                end: SeqNumber::from_u32(NetworkEndian::read_u32(&raw[4..8])),
                            });
                        }
                        TcpOption::SackRange(blocks)
                    },
                    (OptionKind::MaxSegmentSize, _)
                    | (OptionKind::WindowScale, _)
                    | (OptionKind::SackPermitted, _)
                    | (OptionKind::Timestamp, _)
                    | (OptionKind::Sack, _) =>
                        return Err(Error::Malformed),
                    (kind, _) =>
                        TcpOption::Unknown { kind: kind.into(), data },
                }
            }
        }
        Ok((&buffer[length..], option))
    }

    /// The number of bytes this option occupies.
    pub fn buffer_len(&self) -> usize {
        match self {
            TcpOption::EndOfList => 1,
            TcpOption::NoOperation => 1,
            TcpOption::MaxSegmentSize(_) => 4,
            TcpOption::WindowScale(_) => 3,
            TcpOption::SackPermitted => 2,
            TcpOption::SackRange(s) => s.iter().filter(|s| s.is_some()).count() * 8 + 2,
            TcpOption::Timestamp { .. } => 10,
            TcpOption::Unknown { data, .. } => 2 + data.len(),
        }
    }

    /// Write the option to the front of the buffer, returning the rest.
    pub fn emit<'b>(&self, buffer: &'b mut [u8]) -> &'b mut [u8] {
        let length = self.buffer_len();
        match *self {
            TcpOption::EndOfList => {
                // There may be padding space which also should be initialized.
                for p in buffer.iter_mut() {
                    *p = OptionKind::End.into();
                }
                let end = buffer.len();
                return &mut buffer[end..];
            }
            TcpOption::NoOperation => {
                buffer[0] = OptionKind::Nop.into();
            }
            TcpOption::MaxSegmentSize(value) => {
                buffer[0] = OptionKind::MaxSegmentSize.into();
                NetworkEndian::write_u16(&mut buffer[2..4], value)
            }
            TcpOption::WindowScale(value) => {
                buffer[0] = OptionKind::WindowScale.into();
                buffer[2] = value;
            }
            TcpOption::SackPermitted => {
                buffer[0] = OptionKind::SackPermitted.into();
            }
            TcpOption::SackRange(blocks) => {
                buffer[0] = OptionKind::Sack.into();
                let chunks = buffer[2..length].chunks_exact_mut(8);
                for (raw, block) in chunks.zip(blocks.iter().filter_map(|b| b.as_ref())) {
                    NetworkEndian::write_u32(&mut raw[0..4], block.start.to_u32());
                    NetworkEndian::write_u32(&mut raw[4..8], block.end.to_u32());
                }
            }
            TcpOption::Timestamp { tsval, tsecr } => {
                buffer[0] = OptionKind::Timestamp.into();
                NetworkEndian::write_u32(&mut buffer[2..6], tsval);
                NetworkEndian::write_u32(&mut buffer[6..10], tsecr);
            }
            TcpOption::Unknown { kind, data } => {
                buffer[0] = kind;
                buffer[2..length].copy_from_slice(data)
            }
        }
        if length > 1 {
            buffer[1] = length as u8;
        }
        &mut buffer[length..]
    }
}

/// A timestamp option value.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Timestamp {
    /// The sender's clock at transmission.
    pub tsval: u32,
    /// The most recent timestamp received from the peer.
    pub tsecr: u32,
}

/// The parsed option block of a segment.
///
/// This is an immutable value type shared between the input and output paths. Parsing keeps the
/// last occurrence of each option and never fails: a malformed option ends the block.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Hash)]
pub struct Options {
    /// Maximum segment size.
    pub mss: Option<u16>,
    /// Window scale shift count, as sent.
    pub window_scale: Option<u8>,
    /// Selective acknowledgements are permitted.
    pub sack_permitted: bool,
    /// Timestamp value and echo.
    pub timestamp: Option<Timestamp>,
    /// Selective acknowledgement blocks, most recent first.
    pub sack_blocks: [Option<SackBlock>; MAX_SACK_BLOCKS],
}

impl Options {
    /// Decode an option block.
    pub fn parse(mut bytes: &[u8]) -> Self {
        let mut options = Options::default();
        while !bytes.is_empty() {
            let (rest, option) = match TcpOption::parse(bytes) {
                Ok(parsed) => parsed,
                Err(err) => {
                    net_trace!("tcp: option block ends early: {}", err);
                    break;
                },
            };
            match option {
                TcpOption::EndOfList => break,
                TcpOption::NoOperation => (),
                TcpOption::MaxSegmentSize(mss) => options.mss = Some(mss),
                TcpOption::WindowScale(shift) => options.window_scale = Some(shift),
                TcpOption::SackPermitted => options.sack_permitted = true,
                TcpOption::SackRange(blocks) => options.sack_blocks = blocks,
                TcpOption::Timestamp { tsval, tsecr } =>
                    options.timestamp = Some(Timestamp { tsval, tsecr }),
                TcpOption::Unknown { .. } => (),
            }
            bytes = rest;
        }
        options
    }

    /// Restrict to the options meaningful on a segment with or without SYN.
    ///
    /// Maximum segment size, window scale and SACK-permitted are only honored on a SYN while SACK
    /// blocks are only honored on other segments. Timestamps are valid on both.
    pub fn for_segment(mut self, syn: bool) -> Self {
        if syn {
            self.sack_blocks = [None; MAX_SACK_BLOCKS];
        } else {
            self.mss = None;
            self.window_scale = None;
            self.sack_permitted = false;
        }
        self
    }

    /// Iterate over the present SACK blocks.
    pub fn sack_blocks(&self) -> impl Iterator<Item=SackBlock> + '_ {
        self.sack_blocks.iter().filter_map(|block| *block)
    }

    /// Check if any SACK block is present.
    pub fn has_sack(&self) -> bool {
        self.sack_blocks.iter().any(Option::is_some)
    }

    /// The number of bytes the encoded block occupies, padded to a multiple of four.
    pub fn len(&self) -> usize {
        let mut scratch = [0; MAX_OPTION_LEN];
        self.emit(&mut scratch)
    }

    /// Check if no option would be encoded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode the block in canonical order and return its length.
    ///
    /// The order is MSS, window scale, SACK-permitted, timestamp and SACK, each aligned with
    /// no-op padding for the usual packing of 40 option bytes. Options that no longer fit are
    /// omitted and SACK blocks are truncated to the remaining space. The buffer must be able to
    /// hold at least `MAX_OPTION_LEN` bytes or the result of `len`.
    pub fn emit(&self, buffer: &mut [u8]) -> usize {
        let mut len = 0;

        if let Some(mss) = self.mss {
            push_option(buffer, &mut len, |l| l % 4 == 0, TcpOption::MaxSegmentSize(mss));
        }
        if let Some(shift) = self.window_scale {
            push_option(buffer, &mut len, |l| l % 2 == 1, TcpOption::WindowScale(shift));
        }
        if self.sack_permitted {
            push_option(buffer, &mut len, |l| l % 2 == 0, TcpOption::SackPermitted);
        }
        if let Some(Timestamp { tsval, tsecr }) = self.timestamp {
            push_option(buffer, &mut len, |l| l % 4 == 2, TcpOption::Timestamp { tsval, tsecr });
        }
        if self.has_sack() {
            let mut blocks = [None; MAX_SACK_BLOCKS];
            let mut count = 0;
            // Leave room for the alignment and the option header.
            let room = MAX_OPTION_LEN.saturating_sub(align_sack(len) + 2) / 8;
            for (slot, block) in blocks.iter_mut().zip(self.sack_blocks()).take(room) {
                *slot = Some(block);
                count += 1;
            }
            if count > 0 {
                push_option(buffer, &mut len, |l| l % 4 == 2, TcpOption::SackRange(blocks));
            }
        }

        if len % 4 != 0 {
            let padded = (len + 3) / 4 * 4;
            TcpOption::EndOfList.emit(&mut buffer[len..padded]);
            len = padded;
        }
        len
    }
}

fn push_option(buffer: &mut [u8], len: &mut usize, align: fn(usize) -> bool, option: TcpOption)
    -> bool
{
    while !align(*len) {
        if *len >= MAX_OPTION_LEN {
            return false;
        }
        TcpOption::NoOperation.emit(&mut buffer[*len..]);
        *len += 1;
    }
    let size = option.buffer_len();
    if MAX_OPTION_LEN - *len < size {
        return false;
    }
    option.emit(&mut buffer[*len..]);
    *len += size;
    true
}

fn align_sack(mut len: usize) -> usize {
    while len % 4 != 2 {
        len += 1;
    }
    len
}

/// A high-level representation of a Transmission Control Protocol header.
///
/// The checksum is not part of the representation. It is computed by the layer that frames the
/// segment into an IP packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    /// The sending port.
    pub src_port: u16,
    /// The receiving port.
    pub dst_port: u16,
    /// The sequence number of the first byte of data, or of the SYN.
    pub seq_number: SeqNumber,
    /// The acknowledged sequence number, meaningful only with the ACK flag.
    pub ack_number: SeqNumber,
    /// All control flags.
    pub flags: Flags,
    /// The unscaled advertised window.
    pub window_len: u16,
    /// The urgent pointer, meaningful only with the URG flag.
    pub urgent_at: u16,
    /// The option block.
    pub options: Options,
}

impl Repr {
    /// Parse a header, returning it together with the payload.
    pub fn parse(buffer: &[u8]) -> Result<(Repr, &[u8])> {
        if buffer.len() < field::URGENT.end {
            return Err(Error::Truncated);
        }
        let raw_flags = NetworkEndian::read_u16(&buffer[field::FLAGS]);
        let header_len = usize::from(raw_flags >> 12) * 4;
        if header_len < field::URGENT.end {
            return Err(Error::Malformed);
        }
        if buffer.len() < header_len {
            return Err(Error::Truncated);
        }

        let repr = Repr {
            src_port: NetworkEndian::read_u16(&buffer[field::SRC_PORT]),
            dst_port: NetworkEndian::read_u16(&buffer[field::DST_PORT]),
            seq_number: SeqNumber(NetworkEndian::read_i32(&buffer[field::SEQ_NUM])),
            ack_number: SeqNumber(NetworkEndian::read_i32(&buffer[field::ACK_NUM])),
            flags: Flags(raw_flags & 0x1ff),
            window_len: NetworkEndian::read_u16(&buffer[field::WIN_SIZE]),
            urgent_at: NetworkEndian::read_u16(&buffer[field::URGENT]),
            options: Options::parse(&buffer[field::URGENT.end..header_len]),
        };
        Ok((repr, &buffer[header_len..]))
    }

    /// Return the length of a header that will be emitted from this high-level representation.
    ///
    /// The TCP header length is a multiple of 4.
    pub fn header_len(&self) -> usize {
        field::URGENT.end + self.options.len()
    }

    /// Emit the header into the front of a buffer.
    ///
    /// The checksum field is zeroed. Returns the number of bytes written.
    pub fn emit(&self, buffer: &mut [u8]) -> usize {
        let mut options = [0; MAX_OPTION_LEN];
        let option_len = self.options.emit(&mut options);
        let header_len = field::URGENT.end + option_len;

        NetworkEndian::write_u16(&mut buffer[field::SRC_PORT], self.src_port);
        NetworkEndian::write_u16(&mut buffer[field::DST_PORT], self.dst_port);
        NetworkEndian::write_i32(&mut buffer[field::SEQ_NUM], self.seq_number.0);
        NetworkEndian::write_i32(&mut buffer[field::ACK_NUM], self.ack_number.0);
        let raw_flags = ((header_len as u16 / 4) << 12) | (self.flags.0 & 0x1ff);
        NetworkEndian::write_u16(&mut buffer[field::FLAGS], raw_flags);
        NetworkEndian::write_u16(&mut buffer[field::WIN_SIZE], self.window_len);
        NetworkEndian::write_u16(&mut buffer[field::CHECKSUM], 0);
        NetworkEndian::write_u16(&mut buffer[field::URGENT], self.urgent_at);
        buffer[field::URGENT.end..header_len].copy_from_slice(&options[..option_len]);
        header_len
    }

    /// Return the length of a segment with this header, in terms of sequence space.
    pub fn sequence_len(&self, payload_len: usize) -> u32 {
        payload_len as u32 + self.flags.sequence_len()
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} [{}]", self.src_port, self.dst_port, self.flags)?;
        write!(f, " seq={}", self.seq_number)?;
        if self.flags.ack() {
            write!(f, " ack={}", self.ack_number)?;
        }
        write!(f, " win={}", self.window_len)?;
        if let Some(mss) = self.options.mss {
            write!(f, " mss={}", mss)?;
        }
        if let Some(shift) = self.options.window_scale {
            write!(f, " ws={}", shift)?;
        }
        if self.options.sack_permitted {
            write!(f, " sACK")?;
        }
        if let Some(ts) = self.options.timestamp {
            write!(f, " ts={}/{}", ts.tsval, ts.tsecr)?;
        }
        for block in self.options.sack_blocks() {
            write!(f, " sACKr[{},{})", block.start, block.end)?;
        }
        Ok(())
    }
}
