//! Full and mini frame headers.
//!
//! Every datagram starts with a 2-byte big-endian call-number field whose
//! high bit selects the framing.

use crate::core::{
    CALL_NUMBER_MASK, FLAG_FULL, FLAG_RETRANS, FLAG_SC_LOG, FrameError, FrameResult, MAX_SHIFT,
};

/// Size constants for the two header forms.
pub mod sizes {
    /// Full header: scallno + dcallno + ts + oseqno + iseqno + type + csub.
    pub const FULL_HEADER_SIZE: usize = 2 + 2 + 4 + 1 + 1 + 1 + 1;
    /// Mini header: callno + low 16 bits of timestamp.
    pub const MINI_HEADER_SIZE: usize = 2 + 2;
    /// Largest datagram the engine will read.
    pub const MAX_DATAGRAM_SIZE: usize = 65535;
}

/// Frame type byte of a full frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// DTMF digit.
    Dtmf = 1,
    /// Voice payload.
    Voice = 2,
    /// Video payload.
    Video = 3,
    /// Call progress control.
    Control = 4,
    /// Empty frame.
    Null = 5,
    /// Protocol command carrying information elements.
    Iax = 6,
    /// Text message.
    Text = 7,
    /// Image payload.
    Image = 8,
    /// HTML/URL signalling.
    Html = 9,
    /// Comfort noise.
    Cng = 10,
}

impl FrameType {
    /// Parse frame type from a byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Dtmf),
            2 => Some(Self::Voice),
            3 => Some(Self::Video),
            4 => Some(Self::Control),
            5 => Some(Self::Null),
            6 => Some(Self::Iax),
            7 => Some(Self::Text),
            8 => Some(Self::Image),
            9 => Some(Self::Html),
            10 => Some(Self::Cng),
            _ => None,
        }
    }

    /// Convert frame type to its byte representation.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Subclass of an [`FrameType::Iax`] frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum Command {
    New = 1,
    Ping = 2,
    Pong = 3,
    Ack = 4,
    Hangup = 5,
    Reject = 6,
    Accept = 7,
    AuthReq = 8,
    AuthRep = 9,
    Inval = 10,
    LagRq = 11,
    LagRp = 12,
    RegReq = 13,
    RegAuth = 14,
    RegAck = 15,
    RegRej = 16,
    RegRel = 17,
    Vnak = 18,
    DpReq = 19,
    DpRep = 20,
    Dial = 21,
    TxReq = 22,
    TxCnt = 23,
    TxAcc = 24,
    TxReady = 25,
    TxRel = 26,
    TxRej = 27,
    Quelch = 28,
    Unquelch = 29,
    Poke = 30,
    Page = 31,
    Mwi = 32,
    Unsupport = 33,
    Transfer = 34,
}

impl Command {
    const ALL: [Self; 34] = [
        Self::New,
        Self::Ping,
        Self::Pong,
        Self::Ack,
        Self::Hangup,
        Self::Reject,
        Self::Accept,
        Self::AuthReq,
        Self::AuthRep,
        Self::Inval,
        Self::LagRq,
        Self::LagRp,
        Self::RegReq,
        Self::RegAuth,
        Self::RegAck,
        Self::RegRej,
        Self::RegRel,
        Self::Vnak,
        Self::DpReq,
        Self::DpRep,
        Self::Dial,
        Self::TxReq,
        Self::TxCnt,
        Self::TxAcc,
        Self::TxReady,
        Self::TxRel,
        Self::TxRej,
        Self::Quelch,
        Self::Unquelch,
        Self::Poke,
        Self::Page,
        Self::Mwi,
        Self::Unsupport,
        Self::Transfer,
    ];

    /// Look up a command by its (uncompressed) subclass value.
    pub fn from_subclass(subclass: u32) -> Option<Self> {
        let index = usize::try_from(subclass).ok()?.checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// Subclass value on the wire.
    pub fn subclass(self) -> u32 {
        self as u32
    }

    /// Commands from an unknown peer that may create a new session.
    pub fn creates_session(self) -> bool {
        matches!(self, Self::New | Self::Poke | Self::RegReq | Self::RegRel)
    }

    /// Commands belonging to the transfer handshake.
    pub fn is_transfer_handshake(self) -> bool {
        matches!(self, Self::TxReady | Self::TxRel | Self::TxCnt | Self::TxAcc)
    }

    /// Commands that never advance the incoming sequence number.
    pub fn is_unsequenced(self) -> bool {
        matches!(
            self,
            Self::Ack | Self::Inval | Self::TxCnt | Self::TxAcc | Self::Vnak
        )
    }
}

/// Compress a subclass into the single header byte.
pub fn compress_subclass(subclass: u32) -> FrameResult<u8> {
    if subclass < u32::from(FLAG_SC_LOG) {
        return Ok(subclass as u8);
    }
    if !subclass.is_power_of_two() {
        return Err(FrameError::UncompressibleSubclass(subclass));
    }
    let shift = subclass.trailing_zeros() as u8;
    if shift > MAX_SHIFT {
        return Err(FrameError::UncompressibleSubclass(subclass));
    }
    Ok(shift | FLAG_SC_LOG)
}

/// Expand the compressed header byte back into a subclass.
pub fn uncompress_subclass(csub: u8) -> u32 {
    if csub & FLAG_SC_LOG != 0 {
        1u32 << (csub & MAX_SHIFT)
    } else {
        u32::from(csub)
    }
}

/// Full frame header.
///
/// Wire format (12 bytes):
/// ```text
/// +--------------------+--------------------+
/// | F | source call    | R | dest call      |
/// +--------------------+--------------------+
/// |              timestamp (u32)            |
/// +----------+----------+---------+---------+
/// | oseqno   | iseqno   | type    | csub    |
/// +----------+----------+---------+---------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FullHeader {
    /// Sender's call number.
    pub source_call: u16,
    /// Receiver's call number (0 before it is known).
    pub dest_call: u16,
    /// Retransmission flag.
    pub retransmit: bool,
    /// Frame timestamp in ms.
    pub timestamp: u32,
    /// Sender's outgoing sequence number.
    pub oseqno: u8,
    /// Sender's next expected incoming sequence number (piggy-backed ack).
    pub iseqno: u8,
    /// Raw frame type byte.
    pub frame_type: u8,
    /// Compressed subclass byte.
    pub csub: u8,
}

impl FullHeader {
    /// Encode the header to bytes.
    pub fn to_bytes(&self) -> [u8; sizes::FULL_HEADER_SIZE] {
        let mut buf = [0u8; sizes::FULL_HEADER_SIZE];
        let scall = (self.source_call & CALL_NUMBER_MASK) | FLAG_FULL;
        let mut dcall = self.dest_call & CALL_NUMBER_MASK;
        if self.retransmit {
            dcall |= FLAG_RETRANS;
        }
        buf[0..2].copy_from_slice(&scall.to_be_bytes());
        buf[2..4].copy_from_slice(&dcall.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8] = self.oseqno;
        buf[9] = self.iseqno;
        buf[10] = self.frame_type;
        buf[11] = self.csub;
        buf
    }

    /// Parse a full header. The caller has already checked the full bit.
    pub fn from_bytes(data: &[u8]) -> FrameResult<Self> {
        if data.len() < sizes::FULL_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: sizes::FULL_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let scall = u16::from_be_bytes([data[0], data[1]]);
        let dcall = u16::from_be_bytes([data[2], data[3]]);
        Ok(Self {
            source_call: scall & CALL_NUMBER_MASK,
            dest_call: dcall & CALL_NUMBER_MASK,
            retransmit: dcall & FLAG_RETRANS != 0,
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            oseqno: data[8],
            iseqno: data[9],
            frame_type: data[10],
            csub: data[11],
        })
    }

    /// Uncompressed subclass.
    pub fn subclass(&self) -> u32 {
        uncompress_subclass(self.csub)
    }

    /// Frame type, if known.
    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_byte(self.frame_type)
    }

    /// Command, if this is an IAX frame with a known subclass.
    pub fn command(&self) -> Option<Command> {
        match self.kind() {
            Some(FrameType::Iax) => Command::from_subclass(self.subclass()),
            _ => None,
        }
    }
}

/// Mini (voice continuation) header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniHeader {
    /// Sender's call number.
    pub call: u16,
    /// Low 16 bits of the frame timestamp.
    pub timestamp: u16,
}

impl MiniHeader {
    /// Encode the header to bytes.
    pub fn to_bytes(&self) -> [u8; sizes::MINI_HEADER_SIZE] {
        let mut buf = [0u8; sizes::MINI_HEADER_SIZE];
        buf[0..2].copy_from_slice(&(self.call & CALL_NUMBER_MASK).to_be_bytes());
        buf[2..4].copy_from_slice(&self.timestamp.to_be_bytes());
        buf
    }

    /// Parse a mini header.
    pub fn from_bytes(data: &[u8]) -> FrameResult<Self> {
        if data.len() < sizes::MINI_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: sizes::MINI_HEADER_SIZE,
                actual: data.len(),
            });
        }
        Ok(Self {
            call: u16::from_be_bytes([data[0], data[1]]) & CALL_NUMBER_MASK,
            timestamp: u16::from_be_bytes([data[2], data[3]]),
        })
    }
}

/// Either header form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// Full frame.
    Full(FullHeader),
    /// Mini frame.
    Mini(MiniHeader),
}

impl Header {
    /// Split a datagram into its header and payload.
    pub fn parse(data: &[u8]) -> FrameResult<(Self, &[u8])> {
        if data.len() < sizes::MINI_HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: sizes::MINI_HEADER_SIZE,
                actual: data.len(),
            });
        }
        if u16::from_be_bytes([data[0], data[1]]) & FLAG_FULL != 0 {
            let header = FullHeader::from_bytes(data)?;
            Ok((Self::Full(header), &data[sizes::FULL_HEADER_SIZE..]))
        } else {
            let header = MiniHeader::from_bytes(data)?;
            Ok((Self::Mini(header), &data[sizes::MINI_HEADER_SIZE..]))
        }
    }
}

/// Set the retransmit flag on an already encoded full frame.
pub fn mark_retransmit(datagram: &mut [u8]) {
    if datagram.len() >= sizes::FULL_HEADER_SIZE {
        datagram[2] |= (FLAG_RETRANS >> 8) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_from_byte() {
        assert_eq!(FrameType::from_byte(2), Some(FrameType::Voice));
        assert_eq!(FrameType::from_byte(6), Some(FrameType::Iax));
        assert_eq!(FrameType::from_byte(0), None);
        assert_eq!(FrameType::from_byte(11), None);
        assert_eq!(FrameType::Cng.as_byte(), 10);
    }

    #[test]
    fn test_command_lookup() {
        assert_eq!(Command::from_subclass(1), Some(Command::New));
        assert_eq!(Command::from_subclass(18), Some(Command::Vnak));
        assert_eq!(Command::from_subclass(34), Some(Command::Transfer));
        assert_eq!(Command::from_subclass(0), None);
        assert_eq!(Command::from_subclass(35), None);
        for command in Command::ALL {
            assert_eq!(Command::from_subclass(command.subclass()), Some(command));
        }
    }

    #[test]
    fn test_subclass_compression() {
        assert_eq!(compress_subclass(0x7F).unwrap(), 0x7F);
        assert_eq!(compress_subclass(0x80).unwrap(), 0x87);
        // iLBC format bit
        assert_eq!(compress_subclass(1 << 10).unwrap(), 0x8A);
        assert_eq!(uncompress_subclass(0x8A), 1 << 10);
        assert_eq!(uncompress_subclass(0x04), 4);
        assert_eq!(
            compress_subclass(0x81),
            Err(FrameError::UncompressibleSubclass(0x81))
        );
    }

    #[test]
    fn test_full_header_wire_layout() {
        let header = FullHeader {
            source_call: 0x1234,
            dest_call: 0x0042,
            retransmit: true,
            timestamp: 0x01020304,
            oseqno: 5,
            iseqno: 6,
            frame_type: FrameType::Iax.as_byte(),
            csub: Command::Ping.subclass() as u8,
        };
        let bytes = header.to_bytes();
        assert_eq!(hex::encode(bytes), "923480420102030405060602");
        assert_eq!(FullHeader::from_bytes(&bytes).unwrap(), header);
        assert_eq!(header.command(), Some(Command::Ping));
    }

    #[test]
    fn test_header_parse_dispatches_on_full_bit() {
        let mini = MiniHeader {
            call: 7,
            timestamp: 0xBEEF,
        };
        let mut datagram = mini.to_bytes().to_vec();
        datagram.extend_from_slice(b"audio");

        let (header, payload) = Header::parse(&datagram).unwrap();
        assert_eq!(header, Header::Mini(mini));
        assert_eq!(payload, b"audio");
    }

    #[test]
    fn test_header_too_short() {
        assert_eq!(
            Header::parse(&[0x80, 0x01, 0x00]),
            Err(FrameError::TooShort {
                expected: 4,
                actual: 3
            })
        );
        assert_eq!(
            Header::parse(&[0x80, 0x01, 0x00, 0x00, 0x00]),
            Err(FrameError::TooShort {
                expected: 12,
                actual: 5
            })
        );
    }

    #[test]
    fn test_mark_retransmit() {
        let header = FullHeader {
            source_call: 1,
            dest_call: 2,
            retransmit: false,
            timestamp: 10,
            oseqno: 0,
            iseqno: 0,
            frame_type: FrameType::Iax.as_byte(),
            csub: 1,
        };
        let mut bytes = header.to_bytes();
        mark_retransmit(&mut bytes);
        let parsed = FullHeader::from_bytes(&bytes).unwrap();
        assert!(parsed.retransmit);
        assert_eq!(parsed.dest_call, 2);
    }
}
