//! Information elements carried in the payload of IAX command frames.
//!
//! Each element is `tag (u8) | length (u8) | value`. Only the elements the
//! engine itself reads or writes are decoded; anything else is skipped.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use tracing::trace;

use crate::core::IeError;

/// Information element tags.
#[allow(missing_docs)]
pub mod tag {
    pub const CALLED_NUMBER: u8 = 1;
    pub const CALLING_NUMBER: u8 = 2;
    pub const CALLING_ANI: u8 = 3;
    pub const CALLING_NAME: u8 = 4;
    pub const CALLED_CONTEXT: u8 = 5;
    pub const USERNAME: u8 = 6;
    pub const PASSWORD: u8 = 7;
    pub const CAPABILITY: u8 = 8;
    pub const FORMAT: u8 = 9;
    pub const LANGUAGE: u8 = 10;
    pub const VERSION: u8 = 11;
    pub const DNID: u8 = 13;
    pub const AUTHMETHODS: u8 = 14;
    pub const CHALLENGE: u8 = 15;
    pub const MD5_RESULT: u8 = 16;
    pub const APPARENT_ADDR: u8 = 18;
    pub const REFRESH: u8 = 19;
    pub const CALLNO: u8 = 21;
    pub const CAUSE: u8 = 22;
    pub const MUSICONHOLD: u8 = 26;
    pub const TRANSFERID: u8 = 27;
    pub const SAMPLINGRATE: u8 = 41;
    pub const CODEC_PREFS: u8 = 45;
    pub const RR_JITTER: u8 = 46;
    pub const RR_LOSS: u8 = 47;
    pub const RR_PKTS: u8 = 48;
    pub const RR_DELAY: u8 = 49;
    pub const RR_DROPPED: u8 = 50;
    pub const RR_OOO: u8 = 51;
}

/// `AF_INET` as carried in the sockaddr image of APPARENT_ADDR.
const AF_INET: u16 = 2;

/// Size of a `sockaddr_in` image.
const SOCKADDR_IN_SIZE: usize = 16;

/// Builder for an information element payload.
#[derive(Debug, Default, Clone)]
pub struct IeBuilder {
    buf: Vec<u8>,
}

impl IeBuilder {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw element.
    pub fn raw(mut self, tag: u8, value: &[u8]) -> Result<Self, IeError> {
        let len = u8::try_from(value.len()).map_err(|_| IeError::ValueTooLong {
            tag,
            len: value.len(),
        })?;
        self.buf.push(tag);
        self.buf.push(len);
        self.buf.extend_from_slice(value);
        Ok(self)
    }

    /// Append a string element.
    pub fn string(self, tag: u8, value: &str) -> Result<Self, IeError> {
        self.raw(tag, value.as_bytes())
    }

    /// Append a string element if a value is present.
    pub fn opt_string(self, tag: u8, value: Option<&str>) -> Result<Self, IeError> {
        match value {
            Some(v) => self.string(tag, v),
            None => Ok(self),
        }
    }

    /// Append a big-endian 16-bit element.
    pub fn short(self, tag: u8, value: u16) -> Result<Self, IeError> {
        self.raw(tag, &value.to_be_bytes())
    }

    /// Append a big-endian 32-bit element.
    pub fn int(self, tag: u8, value: u32) -> Result<Self, IeError> {
        self.raw(tag, &value.to_be_bytes())
    }

    /// Append an empty (flag) element.
    pub fn flag(self, tag: u8) -> Result<Self, IeError> {
        self.raw(tag, &[])
    }

    /// Append an address as a `sockaddr_in` image.
    pub fn addr(self, tag: u8, addr: SocketAddr) -> Result<Self, IeError> {
        let SocketAddr::V4(v4) = addr else {
            return Err(IeError::UnsupportedAddress);
        };
        let mut image = [0u8; SOCKADDR_IN_SIZE];
        image[0..2].copy_from_slice(&AF_INET.to_be_bytes());
        image[2..4].copy_from_slice(&v4.port().to_be_bytes());
        image[4..8].copy_from_slice(&v4.ip().octets());
        self.raw(tag, &image)
    }

    /// Finish and return the encoded payload.
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

/// Decoded information elements.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Ies {
    pub called_number: Option<String>,
    pub calling_number: Option<String>,
    pub calling_ani: Option<String>,
    pub calling_name: Option<String>,
    pub called_context: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub capability: Option<u32>,
    pub format: Option<u32>,
    pub language: Option<String>,
    pub version: Option<u16>,
    pub dnid: Option<String>,
    pub auth_methods: Option<u16>,
    pub challenge: Option<String>,
    pub md5_result: Option<String>,
    pub apparent_addr: Option<SocketAddr>,
    pub refresh: Option<u16>,
    pub callno: Option<u16>,
    pub cause: Option<String>,
    pub music_on_hold: bool,
    pub transfer_id: Option<u32>,
    pub sampling_rate: Option<u16>,
    pub codec_prefs: Option<String>,
    pub rr_jitter: Option<u32>,
    pub rr_loss: Option<u32>,
    pub rr_packets: Option<u32>,
    pub rr_delay: Option<u16>,
    pub rr_dropped: Option<u32>,
    pub rr_ooo: Option<u32>,
}

impl Ies {
    /// Decode a payload of information elements.
    pub fn parse(mut data: &[u8]) -> Result<Self, IeError> {
        let mut ies = Self::default();
        while !data.is_empty() {
            if data.len() < 2 {
                return Err(IeError::Truncated {
                    tag: data[0],
                    needed: 2,
                    available: data.len(),
                });
            }
            let tag = data[0];
            let len = usize::from(data[1]);
            if data.len() < 2 + len {
                return Err(IeError::Truncated {
                    tag,
                    needed: len,
                    available: data.len() - 2,
                });
            }
            ies.apply(tag, &data[2..2 + len])?;
            data = &data[2 + len..];
        }
        Ok(ies)
    }

    fn apply(&mut self, tag: u8, value: &[u8]) -> Result<(), IeError> {
        match tag {
            tag::CALLED_NUMBER => self.called_number = Some(text(value)),
            tag::CALLING_NUMBER => self.calling_number = Some(text(value)),
            tag::CALLING_ANI => self.calling_ani = Some(text(value)),
            tag::CALLING_NAME => self.calling_name = Some(text(value)),
            tag::CALLED_CONTEXT => self.called_context = Some(text(value)),
            tag::USERNAME => self.username = Some(text(value)),
            tag::PASSWORD => self.password = Some(text(value)),
            tag::CAPABILITY => self.capability = Some(be32(tag, value)?),
            tag::FORMAT => self.format = Some(be32(tag, value)?),
            tag::LANGUAGE => self.language = Some(text(value)),
            tag::VERSION => self.version = Some(be16(tag, value)?),
            tag::DNID => self.dnid = Some(text(value)),
            tag::AUTHMETHODS => self.auth_methods = Some(be16(tag, value)?),
            tag::CHALLENGE => self.challenge = Some(text(value)),
            tag::MD5_RESULT => self.md5_result = Some(text(value)),
            tag::APPARENT_ADDR => self.apparent_addr = Some(sockaddr(tag, value)?),
            tag::REFRESH => self.refresh = Some(be16(tag, value)?),
            tag::CALLNO => self.callno = Some(be16(tag, value)?),
            tag::CAUSE => self.cause = Some(text(value)),
            tag::MUSICONHOLD => self.music_on_hold = true,
            tag::TRANSFERID => self.transfer_id = Some(be32(tag, value)?),
            tag::SAMPLINGRATE => self.sampling_rate = Some(be16(tag, value)?),
            tag::CODEC_PREFS => self.codec_prefs = Some(text(value)),
            tag::RR_JITTER => self.rr_jitter = Some(be32(tag, value)?),
            tag::RR_LOSS => self.rr_loss = Some(be32(tag, value)?),
            tag::RR_PKTS => self.rr_packets = Some(be32(tag, value)?),
            tag::RR_DELAY => self.rr_delay = Some(be16(tag, value)?),
            tag::RR_DROPPED => self.rr_dropped = Some(be32(tag, value)?),
            tag::RR_OOO => self.rr_ooo = Some(be32(tag, value)?),
            other => trace!(tag = other, len = value.len(), "skipping information element"),
        }
        Ok(())
    }
}

fn text(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

fn be16(tag: u8, value: &[u8]) -> Result<u16, IeError> {
    let bytes: [u8; 2] = value.try_into().map_err(|_| IeError::BadLength {
        tag,
        len: value.len(),
    })?;
    Ok(u16::from_be_bytes(bytes))
}

fn be32(tag: u8, value: &[u8]) -> Result<u32, IeError> {
    let bytes: [u8; 4] = value.try_into().map_err(|_| IeError::BadLength {
        tag,
        len: value.len(),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

fn sockaddr(tag: u8, value: &[u8]) -> Result<SocketAddr, IeError> {
    if value.len() != SOCKADDR_IN_SIZE {
        return Err(IeError::BadLength {
            tag,
            len: value.len(),
        });
    }
    let port = u16::from_be_bytes([value[2], value[3]]);
    let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
    Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
}
