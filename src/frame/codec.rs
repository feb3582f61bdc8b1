//! Audio format identifiers and per-format sample counting.
//!
//! The engine never transcodes. It only needs to know how long a voice
//! payload plays so the jitter buffer can schedule it.

use std::fmt;

/// Audio format bit (or capability mask when several bits are set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Format(pub u32);

impl Format {
    /// G.723.1.
    pub const G723_1: Self = Self(1 << 0);
    /// GSM full rate.
    pub const GSM: Self = Self(1 << 1);
    /// G.711 µ-law.
    pub const ULAW: Self = Self(1 << 2);
    /// G.711 a-law.
    pub const ALAW: Self = Self(1 << 3);
    /// G.726 ADPCM.
    pub const G726: Self = Self(1 << 4);
    /// IMA ADPCM.
    pub const ADPCM: Self = Self(1 << 5);
    /// 16-bit signed linear.
    pub const SLINEAR: Self = Self(1 << 6);
    /// LPC10.
    pub const LPC10: Self = Self(1 << 7);
    /// G.729A.
    pub const G729A: Self = Self(1 << 8);
    /// Speex.
    pub const SPEEX: Self = Self(1 << 9);
    /// iLBC.
    pub const ILBC: Self = Self(1 << 10);

    /// Raw bit mask.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether any bit is shared with `other`.
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Length of one interpolated frame in ms.
    pub fn interp_len_ms(self) -> i64 {
        if self == Self::ILBC { 30 } else { 20 }
    }

    /// Number of 8 kHz samples in `payload`.
    ///
    /// An empty payload counts as one interpolation frame. Unknown formats
    /// count as zero.
    pub fn sample_count(self, payload: &[u8]) -> u32 {
        if payload.is_empty() {
            return (self.interp_len_ms() * 8) as u32;
        }
        let len = payload.len() as u32;
        match self {
            Self::SPEEX => speex_samples(payload),
            Self::G723_1 => 240,
            Self::ILBC => 240 * (len / 50),
            Self::GSM => 160 * (len / 33),
            Self::G729A => 160 * (len / 20),
            Self::SLINEAR => len / 2,
            Self::LPC10 => {
                let extra = payload.get(7).map_or(0, |b| u32::from(b & 0x1));
                22 * 8 + extra * 8
            }
            Self::ULAW | Self::ALAW => len,
            Self::ADPCM | Self::G726 => len * 2,
            _ => 0,
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl std::ops::BitOr for Format {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

fn bits_at(data: &[u8], n: u32, bit: usize) -> u8 {
    let byte = bit / 8;
    let rem = 8 - (bit % 8) as u32;
    let first = u32::from(data.get(byte).copied().unwrap_or(0));
    let ret = if rem < n {
        let second = u32::from(data.get(byte + 1).copied().unwrap_or(0));
        (first << (n - rem)) | (second >> (8 - n + rem))
    } else {
        first >> (rem - n)
    };
    (ret & (0xFF >> (8 - n))) as u8
}

const SPEEX_WB_SUBMODE_BITS: [usize; 8] = [0, 36, 112, 192, 352, 0, 0, 0];
const SPEEX_SUBMODE_BITS: [usize; 16] = [0, 43, 119, 160, 220, 300, 364, 492, 79, 0, 0, 0, 0, 0, 0, 0];
const SPEEX_INBAND_BITS: [usize; 16] = [1, 1, 4, 4, 4, 4, 4, 4, 8, 8, 16, 16, 32, 32, 64, 64];

/// Bits taken by up to two wideband layers starting at `bit`.
fn speex_wideband_bits(data: &[u8], bit: usize) -> Option<usize> {
    let total = data.len() * 8;
    let mut off = bit;
    for _ in 0..2 {
        if total.saturating_sub(off) >= 5 && bits_at(data, 1, off) != 0 {
            let mode = bits_at(data, 3, off + 1);
            off += SPEEX_WB_SUBMODE_BITS[usize::from(mode)];
        } else {
            return Some(off - bit);
        }
    }
    if total.saturating_sub(off) >= 5 && bits_at(data, 1, off) != 0 {
        // three wideband layers in a row: corrupt
        return None;
    }
    Some(off - bit)
}

fn speex_samples(data: &[u8]) -> u32 {
    let total = data.len() * 8;
    let mut bit = 0usize;
    let mut count = 0u32;
    while total.saturating_sub(bit) >= 5 {
        let Some(wb) = speex_wideband_bits(data, bit) else {
            break;
        };
        bit += wb;
        if total.saturating_sub(bit) < 5 {
            break;
        }
        let control = bits_at(data, 5, bit);
        bit += 5;
        match control {
            15 => break,
            14 => {
                let signal = bits_at(data, 4, bit);
                bit += 4 + SPEEX_INBAND_BITS[usize::from(signal)];
            }
            13 => {
                let len = bits_at(data, 5, bit);
                bit += 5 + usize::from(len) * 8;
            }
            c if c > 8 => break,
            c => {
                bit += SPEEX_SUBMODE_BITS[usize::from(c)].saturating_sub(5);
                count += 160;
            }
        }
    }
    count
}

/// Ordered codec preference list, encoded on the wire as letters
/// `'A' + bit index`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodecPrefs {
    order: Vec<Format>,
}

/// Longest preference list that fits in one information element.
const MAX_PREFS: usize = 32;

impl CodecPrefs {
    /// Empty preference list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a format, moving it to the end if already present.
    pub fn add(&mut self, format: Format) {
        self.remove(format);
        if self.order.len() < MAX_PREFS {
            self.order.push(format);
        }
    }

    /// Remove a format.
    pub fn remove(&mut self, format: Format) {
        self.order.retain(|f| *f != format);
    }

    /// First preferred format that is also present in `capability`.
    pub fn first_in(&self, capability: Format) -> Option<Format> {
        self.order.iter().copied().find(|f| f.intersects(capability))
    }

    /// Preferred formats in order.
    pub fn formats(&self) -> &[Format] {
        &self.order
    }

    /// Wire string.
    pub fn to_wire(&self) -> String {
        self.order
            .iter()
            .filter(|f| f.0.is_power_of_two())
            .map(|f| char::from(b'A' + f.0.trailing_zeros() as u8))
            .collect()
    }

    /// Parse a wire string; characters outside `'A'..'A'+32` are skipped.
    pub fn from_wire(s: &str) -> Self {
        let mut prefs = Self::new();
        for c in s.bytes() {
            if let Some(shift) = c.checked_sub(b'A').filter(|s| *s < 32) {
                prefs.add(Format(1 << shift));
            }
        }
        prefs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_count_fixed_rate() {
        assert_eq!(Format::ULAW.sample_count(&[0u8; 160]), 160);
        assert_eq!(Format::GSM.sample_count(&[0u8; 66]), 320);
        assert_eq!(Format::ILBC.sample_count(&[0u8; 50]), 240);
        assert_eq!(Format::SLINEAR.sample_count(&[0u8; 320]), 160);
        assert_eq!(Format::G726.sample_count(&[0u8; 80]), 160);
        assert_eq!(Format(1 << 20).sample_count(&[0u8; 10]), 0);
    }

    #[test]
    fn test_empty_payload_is_one_interp_frame() {
        assert_eq!(Format::ULAW.sample_count(&[]), 160);
        assert_eq!(Format::ILBC.sample_count(&[]), 240);
    }

    #[test]
    fn test_speex_narrowband_frames() {
        // Two narrowband mode-0 frames (5 control bits each) then a
        // terminator: 00000 00000 01111 padded to 2 bytes.
        let data = [0b0000_0000, 0b0001_1110];
        assert_eq!(Format::SPEEX.sample_count(&data), 320);
    }

    #[test]
    fn test_bits_at_straddles_bytes() {
        let data = [0b0000_0111, 0b1000_0000];
        assert_eq!(bits_at(&data, 5, 5), 0b11110);
        assert_eq!(bits_at(&data, 3, 0), 0);
    }

    #[test]
    fn test_codec_prefs_wire() {
        let mut prefs = CodecPrefs::new();
        prefs.add(Format::ULAW);
        prefs.add(Format::GSM);
        prefs.add(Format::ULAW);
        assert_eq!(prefs.to_wire(), "BC");
        assert_eq!(CodecPrefs::from_wire("BC"), prefs);
        assert_eq!(
            prefs.first_in(Format(Format::ULAW.0 | Format::ALAW.0)),
            Some(Format::ULAW)
        );
        prefs.remove(Format::ULAW);
        assert_eq!(prefs.formats(), &[Format::GSM]);
    }
}
