// ============================================================================
// Buffer sources: one read-only view over 8-bit and 16-bit JSON input
// ============================================================================
//
// Every scanning and matching routine in this crate is generic over `Unit`,
// so the byte and code-unit decoders share a single implementation instead of
// two parallel code paths. A `Unit` knows how to present itself as a lane of
// a 64-bit scan word; the word-level tricks live in `scan`.

use std::borrow::Cow;

use crate::error::Error;

/// A single element of an input buffer: a byte or a UTF-16-style code unit.
///
/// The associated constants describe how units pack into a `u64` scan word:
/// 8 one-byte lanes or 4 two-byte lanes. `LO`/`HI` are the usual SWAR
/// companions (low bit / high bit of every lane set).
pub trait Unit: Copy + Eq + std::fmt::Debug + 'static {
    /// Units per 64-bit scan word.
    const LANES: usize;
    /// Bits per lane.
    const LANE_BITS: u32;
    /// Low bit of every lane.
    const LO: u64;
    /// High bit of every lane.
    const HI: u64;
    /// Whether the scanner must stop on units with the high bit set.
    /// True for bytes (multi-byte UTF-8 leads), false for code units.
    const STOP_ON_HIGH: bool;

    fn from_ascii(b: u8) -> Self;
    fn as_u32(self) -> u32;

    /// The unit as an ASCII byte, if it is one.
    #[inline]
    fn as_ascii(self) -> Option<u8> {
        let v = self.as_u32();
        if v < 0x80 {
            Some(v as u8)
        } else {
            None
        }
    }

    #[inline]
    fn is_ascii(self, b: u8) -> bool {
        self.as_u32() == b as u32
    }

    /// Load `LANES` units starting at `buf[at]` into one scan word,
    /// first unit in the lowest lane. Plain checked indexing composed with
    /// shift-and-or; the optimizer turns it into a single unaligned load.
    fn load_word(buf: &[Self], at: usize) -> u64;

    /// Broadcast an ASCII byte into every lane.
    #[inline]
    fn splat(b: u8) -> u64 {
        Self::LO.wrapping_mul(b as u64)
    }

    /// Whether `units` spell exactly `name` in this encoding.
    fn eq_name(units: &[Self], name: &str) -> bool;
}

impl Unit for u8 {
    const LANES: usize = 8;
    const LANE_BITS: u32 = 8;
    const LO: u64 = 0x0101_0101_0101_0101;
    const HI: u64 = 0x8080_8080_8080_8080;
    const STOP_ON_HIGH: bool = true;

    #[inline(always)]
    fn from_ascii(b: u8) -> Self {
        b
    }

    #[inline(always)]
    fn as_u32(self) -> u32 {
        self as u32
    }

    #[inline(always)]
    fn load_word(buf: &[Self], at: usize) -> u64 {
        let mut w = 0u64;
        let mut i = 0;
        while i < 8 {
            w |= (buf[at + i] as u64) << (8 * i);
            i += 1;
        }
        w
    }

    #[inline]
    fn eq_name(units: &[Self], name: &str) -> bool {
        units == name.as_bytes()
    }
}

impl Unit for u16 {
    const LANES: usize = 4;
    const LANE_BITS: u32 = 16;
    const LO: u64 = 0x0001_0001_0001_0001;
    const HI: u64 = 0x8000_8000_8000_8000;
    const STOP_ON_HIGH: bool = false;

    #[inline(always)]
    fn from_ascii(b: u8) -> Self {
        b as u16
    }

    #[inline(always)]
    fn as_u32(self) -> u32 {
        self as u32
    }

    #[inline(always)]
    fn load_word(buf: &[Self], at: usize) -> u64 {
        let mut w = 0u64;
        let mut i = 0;
        while i < 4 {
            w |= (buf[at + i] as u64) << (16 * i);
            i += 1;
        }
        w
    }

    #[inline]
    fn eq_name(units: &[Self], name: &str) -> bool {
        let mut it = name.encode_utf16();
        for &u in units {
            match it.next() {
                Some(n) if n == u => {}
                _ => return false,
            }
        }
        it.next().is_none()
    }
}

/// Uniform read-only view over a JSON input buffer.
///
/// All variants must produce identical visible results for identical
/// content; they differ only in allocation behavior. `substring` performs at
/// most one allocation and must only be called with token-aligned bounds
/// inside `[0, len)`.
pub trait Source {
    type Unit: Unit;

    /// The raw buffer.
    fn units(&self) -> &[Self::Unit];

    /// The underlying bytes. Fails on sources that are not byte-backed.
    fn bytes(&self) -> Result<&[u8], Error>;

    /// The original text value this buffer was derived from.
    /// Fails on sources whose buffer is not borrowable as `str`.
    fn input(&self) -> Result<&str, Error>;

    /// Offset of the next occurrence of `unit` at or after `from`.
    fn index_of(&self, unit: Self::Unit, from: usize) -> Option<usize>;

    /// Text content of `[begin, end)`. Borrows whenever the encoding
    /// allows it; never copies more than the requested range.
    fn substring(&self, begin: usize, end: usize) -> Cow<'_, str>;

    #[inline]
    fn len(&self) -> usize {
        self.units().len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.units().is_empty()
    }
}

// ---------------------------------------------------------------------------
// 8-bit, ASCII-only: substrings are direct slices of the original text
// ---------------------------------------------------------------------------

/// Byte source over input known to be pure ASCII. Substring extraction
/// reconstructs text identity directly from the byte offsets, zero-copy.
pub struct AsciiSource<'a> {
    text: &'a str,
}

impl<'a> AsciiSource<'a> {
    pub fn new(text: &'a str) -> Result<Self, Error> {
        if !text.is_ascii() {
            return Err(Error::Unsupported("non-ASCII input for AsciiSource"));
        }
        Ok(AsciiSource { text })
    }
}

impl Source for AsciiSource<'_> {
    type Unit = u8;

    #[inline(always)]
    fn units(&self) -> &[u8] {
        self.text.as_bytes()
    }

    #[inline]
    fn bytes(&self) -> Result<&[u8], Error> {
        Ok(self.text.as_bytes())
    }

    #[inline]
    fn input(&self) -> Result<&str, Error> {
        Ok(self.text)
    }

    #[inline]
    fn index_of(&self, unit: u8, from: usize) -> Option<usize> {
        self.text.as_bytes()[from..]
            .iter()
            .position(|&b| b == unit)
            .map(|i| from + i)
    }

    #[inline]
    fn substring(&self, begin: usize, end: usize) -> Cow<'_, str> {
        // ASCII: every offset is a char boundary
        Cow::Borrowed(&self.text[begin..end])
    }
}

// ---------------------------------------------------------------------------
// 8-bit, UTF-8/Latin-1: substrings go through a byte-to-text conversion
// ---------------------------------------------------------------------------

/// Byte source over UTF-8 input. The whole buffer is validated once at
/// construction (simdutf8), so token-aligned substrings borrow.
#[derive(Debug)]
pub struct Utf8Source<'a> {
    text: &'a str,
}

impl<'a> Utf8Source<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, Error> {
        match simdutf8::compat::from_utf8(bytes) {
            Ok(text) => Ok(Utf8Source { text }),
            Err(e) => Err(Error::syntax(
                "invalid UTF-8 in input",
                e.valid_up_to(),
                String::new(),
            )),
        }
    }
}

impl Source for Utf8Source<'_> {
    type Unit = u8;

    #[inline(always)]
    fn units(&self) -> &[u8] {
        self.text.as_bytes()
    }

    #[inline]
    fn bytes(&self) -> Result<&[u8], Error> {
        Ok(self.text.as_bytes())
    }

    #[inline]
    fn input(&self) -> Result<&str, Error> {
        Ok(self.text)
    }

    #[inline]
    fn index_of(&self, unit: u8, from: usize) -> Option<usize> {
        self.text.as_bytes()[from..]
            .iter()
            .position(|&b| b == unit)
            .map(|i| from + i)
    }

    #[inline]
    fn substring(&self, begin: usize, end: usize) -> Cow<'_, str> {
        // Token bounds land on ASCII delimiters, so the slice stays valid
        // UTF-8; the lossy path never triggers for in-contract callers.
        String::from_utf8_lossy(&self.text.as_bytes()[begin..end])
    }
}

// ---------------------------------------------------------------------------
// 16-bit: the buffer is already decoded code units
// ---------------------------------------------------------------------------

/// Source over UTF-16-style code units. Slicing decodes the requested range.
pub struct WideSource<'a> {
    units: &'a [u16],
}

impl<'a> WideSource<'a> {
    pub fn new(units: &'a [u16]) -> Self {
        WideSource { units }
    }
}

impl Source for WideSource<'_> {
    type Unit = u16;

    #[inline(always)]
    fn units(&self) -> &[u16] {
        self.units
    }

    #[inline]
    fn bytes(&self) -> Result<&[u8], Error> {
        Err(Error::Unsupported("bytes() on a 16-bit source"))
    }

    #[inline]
    fn input(&self) -> Result<&str, Error> {
        Err(Error::Unsupported("input() on a 16-bit source"))
    }

    #[inline]
    fn index_of(&self, unit: u16, from: usize) -> Option<usize> {
        self.units[from..]
            .iter()
            .position(|&u| u == unit)
            .map(|i| from + i)
    }

    #[inline]
    fn substring(&self, begin: usize, end: usize) -> Cow<'_, str> {
        Cow::Owned(String::from_utf16_lossy(&self.units[begin..end]))
    }
}
