// ============================================================================
// Word-at-a-time scanning for JSON string tokens
// ============================================================================
//
// Loads 8 bytes (or 4 code units) into one u64 and tests all lanes against
// the interesting characters with branch-free mask arithmetic. The lane-zero
// test `(w - LO) & !w & HI` can flag a word that contains no real match
// (borrow propagation; for 16-bit lanes also values >= 0x8000), so a flagged
// word is always re-validated with direct element comparisons before an
// offset is returned. A mask hit is a hint, never an answer.
//
// Both scanners assume forward-only movement. `next_stop` additionally
// relies on the caller guaranteeing that a terminator exists before the end
// of the buffer; running off the end is an invariant violation, not a
// recoverable error.

use crate::source::Unit;

/// All-lanes test: high bit set in every lane that is zero.
/// May set spurious bits (see module docs); callers re-validate.
#[inline(always)]
fn zero_lanes<U: Unit>(w: u64) -> u64 {
    w.wrapping_sub(U::LO) & !w & U::HI
}

#[inline(always)]
fn stop_mask<U: Unit>(w: u64, quote: u64, backslash: u64) -> u64 {
    let mut m = zero_lanes::<U>(w ^ quote) | zero_lanes::<U>(w ^ backslash);
    if U::STOP_ON_HIGH {
        m |= w & U::HI;
    }
    m
}

#[inline(always)]
fn is_stop<U: Unit>(u: U, quote: u8) -> bool {
    let v = u.as_u32();
    v == quote as u32 || v == b'\\' as u32 || (U::STOP_ON_HIGH && v >= 0x80)
}

#[inline(always)]
fn is_dirty<U: Unit>(u: U, quote: u8) -> bool {
    let v = u.as_u32();
    v == quote as u32 || v == b'\\' as u32 || v < 0x20
}

/// Exact offset of the first stop unit in the word at `at`, if any.
#[inline]
fn verify_stop<U: Unit>(units: &[U], at: usize, quote: u8) -> Option<usize> {
    let end = (at + U::LANES).min(units.len());
    (at..end).find(|&j| is_stop::<U>(units[j], quote))
}

#[inline]
fn verify_dirty<U: Unit>(units: &[U], at: usize, quote: u8) -> Option<usize> {
    let end = (at + U::LANES).min(units.len());
    (at..end).find(|&j| is_dirty::<U>(units[j], quote))
}

/// Offset of the next `quote`, backslash, or (byte buffers only) unit with
/// the high bit set, at or after `start`.
///
/// # Panics
///
/// Panics if no such unit exists before the end of the buffer. The caller
/// must guarantee a terminator; an unterminated scan is a programming error
/// at this layer, not a data error.
pub fn next_stop<U: Unit>(units: &[U], start: usize, quote: u8) -> usize {
    let len = units.len();
    let q = U::splat(quote);
    let bs = U::splat(b'\\');
    let mut i = start;

    // Four words per stride while a full block remains.
    while i + 4 * U::LANES <= len {
        let w = U::load_word(units, i);
        if stop_mask::<U>(w, q, bs) != 0 {
            if let Some(hit) = verify_stop(units, i, quote) {
                return hit;
            }
        }
        let w = U::load_word(units, i + U::LANES);
        if stop_mask::<U>(w, q, bs) != 0 {
            if let Some(hit) = verify_stop(units, i + U::LANES, quote) {
                return hit;
            }
        }
        let w = U::load_word(units, i + 2 * U::LANES);
        if stop_mask::<U>(w, q, bs) != 0 {
            if let Some(hit) = verify_stop(units, i + 2 * U::LANES, quote) {
                return hit;
            }
        }
        let w = U::load_word(units, i + 3 * U::LANES);
        if stop_mask::<U>(w, q, bs) != 0 {
            if let Some(hit) = verify_stop(units, i + 3 * U::LANES, quote) {
                return hit;
            }
        }
        i += 4 * U::LANES;
    }

    while i + U::LANES <= len {
        let w = U::load_word(units, i);
        if stop_mask::<U>(w, q, bs) != 0 {
            if let Some(hit) = verify_stop(units, i, quote) {
                return hit;
            }
        }
        i += U::LANES;
    }

    while i < len {
        if is_stop::<U>(units[i], quote) {
            return i;
        }
        i += 1;
    }

    panic!("scan ran past end of buffer: caller must guarantee a terminator");
}

/// Offset of the first unit at or after `start` that a plain string copy
/// cannot include verbatim: the quote, a backslash, or a control character
/// below 0x20. Returns `units.len()` when the remainder is clean.
///
/// Used to skip long escape-free spans in one pass; high-bit units do not
/// stop the scan (multi-byte UTF-8 content needs no escaping).
pub fn skip_clean<U: Unit>(units: &[U], start: usize, quote: u8) -> usize {
    let len = units.len();
    let q = U::splat(quote);
    let bs = U::splat(b'\\');
    let ctrl = U::splat(0x20);
    let mut i = start;

    while i + U::LANES <= len {
        let w = U::load_word(units, i);
        // lanes below 0x20; lanes with the high bit set are never flagged
        let below_ctrl = w.wrapping_sub(ctrl) & !w & U::HI;
        let m = zero_lanes::<U>(w ^ q) | zero_lanes::<U>(w ^ bs) | below_ctrl;
        if m != 0 {
            if let Some(hit) = verify_dirty(units, i, quote) {
                return hit;
            }
        }
        i += U::LANES;
    }

    while i < len {
        if is_dirty::<U>(units[i], quote) {
            return i;
        }
        i += 1;
    }

    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn naive_stop<U: Unit>(units: &[U], start: usize, quote: u8) -> Option<usize> {
        (start..units.len()).find(|&i| is_stop::<U>(units[i], quote))
    }

    fn naive_clean<U: Unit>(units: &[U], start: usize, quote: u8) -> usize {
        (start..units.len())
            .find(|&i| is_dirty::<U>(units[i], quote))
            .unwrap_or(units.len())
    }

    #[test]
    fn test_next_stop_finds_quote_across_strides() {
        for pad in [0usize, 1, 3, 7, 8, 15, 31, 32, 33, 63, 100] {
            let mut buf = vec![b'a'; pad];
            buf.push(b'"');
            buf.extend_from_slice(b"rest");
            assert_eq!(next_stop::<u8>(&buf, 0, b'"'), pad, "pad={pad}");
        }
    }

    #[test]
    fn test_next_stop_backslash_before_quote() {
        let buf = b"abcdefghijklmnop\\xyz\"";
        assert_eq!(next_stop::<u8>(buf, 0, b'"'), 16);
    }

    #[test]
    fn test_next_stop_high_byte_stops_byte_scan() {
        let mut buf = vec![b'x'; 20];
        buf[9] = 0xC3; // UTF-8 lead byte
        buf.push(b'"');
        assert_eq!(next_stop::<u8>(&buf, 0, b'"'), 9);
    }

    #[test]
    fn test_next_stop_wide_ignores_high_units() {
        // non-ASCII code units are content, not stops, on the 16-bit path
        let mut buf: Vec<u16> = vec![0x8022; 40]; // looks quote-like in the low byte
        buf.push(b'"' as u16);
        assert_eq!(next_stop::<u16>(&buf, 0, b'"'), 40);
    }

    #[test]
    fn test_next_stop_short_buffer_scalar_path() {
        let buf = b"ab\"";
        assert_eq!(next_stop::<u8>(buf, 0, b'"'), 2);
        let wide: Vec<u16> = vec![b'a' as u16, b'"' as u16];
        assert_eq!(next_stop::<u16>(&wide, 0, b'"'), 1);
    }

    #[test]
    #[should_panic(expected = "scan ran past end")]
    fn test_next_stop_missing_terminator_panics() {
        next_stop::<u8>(b"no terminator here", 0, b'"');
    }

    #[test]
    fn test_skip_clean_stops_on_control() {
        let buf = b"clean run of text\x01 more";
        assert_eq!(skip_clean::<u8>(buf, 0, b'"'), 17);
    }

    #[test]
    fn test_skip_clean_runs_to_end() {
        let buf = b"entirely clean ascii text with no escapes at all";
        assert_eq!(skip_clean::<u8>(buf, 0, b'"'), buf.len());
    }

    #[test]
    fn test_skip_clean_passes_high_bytes() {
        let s = "caf\u{e9} latte and more caf\u{e9}\"";
        let bytes = s.as_bytes();
        assert_eq!(skip_clean::<u8>(bytes, 0, b'"'), bytes.len() - 1);
    }

    #[quickcheck]
    fn prop_next_stop_matches_scalar_bytes(mut data: Vec<u8>, start: u8) -> bool {
        data.push(b'"'); // guarantee a terminator
        let start = (start as usize) % data.len();
        Some(next_stop::<u8>(&data, start, b'"')) == naive_stop::<u8>(&data, start, b'"')
    }

    #[quickcheck]
    fn prop_next_stop_matches_scalar_wide(mut data: Vec<u16>, start: u8) -> bool {
        data.push(b'"' as u16);
        let start = (start as usize) % data.len();
        Some(next_stop::<u16>(&data, start, b'"')) == naive_stop::<u16>(&data, start, b'"')
    }

    #[quickcheck]
    fn prop_skip_clean_matches_scalar_bytes(data: Vec<u8>, start: u8) -> bool {
        let start = (start as usize) % (data.len() + 1);
        skip_clean::<u8>(&data, start, b'"') == naive_clean::<u8>(&data, start, b'"')
    }

    #[quickcheck]
    fn prop_skip_clean_matches_scalar_wide(data: Vec<u16>, start: u8) -> bool {
        let start = (start as usize) % (data.len() + 1);
        skip_clean::<u16>(&data, start, b'"') == naive_clean::<u16>(&data, start, b'"')
    }
}
