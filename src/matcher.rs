// ============================================================================
// Runtime key matching: hash while scanning for the closing quote
// ============================================================================
//
// The matcher replays the hash strategy its table was built with, unit by
// unit, while looking for the key's terminator. Hashing and lookup happen in
// one pass; the key text is never materialized. Whether a terminator is real
// is decided by backslash parity: an odd run of preceding backslashes means
// the quote is escaped and scanning continues.
//
// Keys that contain escape sequences hash over their raw units and so never
// match a stored (unescaped) name; they come back unmatched and the caller
// skips the value. Unmatched is a normal result, not an error.

use crate::error::{excerpt, Error};
use crate::keytable::KeyTable;
use crate::source::Unit;

/// Result of scanning one key.
#[derive(Debug)]
pub struct KeyScan {
    /// Resolved field handle, or `None` for an unknown key.
    pub handle: Option<u32>,
    /// Offset of the first name unit.
    pub start: usize,
    /// Offset of the terminator for quoted keys (resume at `end + 1`), or
    /// one past the last name unit for unquoted keys (resume at `end`).
    pub end: usize,
}

/// Parity of the backslash run immediately before `at`.
#[inline]
fn escaped<U: Unit>(units: &[U], start: usize, at: usize) -> bool {
    let mut j = at;
    while j > start && units[j - 1].as_u32() == b'\\' as u32 {
        j -= 1;
    }
    (at - j) % 2 == 1
}

#[inline]
fn unterminated<U: Unit>(units: &[U], start: usize) -> Error {
    Error::syntax(
        "unterminated string",
        units.len(),
        excerpt(units, start),
    )
}

/// Match a quoted key. `start` is the offset just after the opening quote;
/// `quote` is the terminator unit (`"` or, in single-quote mode, `'`).
///
/// In fast mode (collision-free table, ASCII names, `strict` not forced) a
/// hash match alone resolves the field. Strict mode re-checks the stored
/// name against the scanned region before accepting.
pub fn match_key<U: Unit>(
    units: &[U],
    start: usize,
    quote: u8,
    table: &KeyTable,
    strict: bool,
) -> Result<KeyScan, Error> {
    let kind = table.kind();
    let len = units.len();
    let mut h = 0u64;
    let mut i = start;
    let mut saw_escape = false;

    // two units per step; the odd tail takes the single-unit arm
    let end = loop {
        if i >= len {
            return Err(unterminated(units, start));
        }
        let a = units[i];
        if a.is_ascii(quote) {
            if escaped(units, start, i) {
                h = kind.step(h, a.as_u32());
                i += 1;
                continue;
            }
            break i;
        }
        if a.as_u32() == b'\\' as u32 {
            saw_escape = true;
        }
        if i + 1 < len {
            let b = units[i + 1];
            if b.is_ascii(quote) {
                h = kind.step(h, a.as_u32());
                if escaped(units, start, i + 1) {
                    h = kind.step(h, b.as_u32());
                    i += 2;
                    continue;
                }
                break i + 1;
            }
            if b.as_u32() == b'\\' as u32 {
                saw_escape = true;
            }
            h = kind.step(kind.step(h, a.as_u32()), b.as_u32());
            i += 2;
        } else {
            h = kind.step(h, a.as_u32());
            i += 1;
        }
    };

    if saw_escape {
        return Ok(KeyScan {
            handle: None,
            start,
            end,
        });
    }

    let handle = lookup(units, start, end, h, table, strict);
    Ok(KeyScan { handle, start, end })
}

/// Match an unquoted key (mode flag). The name runs to the first colon or
/// whitespace unit and is hashed with the exact same strategy.
pub fn match_unquoted<U: Unit>(
    units: &[U],
    start: usize,
    table: &KeyTable,
    strict: bool,
) -> Result<KeyScan, Error> {
    let kind = table.kind();
    let len = units.len();
    let mut h = 0u64;
    let mut i = start;

    while i < len {
        let v = units[i].as_u32();
        if v == b':' as u32
            || v == b' ' as u32
            || v == b'\t' as u32
            || v == b'\n' as u32
            || v == b'\r' as u32
        {
            break;
        }
        h = kind.step(h, v);
        i += 1;
    }

    if i == start {
        return Err(Error::syntax(
            "expected object key",
            start,
            excerpt(units, start),
        ));
    }

    let handle = lookup(units, start, i, h, table, strict);
    Ok(KeyScan {
        handle,
        start,
        end: i,
    })
}

#[inline]
fn lookup<U: Unit>(
    units: &[U],
    start: usize,
    end: usize,
    hash: u64,
    table: &KeyTable,
    strict: bool,
) -> Option<u32> {
    if table.fast_mode_ok() && !strict {
        table
            .probe(hash)
            .find(|e| e.hash() == hash)
            .map(|e| e.handle())
    } else {
        table
            .probe(hash)
            .find(|e| e.hash() == hash && U::eq_name(&units[start..end], e.name()))
            .map(|e| e.handle())
    }
}
