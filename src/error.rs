use thiserror::Error;

use crate::source::Unit;

/// How many units of surrounding input a syntax error carries for context.
const EXCERPT_WINDOW: usize = 16;

/// A short, printable excerpt of the input around `at`, for diagnostics.
/// Works on either unit width; unpaired surrogates render as U+FFFD.
pub(crate) fn excerpt<U: Unit>(units: &[U], at: usize) -> String {
    let from = at.saturating_sub(EXCERPT_WINDOW / 2);
    let to = (from + EXCERPT_WINDOW).min(units.len());
    units[from..to]
        .iter()
        .map(|u| char::from_u32(u.as_u32()).unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}

/// Errors surfaced by the decode and source layers.
///
/// Unknown object keys are not errors: the matcher reports them as `None`
/// and the decode loop skips the value. A scan past the end of a buffer is
/// a caller-contract violation and panics instead of returning here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed input. Aborts the whole parse call; no partial results.
    #[error("syntax error at offset {offset}: {reason} (near {excerpt:?})")]
    Syntax {
        reason: String,
        offset: usize,
        excerpt: String,
    },

    /// A buffer source was asked for an operation it structurally cannot
    /// perform, e.g. byte access on a 16-bit source.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl Error {
    #[inline]
    pub(crate) fn syntax(reason: impl Into<String>, offset: usize, excerpt: String) -> Self {
        Error::Syntax {
            reason: reason.into(),
            offset,
            excerpt,
        }
    }

    /// Offset the error refers to, when it carries one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Syntax { offset, .. } => Some(*offset),
            Error::Unsupported(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_position() {
        let err = Error::syntax("unexpected character", 7, "\"id\":1,}".to_string());
        let msg = err.to_string();
        assert!(msg.contains("offset 7"), "{msg}");
        assert!(msg.contains("unexpected character"), "{msg}");
    }

    #[test]
    fn test_excerpt_window_both_widths() {
        let bytes = b"0123456789abcdefghij";
        assert_eq!(excerpt::<u8>(bytes, 10), "23456789abcdefgh");
        assert_eq!(excerpt::<u8>(bytes, 1), "0123456789abcdef");
        let wide: Vec<u16> = "{\"a\"".encode_utf16().collect();
        assert_eq!(excerpt::<u16>(&wide, 1), "{\"a\"");
    }

    #[test]
    fn test_offset_accessor() {
        assert_eq!(
            Error::syntax("x", 3, String::new()).offset(),
            Some(3)
        );
        assert_eq!(Error::Unsupported("bytes()").offset(), None);
    }
}
