//! # shapejson
//!
//! A shape-directed JSON codec. Decoding is driven by *object shapes*: the
//! known field-name set of a type is compiled once into a
//! collision-minimizing hash table ([`keytable`]), and object keys are then
//! hashed while the scanner looks for their closing quote ([`matcher`]):
//! field resolution without materializing a key string. String scanning
//! moves word-at-a-time ([`scan`]), numeric and date literals move as packed
//! machine words ([`packed`]), and the whole pipeline is generic over 8-bit
//! and 16-bit input buffers ([`source`]).
//!
//! Shapeless input decodes into [`Value`] trees; the encode direction writes
//! values back out with bulk escape scanning, itoa/ryu number formatting,
//! and wide-store date/time literals.
//!
//! ```
//! use shapejson::{decode_str, DecodeOptions, Value};
//!
//! let value = decode_str("{\"id\":1,\"name\":\"Ann\"}", DecodeOptions::default()).unwrap();
//! assert_eq!(value.get("id").and_then(Value::as_i64), Some(1));
//! assert_eq!(value.get("name").and_then(Value::as_str), Some("Ann"));
//! ```
//!
//! Typed decoding goes through a [`Shape`] built from per-field decode
//! functions:
//!
//! ```
//! use shapejson::{decode_into, AsciiSource, Decoder, Error, Shape};
//!
//! #[derive(Default)]
//! struct User {
//!     id: i64,
//!     name: String,
//! }
//!
//! fn id(u: &mut User, d: &mut Decoder<'_, u8>) -> Result<(), Error> {
//!     u.id = d.read_i64()?;
//!     Ok(())
//! }
//!
//! fn name(u: &mut User, d: &mut Decoder<'_, u8>) -> Result<(), Error> {
//!     u.name = d.read_string()?.into_owned();
//!     Ok(())
//! }
//!
//! let shape: Shape<User, u8> = Shape::builder().field("id", id).field("name", name).build();
//! let src = AsciiSource::new("{\"id\":7,\"name\":\"Ann\"}").unwrap();
//! let mut user = User::default();
//! decode_into(&src, &shape, &mut user, Default::default()).unwrap();
//! assert_eq!(user.id, 7);
//! assert_eq!(user.name, "Ann");
//! ```

pub mod compression;
pub mod decode;
pub mod encode;
mod error;
pub mod intern;
pub mod keytable;
pub mod matcher;
pub mod packed;
pub mod scan;
pub mod shape;
pub mod source;
pub mod value;

pub use decode::{Cursor, DecodeOptions, Decoder};
pub use encode::{BufferPool, EscapeMode, FormatContext, FormatOptions};
pub use error::Error;
pub use packed::DateTime;
pub use shape::{Shape, ShapeBuilder, TaggedShapes, DEFAULT_DISCRIMINATOR};
pub use source::{AsciiSource, Source, Unit, Utf8Source, WideSource};
pub use value::Value;

/// Decode one JSON value from text, picking the cheapest byte source for
/// the content (ASCII input slices zero-copy).
pub fn decode_str(input: &str, opts: DecodeOptions) -> Result<Value, Error> {
    if input.is_ascii() {
        let src = AsciiSource::new(input)?;
        decode_value_from(&src, opts)
    } else {
        let src = Utf8Source::new(input.as_bytes())?;
        decode_value_from(&src, opts)
    }
}

/// Decode one JSON value from UTF-8 bytes.
pub fn decode_slice(bytes: &[u8], opts: DecodeOptions) -> Result<Value, Error> {
    let src = Utf8Source::new(bytes)?;
    decode_value_from(&src, opts)
}

/// Decode one JSON value from 16-bit code units.
pub fn decode_units(units: &[u16], opts: DecodeOptions) -> Result<Value, Error> {
    let src = WideSource::new(units);
    decode_value_from(&src, opts)
}

/// Decode one JSON value from any source, rejecting trailing input.
pub fn decode_value_from<S: Source>(src: &S, opts: DecodeOptions) -> Result<Value, Error> {
    let mut de = Decoder::new(src, opts);
    let value = de.decode_value()?;
    de.finish()?;
    Ok(value)
}

/// Decode one object of `shape` into `out`, rejecting trailing input.
pub fn decode_into<S: Source, T>(
    src: &S,
    shape: &Shape<T, S::Unit>,
    out: &mut T,
    opts: DecodeOptions,
) -> Result<(), Error> {
    let mut de = Decoder::new(src, opts);
    de.decode_object(shape, out)?;
    de.finish()
}

/// Encode a value compactly into a fresh buffer.
pub fn encode_value(value: &Value) -> std::io::Result<Vec<u8>> {
    let ctx = FormatContext::default();
    encode::to_vec(value, FormatOptions::compact(&ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_both_encodings() {
        let text = "{\"id\":1,\"name\":\"Ann\",\"tags\":[true,null,1.5],\"nested\":{\"k\":\"v\"}}";

        let from_str = decode_str(text, DecodeOptions::default()).unwrap();
        let units: Vec<u16> = text.encode_utf16().collect();
        let from_units = decode_units(&units, DecodeOptions::default()).unwrap();
        assert_eq!(from_str, from_units);

        let encoded = encode_value(&from_str).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), text);
    }

    #[test]
    fn test_non_ascii_input_takes_utf8_source() {
        let text = "{\"k\":\"caf\u{e9}\"}";
        let value = decode_str(text, DecodeOptions::default()).unwrap();
        assert_eq!(value.get("k").and_then(Value::as_str), Some("caf\u{e9}"));
        let encoded = encode_value(&value).unwrap();
        assert_eq!(String::from_utf8(encoded).unwrap(), text);
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let err = decode_str("{\"a\":1} x", DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }
}
