// ============================================================================
// Encode direction: values back to JSON text
// ============================================================================
//
// Strings are written with a bulk fast path: the scanner finds the next byte
// that needs an escape and everything before it is copied in one
// `write_all`. Numbers go through itoa/ryu, date/time literals through the
// packed words in `packed` so a single wide store emits several characters
// at once.

use std::collections::HashSet;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use crate::packed::{self, DateTime};
use crate::scan;
use crate::value::Value;

/// Escape mode for JSON string encoding.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum EscapeMode {
    /// Standard JSON escaping (default).
    #[default]
    Json,
    /// Also escape <, >, & for safe HTML embedding.
    HtmlSafe,
    /// Escape all non-ASCII characters as \uXXXX.
    UnicodeSafe,
    /// Escape line/paragraph separators for JavaScript embedding.
    JavaScriptSafe,
}

/// Shared formatting context holding heap-allocated separator strings.
/// Referenced by `FormatOptions` to avoid cloning on every `nested()` call.
pub struct FormatContext {
    pub line_separator: Vec<u8>,
    pub after_colon: Vec<u8>,
    pub indent: Vec<u8>,
    pub strict_keys: bool,
}

impl Default for FormatContext {
    fn default() -> Self {
        Self {
            line_separator: b"\n".to_vec(),
            after_colon: b" ".to_vec(),
            indent: b"  ".to_vec(),
            strict_keys: false,
        }
    }
}

/// Formatting options for JSON output.
#[derive(Clone, Copy)]
pub struct FormatOptions<'ctx> {
    /// Whether pretty printing is enabled.
    pretty: bool,
    /// Current indentation level (internal use).
    depth: u32,
    /// Escape mode for strings.
    escape: EscapeMode,
    /// Shared context with heap-allocated data.
    ctx: &'ctx FormatContext,
}

impl<'ctx> FormatOptions<'ctx> {
    pub fn compact(ctx: &'ctx FormatContext) -> Self {
        Self {
            pretty: false,
            depth: 0,
            escape: EscapeMode::Json,
            ctx,
        }
    }

    pub fn pretty(ctx: &'ctx FormatContext) -> Self {
        Self {
            pretty: true,
            depth: 0,
            escape: EscapeMode::Json,
            ctx,
        }
    }

    pub fn with_escape(mut self, escape: EscapeMode) -> Self {
        self.escape = escape;
        self
    }

    #[inline(always)]
    fn strict_keys(&self) -> bool {
        self.ctx.strict_keys
    }

    #[inline(always)]
    fn escape_mode(&self) -> EscapeMode {
        self.escape
    }

    #[inline(always)]
    fn nested(&self) -> Self {
        Self {
            pretty: self.pretty,
            depth: self.depth + 1,
            escape: self.escape,
            ctx: self.ctx,
        }
    }

    #[inline(always)]
    fn write_newline<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if self.pretty {
            writer.write_all(&self.ctx.line_separator)?;
            for _ in 0..self.depth {
                writer.write_all(&self.ctx.indent)?;
            }
        }
        Ok(())
    }

    #[inline(always)]
    fn write_space<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        if self.pretty {
            writer.write_all(&self.ctx.after_colon)?;
        }
        Ok(())
    }
}

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: u32 = 128;

/// Check for duplicate keys in strict mode.
#[inline]
fn check_strict_key(seen: &mut Option<HashSet<String>>, key: &str) -> io::Result<()> {
    if let Some(set) = seen {
        if !set.insert(key.to_string()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("duplicate key: {key:?}"),
            ));
        }
    }
    Ok(())
}

/// Write a value tree as JSON.
pub fn write_value<W: Write>(
    value: &Value,
    writer: &mut W,
    opts: FormatOptions<'_>,
) -> io::Result<()> {
    if opts.depth > MAX_DEPTH {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("nesting depth exceeds maximum of {MAX_DEPTH}"),
        ));
    }

    match value {
        Value::Null => writer.write_all(b"null"),
        Value::Bool(true) => writer.write_all(b"true"),
        Value::Bool(false) => writer.write_all(b"false"),
        Value::Int(i) => {
            let mut buf = itoa::Buffer::new();
            writer.write_all(buf.format(*i).as_bytes())
        }
        Value::UInt(u) => {
            let mut buf = itoa::Buffer::new();
            writer.write_all(buf.format(*u).as_bytes())
        }
        Value::Float(f) => write_float(*f, writer),
        Value::Str(s) => write_json_string(s, writer, opts.escape_mode()),
        Value::Array(items) => write_array(items, writer, opts),
        Value::Object(members) => write_object(members, writer, opts),
    }
}

/// Encode into a fresh buffer.
pub fn to_vec(value: &Value, opts: FormatOptions<'_>) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    write_value(value, &mut out, opts)?;
    Ok(out)
}

#[inline(always)]
fn write_float<W: Write>(f: f64, writer: &mut W) -> io::Result<()> {
    if f.is_finite() {
        let mut buf = ryu::Buffer::new();
        writer.write_all(buf.format(f).as_bytes())
    } else {
        Err(io::Error::new(io::ErrorKind::InvalidData, "non-finite float"))
    }
}

fn write_array<W: Write>(items: &[Value], writer: &mut W, opts: FormatOptions<'_>) -> io::Result<()> {
    if items.is_empty() {
        return writer.write_all(b"[]");
    }
    let nested = opts.nested();
    writer.write_all(b"[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",")?;
        }
        nested.write_newline(writer)?;
        write_value(item, writer, nested)?;
    }
    opts.write_newline(writer)?;
    writer.write_all(b"]")
}

fn write_object<W: Write>(
    members: &[(std::sync::Arc<str>, Value)],
    writer: &mut W,
    opts: FormatOptions<'_>,
) -> io::Result<()> {
    if members.is_empty() {
        return writer.write_all(b"{}");
    }
    let nested = opts.nested();
    let escape = opts.escape_mode();
    let mut seen: Option<HashSet<String>> = if opts.strict_keys() {
        Some(HashSet::new())
    } else {
        None
    };

    writer.write_all(b"{")?;
    for (i, (key, value)) in members.iter().enumerate() {
        if i > 0 {
            writer.write_all(b",")?;
        }
        check_strict_key(&mut seen, key)?;
        nested.write_newline(writer)?;
        write_json_string(key, writer, escape)?;
        writer.write_all(b":")?;
        nested.write_space(writer)?;
        write_value(value, writer, nested)?;
    }
    opts.write_newline(writer)?;
    writer.write_all(b"}")
}

/// Fast JSON string escaping - copies safe spans in bulk.
///
/// The standard mode scans for the next byte needing an escape with the
/// word-at-a-time scanner and writes everything before it in one call. The
/// special modes are rarer and take the char-wise path.
pub fn write_json_string<W: Write>(
    s: &str,
    writer: &mut W,
    escape_mode: EscapeMode,
) -> io::Result<()> {
    writer.write_all(b"\"")?;

    if escape_mode == EscapeMode::Json {
        let bytes = s.as_bytes();
        let mut pos = 0;
        while pos < bytes.len() {
            let stop = scan::skip_clean(bytes, pos, b'"');
            if stop > pos {
                writer.write_all(&bytes[pos..stop])?;
            }
            if stop == bytes.len() {
                break;
            }
            match bytes[stop] {
                b'"' => writer.write_all(b"\\\"")?,
                b'\\' => writer.write_all(b"\\\\")?,
                b'\n' => writer.write_all(b"\\n")?,
                b'\r' => writer.write_all(b"\\r")?,
                b'\t' => writer.write_all(b"\\t")?,
                b'\x08' => writer.write_all(b"\\b")?,
                b'\x0c' => writer.write_all(b"\\f")?,
                other => write!(writer, "\\u{:04x}", other)?,
            }
            pos = stop + 1;
        }
    } else {
        // char-wise path handles the multi-byte-sensitive modes
        for ch in s.chars() {
            match ch {
                '"' => writer.write_all(b"\\\"")?,
                '\\' => writer.write_all(b"\\\\")?,
                '\n' => writer.write_all(b"\\n")?,
                '\r' => writer.write_all(b"\\r")?,
                '\t' => writer.write_all(b"\\t")?,
                '\x08' => writer.write_all(b"\\b")?,
                '\x0c' => writer.write_all(b"\\f")?,
                '\x00'..='\x1f' => write!(writer, "\\u{:04x}", ch as u32)?,
                '<' if escape_mode == EscapeMode::HtmlSafe => writer.write_all(b"\\u003c")?,
                '>' if escape_mode == EscapeMode::HtmlSafe => writer.write_all(b"\\u003e")?,
                '&' if escape_mode == EscapeMode::HtmlSafe => writer.write_all(b"\\u0026")?,
                '/' if escape_mode == EscapeMode::HtmlSafe => writer.write_all(b"\\/")?,
                '\u{2028}'
                    if escape_mode == EscapeMode::JavaScriptSafe
                        || escape_mode == EscapeMode::HtmlSafe =>
                {
                    writer.write_all(b"\\u2028")?
                }
                '\u{2029}'
                    if escape_mode == EscapeMode::JavaScriptSafe
                        || escape_mode == EscapeMode::HtmlSafe =>
                {
                    writer.write_all(b"\\u2029")?
                }
                c if escape_mode == EscapeMode::UnicodeSafe && !c.is_ascii() => {
                    if (c as u32) < 0x10000 {
                        write!(writer, "\\u{:04x}", c as u32)?
                    } else {
                        // supplementary plane: surrogate pair
                        let v = c as u32 - 0x10000;
                        write!(writer, "\\u{:04x}\\u{:04x}", 0xD800 + (v >> 10), 0xDC00 + (v & 0x3FF))?
                    }
                }
                c => {
                    let mut buf = [0u8; 4];
                    writer.write_all(c.encode_utf8(&mut buf).as_bytes())?;
                }
            }
        }
    }

    writer.write_all(b"\"")
}

/// Emit a date/time value as a quoted literal via the packed word codec.
/// `separator` is `b' '` or `b'T'`.
pub fn write_datetime_literal<W: Write>(
    dt: &DateTime,
    separator: u8,
    writer: &mut W,
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(32);
    packed::write_datetime(dt, separator, &mut buf);
    writer.write_all(b"\"")?;
    writer.write_all(&buf)?;
    writer.write_all(b"\"")
}

/// Emit `"HH:mm:ss"`.
pub fn write_time_literal<W: Write>(
    hour: u32,
    minute: u32,
    second: u32,
    writer: &mut W,
) -> io::Result<()> {
    let mut buf = Vec::with_capacity(8);
    packed::write_time(hour, minute, second, &mut buf);
    writer.write_all(b"\"")?;
    writer.write_all(&buf)?;
    writer.write_all(b"\"")
}

// ----------------------------------------------------------------------------
// Worker-scoped output buffers
// ----------------------------------------------------------------------------

/// Pool of reusable encode buffers. Each writer borrows one buffer for its
/// lifetime and returns it on drop; buffers that grew past the retain
/// budget are dropped instead of pooled. Buffers are never shared between
/// two live writers.
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
    retain_bytes: usize,
}

impl BufferPool {
    /// `retain_bytes` caps the capacity a buffer may keep between uses.
    pub fn new(retain_bytes: usize) -> Self {
        BufferPool {
            buffers: Mutex::new(Vec::new()),
            retain_bytes,
        }
    }

    /// Take a cleared buffer out of the pool (or allocate a fresh one).
    pub fn acquire(&self) -> PooledBuf<'_> {
        let buf = self
            .buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(128));
        PooledBuf {
            pool: self,
            buf: Some(buf),
        }
    }

    fn release(&self, mut buf: Vec<u8>) {
        if buf.capacity() > self.retain_bytes {
            return;
        }
        buf.clear();
        self.buffers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(buf);
    }
}

/// An output buffer checked out of a [`BufferPool`].
pub struct PooledBuf<'p> {
    pool: &'p BufferPool,
    buf: Option<Vec<u8>>,
}

impl PooledBuf<'_> {
    /// Keep the contents; the buffer is not returned to the pool.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.take().unwrap_or_default()
    }
}

impl Deref for PooledBuf<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        self.buf.as_ref().expect("buffer taken")
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        self.buf.as_mut().expect("buffer taken")
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}
