// ============================================================================
// The object decode loop
// ============================================================================
//
// One `Decoder` drives one parse invocation: it owns the cursor, skips
// whitespace (and comments, when enabled) before every protocol state, finds
// key boundaries through the matcher, dispatches resolved fields to their
// shape's decode functions, and structurally skips values nobody asked for.
// Malformed input aborts the whole call with an offset-carrying syntax
// error; there is no recovery and no partial result.
//
// The member protocol is
//
//   ExpectKeyOrEnd -> ExpectColon -> ExpectValue -> ExpectCommaOrEnd
//
// with `}` terminal in ExpectKeyOrEnd (empty object) and, in trailing-comma
// mode, after a comma.

use std::borrow::Cow;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{excerpt, Error};
use crate::intern;
use crate::keytable::KeyTable;
use crate::matcher;
use crate::packed::{self, DateTime};
use crate::scan;
use crate::shape::{Shape, TaggedShapes};
use crate::source::{Source, Unit};
use crate::value::Value;

/// Maximum nesting depth to prevent stack overflow.
const MAX_DEPTH: usize = 128;

/// Mode flags. Everything beyond standard JSON defaults to off.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Accept `//` line and `/* */` block comments between tokens.
    pub allow_comments: bool,
    /// Accept single-quoted strings and keys.
    pub allow_single_quotes: bool,
    /// Accept unquoted object keys.
    pub allow_unquoted_keys: bool,
    /// Accept a trailing comma before `}` and `]`.
    pub allow_trailing_commas: bool,
    /// Verify matched key names even when the table is collision-free.
    pub strict_keys: bool,
    /// Intern object keys while decoding shapeless values.
    pub intern_keys: bool,
    /// `read_opt_string` maps `""` to `None`.
    pub empty_string_as_null: bool,
    /// Error on duplicate keys in shapeless objects (default: last wins).
    pub reject_duplicate_keys: bool,
    pub max_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions {
            allow_comments: false,
            allow_single_quotes: false,
            allow_unquoted_keys: false,
            allow_trailing_commas: false,
            strict_keys: false,
            intern_keys: false,
            empty_string_as_null: false,
            reject_duplicate_keys: false,
            max_depth: MAX_DEPTH,
        }
    }
}

/// Per-invocation scan state. Created fresh for each top-level parse and
/// mutated only by the decoding functions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cursor {
    /// Current offset.
    pub pos: usize,
    /// End offset of the last consumed token.
    pub token_end: usize,
    /// Offset below which the last string scan confirmed no backslash.
    pub clean_until: usize,
}

/// Streaming decoder over one buffer source.
pub struct Decoder<'de, U: Unit> {
    src: &'de dyn Source<Unit = U>,
    units: &'de [U],
    cursor: Cursor,
    opts: DecodeOptions,
    depth: usize,
}

impl<'de, U: Unit> Decoder<'de, U> {
    pub fn new(src: &'de dyn Source<Unit = U>, opts: DecodeOptions) -> Self {
        Decoder {
            src,
            units: src.units(),
            cursor: Cursor::default(),
            opts,
            depth: 0,
        }
    }

    #[inline]
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    #[inline]
    pub fn options(&self) -> &DecodeOptions {
        &self.opts
    }

    // -- errors --------------------------------------------------------------

    #[inline(never)]
    fn err(&self, reason: impl Into<String>, at: usize) -> Error {
        Error::syntax(reason, at, excerpt(self.units, at))
    }

    #[inline]
    fn err_here(&self, reason: impl Into<String>) -> Error {
        self.err(reason, self.cursor.pos)
    }

    // -- unit-level helpers --------------------------------------------------

    #[inline(always)]
    fn peek(&self) -> Option<U> {
        self.units.get(self.cursor.pos).copied()
    }

    #[inline(always)]
    fn peek_is(&self, b: u8) -> bool {
        matches!(self.peek(), Some(u) if u.is_ascii(b))
    }

    #[inline(always)]
    fn bump(&mut self) {
        self.cursor.pos += 1;
    }

    #[inline]
    fn eat(&mut self, b: u8) -> bool {
        if self.peek_is(b) {
            self.bump();
            true
        } else {
            false
        }
    }

    #[inline]
    fn expect(&mut self, b: u8) -> Result<(), Error> {
        if self.eat(b) {
            Ok(())
        } else {
            Err(self.err_here(format!("expected '{}'", b as char)))
        }
    }

    #[inline]
    fn enter(&mut self) -> Result<(), Error> {
        self.depth += 1;
        if self.depth > self.opts.max_depth {
            return Err(self.err_here("nesting depth exceeds maximum"));
        }
        Ok(())
    }

    #[inline]
    fn leave(&mut self) {
        self.depth -= 1;
    }

    // -- whitespace and comments ---------------------------------------------

    /// Skip whitespace, and comments when the mode flag is set. Runs before
    /// every protocol state.
    pub fn skip_ws(&mut self) -> Result<(), Error> {
        loop {
            while let Some(u) = self.peek() {
                match u.as_u32() {
                    0x20 | 0x09 | 0x0A | 0x0D => self.bump(),
                    _ => break,
                }
            }
            if self.opts.allow_comments && self.peek_is(b'/') {
                self.skip_comment()?;
                continue;
            }
            return Ok(());
        }
    }

    fn skip_comment(&mut self) -> Result<(), Error> {
        let start = self.cursor.pos;
        self.bump(); // the first '/'
        match self.peek().map(|u| u.as_u32()) {
            Some(0x2F) => {
                // line comment runs to the newline or the end of input
                while let Some(u) = self.peek() {
                    self.bump();
                    if u.is_ascii(b'\n') {
                        break;
                    }
                }
                Ok(())
            }
            Some(0x2A) => {
                self.bump();
                loop {
                    match self.peek() {
                        Some(u) if u.is_ascii(b'*') => {
                            self.bump();
                            if self.eat(b'/') {
                                return Ok(());
                            }
                        }
                        Some(_) => self.bump(),
                        None => return Err(self.err("unterminated block comment", start)),
                    }
                }
            }
            _ => Err(self.err("unexpected character '/'", start)),
        }
    }

    /// Verify nothing but whitespace (and comments) follows the value.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.skip_ws()?;
        if self.cursor.pos < self.units.len() {
            return Err(self.err_here("unexpected trailing characters"));
        }
        Ok(())
    }

    // -- objects with a known shape ------------------------------------------

    /// Decode one object of `shape` into `out`.
    pub fn decode_object<T>(&mut self, shape: &Shape<T, U>, out: &mut T) -> Result<(), Error> {
        self.skip_ws()?;
        self.expect(b'{')?;
        self.enter()?;
        self.skip_ws()?;
        if self.eat(b'}') {
            self.leave();
            return Ok(());
        }
        loop {
            self.member(shape, out)?;
            if self.seq_separator(b'}')? {
                break;
            }
        }
        self.leave();
        Ok(())
    }

    /// One `key : value` member. The cursor must sit on the key.
    fn member<T>(&mut self, shape: &Shape<T, U>, out: &mut T) -> Result<(), Error> {
        let handle = self.match_member_key(shape.table())?;
        self.skip_ws()?;
        self.expect(b':')?;
        self.skip_ws()?;
        match handle {
            Some(h) => (shape.decode_fn(h))(out, self),
            None => self.skip_value(),
        }
    }

    /// Resolve the key under the cursor against `table`, advancing past it.
    fn match_member_key(&mut self, table: &KeyTable) -> Result<Option<u32>, Error> {
        match self.peek() {
            Some(u) if u.is_ascii(b'"') => self.match_quoted_key(table, b'"'),
            Some(u) if self.opts.allow_single_quotes && u.is_ascii(b'\'') => {
                self.match_quoted_key(table, b'\'')
            }
            Some(_) if self.opts.allow_unquoted_keys => {
                let scan = matcher::match_unquoted(
                    self.units,
                    self.cursor.pos,
                    table,
                    self.opts.strict_keys,
                )?;
                self.cursor.token_end = scan.end;
                self.cursor.pos = scan.end;
                Ok(scan.handle)
            }
            _ => Err(self.err_here("expected object key")),
        }
    }

    fn match_quoted_key(&mut self, table: &KeyTable, quote: u8) -> Result<Option<u32>, Error> {
        self.bump();
        let scan = matcher::match_key(
            self.units,
            self.cursor.pos,
            quote,
            table,
            self.opts.strict_keys,
        )?;
        self.cursor.token_end = scan.end;
        self.cursor.pos = scan.end + 1;
        Ok(scan.handle)
    }

    /// After a member or element: `,` continues (cursor left on the next
    /// item), `close` terminates. Returns true when the sequence closed.
    fn seq_separator(&mut self, close: u8) -> Result<bool, Error> {
        self.skip_ws()?;
        if self.eat(b',') {
            self.skip_ws()?;
            if self.peek_is(close) {
                if self.opts.allow_trailing_commas {
                    self.bump();
                    return Ok(true);
                }
                return Err(self.err_here(format!("trailing comma before '{}'", close as char)));
            }
            return Ok(false);
        }
        if self.eat(close) {
            return Ok(true);
        }
        Err(self.err_here(format!(
            "expected ',' or '{}' after member",
            close as char
        )))
    }

    // -- polymorphic objects -------------------------------------------------

    /// Decode an object whose concrete type is named by an embedded
    /// discriminator key. The discriminator must be the first member; an
    /// object without one falls back to the registry's default variant.
    pub fn read_tagged<T>(&mut self, reg: &TaggedShapes<T, U>) -> Result<T, Error> {
        self.skip_ws()?;
        self.expect(b'{')?;
        self.enter()?;
        self.skip_ws()?;
        if self.eat(b'}') {
            self.leave();
            return match reg.fallback() {
                Some(v) => Ok((v.make)()),
                None => Err(self.err_here("missing discriminator in polymorphic object")),
            };
        }

        let key = self.read_key_text()?;
        self.skip_ws()?;
        self.expect(b':')?;
        self.skip_ws()?;

        if key == reg.discriminator() {
            let tag = self.read_string()?;
            let variant = reg
                .resolve(&tag)
                .ok_or_else(|| self.err_here(format!("unknown subtype {tag:?}")))?;
            let mut out = (variant.make)();
            self.object_tail(&variant.shape, &mut out)?;
            self.leave();
            Ok(out)
        } else {
            let variant = reg
                .fallback()
                .ok_or_else(|| self.err_here("missing discriminator in polymorphic object"))?;
            let mut out = (variant.make)();
            // the first key was consumed before we knew the shape
            match variant.shape.table().handle_of(&key) {
                Some(h) => (variant.shape.decode_fn(h))(&mut out, self)?,
                None => self.skip_value()?,
            }
            self.object_tail(&variant.shape, &mut out)?;
            self.leave();
            Ok(out)
        }
    }

    /// Remaining members of an object whose first pair was already consumed.
    fn object_tail<T>(&mut self, shape: &Shape<T, U>, out: &mut T) -> Result<(), Error> {
        if self.seq_separator(b'}')? {
            return Ok(());
        }
        loop {
            self.member(shape, out)?;
            if self.seq_separator(b'}')? {
                return Ok(());
            }
        }
    }

    // -- scalar readers ------------------------------------------------------

    fn expect_literal(&mut self, lit: &[u8]) -> Result<(), Error> {
        let at = self.cursor.pos;
        for (i, &b) in lit.iter().enumerate() {
            match self.units.get(at + i) {
                Some(u) if u.is_ascii(b) => {}
                _ => {
                    return Err(self.err(
                        format!("expected '{}'", String::from_utf8_lossy(lit)),
                        at,
                    ))
                }
            }
        }
        self.cursor.pos = at + lit.len();
        self.cursor.token_end = self.cursor.pos;
        Ok(())
    }

    pub fn read_null(&mut self) -> Result<(), Error> {
        self.skip_ws()?;
        self.expect_literal(b"null")
    }

    pub fn read_bool(&mut self) -> Result<bool, Error> {
        self.skip_ws()?;
        match self.peek().and_then(Unit::as_ascii) {
            Some(b't') => {
                self.expect_literal(b"true")?;
                Ok(true)
            }
            Some(b'f') => {
                self.expect_literal(b"false")?;
                Ok(false)
            }
            _ => Err(self.err_here("expected boolean")),
        }
    }

    /// Scan one number token, validating the JSON grammar, and gather its
    /// ASCII image for the number parser. Works identically on both unit
    /// widths; numbers are short, so the gather buffer stays on the stack.
    fn number_token(&mut self) -> Result<(SmallVec<[u8; 32]>, bool), Error> {
        let start = self.cursor.pos;
        let mut buf: SmallVec<[u8; 32]> = SmallVec::new();
        let mut is_float = false;

        if self.peek_is(b'-') {
            buf.push(b'-');
            self.bump();
        }

        match self.peek().and_then(Unit::as_ascii) {
            Some(b'0') => {
                buf.push(b'0');
                self.bump();
            }
            Some(d @ b'1'..=b'9') => {
                buf.push(d);
                self.bump();
                while let Some(d @ b'0'..=b'9') =
                    self.peek().and_then(Unit::as_ascii)
                {
                    buf.push(d);
                    self.bump();
                }
            }
            _ => return Err(self.err("invalid number", start)),
        }

        if self.peek_is(b'.') {
            is_float = true;
            buf.push(b'.');
            self.bump();
            let mut digits = 0;
            while let Some(d @ b'0'..=b'9') = self.peek().and_then(Unit::as_ascii) {
                buf.push(d);
                self.bump();
                digits += 1;
            }
            if digits == 0 {
                return Err(self.err("invalid number", start));
            }
        }

        if let Some(b'e' | b'E') = self.peek().and_then(Unit::as_ascii) {
            is_float = true;
            buf.push(b'e');
            self.bump();
            if let Some(sign @ (b'+' | b'-')) = self.peek().and_then(Unit::as_ascii) {
                buf.push(sign);
                self.bump();
            }
            let mut digits = 0;
            while let Some(d @ b'0'..=b'9') = self.peek().and_then(Unit::as_ascii) {
                buf.push(d);
                self.bump();
                digits += 1;
            }
            if digits == 0 {
                return Err(self.err("invalid number", start));
            }
        }

        self.cursor.token_end = self.cursor.pos;
        Ok((buf, is_float))
    }

    pub fn read_i64(&mut self) -> Result<i64, Error> {
        self.skip_ws()?;
        let at = self.cursor.pos;
        let (buf, is_float) = self.number_token()?;
        if is_float {
            return Err(self.err("expected integer", at));
        }
        lexical_core::parse(&buf).map_err(|_| self.err("integer out of range", at))
    }

    pub fn read_u64(&mut self) -> Result<u64, Error> {
        self.skip_ws()?;
        let at = self.cursor.pos;
        let (buf, is_float) = self.number_token()?;
        if is_float {
            return Err(self.err("expected integer", at));
        }
        lexical_core::parse(&buf).map_err(|_| self.err("integer out of range", at))
    }

    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.skip_ws()?;
        let at = self.cursor.pos;
        let (buf, _) = self.number_token()?;
        lexical_core::parse(&buf).map_err(|_| self.err("invalid number", at))
    }

    /// Read a string value. Borrows from the source when the content needs
    /// no unescaping.
    pub fn read_string(&mut self) -> Result<Cow<'de, str>, Error> {
        self.skip_ws()?;
        let quote = self.string_quote()?;
        self.read_string_body(quote)
    }

    /// `null` (or, in mode, `""`) as `None`.
    pub fn read_opt_string(&mut self) -> Result<Option<Cow<'de, str>>, Error> {
        self.skip_ws()?;
        if self.peek_is(b'n') {
            self.expect_literal(b"null")?;
            return Ok(None);
        }
        let s = self.read_string()?;
        if s.is_empty() && self.opts.empty_string_as_null {
            return Ok(None);
        }
        Ok(Some(s))
    }

    /// Read a quoted date/time literal (`packed` formats).
    pub fn read_datetime(&mut self) -> Result<DateTime, Error> {
        self.skip_ws()?;
        let quote = self.string_quote()?;
        let start = self.cursor.pos;
        let stop = scan::skip_clean(self.units, start, quote);
        if stop >= self.units.len() || !self.units[stop].is_ascii(quote) {
            return Err(self.err("unterminated string", start));
        }
        let dt = packed::parse_datetime(&self.units[start..stop])
            .ok_or_else(|| self.err("invalid date/time literal", start))?;
        self.cursor.token_end = stop;
        self.cursor.pos = stop + 1;
        Ok(dt)
    }

    #[inline]
    fn string_quote(&mut self) -> Result<u8, Error> {
        if self.eat(b'"') {
            Ok(b'"')
        } else if self.opts.allow_single_quotes && self.eat(b'\'') {
            Ok(b'\'')
        } else {
            Err(self.err_here("expected string"))
        }
    }

    /// Body of a string whose opening quote was consumed.
    fn read_string_body(&mut self, quote: u8) -> Result<Cow<'de, str>, Error> {
        let start = self.cursor.pos;
        let stop = scan::skip_clean(self.units, start, quote);
        if stop >= self.units.len() {
            return Err(self.err("unterminated string", start));
        }
        if self.units[stop].is_ascii(quote) {
            // no escape anywhere in the token
            self.cursor.clean_until = stop;
            self.cursor.token_end = stop;
            self.cursor.pos = stop + 1;
            return Ok(self.src.substring(start, stop));
        }
        self.read_string_escaped(quote, start, stop)
    }

    fn read_string_escaped(
        &mut self,
        quote: u8,
        start: usize,
        first_stop: usize,
    ) -> Result<Cow<'de, str>, Error> {
        let mut out = String::with_capacity(first_stop - start + 16);
        let mut seg = start;
        let mut stop = first_stop;
        loop {
            if stop >= self.units.len() {
                return Err(self.err("unterminated string", start));
            }
            let v = self.units[stop].as_u32();
            if v == quote as u32 {
                out.push_str(&self.src.substring(seg, stop));
                self.cursor.token_end = stop;
                self.cursor.pos = stop + 1;
                return Ok(Cow::Owned(out));
            }
            if v == b'\\' as u32 {
                out.push_str(&self.src.substring(seg, stop));
                seg = self.unescape_into(stop, quote, &mut out)?;
                stop = scan::skip_clean(self.units, seg, quote);
            } else if v < 0x20 {
                return Err(self.err("unescaped control character in string", stop));
            } else {
                stop = scan::skip_clean(self.units, stop + 1, quote);
            }
        }
    }

    /// Decode one escape sequence starting at the backslash `at`; returns
    /// the offset just past it.
    fn unescape_into(&mut self, at: usize, quote: u8, out: &mut String) -> Result<usize, Error> {
        let esc = self
            .units
            .get(at + 1)
            .ok_or_else(|| self.err("unterminated escape sequence", at))?
            .as_ascii();
        match esc {
            Some(b'"') => out.push('"'),
            Some(b'\\') => out.push('\\'),
            Some(b'/') => out.push('/'),
            Some(b'b') => out.push('\u{8}'),
            Some(b'f') => out.push('\u{c}'),
            Some(b'n') => out.push('\n'),
            Some(b'r') => out.push('\r'),
            Some(b't') => out.push('\t'),
            Some(b'\'') if quote == b'\'' => out.push('\''),
            Some(b'u') => {
                let cp = self.hex4(at + 2)?;
                if (0xD800..=0xDBFF).contains(&cp) {
                    // high surrogate - must be followed by \u + low surrogate
                    let follow = self.units.get(at + 6).map(|u| u.as_u32());
                    let marker = self.units.get(at + 7).map(|u| u.as_u32());
                    if follow == Some(b'\\' as u32) && marker == Some(b'u' as u32) {
                        let low = self.hex4(at + 8)?;
                        if (0xDC00..=0xDFFF).contains(&low) {
                            let full = 0x10000 + ((cp - 0xD800) << 10) + (low - 0xDC00);
                            match char::from_u32(full) {
                                Some(c) => out.push(c),
                                None => return Err(self.err("invalid unicode escape", at)),
                            }
                            return Ok(at + 12);
                        }
                    }
                    return Err(self.err("lone surrogate in string", at));
                }
                if (0xDC00..=0xDFFF).contains(&cp) {
                    return Err(self.err("lone surrogate in string", at));
                }
                match char::from_u32(cp) {
                    Some(c) => out.push(c),
                    None => return Err(self.err("invalid unicode escape", at)),
                }
                return Ok(at + 6);
            }
            _ => return Err(self.err("invalid escape sequence", at)),
        }
        Ok(at + 2)
    }

    fn hex4(&self, at: usize) -> Result<u32, Error> {
        if at + 4 > self.units.len() {
            return Err(self.err("incomplete unicode escape", at));
        }
        let mut value = 0u32;
        for i in 0..4 {
            let d = match self.units[at + i].as_ascii() {
                Some(b @ b'0'..=b'9') => (b - b'0') as u32,
                Some(b @ b'a'..=b'f') => (b - b'a' + 10) as u32,
                Some(b @ b'A'..=b'F') => (b - b'A' + 10) as u32,
                _ => return Err(self.err("invalid unicode escape", at)),
            };
            value = (value << 4) | d;
        }
        Ok(value)
    }

    /// Typed array read: `elem` runs once per element.
    pub fn read_array<F>(&mut self, mut elem: F) -> Result<(), Error>
    where
        F: FnMut(&mut Self) -> Result<(), Error>,
    {
        self.skip_ws()?;
        self.expect(b'[')?;
        self.enter()?;
        self.skip_ws()?;
        if self.eat(b']') {
            self.leave();
            return Ok(());
        }
        loop {
            elem(self)?;
            if self.seq_separator(b']')? {
                break;
            }
        }
        self.leave();
        Ok(())
    }

    // -- structural skipping -------------------------------------------------

    /// Skip one complete value without materializing it. Quote and bracket
    /// depth are tracked; escapes are honored inside strings.
    pub fn skip_value(&mut self) -> Result<(), Error> {
        self.skip_ws()?;
        let Some(u) = self.peek() else {
            return Err(self.err_here("unexpected end of input"));
        };
        match u.as_ascii() {
            Some(b'"') => {
                self.bump();
                self.skip_string_body(b'"')
            }
            Some(b'\'') if self.opts.allow_single_quotes => {
                self.bump();
                self.skip_string_body(b'\'')
            }
            Some(b'{') => {
                self.bump();
                self.skip_object()
            }
            Some(b'[') => {
                self.bump();
                self.skip_array()
            }
            Some(b't') => self.expect_literal(b"true"),
            Some(b'f') => self.expect_literal(b"false"),
            Some(b'n') => self.expect_literal(b"null"),
            Some(b'-' | b'0'..=b'9') => self.number_token().map(|_| ()),
            _ => Err(self.err_here("unexpected character")),
        }
    }

    fn skip_string_body(&mut self, quote: u8) -> Result<(), Error> {
        let start = self.cursor.pos;
        let mut i = start;
        loop {
            i = scan::skip_clean(self.units, i, quote);
            if i >= self.units.len() {
                return Err(self.err("unterminated string", start));
            }
            let v = self.units[i].as_u32();
            if v == quote as u32 {
                self.cursor.token_end = i;
                self.cursor.pos = i + 1;
                return Ok(());
            }
            if v == b'\\' as u32 {
                i += 2; // the escaped unit never terminates the string
                continue;
            }
            if v < 0x20 {
                return Err(self.err("unescaped control character in string", i));
            }
            i += 1;
        }
    }

    fn skip_object(&mut self) -> Result<(), Error> {
        self.enter()?;
        self.skip_ws()?;
        if self.eat(b'}') {
            self.leave();
            return Ok(());
        }
        loop {
            self.skip_member_key()?;
            self.skip_ws()?;
            self.expect(b':')?;
            self.skip_value()?;
            if self.seq_separator(b'}')? {
                break;
            }
        }
        self.leave();
        Ok(())
    }

    fn skip_member_key(&mut self) -> Result<(), Error> {
        match self.peek() {
            Some(u) if u.is_ascii(b'"') => {
                self.bump();
                self.skip_string_body(b'"')
            }
            Some(u) if self.opts.allow_single_quotes && u.is_ascii(b'\'') => {
                self.bump();
                self.skip_string_body(b'\'')
            }
            Some(_) if self.opts.allow_unquoted_keys => {
                let from = self.cursor.pos;
                while let Some(u) = self.peek() {
                    match u.as_u32() {
                        v if v == b':' as u32 => break,
                        0x20 | 0x09 | 0x0A | 0x0D => break,
                        _ => self.bump(),
                    }
                }
                if self.cursor.pos == from {
                    return Err(self.err_here("expected object key"));
                }
                Ok(())
            }
            _ => Err(self.err_here("expected object key")),
        }
    }

    fn skip_array(&mut self) -> Result<(), Error> {
        self.enter()?;
        self.skip_ws()?;
        if self.eat(b']') {
            self.leave();
            return Ok(());
        }
        loop {
            self.skip_value()?;
            if self.seq_separator(b']')? {
                break;
            }
        }
        self.leave();
        Ok(())
    }

    // -- shapeless decoding --------------------------------------------------

    /// Decode one value of any type into the dynamic model.
    pub fn decode_value(&mut self) -> Result<Value, Error> {
        self.skip_ws()?;
        let Some(u) = self.peek() else {
            return Err(self.err_here("unexpected end of input"));
        };
        match u.as_ascii() {
            Some(b'n') => {
                self.expect_literal(b"null")?;
                Ok(Value::Null)
            }
            Some(b't') => {
                self.expect_literal(b"true")?;
                Ok(Value::Bool(true))
            }
            Some(b'f') => {
                self.expect_literal(b"false")?;
                Ok(Value::Bool(false))
            }
            Some(b'"') => Ok(Value::Str(self.read_string_body_after_quote(b'"')?)),
            Some(b'\'') if self.opts.allow_single_quotes => {
                Ok(Value::Str(self.read_string_body_after_quote(b'\'')?))
            }
            Some(b'{') => {
                self.bump();
                self.decode_value_object()
            }
            Some(b'[') => {
                self.bump();
                self.decode_value_array()
            }
            Some(b'-' | b'0'..=b'9') => self.decode_value_number(),
            _ => Err(self.err_here("unexpected character")),
        }
    }

    #[inline]
    fn read_string_body_after_quote(&mut self, quote: u8) -> Result<String, Error> {
        self.bump();
        Ok(self.read_string_body(quote)?.into_owned())
    }

    fn decode_value_number(&mut self) -> Result<Value, Error> {
        let at = self.cursor.pos;
        let (buf, is_float) = self.number_token()?;
        if is_float {
            let f: f64 = lexical_core::parse(&buf).map_err(|_| self.err("invalid number", at))?;
            return Ok(Value::Float(f));
        }
        // i64 first, u64 for large positive values, f64 for the rest
        if let Ok(i) = lexical_core::parse::<i64>(&buf) {
            return Ok(Value::Int(i));
        }
        if let Ok(u) = lexical_core::parse::<u64>(&buf) {
            return Ok(Value::UInt(u));
        }
        let f: f64 = lexical_core::parse(&buf).map_err(|_| self.err("invalid number", at))?;
        Ok(Value::Float(f))
    }

    fn decode_value_array(&mut self) -> Result<Value, Error> {
        self.enter()?;
        self.skip_ws()?;
        let mut items = Vec::new();
        if self.eat(b']') {
            self.leave();
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.decode_value()?);
            if self.seq_separator(b']')? {
                break;
            }
        }
        self.leave();
        Ok(Value::Array(items))
    }

    fn decode_value_object(&mut self) -> Result<Value, Error> {
        self.enter()?;
        self.skip_ws()?;
        let mut members: Vec<(Arc<str>, Value)> = Vec::new();
        if self.eat(b'}') {
            self.leave();
            return Ok(Value::Object(members));
        }
        loop {
            let key = self.read_key_arc()?;
            self.skip_ws()?;
            self.expect(b':')?;
            let value = self.decode_value()?;
            match members.iter_mut().find(|(k, _)| *k == key) {
                Some(existing) => {
                    if self.opts.reject_duplicate_keys {
                        return Err(self.err_here(format!("duplicate key {key:?}")));
                    }
                    existing.1 = value; // last wins
                }
                None => members.push((key, value)),
            }
            if self.seq_separator(b'}')? {
                break;
            }
        }
        self.leave();
        Ok(Value::Object(members))
    }

    /// Key under the cursor as text, honoring the quoting mode flags.
    fn read_key_text(&mut self) -> Result<Cow<'de, str>, Error> {
        match self.peek() {
            Some(u) if u.is_ascii(b'"') => {
                self.bump();
                self.read_string_body(b'"')
            }
            Some(u) if self.opts.allow_single_quotes && u.is_ascii(b'\'') => {
                self.bump();
                self.read_string_body(b'\'')
            }
            Some(_) if self.opts.allow_unquoted_keys => {
                let from = self.cursor.pos;
                while let Some(u) = self.peek() {
                    match u.as_u32() {
                        v if v == b':' as u32 => break,
                        0x20 | 0x09 | 0x0A | 0x0D => break,
                        _ => self.bump(),
                    }
                }
                if self.cursor.pos == from {
                    return Err(self.err_here("expected object key"));
                }
                Ok(self.src.substring(from, self.cursor.pos))
            }
            _ => Err(self.err_here("expected object key")),
        }
    }

    fn read_key_arc(&mut self) -> Result<Arc<str>, Error> {
        let key = self.read_key_text()?;
        if self.opts.intern_keys {
            Ok(intern::intern(&key))
        } else {
            Ok(Arc::from(&*key))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AsciiSource, Utf8Source, WideSource};

    #[derive(Default, Debug, PartialEq)]
    struct User {
        id: i64,
        name: String,
    }

    fn user_id<U: Unit>(u: &mut User, d: &mut Decoder<'_, U>) -> Result<(), Error> {
        u.id = d.read_i64()?;
        Ok(())
    }

    fn user_name<U: Unit>(u: &mut User, d: &mut Decoder<'_, U>) -> Result<(), Error> {
        u.name = d.read_string()?.into_owned();
        Ok(())
    }

    fn user_shape<U: Unit>() -> Shape<User, U> {
        Shape::builder()
            .field("id", user_id::<U>)
            .field("name", user_name::<U>)
            .build()
    }

    fn decode_user(input: &str, opts: DecodeOptions) -> Result<User, Error> {
        let shape = user_shape::<u8>();
        let src = AsciiSource::new(input).unwrap();
        let mut de = Decoder::new(&src, opts);
        let mut user = User::default();
        de.decode_object(&shape, &mut user)?;
        de.finish()?;
        Ok(user)
    }

    #[test]
    fn test_simple_object_into_shape() {
        let user = decode_user("{\"id\":1,\"name\":\"Ann\"}", DecodeOptions::default()).unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "Ann".into()
            }
        );
    }

    #[test]
    fn test_unknown_key_skipped_silently() {
        let user = decode_user(
            "{\"id\":1,\"extra\":true,\"name\":\"Ann\"}",
            DecodeOptions::default(),
        )
        .unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "Ann".into()
            }
        );
    }

    #[test]
    fn test_unknown_nested_values_skipped() {
        let user = decode_user(
            "{\"extra\":{\"deep\":[1,{\"x\":\"y\\\"z\"},null]},\"id\":2,\"name\":\"B\"}",
            DecodeOptions::default(),
        )
        .unwrap();
        assert_eq!(user.id, 2);
        assert_eq!(user.name, "B");
    }

    #[test]
    fn test_escaped_quote_inside_value() {
        let user = decode_user("{\"id\":1,\"name\":\"A\\\"B\"}", DecodeOptions::default()).unwrap();
        assert_eq!(user.name, "A\"B");
    }

    #[test]
    fn test_trailing_comma_mode() {
        let err = decode_user("{\"id\":1,}", DecodeOptions::default()).unwrap_err();
        match err {
            Error::Syntax { offset, .. } => assert_eq!(offset, 8),
            other => panic!("unexpected error: {other:?}"),
        }

        let opts = DecodeOptions {
            allow_trailing_commas: true,
            ..DecodeOptions::default()
        };
        let user = decode_user("{\"id\":1,}", opts).unwrap();
        assert_eq!(user.id, 1);
    }

    #[test]
    fn test_empty_object() {
        let user = decode_user("{}", DecodeOptions::default()).unwrap();
        assert_eq!(user, User::default());
    }

    #[test]
    fn test_whitespace_between_every_token() {
        let user = decode_user(
            " { \"id\" :\t1 ,\n\"name\" : \"Ann\" } ",
            DecodeOptions::default(),
        )
        .unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.name, "Ann");
    }

    #[test]
    fn test_comments_mode() {
        let opts = DecodeOptions {
            allow_comments: true,
            ..DecodeOptions::default()
        };
        let user = decode_user(
            "{ // line\n\"id\": /* block */ 1, \"name\":\"Ann\"}",
            opts,
        )
        .unwrap();
        assert_eq!(user.id, 1);

        let err = decode_user("{\"id\": /* open 1}", opts).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));

        // comments are a syntax error when the mode is off
        assert!(decode_user("{ // x\n\"id\":1}", DecodeOptions::default()).is_err());
    }

    #[test]
    fn test_single_quotes_and_unquoted_keys() {
        let opts = DecodeOptions {
            allow_single_quotes: true,
            allow_unquoted_keys: true,
            ..DecodeOptions::default()
        };
        let user = decode_user("{id:1,'name':'An\\'n'}", opts).unwrap();
        assert_eq!(user.id, 1);
        assert_eq!(user.name, "An'n");

        assert!(decode_user("{id:1}", DecodeOptions::default()).is_err());
    }

    #[test]
    fn test_wide_source_decodes_same_shape() {
        let shape = user_shape::<u16>();
        let units: Vec<u16> = "{\"id\":9,\"name\":\"Wide\"}".encode_utf16().collect();
        let src = WideSource::new(&units);
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let mut user = User::default();
        de.decode_object(&shape, &mut user).unwrap();
        de.finish().unwrap();
        assert_eq!(user.id, 9);
        assert_eq!(user.name, "Wide");
    }

    #[test]
    fn test_syntax_error_carries_offset_and_excerpt() {
        let err = decode_user("{\"id\":x}", DecodeOptions::default()).unwrap_err();
        match err {
            Error::Syntax {
                offset, excerpt, ..
            } => {
                assert_eq!(offset, 6);
                assert!(excerpt.contains('x'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_colon_and_bad_separator() {
        assert!(decode_user("{\"id\" 1}", DecodeOptions::default()).is_err());
        assert!(decode_user("{\"id\":1 \"name\":\"A\"}", DecodeOptions::default()).is_err());
        assert!(decode_user("{\"id\":1", DecodeOptions::default()).is_err());
    }

    #[test]
    fn test_incomplete_escape_is_error() {
        // the closing quote is escaped, so the string never terminates
        let src = AsciiSource::new("{\"name\":\"a\\\"}").unwrap();
        let shape = user_shape::<u8>();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let mut user = User::default();
        let err = de.decode_object(&shape, &mut user).unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn test_escaped_backslash_then_quote_terminates() {
        let user = decode_user("{\"id\":1,\"name\":\"a\\\\\"}", DecodeOptions::default()).unwrap();
        assert_eq!(user.name, "a\\");
    }

    #[test]
    fn test_unicode_escapes() {
        let user = decode_user(
            "{\"id\":1,\"name\":\"\\u0041\\u00e9\\ud83d\\ude00\"}",
            DecodeOptions::default(),
        )
        .unwrap();
        assert_eq!(user.name, "A\u{e9}\u{1F600}");

        // lone surrogate
        assert!(decode_user("{\"name\":\"\\ud800\"}", DecodeOptions::default()).is_err());
        // bad hex
        assert!(decode_user("{\"name\":\"\\u00zz\"}", DecodeOptions::default()).is_err());
    }

    #[test]
    fn test_control_character_must_be_escaped() {
        assert!(decode_user("{\"name\":\"a\x01b\"}", DecodeOptions::default()).is_err());
    }

    #[test]
    fn test_number_forms() {
        let text = "{\"i\":-42,\"z\":0,\"f\":1.5,\"e\":2e3,\"big\":18446744073709551615,\"huge\":1e300}";
        let src = Utf8Source::new(text.as_bytes()).unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let v = de.decode_value().unwrap();
        assert_eq!(v.get("i"), Some(&Value::Int(-42)));
        assert_eq!(v.get("z"), Some(&Value::Int(0)));
        assert_eq!(v.get("f"), Some(&Value::Float(1.5)));
        assert_eq!(v.get("e"), Some(&Value::Float(2000.0)));
        assert_eq!(v.get("big"), Some(&Value::UInt(u64::MAX)));
        assert_eq!(v.get("huge"), Some(&Value::Float(1e300)));
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        for bad in ["{\"n\":01}", "{\"n\":1.}", "{\"n\":.5}", "{\"n\":1e}", "{\"n\":-}"] {
            let src = AsciiSource::new(bad).unwrap();
            let mut de = Decoder::new(&src, DecodeOptions::default());
            assert!(de.decode_value().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_read_i64_rejects_float() {
        let src = AsciiSource::new("1.25").unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        assert!(de.read_i64().is_err());
    }

    #[test]
    fn test_depth_guard() {
        let mut text = String::new();
        for _ in 0..200 {
            text.push('[');
        }
        let src = AsciiSource::new(&text).unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let err = de.decode_value().unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn test_duplicate_keys_last_wins_and_reject_mode() {
        let text = "{\"k\":1,\"k\":2}";
        let v = crate::decode_str(text, DecodeOptions::default()).unwrap();
        assert_eq!(v.get("k"), Some(&Value::Int(2)));
        match &v {
            Value::Object(members) => assert_eq!(members.len(), 1),
            other => panic!("unexpected value: {other:?}"),
        }

        let opts = DecodeOptions {
            reject_duplicate_keys: true,
            ..DecodeOptions::default()
        };
        assert!(crate::decode_str(text, opts).is_err());
    }

    #[test]
    fn test_intern_keys_share_one_allocation() {
        let opts = DecodeOptions {
            intern_keys: true,
            ..DecodeOptions::default()
        };
        let v = crate::decode_str(
            "[{\"shared_key_name\":1},{\"shared_key_name\":2}]",
            opts,
        )
        .unwrap();
        match v {
            Value::Array(items) => {
                let keys: Vec<Arc<str>> = items
                    .iter()
                    .map(|item| match item {
                        Value::Object(m) => Arc::clone(&m[0].0),
                        other => panic!("unexpected item: {other:?}"),
                    })
                    .collect();
                assert!(Arc::ptr_eq(&keys[0], &keys[1]));
            }
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_read_datetime_field() {
        let src = AsciiSource::new("\"2024-03-09 07:05:01\"").unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let dt = de.read_datetime().unwrap();
        assert_eq!((dt.year, dt.month, dt.day), (2024, 3, 9));
        assert_eq!((dt.hour, dt.minute, dt.second), (7, 5, 1));

        let src = AsciiSource::new("\"not a date\"").unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        assert!(de.read_datetime().is_err());
    }

    #[test]
    fn test_read_opt_string_modes() {
        let opts = DecodeOptions {
            empty_string_as_null: true,
            ..DecodeOptions::default()
        };
        let src = AsciiSource::new("\"\"").unwrap();
        let mut de = Decoder::new(&src, opts);
        assert_eq!(de.read_opt_string().unwrap(), None);

        let src = AsciiSource::new("null").unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        assert_eq!(de.read_opt_string().unwrap(), None);

        let src = AsciiSource::new("\"\"").unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        assert_eq!(de.read_opt_string().unwrap().as_deref(), Some(""));
    }

    #[test]
    fn test_read_array_elements() {
        let src = AsciiSource::new("[1, 2, 3]").unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let mut out = Vec::new();
        de.read_array(|d| {
            out.push(d.read_i64()?);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, vec![1, 2, 3]);
    }

    // -- polymorphic decoding ------------------------------------------------

    #[derive(Debug, PartialEq)]
    enum Pet {
        Cat { lives: i64 },
        Dog { good: bool },
    }

    fn make_cat() -> Pet {
        Pet::Cat { lives: 9 }
    }

    fn make_dog() -> Pet {
        Pet::Dog { good: true }
    }

    fn cat_lives(p: &mut Pet, d: &mut Decoder<'_, u8>) -> Result<(), Error> {
        if let Pet::Cat { lives } = p {
            *lives = d.read_i64()?;
            Ok(())
        } else {
            d.skip_value()
        }
    }

    fn dog_good(p: &mut Pet, d: &mut Decoder<'_, u8>) -> Result<(), Error> {
        if let Pet::Dog { good } = p {
            *good = d.read_bool()?;
            Ok(())
        } else {
            d.skip_value()
        }
    }

    fn pet_registry() -> TaggedShapes<Pet, u8> {
        TaggedShapes::new()
            .variant("cat", make_cat, Shape::builder().field("lives", cat_lives).build())
            .variant("dog", make_dog, Shape::builder().field("good", dog_good).build())
            .default_variant("cat")
    }

    fn read_pet(input: &str) -> Result<Pet, Error> {
        let reg = pet_registry();
        let src = AsciiSource::new(input).unwrap();
        let mut de = Decoder::new(&src, DecodeOptions::default());
        let pet = de.read_tagged(&reg)?;
        de.finish()?;
        Ok(pet)
    }

    #[test]
    fn test_discriminator_selects_variant() {
        assert_eq!(
            read_pet("{\"$type\":\"cat\",\"lives\":7}").unwrap(),
            Pet::Cat { lives: 7 }
        );
        assert_eq!(
            read_pet("{\"$type\":\"dog\",\"good\":false}").unwrap(),
            Pet::Dog { good: false }
        );
        assert_eq!(read_pet("{\"$type\":\"dog\"}").unwrap(), Pet::Dog { good: true });
    }

    #[test]
    fn test_missing_discriminator_uses_default_variant() {
        assert_eq!(read_pet("{\"lives\":3}").unwrap(), Pet::Cat { lives: 3 });
        assert_eq!(read_pet("{}").unwrap(), Pet::Cat { lives: 9 });
    }

    #[test]
    fn test_unknown_subtype_is_error() {
        assert!(read_pet("{\"$type\":\"fish\"}").is_err());
    }

    #[test]
    fn test_unknown_fields_in_tagged_object_skipped() {
        assert_eq!(
            read_pet("{\"$type\":\"cat\",\"fur\":\"orange\",\"lives\":1}").unwrap(),
            Pet::Cat { lives: 1 }
        );
    }
}
