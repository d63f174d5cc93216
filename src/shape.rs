// ============================================================================
// Object shapes: the boundary to the caller's field resolver
// ============================================================================
//
// A `Shape` is what an external reflection/codegen layer hands the decoder:
// the unique field-name set (which drives the key-table build) and, per
// field, a decode function that reads the value and stores it through
// whatever setter the caller closed over. The decode loop never sees the
// target object's layout; a field handle is just an index into this list.

use crate::decode::Decoder;
use crate::error::Error;
use crate::keytable::KeyTable;
use crate::source::Unit;

/// Per-field decode function. Reads one value from the decoder into `T`.
pub type FieldFn<T, U> = for<'de> fn(&mut T, &mut Decoder<'de, U>) -> Result<(), Error>;

struct Field<T, U: Unit> {
    name: &'static str,
    decode: FieldFn<T, U>,
}

/// The decodable shape of one object type: field names plus their decoders,
/// with the key table built once and shared across parses.
pub struct Shape<T, U: Unit> {
    table: KeyTable,
    fields: Box<[Field<T, U>]>,
}

impl<T, U: Unit> Shape<T, U> {
    pub fn builder() -> ShapeBuilder<T, U> {
        ShapeBuilder { fields: Vec::new() }
    }

    #[inline]
    pub fn table(&self) -> &KeyTable {
        &self.table
    }

    #[inline]
    pub(crate) fn decode_fn(&self, handle: u32) -> FieldFn<T, U> {
        self.fields[handle as usize].decode
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }
}

/// Collects `(name, decode fn)` pairs and builds the key table.
pub struct ShapeBuilder<T, U: Unit> {
    fields: Vec<Field<T, U>>,
}

impl<T, U: Unit> ShapeBuilder<T, U> {
    pub fn field(mut self, name: &'static str, decode: FieldFn<T, U>) -> Self {
        self.fields.push(Field { name, decode });
        self
    }

    pub fn build(self) -> Shape<T, U> {
        let names: Vec<&str> = self.fields.iter().map(|f| f.name).collect();
        Shape {
            table: KeyTable::build(&names),
            fields: self.fields.into_boxed_slice(),
        }
    }
}

/// Reserved key that names a concrete subtype inside a polymorphic value.
pub const DEFAULT_DISCRIMINATOR: &str = "$type";

pub(crate) struct TaggedVariant<T, U: Unit> {
    pub(crate) tag: &'static str,
    pub(crate) make: fn() -> T,
    pub(crate) shape: Shape<T, U>,
}

/// Registry for a polymorphic field: a discriminator key plus the concrete
/// shapes it can select. When the decoder meets an object whose first key is
/// the discriminator, it switches to the named variant's shape for the rest
/// of the object.
pub struct TaggedShapes<T, U: Unit> {
    discriminator: &'static str,
    variants: Vec<TaggedVariant<T, U>>,
    default_variant: Option<usize>,
}

impl<T, U: Unit> TaggedShapes<T, U> {
    pub fn new() -> Self {
        Self::with_discriminator(DEFAULT_DISCRIMINATOR)
    }

    pub fn with_discriminator(discriminator: &'static str) -> Self {
        TaggedShapes {
            discriminator,
            variants: Vec::new(),
            default_variant: None,
        }
    }

    pub fn variant(mut self, tag: &'static str, make: fn() -> T, shape: Shape<T, U>) -> Self {
        debug_assert!(
            self.variants.iter().all(|v| v.tag != tag),
            "duplicate variant tag"
        );
        self.variants.push(TaggedVariant { tag, make, shape });
        self
    }

    /// Variant to fall back to when the discriminator is absent.
    pub fn default_variant(mut self, tag: &'static str) -> Self {
        self.default_variant = self.variants.iter().position(|v| v.tag == tag);
        debug_assert!(self.default_variant.is_some(), "unknown default tag");
        self
    }

    #[inline]
    pub fn discriminator(&self) -> &'static str {
        self.discriminator
    }

    #[inline]
    pub(crate) fn resolve(&self, tag: &str) -> Option<&TaggedVariant<T, U>> {
        self.variants.iter().find(|v| v.tag == tag)
    }

    #[inline]
    pub(crate) fn fallback(&self) -> Option<&TaggedVariant<T, U>> {
        self.default_variant.map(|i| &self.variants[i])
    }
}

impl<T, U: Unit> Default for TaggedShapes<T, U> {
    fn default() -> Self {
        Self::new()
    }
}
