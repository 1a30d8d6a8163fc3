//! Packed per-field metadata and the shared path table.
//!
//! Every flattened field of a plain struct gets one 16-bit word:
//!
//! ```text
//! ┌─────────────┬────────────┬─────────────────┐
//! │ Origin (3b) │ Depth (2b) │ PathIndex (11b) │
//! └─────────────┴────────────┴─────────────────┘
//!   bits 13-15    bits 11-12     bits 0-10
//! ```
//!
//! - **Origin**: how the field relates to the nested message (see [`Origin`])
//! - **Depth**: number of path segments from the message root to the message
//!   that holds the field (0 for fields that live on the root)
//! - **PathIndex**: start offset into the type's path table
//!
//! The path table is a flat `u16` array of protobuf field numbers shared by all
//! fields of one type. A field with depth `d` reads `d` consecutive entries
//! starting at its path index.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const ORIGIN_SHIFT: u16 = 13;
pub const ORIGIN_MASK: u16 = 0x7 << ORIGIN_SHIFT; // 0xE000
pub const DEPTH_SHIFT: u16 = 11;
pub const DEPTH_MASK: u16 = 0x3 << DEPTH_SHIFT; // 0x1800
pub const PATH_INDEX_MASK: u16 = 0x07FF;

/// Largest depth a descriptor can carry.
pub const MAX_DEPTH: u16 = 3;
/// Largest path table offset a descriptor can carry.
pub const MAX_PATH_INDEX: u16 = PATH_INDEX_MASK;

/// How a flattened field relates to the original message tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Origin {
    /// Copied unchanged.
    Direct = 0,
    /// Flattened out of a nested message.
    Embed = 1,
    /// Flattened out of a nested message reached through a `oneof`.
    OneofEmbed = 2,
    /// No protobuf-backed source.
    Virtual = 3,
    /// Stored as an opaque encoded blob.
    Serialized = 4,
    /// Flattened through a named type alias.
    TypeAlias = 5,
}

impl Origin {
    pub const ALL: [Origin; 6] = [
        Origin::Direct,
        Origin::Embed,
        Origin::OneofEmbed,
        Origin::Virtual,
        Origin::Serialized,
        Origin::TypeAlias,
    ];

    pub const fn bits(self) -> u16 {
        self as u16
    }

    /// Typed view of a raw 3-bit tag; `None` for the reserved values 6 and 7.
    pub const fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            0 => Some(Origin::Direct),
            1 => Some(Origin::Embed),
            2 => Some(Origin::OneofEmbed),
            3 => Some(Origin::Virtual),
            4 => Some(Origin::Serialized),
            5 => Some(Origin::TypeAlias),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Origin::Direct => "direct",
            Origin::Embed => "embed",
            Origin::OneofEmbed => "oneof_embed",
            Origin::Virtual => "virtual",
            Origin::Serialized => "serialized",
            Origin::TypeAlias => "type_alias",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseOriginError {
    #[error("reserved origin tag: {0}")]
    Reserved(u16),

    #[error("unknown origin: {0:?}")]
    Unknown(String),
}

impl FromStr for Origin {
    type Err = ParseOriginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(n) = trimmed.parse::<u16>() {
            return Origin::from_bits(n).ok_or(ParseOriginError::Reserved(n));
        }
        Origin::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| ParseOriginError::Unknown(trimmed.to_string()))
    }
}

/// One packed metadata word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct FieldMeta(u16);

impl FieldMeta {
    /// Pack raw components. Each input is masked to its bit width; out-of-range
    /// values are truncated, not rejected.
    pub const fn encode(origin: u16, depth: u16, path_index: u16) -> Self {
        Self(
            ((origin & 0x7) << ORIGIN_SHIFT)
                | ((depth & 0x3) << DEPTH_SHIFT)
                | (path_index & PATH_INDEX_MASK),
        )
    }

    pub const fn new(origin: Origin, depth: u16, path_index: u16) -> Self {
        Self::encode(origin.bits(), depth, path_index)
    }

    /// Reinterpret a word emitted into generated code.
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Raw 3-bit origin tag (0-7).
    pub const fn origin_bits(self) -> u16 {
        (self.0 & ORIGIN_MASK) >> ORIGIN_SHIFT
    }

    pub const fn origin(self) -> Option<Origin> {
        Origin::from_bits(self.origin_bits())
    }

    pub const fn depth(self) -> u16 {
        (self.0 & DEPTH_MASK) >> DEPTH_SHIFT
    }

    pub const fn path_index(self) -> u16 {
        self.0 & PATH_INDEX_MASK
    }

    pub const fn is_direct(self) -> bool {
        self.origin_bits() == Origin::Direct as u16
    }

    /// `Embed` or `OneofEmbed`: the field has to be walked to and set, not copied.
    pub const fn is_embed_kind(self) -> bool {
        let o = self.origin_bits();
        o == Origin::Embed as u16 || o == Origin::OneofEmbed as u16
    }
}

impl fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self.origin() {
            Some(o) => o.as_str().to_string(),
            None => format!("reserved({})", self.origin_bits()),
        };
        write!(
            f,
            "FieldMeta({:#06x} origin={} depth={} path_index={})",
            self.0,
            origin,
            self.depth(),
            self.path_index()
        )
    }
}

impl From<FieldMeta> for u16 {
    fn from(value: FieldMeta) -> Self {
        value.0
    }
}

impl From<u16> for FieldMeta {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

/// Path of field numbers for `field_index`, or an empty slice when there is
/// nothing to walk: index out of range, depth 0, or a window that runs past
/// the end of `paths`.
pub fn resolve_path<'a>(fields: &[FieldMeta], paths: &'a [u16], field_index: usize) -> &'a [u16] {
    let Some(meta) = fields.get(field_index) else {
        return &[];
    };
    let depth = meta.depth() as usize;
    if depth == 0 {
        return &[];
    }
    let start = meta.path_index() as usize;
    match paths.get(start..start + depth) {
        Some(window) => window,
        None => &[],
    }
}

/// Read side of a type's flattened layout.
///
/// Implemented by the `'static` [`TypeDescriptor`] emitted into generated code
/// and by owned layouts built at generation time.
pub trait TypeInfo {
    fn type_name(&self) -> &str;

    fn fields(&self) -> &[FieldMeta];

    fn paths(&self) -> &[u16];

    fn json_name(&self, field_index: usize) -> Option<&str>;

    fn field_count(&self) -> usize {
        self.fields().len()
    }

    fn field_meta(&self, field_index: usize) -> Option<FieldMeta> {
        self.fields().get(field_index).copied()
    }

    fn field_index(&self, json_name: &str) -> Option<usize> {
        (0..self.field_count()).find(|&i| self.json_name(i) == Some(json_name))
    }

    fn resolve_path(&self, field_index: usize) -> &[u16] {
        resolve_path(self.fields(), self.paths(), field_index)
    }
}

/// Layout constant baked into generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    /// Index = position of the field in the plain struct.
    pub fields: &'static [FieldMeta],
    pub paths: &'static [u16],
    /// Same indexing as `fields`.
    pub json_names: &'static [&'static str],
}

impl TypeDescriptor {
    pub const fn new(
        type_name: &'static str,
        fields: &'static [FieldMeta],
        paths: &'static [u16],
        json_names: &'static [&'static str],
    ) -> Self {
        Self {
            type_name,
            fields,
            paths,
            json_names,
        }
    }
}

impl TypeInfo for TypeDescriptor {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn fields(&self) -> &[FieldMeta] {
        self.fields
    }

    fn paths(&self) -> &[u16] {
        self.paths
    }

    fn json_name(&self, field_index: usize) -> Option<&str> {
        self.json_names.get(field_index).copied()
    }
}

impl<T: TypeInfo + ?Sized> TypeInfo for &T {
    fn type_name(&self) -> &str {
        (**self).type_name()
    }

    fn fields(&self) -> &[FieldMeta] {
        (**self).fields()
    }

    fn paths(&self) -> &[u16] {
        (**self).paths()
    }

    fn json_name(&self, field_index: usize) -> Option<&str> {
        (**self).json_name(field_index)
    }
}
