//! Protobuf scalar kinds and the per-field leaf table.
//!
//! The packed metadata word says *where* a flattened field lives; its [`Leaf`]
//! says *what* it is there: the field number inside the innermost message, the
//! protobuf scalar kind, and whether the field is repeated.

use std::fmt;

use prost::encoding::WireType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Double,
    Float,
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Bool,
    #[default]
    String,
    Bytes,
    Enum,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 16] = [
        ScalarKind::Double,
        ScalarKind::Float,
        ScalarKind::Int32,
        ScalarKind::Int64,
        ScalarKind::Uint32,
        ScalarKind::Uint64,
        ScalarKind::Sint32,
        ScalarKind::Sint64,
        ScalarKind::Fixed32,
        ScalarKind::Fixed64,
        ScalarKind::Sfixed32,
        ScalarKind::Sfixed64,
        ScalarKind::Bool,
        ScalarKind::String,
        ScalarKind::Bytes,
        ScalarKind::Enum,
    ];

    /// Wire type of a single, unpacked value.
    pub const fn wire_type(self) -> WireType {
        match self {
            ScalarKind::Int32
            | ScalarKind::Int64
            | ScalarKind::Uint32
            | ScalarKind::Uint64
            | ScalarKind::Sint32
            | ScalarKind::Sint64
            | ScalarKind::Bool
            | ScalarKind::Enum => WireType::Varint,
            ScalarKind::Double | ScalarKind::Fixed64 | ScalarKind::Sfixed64 => {
                WireType::SixtyFourBit
            }
            ScalarKind::Float | ScalarKind::Fixed32 | ScalarKind::Sfixed32 => {
                WireType::ThirtyTwoBit
            }
            ScalarKind::String | ScalarKind::Bytes => WireType::LengthDelimited,
        }
    }

    /// Repeated fields of numeric kinds are written packed.
    pub const fn is_packable(self) -> bool {
        !matches!(self, ScalarKind::String | ScalarKind::Bytes)
    }

    /// Name as written in `.proto` files and manifests.
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarKind::Double => "double",
            ScalarKind::Float => "float",
            ScalarKind::Int32 => "int32",
            ScalarKind::Int64 => "int64",
            ScalarKind::Uint32 => "uint32",
            ScalarKind::Uint64 => "uint64",
            ScalarKind::Sint32 => "sint32",
            ScalarKind::Sint64 => "sint64",
            ScalarKind::Fixed32 => "fixed32",
            ScalarKind::Fixed64 => "fixed64",
            ScalarKind::Sfixed32 => "sfixed32",
            ScalarKind::Sfixed64 => "sfixed64",
            ScalarKind::Bool => "bool",
            ScalarKind::String => "string",
            ScalarKind::Bytes => "bytes",
            ScalarKind::Enum => "enum",
        }
    }

    /// Variant identifier, for emitting Rust source.
    pub fn variant_name(self) -> &'static str {
        match self {
            ScalarKind::Double => "Double",
            ScalarKind::Float => "Float",
            ScalarKind::Int32 => "Int32",
            ScalarKind::Int64 => "Int64",
            ScalarKind::Uint32 => "Uint32",
            ScalarKind::Uint64 => "Uint64",
            ScalarKind::Sint32 => "Sint32",
            ScalarKind::Sint64 => "Sint64",
            ScalarKind::Fixed32 => "Fixed32",
            ScalarKind::Fixed64 => "Fixed64",
            ScalarKind::Sfixed32 => "Sfixed32",
            ScalarKind::Sfixed64 => "Sfixed64",
            ScalarKind::Bool => "Bool",
            ScalarKind::String => "String",
            ScalarKind::Bytes => "Bytes",
            ScalarKind::Enum => "Enum",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a plain field lands inside the innermost message of its path.
///
/// `number == 0` marks a field with no protobuf counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Leaf {
    pub number: u32,
    pub kind: ScalarKind,
    pub repeated: bool,
}

impl Leaf {
    pub const NONE: Leaf = Leaf {
        number: 0,
        kind: ScalarKind::String,
        repeated: false,
    };

    pub const fn new(number: u32, kind: ScalarKind) -> Self {
        Self {
            number,
            kind,
            repeated: false,
        }
    }

    pub const fn repeated(number: u32, kind: ScalarKind) -> Self {
        Self {
            number,
            kind,
            repeated: true,
        }
    }

    pub const fn is_none(self) -> bool {
        self.number == 0
    }
}
