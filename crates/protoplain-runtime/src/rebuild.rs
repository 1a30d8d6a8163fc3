//! Converting between sparse plain values and nested protobuf messages.
//!
//! [`rebuild_from_sparse`] puts each set plain field back at its resolved path
//! in a [`MessageTree`]; [`flatten_to_sparse`] reads the same paths out of a
//! tree. The leaf table supplies each field's number and scalar kind, so values
//! are converted with the proto3 JSON mapping of that kind:
//!
//! - 64-bit integers accept JSON numbers or decimal strings
//! - `float`/`double` accept any JSON number and `"NaN"`, `"Infinity"`,
//!   `"-Infinity"`
//! - `bytes` are base64 strings
//! - repeated fields are JSON arrays

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use prost::encoding::WireType;
use serde_json::{Number, Value};

use crate::field_meta::{Origin, TypeInfo};
use crate::message::{FieldValue, MessageShape, MessageTree};
use crate::scalar::{Leaf, ScalarKind};
use crate::sparse::{SparseError, SparseValue};

#[derive(Debug, thiserror::Error)]
pub enum RebuildError {
    #[error("{type_name}: expected {expected} leaves, got {found}")]
    LeafCountMismatch {
        type_name: String,
        expected: usize,
        found: usize,
    },

    /// A path segment already holds a scalar, so it cannot hold a message.
    #[error("field {number} is set to a scalar and cannot hold a nested message")]
    PathConflict { number: u32 },

    #[error("field {number} is used both as a nested message and as a leaf")]
    ShapeConflict { number: u32 },

    #[error("{type_name}: field {index} expects {expected}, got JSON {found}")]
    UnsupportedValue {
        type_name: String,
        index: usize,
        expected: String,
        found: &'static str,
    },

    #[error("field {number}: wire type {found:?}, expected {expected:?}")]
    WireTypeMismatch {
        number: u32,
        expected: WireType,
        found: WireType,
    },

    #[error("field {number}: value runs past the end of the buffer")]
    Truncated { number: u32 },

    #[error("field {number}: string is not valid UTF-8")]
    InvalidUtf8 { number: u32 },

    #[error("protobuf decode: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Sparse(#[from] SparseError),
}

fn check_leaf_count<T: TypeInfo + ?Sized>(info: &T, leaves: &[Leaf]) -> Result<(), RebuildError> {
    if leaves.len() == info.field_count() {
        return Ok(());
    }
    Err(RebuildError::LeafCountMismatch {
        type_name: info.type_name().to_string(),
        expected: info.field_count(),
        found: leaves.len(),
    })
}

/// The leaf of field `index` if it maps onto a protobuf field at all.
fn backed_leaf<T: TypeInfo + ?Sized>(info: &T, leaves: &[Leaf], index: usize) -> Option<Leaf> {
    let meta = info.field_meta(index)?;
    let leaf = leaves.get(index).copied()?;
    if leaf.is_none() || meta.origin() == Some(Origin::Virtual) {
        return None;
    }
    Some(leaf)
}

/// Rebuild the nested message for a sparse plain value.
///
/// `leaves[i]` says where plain field `i` lands inside the message its path
/// leads to. `Virtual` fields and leaves with number 0 have no protobuf
/// counterpart and are skipped, as are `null` values.
pub fn rebuild_from_sparse<T: TypeInfo + ?Sized>(
    info: &T,
    leaves: &[Leaf],
    sparse: &SparseValue,
) -> Result<MessageTree, RebuildError> {
    check_leaf_count(info, leaves)?;

    let mut tree = MessageTree::new();
    for (index, value) in sparse.entries(info) {
        let value = value?;
        let Some(leaf) = backed_leaf(info, leaves, index) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let value = field_from_json(leaf, value).map_err(|found| RebuildError::UnsupportedValue {
            type_name: info.type_name().to_string(),
            index,
            expected: describe_leaf(leaf),
            found,
        })?;
        tree.set_path(info.resolve_path(index), leaf.number, value)?;
    }
    Ok(tree)
}

/// Project a message onto the plain layout: every backed field present in
/// `tree` is set, in field order. Empty repeated fields count as absent.
pub fn flatten_to_sparse<T: TypeInfo + ?Sized>(
    info: &T,
    leaves: &[Leaf],
    tree: &MessageTree,
) -> Result<SparseValue, RebuildError> {
    check_leaf_count(info, leaves)?;

    let mut sparse = SparseValue::new();
    for index in 0..info.field_count() {
        let Some(leaf) = backed_leaf(info, leaves, index) else {
            continue;
        };
        let Some(value) = tree.get_path(info.resolve_path(index), leaf.number) else {
            continue;
        };
        if let Some(json) = field_to_json(value) {
            sparse.set(info, index, json)?;
        }
    }
    Ok(sparse)
}

/// Decode protobuf bytes straight into the sparse plain form.
pub fn sparse_from_bytes<T: TypeInfo + ?Sized>(
    info: &T,
    leaves: &[Leaf],
    bytes: &[u8],
) -> Result<SparseValue, RebuildError> {
    check_leaf_count(info, leaves)?;
    let shape = MessageShape::from_layout(info, leaves)?;
    let tree = MessageTree::decode(&shape, bytes)?;
    flatten_to_sparse(info, leaves, &tree)
}

fn describe_leaf(leaf: Leaf) -> String {
    if leaf.repeated {
        format!("repeated {}", leaf.kind)
    } else {
        leaf.kind.to_string()
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// JSON value for a leaf; the error names the offending JSON type.
pub fn field_from_json(leaf: Leaf, value: &Value) -> Result<FieldValue, &'static str> {
    if !leaf.repeated {
        return scalar_from_json(leaf.kind, value);
    }
    let Value::Array(items) = value else {
        return Err(json_type(value));
    };
    let values = items
        .iter()
        .map(|item| scalar_from_json(leaf.kind, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FieldValue::Repeated {
        kind: leaf.kind,
        values,
    })
}

fn scalar_from_json(kind: ScalarKind, value: &Value) -> Result<FieldValue, &'static str> {
    let found = json_type(value);
    let int32 = || json_i64(value).and_then(|v| i32::try_from(v).ok()).ok_or(found);
    let uint32 = || json_u64(value).and_then(|v| u32::try_from(v).ok()).ok_or(found);
    let int64 = || json_i64(value).ok_or(found);
    let uint64 = || json_u64(value).ok_or(found);

    Ok(match kind {
        ScalarKind::Int32 => FieldValue::Int32(int32()?),
        ScalarKind::Sint32 => FieldValue::Sint32(int32()?),
        ScalarKind::Sfixed32 => FieldValue::Sfixed32(int32()?),
        ScalarKind::Enum => FieldValue::Enum(int32()?),
        ScalarKind::Uint32 => FieldValue::Uint32(uint32()?),
        ScalarKind::Fixed32 => FieldValue::Fixed32(uint32()?),
        ScalarKind::Int64 => FieldValue::Int64(int64()?),
        ScalarKind::Sint64 => FieldValue::Sint64(int64()?),
        ScalarKind::Sfixed64 => FieldValue::Sfixed64(int64()?),
        ScalarKind::Uint64 => FieldValue::Uint64(uint64()?),
        ScalarKind::Fixed64 => FieldValue::Fixed64(uint64()?),
        ScalarKind::Double => FieldValue::Double(json_f64(value).ok_or(found)?),
        ScalarKind::Float => FieldValue::Float(json_f64(value).ok_or(found)? as f32),
        ScalarKind::Bool => FieldValue::Bool(value.as_bool().ok_or(found)?),
        ScalarKind::String => FieldValue::String(value.as_str().ok_or(found)?.to_string()),
        ScalarKind::Bytes => {
            let text = value.as_str().ok_or(found)?;
            let bytes = STANDARD
                .decode(text)
                .or_else(|_| URL_SAFE.decode(text))
                .map_err(|_| "non-base64 string")?;
            FieldValue::Bytes(bytes)
        }
    })
}

fn json_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0 && f >= 0.0 && f < u64::MAX as f64).then_some(f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.trim() {
            "NaN" => Some(f64::NAN),
            "Infinity" => Some(f64::INFINITY),
            "-Infinity" => Some(f64::NEG_INFINITY),
            other => other.parse().ok(),
        },
        _ => None,
    }
}

fn float_to_json(v: f64) -> Value {
    match Number::from_f64(v) {
        Some(n) => Value::Number(n),
        None if v.is_nan() => Value::String("NaN".to_string()),
        None if v > 0.0 => Value::String("Infinity".to_string()),
        None => Value::String("-Infinity".to_string()),
    }
}

/// JSON form of a decoded value; `None` for nested messages and empty lists.
pub fn field_to_json(value: &FieldValue) -> Option<Value> {
    Some(match value {
        FieldValue::Int32(v) | FieldValue::Sint32(v) | FieldValue::Sfixed32(v) | FieldValue::Enum(v) => {
            Value::from(*v)
        }
        FieldValue::Uint32(v) | FieldValue::Fixed32(v) => Value::from(*v),
        FieldValue::Int64(v) | FieldValue::Sint64(v) | FieldValue::Sfixed64(v) => Value::from(*v),
        FieldValue::Uint64(v) | FieldValue::Fixed64(v) => Value::from(*v),
        FieldValue::Double(v) => float_to_json(*v),
        FieldValue::Float(v) => float_to_json(f64::from(*v)),
        FieldValue::Bool(v) => Value::Bool(*v),
        FieldValue::String(v) => Value::String(v.clone()),
        FieldValue::Bytes(v) => Value::String(STANDARD.encode(v)),
        FieldValue::Repeated { values, .. } if values.is_empty() => return None,
        FieldValue::Repeated { values, .. } => {
            Value::Array(values.iter().filter_map(field_to_json).collect())
        }
        FieldValue::Message(_) => return None,
    })
}
