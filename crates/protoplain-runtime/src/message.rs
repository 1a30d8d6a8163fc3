//! Protobuf messages as field-number trees.
//!
//! A [`MessageTree`] holds typed field values keyed by field number, with
//! nested messages as subtrees. It writes protobuf wire format through
//! `prost::encoding`, so the bytes decode straight into the generated `prost`
//! message type, and reads wire bytes back given a [`MessageShape`] that says
//! which numbers are nested messages and which are scalar leaves.

use std::collections::BTreeMap;

use prost::bytes::BufMut;
use prost::encoding::{
    self, decode_key, decode_varint, encode_key, encode_varint, encoded_len_varint, key_len,
    DecodeContext, WireType,
};

use crate::field_meta::{Origin, TypeInfo};
use crate::rebuild::RebuildError;
use crate::scalar::{Leaf, ScalarKind};

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Double(f64),
    Float(f32),
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Sint32(i32),
    Sint64(i64),
    Fixed32(u32),
    Fixed64(u64),
    Sfixed32(i32),
    Sfixed64(i64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    Enum(i32),
    /// Every element must be a scalar of `kind`.
    Repeated { kind: ScalarKind, values: Vec<FieldValue> },
    Message(MessageTree),
}

impl FieldValue {
    /// Scalar kind of a single value; `None` for lists and messages.
    pub fn kind(&self) -> Option<ScalarKind> {
        Some(match self {
            FieldValue::Double(_) => ScalarKind::Double,
            FieldValue::Float(_) => ScalarKind::Float,
            FieldValue::Int32(_) => ScalarKind::Int32,
            FieldValue::Int64(_) => ScalarKind::Int64,
            FieldValue::Uint32(_) => ScalarKind::Uint32,
            FieldValue::Uint64(_) => ScalarKind::Uint64,
            FieldValue::Sint32(_) => ScalarKind::Sint32,
            FieldValue::Sint64(_) => ScalarKind::Sint64,
            FieldValue::Fixed32(_) => ScalarKind::Fixed32,
            FieldValue::Fixed64(_) => ScalarKind::Fixed64,
            FieldValue::Sfixed32(_) => ScalarKind::Sfixed32,
            FieldValue::Sfixed64(_) => ScalarKind::Sfixed64,
            FieldValue::Bool(_) => ScalarKind::Bool,
            FieldValue::String(_) => ScalarKind::String,
            FieldValue::Bytes(_) => ScalarKind::Bytes,
            FieldValue::Enum(_) => ScalarKind::Enum,
            FieldValue::Repeated { .. } | FieldValue::Message(_) => return None,
        })
    }

    fn wire_type(&self) -> WireType {
        self.kind()
            .map_or(WireType::LengthDelimited, ScalarKind::wire_type)
    }

    /// Length of the value without its key.
    fn value_len(&self) -> usize {
        match self {
            FieldValue::Int32(v) | FieldValue::Enum(v) => encoded_len_varint(*v as u64),
            FieldValue::Int64(v) => encoded_len_varint(*v as u64),
            FieldValue::Uint32(v) => encoded_len_varint(u64::from(*v)),
            FieldValue::Uint64(v) => encoded_len_varint(*v),
            FieldValue::Sint32(v) => encoded_len_varint(zigzag32(*v)),
            FieldValue::Sint64(v) => encoded_len_varint(zigzag64(*v)),
            FieldValue::Bool(_) => 1,
            FieldValue::Float(_) | FieldValue::Fixed32(_) | FieldValue::Sfixed32(_) => 4,
            FieldValue::Double(_) | FieldValue::Fixed64(_) | FieldValue::Sfixed64(_) => 8,
            FieldValue::String(v) => delimited_len(v.len()),
            FieldValue::Bytes(v) => delimited_len(v.len()),
            FieldValue::Message(m) => delimited_len(m.encoded_len()),
            FieldValue::Repeated { values, .. } => delimited_len(packed_len(values)),
        }
    }

    fn encode_value(&self, buf: &mut impl BufMut) {
        match self {
            FieldValue::Int32(v) | FieldValue::Enum(v) => encode_varint(*v as u64, buf),
            FieldValue::Int64(v) => encode_varint(*v as u64, buf),
            FieldValue::Uint32(v) => encode_varint(u64::from(*v), buf),
            FieldValue::Uint64(v) => encode_varint(*v, buf),
            FieldValue::Sint32(v) => encode_varint(zigzag32(*v), buf),
            FieldValue::Sint64(v) => encode_varint(zigzag64(*v), buf),
            FieldValue::Bool(v) => encode_varint(u64::from(*v), buf),
            FieldValue::Float(v) => buf.put_f32_le(*v),
            FieldValue::Fixed32(v) => buf.put_u32_le(*v),
            FieldValue::Sfixed32(v) => buf.put_i32_le(*v),
            FieldValue::Double(v) => buf.put_f64_le(*v),
            FieldValue::Fixed64(v) => buf.put_u64_le(*v),
            FieldValue::Sfixed64(v) => buf.put_i64_le(*v),
            FieldValue::String(v) => {
                encode_varint(v.len() as u64, buf);
                buf.put_slice(v.as_bytes());
            }
            FieldValue::Bytes(v) => {
                encode_varint(v.len() as u64, buf);
                buf.put_slice(v);
            }
            FieldValue::Message(m) => {
                encode_varint(m.encoded_len() as u64, buf);
                m.encode_raw(buf);
            }
            FieldValue::Repeated { values, .. } => {
                encode_varint(packed_len(values) as u64, buf);
                for value in values {
                    value.encode_value(buf);
                }
            }
        }
    }

    fn encoded_len(&self, tag: u32) -> usize {
        match self {
            FieldValue::Repeated { values, .. } if values.is_empty() => 0,
            FieldValue::Repeated { kind, values } if !kind.is_packable() => values
                .iter()
                .map(|v| key_len(tag) + v.value_len())
                .sum(),
            _ => key_len(tag) + self.value_len(),
        }
    }

    fn encode(&self, tag: u32, buf: &mut impl BufMut) {
        match self {
            FieldValue::Repeated { values, .. } if values.is_empty() => {}
            FieldValue::Repeated { kind, values } if !kind.is_packable() => {
                for value in values {
                    encode_key(tag, value.wire_type(), buf);
                    value.encode_value(buf);
                }
            }
            _ => {
                encode_key(tag, self.wire_type(), buf);
                self.encode_value(buf);
            }
        }
    }
}

fn zigzag32(v: i32) -> u64 {
    u64::from(((v << 1) ^ (v >> 31)) as u32)
}

fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn delimited_len(len: usize) -> usize {
    encoded_len_varint(len as u64) + len
}

fn packed_len(values: &[FieldValue]) -> usize {
    values.iter().map(FieldValue::value_len).sum()
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int64(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Double(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(value: Vec<u8>) -> Self {
        FieldValue::Bytes(value)
    }
}

impl From<MessageTree> for FieldValue {
    fn from(value: MessageTree) -> Self {
        FieldValue::Message(value)
    }
}

/// Which field numbers of a message are nested messages and which are leaves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageShape {
    leaves: BTreeMap<u32, Leaf>,
    messages: BTreeMap<u32, MessageShape>,
}

impl MessageShape {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shape implied by a flattened layout: every resolved path becomes a
    /// chain of messages, every leaf a scalar. `Virtual` fields and leaves
    /// with number 0 contribute nothing.
    pub fn from_layout<T: TypeInfo + ?Sized>(
        info: &T,
        leaves: &[Leaf],
    ) -> Result<Self, RebuildError> {
        let mut shape = Self::new();
        for (index, leaf) in leaves.iter().enumerate().take(info.field_count()) {
            let is_virtual = info
                .field_meta(index)
                .is_some_and(|m| m.origin() == Some(Origin::Virtual));
            if leaf.is_none() || is_virtual {
                continue;
            }
            shape.add(info.resolve_path(index), *leaf)?;
        }
        Ok(shape)
    }

    pub fn add(&mut self, path: &[u16], leaf: Leaf) -> Result<(), RebuildError> {
        let mut node = self;
        for &segment in path {
            let number = u32::from(segment);
            if node.leaves.contains_key(&number) {
                return Err(RebuildError::ShapeConflict { number });
            }
            node = node.messages.entry(number).or_default();
        }
        if node.messages.contains_key(&leaf.number) {
            return Err(RebuildError::ShapeConflict {
                number: leaf.number,
            });
        }
        match node.leaves.get(&leaf.number) {
            Some(existing) if *existing != leaf => Err(RebuildError::ShapeConflict {
                number: leaf.number,
            }),
            _ => {
                node.leaves.insert(leaf.number, leaf);
                Ok(())
            }
        }
    }

    pub fn leaf(&self, number: u32) -> Option<Leaf> {
        self.leaves.get(&number).copied()
    }

    pub fn message(&self, number: u32) -> Option<&MessageShape> {
        self.messages.get(&number)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageTree {
    fields: BTreeMap<u32, FieldValue>,
}

impl MessageTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, number: u32) -> Option<&FieldValue> {
        self.fields.get(&number)
    }

    pub fn message(&self, number: u32) -> Option<&MessageTree> {
        match self.fields.get(&number) {
            Some(FieldValue::Message(m)) => Some(m),
            _ => None,
        }
    }

    /// Fields in ascending field-number order.
    pub fn fields(&self) -> impl Iterator<Item = (u32, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (*n, v))
    }

    pub fn set(&mut self, number: u32, value: impl Into<FieldValue>) {
        self.fields.insert(number, value.into());
    }

    /// Walk `path` (creating empty messages as needed) and set `leaf` on the
    /// innermost message. An empty path sets `leaf` on this message.
    pub fn set_path(
        &mut self,
        path: &[u16],
        leaf: u32,
        value: impl Into<FieldValue>,
    ) -> Result<(), RebuildError> {
        let mut node = self;
        for &segment in path {
            let number = u32::from(segment);
            let slot = node
                .fields
                .entry(number)
                .or_insert_with(|| FieldValue::Message(MessageTree::default()));
            node = match slot {
                FieldValue::Message(m) => m,
                _ => return Err(RebuildError::PathConflict { number }),
            };
        }
        node.fields.insert(leaf, value.into());
        Ok(())
    }

    /// Value of `leaf` in the message `path` leads to. `None` when any message
    /// on the way is absent or a segment is not a message.
    pub fn get_path(&self, path: &[u16], leaf: u32) -> Option<&FieldValue> {
        let mut node = self;
        for &segment in path {
            node = node.message(u32::from(segment))?;
        }
        node.get(leaf)
    }

    pub fn encoded_len(&self) -> usize {
        self.fields.iter().map(|(n, v)| v.encoded_len(*n)).sum()
    }

    pub fn encode_raw(&self, buf: &mut impl BufMut) {
        for (number, value) in &self.fields {
            value.encode(*number, buf);
        }
    }

    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_raw(&mut buf);
        buf
    }

    /// Read wire bytes. Numbers the shape does not know are skipped.
    pub fn decode(shape: &MessageShape, bytes: &[u8]) -> Result<Self, RebuildError> {
        let mut tree = Self::new();
        tree.merge(shape, bytes)?;
        Ok(tree)
    }

    /// Merge wire bytes into this tree with protobuf semantics: singular
    /// scalars take the last value, repeated fields append, messages merge.
    pub fn merge(&mut self, shape: &MessageShape, mut buf: &[u8]) -> Result<(), RebuildError> {
        while !buf.is_empty() {
            let (number, wire_type) = decode_key(&mut buf)?;
            if let Some(child) = shape.message(number) {
                expect_wire_type(number, WireType::LengthDelimited, wire_type)?;
                let payload = take_delimited(number, &mut buf)?;
                let slot = self
                    .fields
                    .entry(number)
                    .or_insert_with(|| FieldValue::Message(MessageTree::default()));
                match slot {
                    FieldValue::Message(m) => m.merge(child, payload)?,
                    _ => return Err(RebuildError::PathConflict { number }),
                }
            } else if let Some(leaf) = shape.leaf(number) {
                self.merge_leaf(number, leaf, wire_type, &mut buf)?;
            } else {
                encoding::skip_field(wire_type, number, &mut buf, DecodeContext::default())?;
            }
        }
        Ok(())
    }

    fn merge_leaf(
        &mut self,
        number: u32,
        leaf: Leaf,
        wire_type: WireType,
        buf: &mut &[u8],
    ) -> Result<(), RebuildError> {
        let kind = leaf.kind;
        if !leaf.repeated {
            expect_wire_type(number, kind.wire_type(), wire_type)?;
            let value = decode_value(number, kind, buf)?;
            self.fields.insert(number, value);
            return Ok(());
        }

        let mut values = Vec::new();
        if wire_type == WireType::LengthDelimited && kind.is_packable() {
            let mut packed = take_delimited(number, buf)?;
            while !packed.is_empty() {
                values.push(decode_value(number, kind, &mut packed)?);
            }
        } else {
            expect_wire_type(number, kind.wire_type(), wire_type)?;
            values.push(decode_value(number, kind, buf)?);
        }
        let slot = self.fields.entry(number).or_insert_with(|| FieldValue::Repeated {
            kind,
            values: Vec::new(),
        });
        if let FieldValue::Repeated { values: existing, .. } = slot {
            existing.extend(values);
        }
        Ok(())
    }
}

fn expect_wire_type(number: u32, expected: WireType, found: WireType) -> Result<(), RebuildError> {
    if expected == found {
        Ok(())
    } else {
        Err(RebuildError::WireTypeMismatch {
            number,
            expected,
            found,
        })
    }
}

fn take_delimited<'a>(number: u32, buf: &mut &'a [u8]) -> Result<&'a [u8], RebuildError> {
    let len = decode_varint(buf)?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= buf.len())
        .ok_or(RebuildError::Truncated { number })?;
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn take_fixed<const N: usize>(number: u32, buf: &mut &[u8]) -> Result<[u8; N], RebuildError> {
    if buf.len() < N {
        return Err(RebuildError::Truncated { number });
    }
    let (head, tail) = buf.split_at(N);
    let mut out = [0u8; N];
    out.copy_from_slice(head);
    *buf = tail;
    Ok(out)
}

fn decode_value(number: u32, kind: ScalarKind, buf: &mut &[u8]) -> Result<FieldValue, RebuildError> {
    Ok(match kind {
        ScalarKind::Int32 => FieldValue::Int32(decode_varint(buf)? as i32),
        ScalarKind::Enum => FieldValue::Enum(decode_varint(buf)? as i32),
        ScalarKind::Int64 => FieldValue::Int64(decode_varint(buf)? as i64),
        ScalarKind::Uint32 => FieldValue::Uint32(decode_varint(buf)? as u32),
        ScalarKind::Uint64 => FieldValue::Uint64(decode_varint(buf)?),
        ScalarKind::Bool => FieldValue::Bool(decode_varint(buf)? != 0),
        ScalarKind::Sint32 => {
            let raw = decode_varint(buf)? as u32;
            FieldValue::Sint32(((raw >> 1) as i32) ^ -((raw & 1) as i32))
        }
        ScalarKind::Sint64 => {
            let raw = decode_varint(buf)?;
            FieldValue::Sint64(((raw >> 1) as i64) ^ -((raw & 1) as i64))
        }
        ScalarKind::Float => FieldValue::Float(f32::from_le_bytes(take_fixed(number, buf)?)),
        ScalarKind::Fixed32 => FieldValue::Fixed32(u32::from_le_bytes(take_fixed(number, buf)?)),
        ScalarKind::Sfixed32 => FieldValue::Sfixed32(i32::from_le_bytes(take_fixed(number, buf)?)),
        ScalarKind::Double => FieldValue::Double(f64::from_le_bytes(take_fixed(number, buf)?)),
        ScalarKind::Fixed64 => FieldValue::Fixed64(u64::from_le_bytes(take_fixed(number, buf)?)),
        ScalarKind::Sfixed64 => FieldValue::Sfixed64(i64::from_le_bytes(take_fixed(number, buf)?)),
        ScalarKind::String => {
            let bytes = take_delimited(number, buf)?;
            let text = std::str::from_utf8(bytes).map_err(|_| RebuildError::InvalidUtf8 { number })?;
            FieldValue::String(text.to_string())
        }
        ScalarKind::Bytes => FieldValue::Bytes(take_delimited(number, buf)?.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_path_creates_intermediate_messages() {
        let mut tree = MessageTree::new();
        tree.set_path(&[5, 1], 4, "10115").unwrap();
        let inner = tree.message(5).and_then(|m| m.message(1)).unwrap();
        assert_eq!(inner.get(4), Some(&FieldValue::String("10115".into())));
        assert_eq!(tree.get_path(&[5, 1], 4), inner.get(4));
        assert_eq!(tree.get_path(&[5, 2], 4), None);
    }

    #[test]
    fn set_path_through_scalar_conflicts() {
        let mut tree = MessageTree::new();
        tree.set(5, 7i64);
        assert!(matches!(
            tree.set_path(&[5], 1, true),
            Err(RebuildError::PathConflict { number: 5 })
        ));
    }

    #[test]
    fn encodes_nested_message_as_length_delimited() {
        let mut tree = MessageTree::new();
        tree.set_path(&[3], 1, "Main").unwrap();
        // field 3, wire type 2, len 6 | field 1, wire type 2, len 4, "Main"
        assert_eq!(
            tree.encode_to_vec(),
            vec![0x1a, 0x06, 0x0a, 0x04, b'M', b'a', b'i', b'n']
        );
        assert_eq!(tree.encoded_len(), 8);
    }

    #[test]
    fn fixed_width_and_zigzag_encodings() {
        let mut tree = MessageTree::new();
        tree.set(1, FieldValue::Sint32(-1));
        tree.set(2, FieldValue::Float(1.5));
        tree.set(3, FieldValue::Double(2.0));
        tree.set(4, FieldValue::Int32(-1));
        let bytes = tree.encode_to_vec();
        assert_eq!(&bytes[..2], &[0x08, 0x01]);
        assert_eq!(&bytes[2..7], &[0x15, 0x00, 0x00, 0xc0, 0x3f]);
        assert_eq!(bytes[7], 0x19);
        assert_eq!(&bytes[8..16], &2.0f64.to_le_bytes());
        // negative int32 is sign-extended to ten bytes
        assert_eq!(bytes.len(), 16 + 1 + 10);
        assert_eq!(tree.encoded_len(), bytes.len());
    }

    #[test]
    fn repeated_numbers_are_packed_and_strings_are_not() {
        let mut tree = MessageTree::new();
        tree.set(
            1,
            FieldValue::Repeated {
                kind: ScalarKind::Int32,
                values: vec![FieldValue::Int32(1), FieldValue::Int32(2), FieldValue::Int32(300)],
            },
        );
        tree.set(
            2,
            FieldValue::Repeated {
                kind: ScalarKind::String,
                values: vec!["a".into(), "b".into()],
            },
        );
        tree.set(
            3,
            FieldValue::Repeated {
                kind: ScalarKind::Int32,
                values: Vec::new(),
            },
        );
        assert_eq!(
            tree.encode_to_vec(),
            vec![0x0a, 0x04, 0x01, 0x02, 0xac, 0x02, 0x12, 0x01, b'a', 0x12, 0x01, b'b']
        );
        assert_eq!(tree.encoded_len(), 12);
    }

    #[test]
    fn decode_reads_back_what_encode_wrote() {
        let mut shape = MessageShape::new();
        shape.add(&[], Leaf::new(1, ScalarKind::Sint64)).unwrap();
        shape.add(&[3], Leaf::new(1, ScalarKind::String)).unwrap();
        shape.add(&[3], Leaf::repeated(2, ScalarKind::Fixed32)).unwrap();
        shape.add(&[3, 4], Leaf::new(7, ScalarKind::Bytes)).unwrap();

        let mut tree = MessageTree::new();
        tree.set(1, FieldValue::Sint64(-300));
        tree.set_path(&[3], 1, "Main").unwrap();
        tree.set_path(
            &[3],
            2,
            FieldValue::Repeated {
                kind: ScalarKind::Fixed32,
                values: vec![FieldValue::Fixed32(7), FieldValue::Fixed32(u32::MAX)],
            },
        )
        .unwrap();
        tree.set_path(&[3, 4], 7, vec![0u8, 255]).unwrap();

        let decoded = MessageTree::decode(&shape, &tree.encode_to_vec()).unwrap();
        assert_eq!(decoded, tree);
    }

    #[test]
    fn decode_skips_unknown_fields_and_merges_repeats() {
        let mut shape = MessageShape::new();
        shape.add(&[], Leaf::new(1, ScalarKind::Int32)).unwrap();
        shape.add(&[], Leaf::repeated(2, ScalarKind::Int32)).unwrap();
        // 1:5, 9:"x" (unknown), 1:6, 2:[1] unpacked, 2:[2,3] packed
        let bytes = [
            0x08, 0x05, 0x4a, 0x01, b'x', 0x08, 0x06, 0x10, 0x01, 0x12, 0x02, 0x02, 0x03,
        ];
        let tree = MessageTree::decode(&shape, &bytes).unwrap();
        assert_eq!(tree.get(1), Some(&FieldValue::Int32(6)));
        assert_eq!(
            tree.get(2),
            Some(&FieldValue::Repeated {
                kind: ScalarKind::Int32,
                values: vec![FieldValue::Int32(1), FieldValue::Int32(2), FieldValue::Int32(3)],
            })
        );
        assert_eq!(tree.get(9), None);
    }

    #[test]
    fn decode_rejects_wrong_wire_type_and_truncation() {
        let mut shape = MessageShape::new();
        shape.add(&[], Leaf::new(1, ScalarKind::Double)).unwrap();
        assert!(matches!(
            MessageTree::decode(&shape, &[0x08, 0x02]),
            Err(RebuildError::WireTypeMismatch { number: 1, .. })
        ));
        assert!(matches!(
            MessageTree::decode(&shape, &[0x09, 0x00, 0x00]),
            Err(RebuildError::Truncated { number: 1 })
        ));
    }

    #[test]
    fn shape_refuses_a_number_that_is_both_message_and_leaf() {
        let mut shape = MessageShape::new();
        shape.add(&[3], Leaf::new(1, ScalarKind::String)).unwrap();
        assert!(matches!(
            shape.add(&[], Leaf::new(3, ScalarKind::String)),
            Err(RebuildError::ShapeConflict { number: 3 })
        ));
        assert!(matches!(
            shape.add(&[3], Leaf::new(1, ScalarKind::Int32)),
            Err(RebuildError::ShapeConflict { number: 1 })
        ));
    }
}
