//! Sparse values: the JSON-facing "only what is set" shape of a plain struct.
//!
//! A [`SparseValue`] keeps two views of the same data:
//!
//! - `src`: the indices of the fields that are set, in the order they were set
//!   (or encountered while decoding)
//! - `data`: JSON name → raw JSON value
//!
//! Both are always written together, so every index in `src` has a value under
//! its JSON name and every value has its index in `src`.
//!
//! On the wire the fields are emitted under their JSON names, followed by the
//! index list under the auxiliary key `_src`:
//!
//! ```json
//! { "street": "Main", "city": "Springfield", "_src": [1, 2] }
//! ```

use std::fmt;

use serde::de::{DeserializeSeed, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::field_meta::TypeInfo;

/// Auxiliary key carrying the set-index list.
pub const SOURCE_INDEX_KEY: &str = "_src";

#[derive(Debug, thiserror::Error)]
pub enum SparseError {
    #[error("{type_name} has no field at index {index}")]
    UnknownFieldIndex { type_name: String, index: usize },

    #[error("{type_name} has no field named {name:?}")]
    UnknownFieldName { type_name: String, name: String },

    #[error("{type_name}: field {index} is marked set but has no value")]
    MissingValue { type_name: String, index: usize },

    #[error("sparse JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseValue {
    src: Vec<u16>,
    data: Map<String, Value>,
}

impl SparseValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.src.len()
    }

    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Indices of the set fields, in set order.
    pub fn set_indices(&self) -> &[u16] {
        &self.src
    }

    pub fn is_set(&self, field_index: usize) -> bool {
        self.src.iter().any(|&i| i as usize == field_index)
    }

    pub fn get(&self, json_name: &str) -> Option<&Value> {
        self.data.get(json_name)
    }

    /// Set a field by index. Setting an already-set field replaces its value
    /// and keeps its original position.
    pub fn set<T: TypeInfo + ?Sized>(
        &mut self,
        info: &T,
        field_index: usize,
        value: Value,
    ) -> Result<(), SparseError> {
        let unknown = || SparseError::UnknownFieldIndex {
            type_name: info.type_name().to_string(),
            index: field_index,
        };
        if field_index >= info.field_count() {
            return Err(unknown());
        }
        let index = u16::try_from(field_index).map_err(|_| unknown())?;
        let name = info.json_name(field_index).ok_or_else(unknown)?;
        self.insert(index, name.to_string(), value);
        Ok(())
    }

    pub fn set_by_name<T: TypeInfo + ?Sized>(
        &mut self,
        info: &T,
        json_name: &str,
        value: Value,
    ) -> Result<(), SparseError> {
        let index = info
            .field_index(json_name)
            .ok_or_else(|| SparseError::UnknownFieldName {
                type_name: info.type_name().to_string(),
                name: json_name.to_string(),
            })?;
        self.set(info, index, value)
    }

    fn insert(&mut self, index: u16, name: String, value: Value) {
        if !self.src.contains(&index) {
            self.src.push(index);
        }
        self.data.insert(name, value);
    }

    /// `(field index, value)` pairs in set order.
    pub fn entries<'a, T: TypeInfo + ?Sized>(
        &'a self,
        info: &'a T,
    ) -> impl Iterator<Item = (usize, Result<&'a Value, SparseError>)> + 'a {
        self.src.iter().map(move |&index| {
            let index = index as usize;
            let value = info
                .json_name(index)
                .and_then(|name| self.data.get(name))
                .ok_or_else(|| SparseError::MissingValue {
                    type_name: info.type_name().to_string(),
                    index,
                });
            (index, value)
        })
    }

    fn check<T: TypeInfo + ?Sized>(&self, info: &T) -> Result<(), SparseError> {
        for (_, value) in self.entries(info) {
            value?;
        }
        Ok(())
    }

    pub fn to_json_string<T: TypeInfo + ?Sized>(&self, info: &T) -> Result<String, SparseError> {
        self.check(info)?;
        Ok(serde_json::to_string(&SparseView { value: self, info })?)
    }

    pub fn to_json_value<T: TypeInfo + ?Sized>(&self, info: &T) -> Result<Value, SparseError> {
        self.check(info)?;
        Ok(serde_json::to_value(SparseView { value: self, info })?)
    }

    /// Decode a JSON object. Keys are matched against the type's JSON names in
    /// the order they appear; unknown keys (and `_src`) are skipped.
    pub fn from_json_str<T: TypeInfo + ?Sized>(info: &T, json: &str) -> Result<Self, SparseError> {
        let mut de = serde_json::Deserializer::from_str(json);
        let value = SparseSeed { info }.deserialize(&mut de)?;
        de.end()?;
        Ok(value)
    }

    pub fn from_json_value<T: TypeInfo + ?Sized>(info: &T, json: Value) -> Result<Self, SparseError> {
        Ok(SparseSeed { info }.deserialize(json)?)
    }
}

struct SparseView<'a, T: ?Sized> {
    value: &'a SparseValue,
    info: &'a T,
}

impl<T: TypeInfo + ?Sized> Serialize for SparseView<'_, T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::Error as _;

        let src = &self.value.src;
        let mut map = serializer.serialize_map(Some(src.len() + usize::from(!src.is_empty())))?;
        for (index, value) in self.value.entries(self.info) {
            let value = value.map_err(S::Error::custom)?;
            let name = self
                .info
                .json_name(index)
                .ok_or_else(|| S::Error::custom(format!("no JSON name for field {index}")))?;
            map.serialize_entry(name, value)?;
        }
        if !src.is_empty() {
            map.serialize_entry(SOURCE_INDEX_KEY, src)?;
        }
        map.end()
    }
}

struct SparseSeed<'a, T: ?Sized> {
    info: &'a T,
}

impl<'de, T: TypeInfo + ?Sized> DeserializeSeed<'de> for SparseSeed<'_, T> {
    type Value = SparseValue;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> Result<SparseValue, D::Error> {
        deserializer.deserialize_map(self)
    }
}

impl<'de, T: TypeInfo + ?Sized> Visitor<'de> for SparseSeed<'_, T> {
    type Value = SparseValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a JSON object for {}", self.info.type_name())
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<SparseValue, A::Error> {
        let mut out = SparseValue::new();
        while let Some(key) = access.next_key::<String>()? {
            let index = if key == SOURCE_INDEX_KEY {
                None
            } else {
                self.info
                    .field_index(&key)
                    .and_then(|i| u16::try_from(i).ok())
            };
            match index {
                Some(index) => {
                    let value: Value = access.next_value()?;
                    out.insert(index, key, value);
                }
                None => {
                    access.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(out)
    }
}

/// Sparse emission straight from a generated plain struct.
///
/// `present_field` returns `Some` only for fields in a present state (a set
/// `Option`, a non-empty repeated field, ...). Fields holding nested plain
/// messages return their own sparse JSON.
pub trait SparseEmit {
    type Info: TypeInfo + ?Sized + 'static;

    fn type_info() -> &'static Self::Info;

    fn present_field(&self, field_index: usize) -> Option<Value>;

    fn to_sparse(&self) -> SparseValue {
        let info = Self::type_info();
        let mut out = SparseValue::new();
        for index in 0..info.field_count() {
            let Some(value) = self.present_field(index) else {
                continue;
            };
            let (Ok(compact), Some(name)) = (u16::try_from(index), info.json_name(index)) else {
                continue;
            };
            out.insert(compact, name.to_string(), value);
        }
        out
    }

    fn to_sparse_json(&self) -> Result<String, SparseError> {
        self.to_sparse().to_json_string(Self::type_info())
    }
}
