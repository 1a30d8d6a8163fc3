//! Ledger data model and its JSON shape.
//!
//! ```json
//! {"entries":[{"field":"email","sources":[{"path":"crm/v1/contact.proto"}]}]}
//! ```
//!
//! Empty strings and empty lists are omitted on output, so an empty ledger is
//! written as `{}`. On input, missing keys and `null` read as empty.

use serde::{Deserialize, Deserializer, Serialize};

/// Where a flattened field name came from (schema file or declaration path).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub path: String,
}

impl Source {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    #[serde(default, skip_serializing_if = "String::is_empty", deserialize_with = "null_as_default")]
    pub field: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable_list")]
    pub sources: Vec<Source>,
}

impl Entry {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            sources: Vec::new(),
        }
    }

    pub fn with_source(mut self, path: impl Into<String>) -> Self {
        self.add_source(path);
        self
    }

    /// Appends unless the path is empty or already listed. Returns whether it
    /// was added.
    pub fn add_source(&mut self, path: impl Into<String>) -> bool {
        let path = path.into();
        if path.is_empty() || self.has_source(&path) {
            return false;
        }
        self.sources.push(Source { path });
        true
    }

    pub fn has_source(&self, path: &str) -> bool {
        self.sources.iter().any(|s| s.path == path)
    }

    /// Non-empty source paths, first occurrence order, without duplicates.
    pub fn source_paths(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if source.path.is_empty() || out.iter().any(|p| *p == source.path) {
                continue;
            }
            out.push(source.path.clone());
        }
        out
    }
}

/// The ledger. It does not enforce uniqueness of field names itself; see
/// [`crate::tracker::CollisionTracker`] for the checked protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crf {
    #[serde(default, skip_serializing_if = "Vec::is_empty", deserialize_with = "nullable_list")]
    pub entries: Vec<Entry>,
}

impl Crf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_entries(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, field: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.field == field)
    }

    pub fn entry_mut(&mut self, field: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.field == field)
    }

    /// Collision error for `field` if any entry already claims that name.
    pub fn error_for(&self, field: &str) -> Option<FieldCollision> {
        if field.is_empty() {
            return None;
        }
        self.entry(field).map(|entry| FieldCollision {
            field: field.to_string(),
            sources: entry.source_paths(),
        })
    }

    /// Unchecked append of a new entry.
    pub fn push(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Adds `path` to the entry for `field`, creating the entry if needed.
    pub fn record(&mut self, field: &str, path: &str) {
        match self.entry_mut(field) {
            Some(entry) => {
                entry.add_source(path);
            }
            None => self.entries.push(Entry::new(field).with_source(path)),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.field.as_str())
    }
}

/// Two or more sources flatten to the same field name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("field name collision for {field:?}{}", list_sources(.sources))]
pub struct FieldCollision {
    pub field: String,
    pub sources: Vec<String>,
}

fn list_sources(sources: &[String]) -> String {
    if sources.is_empty() {
        String::new()
    } else {
        format!(" from {}", sources.join(", "))
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A missing or `null` list reads as empty; `null` items read as defaults.
fn nullable_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items
        .unwrap_or_default()
        .into_iter()
        .map(Option::unwrap_or_default)
        .collect())
}
