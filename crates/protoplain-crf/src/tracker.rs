//! Checked registration of flattened names against a shared ledger.
//!
//! A generator run owns one [`CollisionTracker`] and hands `&CollisionTracker`
//! (or an `Arc`) to every per-file step. The check and the append happen under
//! a single lock acquisition, so two steps flattening the same name from
//! different sources cannot both pass the check.

use std::path::Path;

use parking_lot::Mutex;

use crate::ledger::{Crf, Entry, FieldCollision};
use crate::sidecar::{self, SidecarError};

/// Outcome of a successful [`CollisionTracker::check_and_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First time this name was seen; a new entry was appended.
    New,
    /// The name was already recorded from this very source.
    AlreadyRecorded,
    /// Empty field name; nothing to track.
    Ignored,
}

#[derive(Debug, Default)]
pub struct CollisionTracker {
    ledger: Mutex<Crf>,
}

impl CollisionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ledger(ledger: Crf) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    /// Start from the sidecar at `path`; a missing file is an empty ledger.
    pub fn load(path: &Path) -> Result<Self, SidecarError> {
        Ok(Self::from_ledger(sidecar::load(path)?))
    }

    pub fn has_entries(&self) -> bool {
        self.ledger.lock().has_entries()
    }

    /// Read-only query; does not record anything.
    pub fn error_for(&self, field: &str) -> Option<FieldCollision> {
        self.ledger.lock().error_for(field)
    }

    /// Claim `field` for `source`.
    ///
    /// Fails if the name is already claimed by a different source; the error
    /// lists every known source followed by the new one, and the ledger is left
    /// unchanged.
    pub fn check_and_record(
        &self,
        field: &str,
        source: &str,
    ) -> Result<Registration, FieldCollision> {
        if field.is_empty() {
            return Ok(Registration::Ignored);
        }

        let mut ledger = self.ledger.lock();
        if let Some(entry) = ledger.entry(field) {
            let unattributed = source.is_empty() && entry.source_paths().is_empty();
            if unattributed || entry.has_source(source) {
                return Ok(Registration::AlreadyRecorded);
            }
            let mut sources = entry.source_paths();
            if !source.is_empty() {
                sources.push(source.to_string());
            }
            tracing::warn!(field, ?sources, "flattened field name collision");
            return Err(FieldCollision {
                field: field.to_string(),
                sources,
            });
        }

        ledger.push(Entry::new(field).with_source(source));
        tracing::debug!(field, source, "recorded flattened field");
        Ok(Registration::New)
    }

    /// Copy of the current ledger.
    pub fn snapshot(&self) -> Crf {
        self.ledger.lock().clone()
    }

    pub fn into_ledger(self) -> Crf {
        self.ledger.into_inner()
    }

    /// Write the current ledger to the sidecar at `path`.
    pub fn persist(&self, path: &Path) -> Result<(), SidecarError> {
        let ledger = self.ledger.lock();
        sidecar::persist(path, &ledger)
    }
}

impl From<Crf> for CollisionTracker {
    fn from(value: Crf) -> Self {
        Self::from_ledger(value)
    }
}
