//! Collision ledger ("CRF") for flattened field names.
//!
//! Flattening nested messages can make two different schema fields land on the
//! same plain field name. The ledger records, per flattened name, which source
//! locations produced it, so that a generator run can refuse to emit a second,
//! different source under a name that is already taken.
//!
//! - [`ledger`]: the plain data (`Crf` → `Entry` → `Source`) and lookups
//! - [`tracker`]: the shared, lock-guarded check-then-record protocol
//! - [`sidecar`]: JSON persistence between separate generator invocations

pub mod ledger;
pub mod sidecar;
pub mod tracker;

pub use ledger::{Crf, Entry, FieldCollision, Source};
pub use sidecar::{load, persist, SidecarError};
pub use tracker::{CollisionTracker, Registration};
