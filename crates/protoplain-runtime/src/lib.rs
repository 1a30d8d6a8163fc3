//! Run-time support for generated plain projections.
//!
//! Generated plain structs are flattened views of nested protobuf messages.
//! Everything the generated conversion code needs at run time lives here:
//!
//! - [`field_meta`]: the packed 16-bit per-field metadata and the shared path
//!   table that records where each flattened field lives in the nested tree
//! - [`sparse`]: the "only what is set" JSON shape of a projection
//! - [`discriminator`]: the `<enum full name>:<number>` tag used for
//!   flattened `oneof` fields, plus the enum registry it resolves against
//! - [`scalar`]: protobuf scalar kinds and the per-field leaf table
//! - [`message`]: protobuf messages as field-number trees, with wire encoding
//!   and shape-guided decoding
//! - [`rebuild`]: walking resolved paths to rebuild the nested protobuf
//!   message from a flat value, and to flatten a message back
//!
//! All tables are computed at generation time and are read-only here.

pub mod discriminator;
pub mod field_meta;
pub mod message;
pub mod rebuild;
pub mod scalar;
pub mod sparse;

pub use discriminator::{
    Discriminator, DiscriminatorError, EnumDescriptor, EnumRegistry, EnumRegistryBuilder,
    EnumValue, ProtoEnum,
};
pub use field_meta::{FieldMeta, Origin, ParseOriginError, TypeDescriptor, TypeInfo};
pub use message::{FieldValue, MessageShape, MessageTree};
pub use rebuild::{flatten_to_sparse, rebuild_from_sparse, sparse_from_bytes, RebuildError};
pub use scalar::{Leaf, ScalarKind};
pub use sparse::{SparseEmit, SparseError, SparseValue};
