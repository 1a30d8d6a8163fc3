//! Generation-time layout planning for plain structs.
//!
//! The descriptor walker decides, per message, which fields are copied,
//! embedded, virtual or aliased, and hands each flattened field to a
//! [`LayoutBuilder`] as a [`FlatField`]. The builder:
//!
//! - packs the field's origin/depth/path offset into a `FieldMeta` word
//! - shares path windows between fields that live in the same nested message
//! - refuses two sources for one flattened name, both within the message and,
//!   through a `CollisionTracker`, across generator invocations
//!
//! The finished [`TypeLayout`] can be rendered as the `static` constant that
//! generated code embeds (see [`render`]).

pub mod layout;
pub mod render;

pub use layout::{plan_message, FlatField, LayoutBuilder, LayoutError, Manifest, TypeLayout};
pub use render::LayoutOptions;
