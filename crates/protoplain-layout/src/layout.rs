//! Building a type's field metadata table and path table.

use protoplain_crf::{CollisionTracker, FieldCollision};
use protoplain_runtime::field_meta::{MAX_DEPTH, MAX_PATH_INDEX};
use protoplain_runtime::{FieldMeta, Leaf, Origin, ScalarKind, TypeInfo};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("{type_name}.{field}: path has {depth} segments, at most {max} fit", max = MAX_DEPTH)]
    PathTooDeep {
        type_name: String,
        field: String,
        depth: usize,
    },

    #[error("{type_name}.{field}: path table offset {offset} exceeds {max}", max = MAX_PATH_INDEX)]
    PathTableFull {
        type_name: String,
        field: String,
        offset: usize,
    },

    #[error("{type_name}.{field}: field pushed twice from the same source")]
    DuplicateField { type_name: String, field: String },

    #[error(transparent)]
    Collision(#[from] FieldCollision),
}

/// One flattened field as the descriptor walker reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatField {
    pub json_name: String,
    pub origin: Origin,
    /// Field numbers of the messages that lead to the field, outermost first.
    /// Empty for fields on the root message.
    #[serde(default)]
    pub path: Vec<u16>,
    /// Field number inside the innermost message; 0 when there is none.
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub kind: ScalarKind,
    #[serde(default)]
    pub repeated: bool,
    /// Schema file or declaration that produced the field.
    #[serde(default)]
    pub source: String,
}

impl FlatField {
    pub fn new(json_name: impl Into<String>, origin: Origin, number: u32) -> Self {
        Self {
            json_name: json_name.into(),
            origin,
            path: Vec::new(),
            number,
            kind: ScalarKind::default(),
            repeated: false,
            source: String::new(),
        }
    }

    pub fn with_kind(mut self, kind: ScalarKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    /// Protobuf location of the field; [`Leaf::NONE`] when `number` is 0.
    pub fn leaf(&self) -> Leaf {
        match (self.number, self.repeated) {
            (0, _) => Leaf::NONE,
            (number, false) => Leaf::new(number, self.kind),
            (number, true) => Leaf::repeated(number, self.kind),
        }
    }

    pub fn at(mut self, path: impl Into<Vec<u16>>) -> Self {
        self.path = path.into();
        self
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Layout description as read from a JSON manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub type_name: String,
    pub fields: Vec<FlatField>,
}

impl Manifest {
    pub fn plan(self, tracker: Option<&CollisionTracker>) -> Result<TypeLayout, LayoutError> {
        plan_message(self.type_name, self.fields, tracker)
    }
}

#[derive(Debug, Clone, Copy)]
struct Planned {
    meta: FieldMeta,
    appends_path: bool,
}

#[derive(Debug, Clone)]
pub struct LayoutBuilder {
    layout: TypeLayout,
}

impl LayoutBuilder {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            layout: TypeLayout {
                type_name: type_name.into(),
                ..TypeLayout::default()
            },
        }
    }

    pub fn type_name(&self) -> &str {
        &self.layout.type_name
    }

    /// Ledger key for a field of this type.
    pub fn ledger_key(&self, json_name: &str) -> String {
        format!("{}.{}", self.layout.type_name, json_name)
    }

    /// Add the next field of the plain struct.
    pub fn push(&mut self, field: FlatField) -> Result<FieldMeta, LayoutError> {
        let planned = self.plan(&field)?;
        Ok(self.commit(field, planned))
    }

    /// Like [`push`](Self::push), but also claims the name in the shared ledger.
    /// Nothing is recorded anywhere if the field is rejected.
    pub fn push_tracked(
        &mut self,
        field: FlatField,
        tracker: &CollisionTracker,
    ) -> Result<FieldMeta, LayoutError> {
        let planned = self.plan(&field)?;
        tracker.check_and_record(&self.ledger_key(&field.json_name), &field.source)?;
        Ok(self.commit(field, planned))
    }

    fn plan(&self, field: &FlatField) -> Result<Planned, LayoutError> {
        let layout = &self.layout;
        if let Some(existing) = layout.field_index(&field.json_name) {
            let existing_source = &layout.sources[existing];
            if *existing_source == field.source {
                return Err(LayoutError::DuplicateField {
                    type_name: layout.type_name.clone(),
                    field: field.json_name.clone(),
                });
            }
            let sources: Vec<String> = [existing_source, &field.source]
                .into_iter()
                .filter(|s| !s.is_empty())
                .cloned()
                .collect();
            tracing::warn!(
                type_name = %layout.type_name,
                field = %field.json_name,
                ?sources,
                "two sources flatten to one field name"
            );
            return Err(FieldCollision {
                field: self.ledger_key(&field.json_name),
                sources,
            }
            .into());
        }

        let depth = field.path.len();
        if depth > MAX_DEPTH as usize {
            return Err(LayoutError::PathTooDeep {
                type_name: layout.type_name.clone(),
                field: field.json_name.clone(),
                depth,
            });
        }

        let (offset, appends_path) = if depth == 0 {
            (0, false)
        } else {
            match find_window(&layout.paths, &field.path) {
                Some(offset) => (offset, false),
                None => (layout.paths.len(), true),
            }
        };
        if offset > MAX_PATH_INDEX as usize {
            return Err(LayoutError::PathTableFull {
                type_name: layout.type_name.clone(),
                field: field.json_name.clone(),
                offset,
            });
        }

        Ok(Planned {
            meta: FieldMeta::new(field.origin, depth as u16, offset as u16),
            appends_path,
        })
    }

    fn commit(&mut self, field: FlatField, planned: Planned) -> FieldMeta {
        let layout = &mut self.layout;
        if planned.appends_path {
            layout.paths.extend_from_slice(&field.path);
        }
        tracing::debug!(
            type_name = %layout.type_name,
            field = %field.json_name,
            origin = %field.origin,
            depth = planned.meta.depth(),
            path_index = planned.meta.path_index(),
            "planned flattened field"
        );
        layout.fields.push(planned.meta);
        layout.leaves.push(field.leaf());
        layout.json_names.push(field.json_name);
        layout.sources.push(field.source);
        planned.meta
    }

    pub fn build(self) -> TypeLayout {
        self.layout
    }
}

fn find_window(haystack: &[u16], needle: &[u16]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Plan a whole message in one go.
pub fn plan_message(
    type_name: impl Into<String>,
    fields: impl IntoIterator<Item = FlatField>,
    tracker: Option<&CollisionTracker>,
) -> Result<TypeLayout, LayoutError> {
    let mut builder = LayoutBuilder::new(type_name);
    for field in fields {
        match tracker {
            Some(tracker) => builder.push_tracked(field, tracker)?,
            None => builder.push(field)?,
        };
    }
    Ok(builder.build())
}

/// Owned result of planning one type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeLayout {
    pub(crate) type_name: String,
    pub(crate) fields: Vec<FieldMeta>,
    pub(crate) paths: Vec<u16>,
    pub(crate) json_names: Vec<String>,
    pub(crate) leaves: Vec<Leaf>,
    pub(crate) sources: Vec<String>,
}

impl TypeLayout {
    /// Leaf table in field order, as `rebuild_from_sparse` expects it.
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn source(&self, field_index: usize) -> Option<&str> {
        self.sources.get(field_index).map(String::as_str)
    }
}

impl TypeInfo for TypeLayout {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    fn paths(&self) -> &[u16] {
        &self.paths
    }

    fn json_name(&self, field_index: usize) -> Option<&str> {
        self.json_names.get(field_index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address_fields() -> Vec<FlatField> {
        vec![
            FlatField::new("name", Origin::Direct, 1).from_source("people.proto"),
            FlatField::new("street", Origin::Embed, 1)
                .at([3])
                .from_source("address.proto"),
            FlatField::new("city", Origin::Embed, 2)
                .at([3])
                .from_source("address.proto"),
        ]
    }

    #[test]
    fn embedded_fields_share_one_path_window() {
        let layout = plan_message("people.Person", address_fields(), None).unwrap();
        assert_eq!(layout.paths(), &[3]);
        assert_eq!(layout.fields()[1], FieldMeta::new(Origin::Embed, 1, 0));
        assert_eq!(layout.fields()[2], FieldMeta::new(Origin::Embed, 1, 0));
        assert_eq!(layout.resolve_path(2), &[3]);
        let numbers: Vec<u32> = layout.leaves().iter().map(|l| l.number).collect();
        assert_eq!(numbers, vec![1, 1, 2]);
    }

    #[test]
    fn overlapping_windows_are_reused() {
        let mut builder = LayoutBuilder::new("t.Deep");
        builder
            .push(FlatField::new("zip", Origin::Embed, 4).at([5, 1, 2]))
            .unwrap();
        let meta = builder
            .push(FlatField::new("line", Origin::Embed, 1).at([1, 2]))
            .unwrap();
        let fresh = builder
            .push(FlatField::new("code", Origin::OneofEmbed, 1).at([2, 9]))
            .unwrap();
        let layout = builder.build();

        assert_eq!(meta.path_index(), 1);
        assert_eq!(fresh.path_index(), 3);
        assert_eq!(layout.paths(), &[5, 1, 2, 2, 9]);
        assert_eq!(layout.resolve_path(2), &[2, 9]);
    }

    #[test]
    fn four_segments_do_not_fit() {
        let err = LayoutBuilder::new("t.Deep")
            .push(FlatField::new("x", Origin::Embed, 1).at([1, 2, 3, 4]))
            .unwrap_err();
        assert!(matches!(err, LayoutError::PathTooDeep { depth: 4, .. }));
    }

    #[test]
    fn path_table_overflow_is_rejected_without_mutation() {
        let mut builder = LayoutBuilder::new("t.Wide");
        for i in 0..=MAX_PATH_INDEX {
            builder
                .push(FlatField::new(format!("f{i}"), Origin::Embed, 1).at([i + 1]))
                .unwrap();
        }
        let err = builder
            .push(FlatField::new("overflow", Origin::Embed, 1).at([4000]))
            .unwrap_err();
        assert!(matches!(err, LayoutError::PathTableFull { offset: 2048, .. }));

        // Existing windows can still be shared.
        builder
            .push(FlatField::new("shared", Origin::Embed, 1).at([7]))
            .unwrap();
        assert_eq!(builder.build().paths().len(), 2048);
    }

    #[test]
    fn same_name_from_two_sources_collides() {
        let mut fields = address_fields();
        fields.push(
            FlatField::new("city", Origin::Embed, 5)
                .at([4])
                .from_source("billing.proto"),
        );
        let err = plan_message("people.Person", fields, None).unwrap_err();
        let LayoutError::Collision(collision) = err else {
            panic!("expected collision, got {err:?}");
        };
        assert_eq!(collision.field, "people.Person.city");
        assert_eq!(collision.sources, vec!["address.proto", "billing.proto"]);
    }

    #[test]
    fn same_name_from_same_source_is_a_duplicate() {
        let mut fields = address_fields();
        fields.push(FlatField::new("name", Origin::Direct, 1).from_source("people.proto"));
        assert!(matches!(
            plan_message("people.Person", fields, None),
            Err(LayoutError::DuplicateField { .. })
        ));
    }

    #[test]
    fn tracked_push_records_qualified_names() {
        let tracker = CollisionTracker::new();
        plan_message("people.Person", address_fields(), Some(&tracker)).unwrap();
        let ledger = tracker.snapshot();
        assert_eq!(
            ledger.fields().collect::<Vec<_>>(),
            vec!["people.Person.name", "people.Person.street", "people.Person.city"]
        );
    }

    #[test]
    fn replanning_without_sources_is_idempotent() {
        let tracker = CollisionTracker::new();
        let fields = || [FlatField::new("id", Origin::Direct, 1)];
        plan_message("t.Plain", fields(), Some(&tracker)).unwrap();
        plan_message("t.Plain", fields(), Some(&tracker)).unwrap();
        assert_eq!(tracker.snapshot().len(), 1);
    }

    #[test]
    fn rejected_field_is_not_recorded() {
        let tracker = CollisionTracker::new();
        let mut builder = LayoutBuilder::new("t.Deep");
        let err = builder
            .push_tracked(FlatField::new("x", Origin::Embed, 1).at([1, 2, 3, 4]), &tracker)
            .unwrap_err();
        assert!(matches!(err, LayoutError::PathTooDeep { .. }));
        assert!(!tracker.has_entries());
    }

    #[test]
    fn manifest_reads_snake_case_origins() {
        let manifest: Manifest = serde_json::from_str(
            r#"{"type_name":"people.Person","fields":[
                {"json_name":"name","origin":"direct","number":1},
                {"json_name":"card","origin":"oneof_embed","path":[7],"number":2,"source":"pay.proto"},
                {"json_name":"scores","origin":"direct","number":3,"kind":"sint32","repeated":true}
            ]}"#,
        )
        .unwrap();
        let layout = manifest.plan(None).unwrap();
        assert_eq!(layout.fields()[1].origin(), Some(Origin::OneofEmbed));
        assert_eq!(layout.source(1), Some("pay.proto"));
        assert_eq!(layout.leaves()[0], Leaf::new(1, ScalarKind::String));
        assert_eq!(layout.leaves()[2], Leaf::repeated(3, ScalarKind::Sint32));
    }
}
