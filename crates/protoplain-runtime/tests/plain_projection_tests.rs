//! A hand-written stand-in for generated code: `PersonPlain` flattens
//! `Person.address` (field 3) into `street` / `city`.

use prost::Message;
use protoplain_runtime::{
    rebuild_from_sparse, sparse_from_bytes, FieldMeta, Leaf, Origin, ScalarKind, SparseEmit,
    SparseValue, TypeDescriptor, TypeInfo,
};
use serde_json::{json, Value};

#[derive(Clone, PartialEq, prost::Message)]
struct Address {
    #[prost(string, tag = "1")]
    street: String,
    #[prost(string, tag = "2")]
    city: String,
}

#[derive(Clone, PartialEq, prost::Message)]
struct Person {
    #[prost(string, tag = "1")]
    name: String,
    #[prost(message, optional, tag = "3")]
    address: Option<Address>,
    #[prost(int64, tag = "4")]
    age: i64,
}

static PERSON_PLAIN: TypeDescriptor = TypeDescriptor::new(
    "people.PersonPlain",
    &[
        FieldMeta::from_raw(0x0000),
        FieldMeta::from_raw(0x2800),
        FieldMeta::from_raw(0x2800),
        FieldMeta::from_raw(0x0000),
        FieldMeta::from_raw(0x6000),
    ],
    &[3],
    &["name", "street", "city", "age", "displayName"],
);

/// Where each plain field lands inside the message its path leads to.
const PERSON_PLAIN_LEAVES: [Leaf; 5] = [
    Leaf::new(1, ScalarKind::String),
    Leaf::new(1, ScalarKind::String),
    Leaf::new(2, ScalarKind::String),
    Leaf::new(4, ScalarKind::Int64),
    Leaf::NONE,
];

#[derive(Debug, Default)]
struct PersonPlain {
    name: Option<String>,
    street: Option<String>,
    city: Option<String>,
    age: Option<i64>,
    display_name: Option<String>,
}

impl SparseEmit for PersonPlain {
    type Info = TypeDescriptor;

    fn type_info() -> &'static TypeDescriptor {
        &PERSON_PLAIN
    }

    fn present_field(&self, field_index: usize) -> Option<Value> {
        match field_index {
            0 => self.name.as_ref().map(|v| json!(v)),
            1 => self.street.as_ref().map(|v| json!(v)),
            2 => self.city.as_ref().map(|v| json!(v)),
            3 => self.age.map(|v| json!(v)),
            4 => self.display_name.as_ref().map(|v| json!(v)),
            _ => None,
        }
    }
}

fn to_person(sparse: &SparseValue) -> Person {
    let tree = rebuild_from_sparse(&PERSON_PLAIN, &PERSON_PLAIN_LEAVES, sparse).unwrap();
    Person::decode(tree.encode_to_vec().as_slice()).unwrap()
}

#[test]
fn layout_constants_describe_the_embedding() {
    let street = PERSON_PLAIN.field_meta(1).unwrap();
    assert_eq!(street.origin(), Some(Origin::Embed));
    assert_eq!(street.depth(), 1);
    assert!(street.is_embed_kind());
    assert_eq!(PERSON_PLAIN.resolve_path(1), &[3]);
    assert_eq!(PERSON_PLAIN.resolve_path(2), &[3]);
    assert!(PERSON_PLAIN.resolve_path(0).is_empty());
    assert_eq!(PERSON_PLAIN.field_meta(4).unwrap().origin(), Some(Origin::Virtual));
}

#[test]
fn street_only_rebuilds_address_at_field_three() {
    let plain = PersonPlain {
        street: Some("Main".to_string()),
        ..Default::default()
    };
    let person = to_person(&plain.to_sparse());
    assert_eq!(
        person,
        Person {
            name: String::new(),
            address: Some(Address {
                street: "Main".to_string(),
                city: String::new(),
            }),
            age: 0,
        }
    );
}

#[test]
fn sparse_json_only_carries_present_fields() {
    let plain = PersonPlain {
        name: Some("Ada".to_string()),
        city: Some("London".to_string()),
        display_name: Some("ada".to_string()),
        ..Default::default()
    };
    assert_eq!(
        plain.to_sparse_json().unwrap(),
        r#"{"name":"Ada","city":"London","displayName":"ada","_src":[0,2,4]}"#
    );
}

#[test]
fn partial_update_payload_rebuilds_only_known_fields() {
    let sparse =
        SparseValue::from_json_str(&PERSON_PLAIN, r#"{"age":36,"city":"Berlin","legacy":true}"#)
            .unwrap();
    assert_eq!(sparse.set_indices(), &[3, 2]);

    let person = to_person(&sparse);
    assert_eq!(person.age, 36);
    assert_eq!(person.name, "");
    assert_eq!(
        person.address,
        Some(Address {
            street: String::new(),
            city: "Berlin".to_string(),
        })
    );
}

#[test]
fn virtual_fields_never_reach_the_wire() {
    let plain = PersonPlain {
        display_name: Some("ghost".to_string()),
        ..Default::default()
    };
    let tree = rebuild_from_sparse(&PERSON_PLAIN, &PERSON_PLAIN_LEAVES, &plain.to_sparse()).unwrap();
    assert!(tree.is_empty());
    assert!(tree.encode_to_vec().is_empty());
}

#[test]
fn prost_bytes_flatten_to_sparse_and_rebuild_identically() {
    let person = Person {
        name: "Ada".to_string(),
        address: Some(Address {
            street: "Main".to_string(),
            city: "London".to_string(),
        }),
        age: 36,
    };
    let bytes = person.encode_to_vec();

    let sparse = sparse_from_bytes(&PERSON_PLAIN, &PERSON_PLAIN_LEAVES, &bytes).unwrap();
    assert_eq!(
        sparse.to_json_string(&PERSON_PLAIN).unwrap(),
        r#"{"name":"Ada","street":"Main","city":"London","age":36,"_src":[0,1,2,3]}"#
    );

    let tree = rebuild_from_sparse(&PERSON_PLAIN, &PERSON_PLAIN_LEAVES, &sparse).unwrap();
    assert_eq!(tree.encode_to_vec(), bytes);
}

#[test]
fn absent_nested_message_flattens_to_nothing() {
    let person = Person {
        name: "Ada".to_string(),
        address: None,
        age: 0,
    };
    let sparse =
        sparse_from_bytes(&PERSON_PLAIN, &PERSON_PLAIN_LEAVES, &person.encode_to_vec()).unwrap();
    assert_eq!(sparse.set_indices(), &[0]);
}
