//! Enum discriminators for flattened `oneof` fields.
//!
//! A flattened `oneof` becomes two plain fields: a payload (a closed sum type
//! with one variant per branch) and a discriminator string naming the enum
//! value that selects the branch:
//!
//! ```text
//! <enum full name>:<enum number in decimal>
//! e.g. "shop.v1.PaymentKind:2"
//! ```
//!
//! Decoding resolves the full name against an [`EnumRegistry`] that generated
//! registration code fills once at start-up. Enums are open: a number that is
//! not a declared variant still decodes.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const DISCRIMINATOR_SEPARATOR: char = ':';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscriminatorError {
    /// Not `<name>:<number>` with two non-empty parts and a decimal number.
    #[error("malformed discriminator: {0:?}")]
    Malformed(String),

    #[error("unknown enum type: {0}")]
    UnknownEnumType(String),

    /// Decoded fine, but names a different enum than the caller asked for.
    #[error("discriminator names enum {found}, expected {expected}")]
    TypeMismatch { expected: String, found: String },
}

/// Static description of a generated enum type.
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub full_name: &'static str,
    /// Declared `(name, number)` pairs in declaration order.
    pub values: &'static [(&'static str, i32)],
}

impl EnumDescriptor {
    pub const fn new(full_name: &'static str, values: &'static [(&'static str, i32)]) -> Self {
        Self { full_name, values }
    }

    /// Construct a value of this type. Any number is accepted.
    pub fn value(&'static self, number: i32) -> EnumValue {
        EnumValue {
            descriptor: self,
            number,
        }
    }

    pub fn name_of(&self, number: i32) -> Option<&'static str> {
        self.values
            .iter()
            .find(|(_, n)| *n == number)
            .map(|(name, _)| *name)
    }
}

/// An enum value detached from its concrete Rust type.
#[derive(Clone, Copy)]
pub struct EnumValue {
    descriptor: &'static EnumDescriptor,
    number: i32,
}

impl EnumValue {
    pub fn descriptor(&self) -> &'static EnumDescriptor {
        self.descriptor
    }

    pub fn full_name(&self) -> &'static str {
        self.descriptor.full_name
    }

    pub fn number(&self) -> i32 {
        self.number
    }

    /// Declared variant name; `None` for numbers the schema does not declare.
    pub fn name(&self) -> Option<&'static str> {
        self.descriptor.name_of(self.number)
    }

    pub fn discriminator(&self) -> Discriminator {
        encode(*self)
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.full_name() == other.full_name()
    }
}

impl Eq for EnumValue {}

impl fmt::Debug for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{}::{}({})", self.full_name(), name, self.number),
            None => write!(f, "{}({})", self.full_name(), self.number),
        }
    }
}

/// Implemented by generated enum types.
pub trait ProtoEnum: Copy {
    const DESCRIPTOR: &'static EnumDescriptor;

    fn number(self) -> i32;

    /// Open-enum construction: undeclared numbers must round-trip.
    fn from_number(number: i32) -> Self;

    fn to_enum_value(self) -> EnumValue {
        Self::DESCRIPTOR.value(self.number())
    }

    fn discriminator(self) -> Discriminator {
        encode(self.to_enum_value())
    }
}

/// Implemented by the payload sum type of a flattened `oneof`.
///
/// The case enum decides which variant to build when rehydrating; the payload
/// itself stays a closed Rust enum.
pub trait FlattenedOneof {
    type Case: ProtoEnum;

    fn case(&self) -> Self::Case;

    fn discriminator(&self) -> Discriminator {
        self.case().discriminator()
    }
}

/// Name-keyed lookup of enum types, frozen after construction.
#[derive(Debug, Clone, Default)]
pub struct EnumRegistry {
    types: HashMap<&'static str, &'static EnumDescriptor>,
}

impl EnumRegistry {
    pub fn builder() -> EnumRegistryBuilder {
        EnumRegistryBuilder::default()
    }

    pub fn lookup(&self, full_name: &str) -> Option<&'static EnumDescriptor> {
        self.types.get(full_name).copied()
    }

    pub fn contains(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &'static EnumDescriptor> + '_ {
        self.types.values().copied()
    }

    pub fn decode(&self, discriminator: &str) -> Result<EnumValue, DiscriminatorError> {
        decode(discriminator, self)
    }
}

#[derive(Debug, Default)]
pub struct EnumRegistryBuilder {
    types: HashMap<&'static str, &'static EnumDescriptor>,
}

impl EnumRegistryBuilder {
    /// Registering the same full name twice keeps the first descriptor.
    pub fn register_descriptor(&mut self, descriptor: &'static EnumDescriptor) -> &mut Self {
        self.types.entry(descriptor.full_name).or_insert(descriptor);
        self
    }

    pub fn register<E: ProtoEnum>(&mut self) -> &mut Self {
        self.register_descriptor(E::DESCRIPTOR)
    }

    pub fn build(&mut self) -> EnumRegistry {
        EnumRegistry {
            types: std::mem::take(&mut self.types),
        }
    }
}

/// Encoded enum value, stored next to a flattened `oneof` payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Discriminator(String);

impl Discriminator {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Syntactic split into `(full name, number)` without consulting a registry.
    pub fn parts(&self) -> Result<(&str, i32), DiscriminatorError> {
        split(&self.0)
    }

    pub fn decode(&self, registry: &EnumRegistry) -> Result<EnumValue, DiscriminatorError> {
        decode(&self.0, registry)
    }

    pub fn decode_as<E: ProtoEnum>(&self, registry: &EnumRegistry) -> Result<E, DiscriminatorError> {
        decode_as(&self.0, registry)
    }
}

impl fmt::Display for Discriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Discriminator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for Discriminator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Discriminator {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

pub fn encode(value: EnumValue) -> Discriminator {
    Discriminator(format!(
        "{}{}{}",
        value.full_name(),
        DISCRIMINATOR_SEPARATOR,
        value.number()
    ))
}

/// Syntax is checked before the registry so that a broken string is always
/// reported as malformed, whatever the registry holds.
pub fn decode(discriminator: &str, registry: &EnumRegistry) -> Result<EnumValue, DiscriminatorError> {
    let (full_name, number) = split(discriminator)?;
    let descriptor = registry
        .lookup(full_name)
        .ok_or_else(|| DiscriminatorError::UnknownEnumType(full_name.to_string()))?;
    Ok(descriptor.value(number))
}

pub fn decode_as<E: ProtoEnum>(
    discriminator: &str,
    registry: &EnumRegistry,
) -> Result<E, DiscriminatorError> {
    let value = decode(discriminator, registry)?;
    if value.full_name() != E::DESCRIPTOR.full_name {
        return Err(DiscriminatorError::TypeMismatch {
            expected: E::DESCRIPTOR.full_name.to_string(),
            found: value.full_name().to_string(),
        });
    }
    Ok(E::from_number(value.number()))
}

fn split(discriminator: &str) -> Result<(&str, i32), DiscriminatorError> {
    let malformed = || DiscriminatorError::Malformed(discriminator.to_string());
    let mut parts = discriminator.split(DISCRIMINATOR_SEPARATOR);
    let (Some(full_name), Some(number), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed());
    };
    if full_name.is_empty() || number.is_empty() {
        return Err(malformed());
    }
    let number = number.parse::<i32>().map_err(|_| malformed())?;
    Ok((full_name, number))
}

#[cfg(test)]
mod tests {
    use super::*;

    static COLOR: EnumDescriptor =
        EnumDescriptor::new("paint.v1.Color", &[("COLOR_UNSPECIFIED", 0), ("RED", 1), ("BLUE", 2)]);

    fn registry() -> EnumRegistry {
        EnumRegistry::builder().register_descriptor(&COLOR).build()
    }

    #[test]
    fn encode_formats_name_and_number() {
        assert_eq!(COLOR.value(2).discriminator().as_str(), "paint.v1.Color:2");
        assert_eq!(COLOR.value(-4).discriminator().as_str(), "paint.v1.Color:-4");
    }

    #[test]
    fn decode_resolves_registered_type() {
        let value = decode("paint.v1.Color:1", &registry()).unwrap();
        assert_eq!(value.full_name(), "paint.v1.Color");
        assert_eq!(value.number(), 1);
        assert_eq!(value.name(), Some("RED"));
    }

    #[test]
    fn decode_accepts_undeclared_numbers() {
        let value = decode("paint.v1.Color:42", &registry()).unwrap();
        assert_eq!(value.number(), 42);
        assert_eq!(value.name(), None);
    }

    #[test]
    fn malformed_inputs_are_classified() {
        let registry = registry();
        for input in [
            "bad",
            "a:b:c",
            "a:notanumber",
            "paint.v1.Color:",
            ":1",
            "",
            "paint.v1.Color:1.5",
            "paint.v1.Color:99999999999",
        ] {
            assert!(
                matches!(decode(input, &registry), Err(DiscriminatorError::Malformed(_))),
                "{input:?}"
            );
        }
    }

    #[test]
    fn unregistered_type_is_unknown() {
        assert_eq!(
            decode("pkg.Unregistered:0", &registry()),
            Err(DiscriminatorError::UnknownEnumType("pkg.Unregistered".to_string()))
        );
    }

    #[test]
    fn duplicate_registration_keeps_first() {
        static SHADOW: EnumDescriptor = EnumDescriptor::new("paint.v1.Color", &[]);
        let registry = EnumRegistry::builder()
            .register_descriptor(&COLOR)
            .register_descriptor(&SHADOW)
            .build();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("paint.v1.Color").map(|d| d.values.len()), Some(3));
    }

    #[test]
    fn discriminator_serializes_as_plain_string() {
        let d = COLOR.value(1).discriminator();
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"paint.v1.Color:1\"");
        let back: Discriminator = serde_json::from_str("\"paint.v1.Color:1\"").unwrap();
        assert_eq!(back, d);
    }
}
