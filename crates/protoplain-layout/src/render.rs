//! Emitting a planned layout as Rust source.

use std::fmt::Write as _;

use protoplain_runtime::{Leaf, TypeInfo};
use serde::{Deserialize, Serialize};

use crate::layout::TypeLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutOptions {
    /// Appended to the message name to form the plain struct's name.
    pub plain_suffix: String,
    /// Path under which generated code reaches the runtime crate.
    pub runtime_crate: String,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            plain_suffix: "Plain".to_string(),
            runtime_crate: "::protoplain_runtime".to_string(),
        }
    }
}

impl LayoutOptions {
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.plain_suffix = suffix.into();
        self
    }

    /// `pkg.Person` -> `pkg.PersonPlain`.
    pub fn plain_type_name(&self, type_name: &str) -> String {
        format!("{type_name}{}", self.plain_suffix)
    }

    /// Identifier prefix for the constants of `type_name`: `pkg.Person` -> `PERSON_PLAIN`.
    pub fn const_prefix(&self, type_name: &str) -> String {
        let short = type_name.rsplit('.').next().unwrap_or(type_name);
        screaming_snake(&format!("{short}{}", self.plain_suffix))
    }
}

impl TypeLayout {
    /// Render the layout as a `static` descriptor plus the leaf table needed
    /// to rebuild the original message.
    pub fn render_static(&self, options: &LayoutOptions) -> String {
        let rt = &options.runtime_crate;
        let prefix = options.const_prefix(self.type_name());
        let mut out = String::new();

        let _ = writeln!(out, "pub static {prefix}_INFO: {rt}::TypeDescriptor = {rt}::TypeDescriptor::new(");
        let _ = writeln!(out, "    {:?},", options.plain_type_name(self.type_name()));

        out.push_str("    &[");
        for (i, meta) in self.fields().iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{rt}::FieldMeta::from_raw(0x{:04x})", meta.raw());
        }
        out.push_str("],\n");

        let _ = writeln!(out, "    &{:?},", self.paths());
        let _ = writeln!(out, "    &{:?},", self.json_names);
        out.push_str(");\n");

        let leaves = self.leaves();
        let _ = write!(out, "pub const {prefix}_LEAVES: [{rt}::Leaf; {}] = [", leaves.len());
        for (i, leaf) in leaves.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            render_leaf(&mut out, rt, leaf);
        }
        out.push_str("];\n");
        out
    }
}

fn render_leaf(out: &mut String, rt: &str, leaf: &Leaf) {
    if leaf.is_none() {
        let _ = write!(out, "{rt}::Leaf::NONE");
        return;
    }
    let ctor = if leaf.repeated { "repeated" } else { "new" };
    let _ = write!(
        out,
        "{rt}::Leaf::{ctor}({}, {rt}::ScalarKind::{})",
        leaf.number,
        leaf.kind.variant_name()
    );
}

fn screaming_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' {
            if !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if (prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower))
                && !out.ends_with('_')
            {
                out.push('_');
            }
        }
        out.extend(c.to_uppercase());
    }
    out
}
