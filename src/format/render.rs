//! Schema-aware attribute assembly.

use crate::audit::{Attr, AttrValue};
use crate::format::{Field, Schema};

/// Accumulates attributes keyed by schema field names.
///
/// Fields the schema maps to an empty name are dropped on insertion, so a
/// suppressed field never reaches the sink.
pub struct RecordBuilder<'a> {
    schema: &'a Schema,
    attrs: Vec<Attr>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            attrs: Vec::with_capacity(24),
        }
    }

    /// Add a semantic field.
    pub fn field(&mut self, field: Field, value: impl Into<AttrValue>) -> &mut Self {
        let key = self.schema.field(field);
        if !key.is_empty() {
            self.attrs.push(Attr::new(key, value));
        }
        self
    }

    /// Add a semantic field whose value is a group of attributes.
    /// Empty groups are omitted.
    pub fn group(&mut self, field: Field, attrs: Vec<Attr>) -> &mut Self {
        if !attrs.is_empty() {
            self.field(field, AttrValue::Group(attrs));
        }
        self
    }

    /// Add free-form attributes as-is. Attributes with empty keys are dropped.
    pub fn extend(&mut self, attrs: impl IntoIterator<Item = Attr>) -> &mut Self {
        self.attrs
            .extend(attrs.into_iter().filter(|a| !a.key.is_empty()));
        self
    }

    /// Finish, nesting delimited keys when the schema asks for it.
    pub fn build(self) -> Vec<Attr> {
        match self.schema.group_delimiter() {
            Some(delimiter) => group_attrs(self.attrs, delimiter),
            None => self.attrs,
        }
    }
}

/// Nest `group<delim>leaf` keys into `group: {leaf: ..}` objects.
///
/// Ungrouped attributes keep their position; each group is placed where its
/// first member appeared.
pub fn group_attrs(attrs: Vec<Attr>, delimiter: &str) -> Vec<Attr> {
    let mut result: Vec<Attr> = Vec::with_capacity(attrs.len());

    for attr in attrs {
        let Some((prefix, leaf)) = attr.key.split_once(delimiter) else {
            result.push(attr);
            continue;
        };
        let leaf = Attr {
            key: leaf.to_string(),
            value: attr.value,
        };

        let existing = result.iter_mut().find(|a| {
            a.key == prefix && matches!(a.value, AttrValue::Group(_))
        });
        match existing {
            Some(Attr {
                value: AttrValue::Group(members),
                ..
            }) => members.push(leaf),
            _ => result.push(Attr::group(prefix, vec![leaf])),
        }
    }

    result
}
