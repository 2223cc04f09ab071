//! Immutable per-model type descriptor.

use crate::schema::field::{FieldType, TYPE_FIELD};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Whether a from-reference yields at most one row or a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[serde(alias = "ONE")]
    One,
    #[serde(alias = "MANY")]
    Many,
}

/// Everything the runtime knows about one model type. Built once by the
/// registry and shared behind an `Arc`; a derived model owns a copy of its
/// parent's maps, never a live view of them.
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) plural: Option<String>,
    pub(crate) parent: Option<String>,
    /// Root first, direct parent last.
    pub(crate) ancestors: Vec<String>,
    pub(crate) children: Vec<String>,
    pub(crate) has_children: bool,
    pub(crate) fields: IndexMap<String, FieldType>,
    pub(crate) transmodel: IndexMap<String, String>,
    pub(crate) relations: IndexMap<String, Cardinality>,
    pub(crate) sensitive: HashSet<String>,
    pub(crate) xid: Option<String>,
}

impl ModelDescriptor {
    pub(crate) fn root(name: &str, table: &str) -> Self {
        ModelDescriptor {
            name: name.to_string(),
            table: table.to_string(),
            plural: None,
            parent: None,
            ancestors: Vec::new(),
            children: Vec::new(),
            has_children: false,
            fields: IndexMap::new(),
            transmodel: IndexMap::new(),
            relations: IndexMap::new(),
            sensitive: HashSet::new(),
            xid: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declared plural alias, or the name with an `s` appended.
    pub fn plural(&self) -> String {
        self.plural.clone().unwrap_or_else(|| format!("{}s", self.name))
    }

    pub fn declared_plural(&self) -> Option<&str> {
        self.plural.as_deref()
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// Name of the top-most model of this hierarchy (itself for roots).
    pub fn root_name(&self) -> &str {
        self.ancestors.first().map(String::as_str).unwrap_or(&self.name)
    }

    pub fn children(&self) -> &[String] {
        &self.children
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn has_children(&self) -> bool {
        self.has_children
    }

    /// True when the table stores a real `_type` column.
    pub fn has_discriminator(&self) -> bool {
        self.fields.contains_key(TYPE_FIELD)
    }

    /// Every stored column except `id`, sensitive ones included.
    pub fn columns(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Normal field iteration: stored columns minus the sensitive ones.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldType)> {
        self.columns().filter(|(k, _)| !self.sensitive.contains(*k))
    }

    pub fn field_type(&self, name: &str) -> Option<&FieldType> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn sensitive(&self) -> &HashSet<String> {
        &self.sensitive
    }

    pub fn is_sensitive(&self, name: &str) -> bool {
        self.sensitive.contains(name)
    }

    pub fn transmodel(&self, alias: &str) -> Option<&str> {
        self.transmodel.get(alias).map(String::as_str)
    }

    pub fn relation(&self, alias: &str) -> Option<Cardinality> {
        self.relations.get(alias).copied()
    }

    pub fn xid(&self) -> Option<&str> {
        self.xid.as_deref()
    }

    /// `true` if `other` is this model or one of its ancestors.
    pub fn is_a(&self, other: &str) -> bool {
        self.name == other || self.ancestors.iter().any(|a| a == other)
    }
}
