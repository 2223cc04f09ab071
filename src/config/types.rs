//! Raw model definitions, as written in code or loaded from JSON.

use crate::schema::{Cardinality, FieldType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One `setSchema` call: the additions a model makes on top of its parent.
///
/// A field mapped to `None` (JSON `null`) removes that field from the
/// inherited schema.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    #[serde(default)]
    pub extends: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    /// Plural alias used for pluralized traversal selectors (e.g. `tires`).
    #[serde(default)]
    pub plural: Option<String>,
    #[serde(default)]
    pub fields: IndexMap<String, Option<FieldType>>,
    /// Short alias -> target model name, for reference fields whose natural
    /// name is not the target model's name.
    #[serde(default)]
    pub transmodel: IndexMap<String, String>,
    /// Back-alias -> cardinality of the relation this model's `_<alias>_ref`
    /// field forms with the referenced model.
    #[serde(default)]
    pub relations: IndexMap<String, Cardinality>,
    /// Fields that are stored but never flattened.
    #[serde(default)]
    pub sensitive: Vec<String>,
    /// External id field, looked up by `get_by_xid`.
    #[serde(default)]
    pub xid: Option<String>,
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDefinition {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn plural(mut self, plural: impl Into<String>) -> Self {
        self.plural = Some(plural.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.insert(name.into(), Some(ty));
        self
    }

    /// Drop an inherited field.
    pub fn remove_field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.transmodel.insert(alias.into(), target.into());
        self
    }

    pub fn relation(mut self, alias: impl Into<String>, cardinality: Cardinality) -> Self {
        self.relations.insert(alias.into(), cardinality);
        self
    }

    pub fn sensitive<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sensitive.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn xid(mut self, field: impl Into<String>) -> Self {
        self.xid = Some(field.into());
        self
    }
}

/// All model definitions of one service, e.g. a `models.json` file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub models: Vec<ModelDefinition>,
}
