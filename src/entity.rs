//! Entity instances: one stored row plus its change history and attached
//! relationship results.

use crate::client::Client;
use crate::collection::Collection;
use crate::driver::Row;
use crate::error::{ConfigError, OrmError, Result};
use crate::id::Id;
use crate::relation::Direction;
use crate::schema::{alias_to_ref, is_ref_field, Cardinality, ModelDescriptor, ID_FIELD, TYPE_FIELD};
use crate::sql::filter::value_eq;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// What [`Entity::flatten`] leaves out. Every flag defaults to on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlattenOptions {
    pub strip_id: bool,
    /// Drop `_x_ref` foreign-key fields.
    pub strip_refs: bool,
    pub strip_sensitive: bool,
    /// Drop the `_type` discriminator.
    pub strip_meta: bool,
    /// Include attached relationship results under their aliases.
    pub nested: bool,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            strip_id: true,
            strip_refs: true,
            strip_sensitive: true,
            strip_meta: true,
            nested: true,
        }
    }
}

/// Result of reading a relationship from one entity.
#[derive(Clone, Debug)]
pub enum Related {
    One(Option<Entity>),
    Many(Collection),
}

impl Related {
    pub fn one(&self) -> Option<&Entity> {
        match self {
            Related::One(e) => e.as_ref(),
            Related::Many(_) => None,
        }
    }

    pub fn many(&self) -> Option<&Collection> {
        match self {
            Related::Many(c) => Some(c),
            Related::One(_) => None,
        }
    }

    pub fn flatten(&self, opts: FlattenOptions) -> Value {
        match self {
            Related::One(Some(e)) => e.flatten(opts),
            Related::One(None) => Value::Null,
            Related::Many(c) => Value::Array(c.flatten(opts)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Entity {
    client: Client,
    model: Arc<ModelDescriptor>,
    requested_as: String,
    id: Id,
    data: Row,
    /// Previous values per field, oldest first.
    dirty: IndexMap<String, Vec<Value>>,
    attached: IndexMap<String, Related>,
}

impl Entity {
    /// Wrap a stored row. The row must carry its id.
    pub fn from_row(
        client: &Client,
        model: Arc<ModelDescriptor>,
        requested_as: &str,
        row: Row,
    ) -> Result<Self> {
        let id = row
            .get(ID_FIELD)
            .and_then(Id::from_value)
            .ok_or_else(|| OrmError::InvalidInput(format!("{} row has no id", model.name())))?;
        Ok(Self {
            client: client.clone(),
            model,
            requested_as: requested_as.to_string(),
            id,
            data: row,
            dirty: IndexMap::new(),
            attached: IndexMap::new(),
        })
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Concrete type of the stored row.
    pub fn model(&self) -> &Arc<ModelDescriptor> {
        &self.model
    }

    /// Model the caller asked for; a supertype of [`Entity::model`] after a
    /// polymorphic read.
    pub fn requested_as(&self) -> &str {
        &self.requested_as
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    fn check_settable(&self, field: &str) -> Result<(), ConfigError> {
        if field == ID_FIELD || field == TYPE_FIELD {
            return Err(ConfigError::ReservedField {
                model: self.model.name().to_string(),
                field: field.to_string(),
            });
        }
        if !self.model.has_field(field) {
            return Err(ConfigError::UnknownField {
                model: self.model.name().to_string(),
                field: field.to_string(),
            });
        }
        Ok(())
    }

    /// Change one field. Setting the current value again changes nothing.
    pub fn set(&mut self, field: &str, value: Value) -> Result<()> {
        self.check_settable(field)?;
        let previous = self.data.get(field).cloned().unwrap_or(Value::Null);
        if value_eq(&previous, &value) {
            return Ok(());
        }
        self.dirty.entry(field.to_string()).or_default().push(previous);
        self.data.insert(field.to_string(), value);
        Ok(())
    }

    /// Change several fields; nothing is applied if any name is rejected.
    pub fn set_many(&mut self, values: Map<String, Value>) -> Result<()> {
        for field in values.keys() {
            self.check_settable(field)?;
        }
        for (field, value) in values {
            self.set(&field, value)?;
        }
        Ok(())
    }

    /// Point the `_<alias>_ref` field at `other` and attach it under `alias`.
    pub fn set_ref(&mut self, alias: &str, other: &Entity) -> Result<()> {
        let alias = alias.to_lowercase();
        self.set(&alias_to_ref(&alias), other.id.to_value())?;
        self.attached
            .insert(alias, Related::One(Some(other.clone())));
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub(crate) fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.keys().map(String::as_str)
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    /// Values `field` held before each change since the last save.
    pub fn history(&self, field: &str) -> &[Value] {
        self.dirty.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn attached(&self, alias: &str) -> Option<&Related> {
        self.attached.get(alias)
    }

    pub fn flatten(&self, opts: FlattenOptions) -> Value {
        let mut out = Map::new();
        for (field, value) in &self.data {
            if (opts.strip_id && field == ID_FIELD)
                || (opts.strip_refs && is_ref_field(field))
                || (opts.strip_sensitive && self.model.is_sensitive(field))
                || (opts.strip_meta && field == TYPE_FIELD)
            {
                continue;
            }
            out.insert(field.clone(), value.clone());
        }
        if opts.nested {
            for (alias, related) in &self.attached {
                out.insert(alias.clone(), related.flatten(opts));
            }
        }
        Value::Object(out)
    }

    /// Follow a relationship and attach the result under its alias.
    pub async fn read_in(&mut self, selector: &str, filters: Option<&Value>) -> Result<Related> {
        let relation = self
            .client
            .registry()
            .resolve(self.model.name(), selector)?;
        let related = match relation.direction {
            Direction::To => {
                let target = self.client.model(&relation.target)?;
                match self.data.get(&relation.ref_field).and_then(Id::from_value) {
                    Some(id) => Related::One(target.get_by_id(id).await?),
                    None => Related::One(None),
                }
            }
            Direction::From => {
                let filters = filters.unwrap_or(&Value::Null);
                let mut found = self
                    .client
                    .get_to_me(&self.id, &relation.ref_field, &relation.target, filters)
                    .await?;
                match relation.cardinality {
                    Cardinality::One => {
                        if found.len() > 1 {
                            tracing::warn!(
                                model = self.model.name(),
                                selector,
                                rows = found.len(),
                                "one-to-one relation returned several rows, keeping the first"
                            );
                        }
                        Related::One(if found.is_empty() {
                            None
                        } else {
                            Some(found.swap_remove(0))
                        })
                    }
                    Cardinality::Many => Related::Many(found.into_iter().collect()),
                }
            }
        };
        self.attached.insert(relation.alias.clone(), related.clone());
        Ok(related)
    }

    pub async fn save(&mut self) -> Result<bool> {
        let client = self.client.clone();
        client.save(self).await
    }

    pub async fn delete(&self) -> Result<Option<Id>> {
        self.client.delete(self).await
    }
}
