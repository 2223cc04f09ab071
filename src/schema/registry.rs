//! Schema registration: definitions are folded into descriptors once, then frozen.

use crate::config::ModelDefinition;
use crate::error::ConfigError;
use crate::relation::{Relation, Resolver};
use crate::schema::descriptor::ModelDescriptor;
use crate::schema::field::{
    alias_to_ref, check_identifier, is_ref_field, is_valid_ref_field, FieldType, ID_FIELD,
    TYPE_FIELD,
};
use indexmap::IndexMap;
use std::sync::Arc;

/// Collects model definitions in registration order. A parent must be
/// defined before any of its subtypes.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    models: IndexMap<String, Option<ModelDescriptor>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a model name whose schema arrives later. `build` fails if it
    /// never does.
    pub fn declare(&mut self, name: &str) -> Result<&mut Self, ConfigError> {
        check_identifier(name)?;
        self.models.entry(name.to_string()).or_insert(None);
        Ok(self)
    }

    /// Set a model's schema, merging a copy of its parent's definitions first.
    pub fn define(&mut self, def: ModelDefinition) -> Result<&mut Self, ConfigError> {
        let name = def.name.as_str();
        check_identifier(name)?;
        if let Some(Some(_)) = self.models.get(name) {
            return Err(ConfigError::DuplicateModel(name.to_string()));
        }
        let table = def
            .table
            .as_deref()
            .ok_or_else(|| ConfigError::MissingTable(name.to_string()))?;
        check_identifier(table)?;
        if let Some(plural) = &def.plural {
            check_identifier(plural)?;
        }

        let mut desc = match def.extends.as_deref() {
            Some(parent) => self.derive_from(parent, name, table)?,
            None => ModelDescriptor::root(name, table),
        };
        desc.plural = def.plural.clone();

        for (field, ty) in &def.fields {
            if field == ID_FIELD || field == TYPE_FIELD {
                return Err(ConfigError::ReservedField {
                    model: name.to_string(),
                    field: field.clone(),
                });
            }
            check_identifier(field)?;
            if is_ref_field(field) && !is_valid_ref_field(field) {
                return Err(ConfigError::InvalidIdentifier(field.clone()));
            }
            match ty {
                Some(ty) => {
                    desc.fields.insert(field.clone(), ty.clone());
                }
                None => {
                    desc.fields.shift_remove(field);
                    desc.sensitive.remove(field);
                    if desc.xid.as_deref() == Some(field.as_str()) {
                        desc.xid = None;
                    }
                }
            }
        }

        for (alias, target) in &def.transmodel {
            check_identifier(alias)?;
            desc.transmodel.insert(alias.to_lowercase(), target.clone());
        }
        for (alias, cardinality) in &def.relations {
            desc.relations.insert(alias.to_lowercase(), *cardinality);
        }
        for field in &def.sensitive {
            if !desc.fields.contains_key(field) {
                return Err(ConfigError::UnknownField {
                    model: name.to_string(),
                    field: field.clone(),
                });
            }
            desc.sensitive.insert(field.clone());
        }
        if let Some(xid) = &def.xid {
            if !desc.fields.contains_key(xid) {
                return Err(ConfigError::UnknownField {
                    model: name.to_string(),
                    field: xid.clone(),
                });
            }
            desc.xid = Some(xid.clone());
        }

        tracing::debug!(model = %name, fields = desc.fields.len(), "model defined");
        self.adopt(&desc);
        self.models.insert(name.to_string(), Some(desc));
        Ok(self)
    }

    /// Copy the parent's descriptor for a new subtype. Nothing registered
    /// changes until [`Self::adopt`] runs.
    fn derive_from(
        &self,
        parent: &str,
        name: &str,
        table: &str,
    ) -> Result<ModelDescriptor, ConfigError> {
        let mut desc = match self.models.get(parent) {
            None => return Err(ConfigError::UnknownModel(parent.to_string())),
            Some(None) => return Err(ConfigError::MissingSchema(parent.to_string())),
            Some(Some(p)) => p.clone(),
        };
        let mut lineage = desc.ancestors.clone();
        lineage.push(parent.to_string());
        if !desc.fields.contains_key(TYPE_FIELD) {
            desc.fields.insert(TYPE_FIELD.to_string(), FieldType::Text);
        }
        desc.name = name.to_string();
        desc.table = table.to_string();
        desc.parent = Some(parent.to_string());
        desc.ancestors = lineage;
        desc.children = Vec::new();
        desc.has_children = false;
        Ok(desc)
    }

    /// Mark every ancestor of a registered subtype as having children, which
    /// gives them a `_type` column.
    fn adopt(&mut self, desc: &ModelDescriptor) {
        for ancestor in &desc.ancestors {
            if let Some(Some(a)) = self.models.get_mut(ancestor) {
                a.has_children = true;
                if !a.fields.contains_key(TYPE_FIELD) {
                    a.fields.insert(TYPE_FIELD.to_string(), FieldType::Text);
                }
                if desc.parent.as_deref() == Some(ancestor.as_str())
                    && !a.children.iter().any(|c| *c == desc.name)
                {
                    a.children.push(desc.name.clone());
                }
            }
        }
    }

    /// Freeze the registry. Fails on declared-but-undefined models and on
    /// aliases pointing at models that were never registered.
    pub fn build(self) -> Result<Registry, ConfigError> {
        let mut models = IndexMap::with_capacity(self.models.len());
        for (name, desc) in self.models {
            let desc = desc.ok_or_else(|| ConfigError::MissingSchema(name.clone()))?;
            models.insert(name, Arc::new(desc));
        }
        for desc in models.values() {
            for (alias, target) in &desc.transmodel {
                if !models.contains_key(target) {
                    return Err(ConfigError::UnknownModel(target.clone()));
                }
                let field = alias_to_ref(alias);
                if !desc.has_field(&field) {
                    return Err(ConfigError::UnknownField {
                        model: desc.name.clone(),
                        field,
                    });
                }
            }
            for alias in desc.relations.keys() {
                if !desc.has_field(&alias_to_ref(alias)) {
                    return Err(ConfigError::Validation(format!(
                        "model '{}' declares relation '{}' without field '{}'",
                        desc.name,
                        alias,
                        alias_to_ref(alias)
                    )));
                }
            }
        }
        Ok(Registry {
            models,
            resolver: Resolver::default(),
        })
    }
}

/// Frozen set of model descriptors plus the relationship cache built on them.
#[derive(Debug)]
pub struct Registry {
    models: IndexMap<String, Arc<ModelDescriptor>>,
    resolver: Resolver,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Discriminator lookup. An unknown name is a registration gap.
    pub fn model(&self, name: &str) -> Result<&Arc<ModelDescriptor>, ConfigError> {
        self.models
            .get(name)
            .ok_or_else(|| ConfigError::UnknownModel(name.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ModelDescriptor>> {
        self.models.get(name)
    }

    /// Models in registration order; parents always precede their subtypes.
    pub fn models(&self) -> impl Iterator<Item = &Arc<ModelDescriptor>> {
        self.models.values()
    }

    pub fn by_plural(&self, plural: &str) -> Option<&Arc<ModelDescriptor>> {
        self.models
            .values()
            .find(|m| m.declared_plural() == Some(plural))
    }

    /// Case-insensitive name match, used to turn a reference alias back into
    /// the model it names.
    pub fn by_alias(&self, alias: &str) -> Option<&Arc<ModelDescriptor>> {
        self.models
            .values()
            .find(|m| m.name().eq_ignore_ascii_case(alias))
    }

    /// All transitive subtypes of `name`, in registration order.
    pub fn descendants(&self, name: &str) -> Vec<&Arc<ModelDescriptor>> {
        self.models
            .values()
            .filter(|m| m.ancestors().iter().any(|a| a == name))
            .collect()
    }

    /// Whether a row whose discriminator is `concrete` belongs to `model`.
    pub fn is_a(&self, concrete: &str, model: &str) -> bool {
        self.models
            .get(concrete)
            .map(|m| m.is_a(model))
            .unwrap_or(false)
    }

    /// Resolve a selector on `model`, memoized for the registry's lifetime.
    pub fn resolve(&self, model: &str, selector: &str) -> Result<Arc<Relation>, ConfigError> {
        self.resolver.resolve(self, model, selector)
    }
}
