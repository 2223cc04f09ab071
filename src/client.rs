//! Client bound to one registry and one driver, plus per-model handles.

use crate::driver::{Driver, Row};
use crate::entity::Entity;
use crate::error::{ConfigError, OrmError, Result};
use crate::id::Id;
use crate::schema::{ModelDescriptor, Registry, ID_FIELD, TYPE_FIELD};
use crate::sql::{self, filter, Operation};
use serde_json::{Map, Value};
use std::sync::Arc;

struct ClientInner {
    registry: Arc<Registry>,
    driver: Arc<dyn Driver>,
}

/// Cheap to clone; every clone shares the registry and driver.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("models", &self.inner.registry.models().count())
            .finish_non_exhaustive()
    }
}

impl Client {
    pub fn new<D: Driver>(registry: Arc<Registry>, driver: D) -> Self {
        Self::with_driver(registry, Arc::new(driver))
    }

    pub fn with_driver(registry: Arc<Registry>, driver: Arc<dyn Driver>) -> Self {
        Self {
            inner: Arc::new(ClientInner { registry, driver }),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.registry
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.inner.driver
    }

    pub fn model(&self, name: &str) -> Result<Model, ConfigError> {
        Ok(Model {
            client: self.clone(),
            descriptor: self.inner.registry.model(name)?.clone(),
        })
    }

    /// Wrap a row read through `requested` in its concrete type.
    ///
    /// A row whose `_type` names another model is read again through that
    /// model so the entity carries all of the subtype's fields. A
    /// discriminator missing from the registry is an error.
    pub async fn materialize(&self, requested: &Arc<ModelDescriptor>, row: Row) -> Result<Entity> {
        let concrete = match row.get(TYPE_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(t)) if t == requested.name() => None,
            Some(Value::String(t)) => Some(self.inner.registry.model(t)?.clone()),
            Some(other) => {
                return Err(OrmError::InvalidInput(format!(
                    "discriminator must be a model name, got {}",
                    other
                )))
            }
        };
        let Some(concrete) = concrete else {
            return Entity::from_row(self, requested.clone(), requested.name(), row);
        };
        let id = row
            .get(ID_FIELD)
            .and_then(Id::from_value)
            .ok_or_else(|| OrmError::InvalidInput(format!("{} row has no id", requested.name())))?;
        tracing::debug!(requested = requested.name(), concrete = concrete.name(), %id, "polymorphic read");
        match self.inner.driver.select_by_id(&concrete, &id).await? {
            Some(full) => Entity::from_row(self, concrete, requested.name(), full),
            // Deleted between the two reads: keep what the first read saw.
            None => Entity::from_row(self, concrete, requested.name(), row),
        }
    }

    /// Entities of `target` whose `ref_field` points at `id`, narrowed by a
    /// filter tree.
    pub async fn get_to_me(
        &self,
        id: &Id,
        ref_field: &str,
        target: &str,
        filters: &Value,
    ) -> Result<Vec<Entity>> {
        let target = self.inner.registry.model(target)?.clone();
        if !target.has_field(ref_field) {
            return Err(ConfigError::UnknownField {
                model: target.name().to_string(),
                field: ref_field.to_string(),
            }
            .into());
        }
        filter::validate(filters, &target)?;
        let rows = self
            .inner
            .driver
            .select_to_me(&target, ref_field, id, filters)
            .await?;
        futures::future::try_join_all(rows.into_iter().map(|row| self.materialize(&target, row)))
            .await
    }

    /// Write the entity's dirty fields. `Ok(false)` means nothing was
    /// written: either nothing changed or the row no longer exists.
    pub async fn save(&self, entity: &mut Entity) -> Result<bool> {
        if !entity.is_dirty() {
            return Ok(false);
        }
        let model = entity.model().clone();
        let keys: Vec<String> = entity.dirty_fields().map(str::to_string).collect();
        let a = sql::build(
            keys.iter().map(String::as_str),
            entity.data(),
            Operation::Update,
            &model,
        )?;
        match self.inner.driver.update(&model, &a).await? {
            Some(_) => {
                entity.clear_dirty();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn delete(&self, entity: &Entity) -> Result<Option<Id>> {
        self.inner.driver.delete(entity.model(), entity.id()).await
    }
}

/// Handle on one registered model.
#[derive(Clone, Debug)]
pub struct Model {
    client: Client,
    descriptor: Arc<ModelDescriptor>,
}

fn into_object(data: Value) -> Result<Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(OrmError::InvalidInput(format!(
            "entity data must be an object, got {}",
            other
        ))),
    }
}

impl Model {
    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<ModelDescriptor> {
        &self.descriptor
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Store a new entity. A `_type` naming another model stores it there.
    pub async fn create_one(&self, data: Value) -> Result<Entity> {
        let mut data = into_object(data)?;
        let target = match data.remove(TYPE_FIELD) {
            None | Some(Value::Null) => self.descriptor.clone(),
            Some(Value::String(t)) if t == self.name() => self.descriptor.clone(),
            Some(Value::String(t)) => self.client.registry().model(&t)?.clone(),
            Some(other) => {
                return Err(OrmError::InvalidInput(format!(
                    "'{}' must be a model name, got {}",
                    TYPE_FIELD, other
                )))
            }
        };
        let keys: Vec<String> = data.keys().cloned().collect();
        let a = sql::build(keys.iter().map(String::as_str), &data, Operation::Create, &target)?;
        let row = self.client.driver().insert(&target, &a).await?;
        tracing::debug!(model = target.name(), "created");
        Entity::from_row(&self.client, target, self.name(), row)
    }

    pub async fn get_by_id(&self, id: impl Into<Id>) -> Result<Option<Entity>> {
        let id = id.into();
        match self.client.driver().select_by_id(&self.descriptor, &id).await? {
            Some(row) => Ok(Some(self.client.materialize(&self.descriptor, row).await?)),
            None => Ok(None),
        }
    }

    /// One result per id, in input order. A failed slot leaves the others
    /// untouched.
    pub async fn get_by_ids<I>(&self, ids: I) -> Vec<Result<Option<Entity>>>
    where
        I: IntoIterator,
        I::Item: Into<Id>,
    {
        futures::future::join_all(ids.into_iter().map(|id| self.get_by_id(id))).await
    }

    pub async fn get_by_xid(&self, xid: impl Into<Value>) -> Result<Option<Entity>> {
        match self
            .client
            .driver()
            .select_by_xid(&self.descriptor, &xid.into())
            .await?
        {
            Some(row) => Ok(Some(self.client.materialize(&self.descriptor, row).await?)),
            None => Ok(None),
        }
    }

    /// Update stored fields by id. Returns the id and written fields, or
    /// `None` if no such row exists.
    pub async fn update_one(&self, id: impl Into<Id>, data: Value) -> Result<Option<Row>> {
        let mut data = into_object(data)?;
        data.remove(ID_FIELD);
        data.remove(TYPE_FIELD);
        if data.is_empty() {
            return Err(OrmError::InvalidInput(format!(
                "update of {} carries no fields",
                self.name()
            )));
        }
        let keys: Vec<String> = data.keys().cloned().collect();
        data.insert(ID_FIELD.to_string(), id.into().to_value());
        let a = sql::build(
            keys.iter().map(String::as_str),
            &data,
            Operation::Update,
            &self.descriptor,
        )?;
        self.client.driver().update(&self.descriptor, &a).await
    }

    pub async fn delete_by_id(&self, id: impl Into<Id>) -> Result<Option<Id>> {
        self.client
            .driver()
            .delete(&self.descriptor, &id.into())
            .await
    }

    pub async fn save_one(&self, entity: &mut Entity) -> Result<bool> {
        self.client.save(entity).await
    }

    /// Entities of `target` pointing at `id` through `ref_field`.
    pub async fn get_to_me(
        &self,
        id: impl Into<Id>,
        ref_field: &str,
        target: &str,
        filters: &Value,
    ) -> Result<Vec<Entity>> {
        self.client
            .get_to_me(&id.into(), ref_field, target, filters)
            .await
    }
}
