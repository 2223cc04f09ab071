//! PostgreSQL driver: statements from the query builder, executed on a pool.

use crate::config::{Settings, TableLayout};
use crate::driver::{Driver, Row};
use crate::error::{ConfigError, OrmError, Result, StoreContext};
use crate::id::Id;
use crate::schema::{ModelDescriptor, Registry, ID_FIELD, TYPE_FIELD};
use crate::sql::{self, ddl, Assignments, PgBindValue, QueryBuf, ID_TYPE};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TableOptions {
    /// Drop the existing relation first. Nothing is ever dropped otherwise.
    pub drop_existing: bool,
}

#[derive(Clone)]
pub struct PgDriver {
    pool: PgPool,
    registry: Arc<Registry>,
    settings: Settings,
}

impl PgDriver {
    pub fn new(pool: PgPool, registry: Arc<Registry>, settings: Settings) -> Self {
        Self {
            pool,
            registry,
            settings,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn fetch_optional(&self, q: &QueryBuf, context: &str) -> Result<Option<Row>> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for (v, ty) in q.params.iter().zip(&q.types) {
            query = query.bind(PgBindValue::from_json(v, ty));
        }
        let row = query
            .fetch_optional(&self.pool)
            .await
            .store_context(|| context)?;
        Ok(row.map(|r| row_to_json(&r)))
    }

    async fn fetch_all(&self, q: &QueryBuf, context: &str) -> Result<Vec<Row>> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for (v, ty) in q.params.iter().zip(&q.types) {
            query = query.bind(PgBindValue::from_json(v, ty));
        }
        let rows = query.fetch_all(&self.pool).await.store_context(|| context)?;
        Ok(rows.iter().map(row_to_json).collect())
    }

    async fn execute(&self, statement: &str, context: &str) -> Result<()> {
        tracing::info!(sql = %statement, "ddl");
        sqlx::query(statement)
            .execute(&self.pool)
            .await
            .store_context(|| context)?;
        Ok(())
    }

    /// Model whose table holds the row `id` for a write through `model`.
    /// Under [`TableLayout::Duplicate`] a parent table holds only the
    /// parent's own rows, so the row's discriminator picks the table.
    /// `None` when no such row exists.
    async fn write_target(
        &self,
        model: &ModelDescriptor,
        id: &Value,
    ) -> Result<Option<Arc<ModelDescriptor>>> {
        if !routes_by_type(model, &self.settings) {
            return Ok(Some(self.registry.model(model.name())?.clone()));
        }
        let q = sql::locate(model, id, &self.settings);
        let row = self
            .fetch_optional(&q, &format!("locate {} row", model.name()))
            .await?;
        match row {
            Some(row) => Ok(Some(concrete_model(&self.registry, model, &row)?)),
            None => Ok(None),
        }
    }

    fn by_id(mut q: QueryBuf, id: &Id) -> QueryBuf {
        q.params.push(id.to_value());
        q.types.push(ID_TYPE);
        q
    }

    pub async fn create_table(&self, model: &str, opts: TableOptions) -> Result<()> {
        let m = self.registry.model(model)?;
        if opts.drop_existing {
            self.drop_view(model).await?;
            self.drop_table(model).await?;
        }
        let statement = ddl::create_table(m, &self.registry, &self.settings)?;
        self.execute(&statement, &format!("create table for {}", model))
            .await
    }

    pub async fn create_view(&self, model: &str, opts: TableOptions) -> Result<()> {
        let m = self.registry.model(model)?;
        if opts.drop_existing {
            self.drop_view(model).await?;
        }
        let statement = ddl::create_view(m, &self.registry, &self.settings)?;
        self.execute(&statement, &format!("create view for {}", model))
            .await
    }

    pub async fn drop_table(&self, model: &str) -> Result<()> {
        let m = self.registry.model(model)?;
        self.execute(
            &ddl::drop_table(m, &self.settings),
            &format!("drop table for {}", model),
        )
        .await
    }

    pub async fn drop_view(&self, model: &str) -> Result<()> {
        let m = self.registry.model(model)?;
        self.execute(
            &ddl::drop_view(m, &self.settings),
            &format!("drop view for {}", model),
        )
        .await
    }

    /// Create the schema, every table (parents before subtypes), then every
    /// view, so union views can see all descendant tables.
    pub async fn create_all(&self, opts: TableOptions) -> Result<()> {
        self.execute(
            &format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                sql::quoted(&self.settings.schema)
            ),
            "create schema",
        )
        .await?;
        if opts.drop_existing {
            self.drop_all().await?;
        }
        let names: Vec<String> = self.registry.models().map(|m| m.name().to_string()).collect();
        for name in &names {
            self.create_table(name, TableOptions::default()).await?;
        }
        for name in &names {
            self.create_view(name, TableOptions::default()).await?;
        }
        Ok(())
    }

    /// Drop every view, then every table, subtypes first.
    pub async fn drop_all(&self) -> Result<()> {
        let names: Vec<String> = self.registry.models().map(|m| m.name().to_string()).collect();
        for name in names.iter().rev() {
            self.drop_view(name).await?;
        }
        for name in names.iter().rev() {
            self.drop_table(name).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Driver for PgDriver {
    async fn insert(&self, model: &ModelDescriptor, a: &Assignments) -> Result<Row> {
        let context = format!("insert into {}", model.name());
        let q = sql::insert(model, a, &self.settings);
        self.fetch_optional(&q, &context)
            .await?
            .ok_or_else(|| OrmError::store(context, "insert returned no row"))
    }

    async fn select_by_id(&self, model: &ModelDescriptor, id: &Id) -> Result<Option<Row>> {
        let q = Self::by_id(sql::select_by_id(model, &self.settings), id);
        self.fetch_optional(&q, &format!("select {} by id", model.name()))
            .await
    }

    async fn select_by_xid(&self, model: &ModelDescriptor, xid: &Value) -> Result<Option<Row>> {
        let field = model
            .xid()
            .ok_or_else(|| ConfigError::MissingXid(model.name().to_string()))?;
        let q = sql::select_by_field(model, field, xid, &self.settings)?;
        self.fetch_optional(&q, &format!("select {} by {}", model.name(), field))
            .await
    }

    async fn update(&self, model: &ModelDescriptor, a: &Assignments) -> Result<Option<Row>> {
        let context = format!("update {}", model.name());
        let id = a
            .update_id()
            .ok_or_else(|| OrmError::store(context.clone(), "update without an id"))?;
        let Some(target) = self.write_target(model, id).await? else {
            return Ok(None);
        };
        let q = sql::update(&target, a, &self.settings);
        self.fetch_optional(&q, &context).await
    }

    async fn delete(&self, model: &ModelDescriptor, id: &Id) -> Result<Option<Id>> {
        let Some(target) = self.write_target(model, &id.to_value()).await? else {
            return Ok(None);
        };
        let q = Self::by_id(sql::delete(&target, &self.settings), id);
        let row = self
            .fetch_optional(&q, &format!("delete from {}", model.name()))
            .await?;
        Ok(row.and_then(|r| r.get(ID_FIELD).and_then(Id::from_value)))
    }

    async fn select_to_me(
        &self,
        model: &ModelDescriptor,
        ref_field: &str,
        id: &Id,
        filters: &Value,
    ) -> Result<Vec<Row>> {
        let q = sql::select_to_me(model, ref_field, &id.to_value(), filters, &self.settings)?;
        self.fetch_all(&q, &format!("select {} by {}", model.name(), ref_field))
            .await
    }
}

/// Whether writes through `model` must first find the row's own table.
fn routes_by_type(model: &ModelDescriptor, settings: &Settings) -> bool {
    settings.layout == TableLayout::Duplicate && model.has_children()
}

/// Descriptor named by a located row's `_type`, which must be `model` or
/// one of its subtypes.
fn concrete_model(
    registry: &Registry,
    model: &ModelDescriptor,
    row: &Row,
) -> Result<Arc<ModelDescriptor>> {
    let name = row
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or(model.name());
    let concrete = registry.model(name)?;
    if !concrete.is_a(model.name()) {
        return Err(OrmError::store(
            format!("locate {} row", model.name()),
            format!("row belongs to unrelated model '{}'", name),
        ));
    }
    Ok(concrete.clone())
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Row {
    use sqlx::{Column, Row as _};
    let mut map = serde_json::Map::new();
    for col in row.columns() {
        let name = col.name();
        map.insert(name.to_string(), cell_to_value(row, name));
    }
    map
}

fn float(n: f64) -> Value {
    serde_json::Number::from_f64(n)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn list<T>(items: Vec<Option<T>>, f: impl Fn(T) -> Value) -> Value {
    Value::Array(
        items
            .into_iter()
            .map(|i| i.map(&f).unwrap_or(Value::Null))
            .collect(),
    )
}

fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row as _;
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::Number(n.into());
    }
    if let Ok(Some(n)) = row.try_get::<Option<f32>, _>(name) {
        return float(n as f64);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return float(n);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<serde_json::Value>, _>(name) {
        return j;
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<String>>>, _>(name) {
        return list(v, Value::String);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<i64>>>, _>(name) {
        return list(v, |n| Value::Number(n.into()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<f64>>>, _>(name) {
        return list(v, float);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<bool>>>, _>(name) {
        return list(v, Value::Bool);
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<uuid::Uuid>>>, _>(name) {
        return list(v, |u| Value::String(u.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<Vec<Option<chrono::DateTime<chrono::Utc>>>>, _>(name) {
        return list(v, |d| Value::String(d.to_rfc3339()));
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelDefinition;
    use crate::schema::FieldType;
    use serde_json::json;

    fn registry() -> Registry {
        let mut b = Registry::builder();
        b.define(ModelDefinition::new("Parent").table("parents").field("title", FieldType::Text))
            .unwrap();
        b.define(ModelDefinition::new("Child").extends("Parent").table("children"))
            .unwrap();
        b.define(ModelDefinition::new("Car").table("cars")).unwrap();
        b.build().unwrap()
    }

    fn row(v: Value) -> Row {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn only_duplicate_parents_look_up_the_row_first() {
        let reg = registry();
        let duplicate = Settings {
            layout: TableLayout::Duplicate,
            ..Settings::default()
        };
        assert!(routes_by_type(reg.model("Parent").unwrap(), &duplicate));
        assert!(!routes_by_type(reg.model("Child").unwrap(), &duplicate));
        assert!(!routes_by_type(reg.model("Car").unwrap(), &duplicate));
        assert!(!routes_by_type(reg.model("Parent").unwrap(), &Settings::default()));
    }

    #[test]
    fn located_rows_pick_the_subtype_table() {
        let reg = registry();
        let parent = reg.model("Parent").unwrap();
        let target = concrete_model(&reg, parent, &row(json!({ "_type": "Child" }))).unwrap();
        assert_eq!(target.name(), "Child");
        let data = row(json!({ "id": 4, "title": "t" }));
        let a = sql::build(["title"], &data, sql::Operation::Update, &target).unwrap();
        assert!(sql::update(&target, &a, &Settings::default())
            .sql
            .starts_with("UPDATE \"public\".\"children\" SET"));
        assert!(sql::delete(&target, &Settings::default())
            .sql
            .starts_with("DELETE FROM \"public\".\"children\""));

        let own = concrete_model(&reg, parent, &row(json!({ "_type": "Parent" }))).unwrap();
        assert_eq!(own.name(), "Parent");

        let err = concrete_model(&reg, parent, &row(json!({ "_type": "Car" }))).unwrap_err();
        assert!(!err.is_config());
        assert!(concrete_model(&reg, parent, &row(json!({ "_type": "Boat" })))
            .unwrap_err()
            .is_config());
    }
}
