//! Builds parameterized INSERT, SELECT, UPDATE, DELETE from a model descriptor.

use crate::config::Settings;
use crate::error::ConfigError;
use crate::schema::{alias_to_ref, ref_to_alias, FieldType, ModelDescriptor, ID_FIELD, TYPE_FIELD};
use crate::sql::filter::{build_filter, BoolOp};
use serde_json::{Map, Value};

/// Column type of `id` on every table.
pub const ID_TYPE: FieldType = FieldType::Integer;

/// Quote identifier for PostgreSQL (safe: names are checked at registration).
pub(crate) fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified relation name.
pub(crate) fn qualified(schema: &str, name: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(name))
}

pub fn table_name(model: &ModelDescriptor, settings: &Settings) -> String {
    qualified(&settings.schema, model.table())
}

pub fn view_name(model: &ModelDescriptor, settings: &Settings) -> String {
    qualified(
        &settings.schema,
        &format!("{}{}", settings.view_prefix, model.table()),
    )
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
    /// Declared type of each parameter, parallel to `params`.
    pub types: Vec<FieldType>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf::default()
    }

    fn push_param(&mut self, v: Value, ty: FieldType) -> usize {
        self.params.push(v);
        self.types.push(ty);
        self.params.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    Create,
    Insert,
    Update,
}

/// Column list, placeholders and bound values for one write.
///
/// For `Update` the id is bound first (`$1`) and is not part of `columns`,
/// so `values` is one longer than `columns`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignments {
    pub columns: Vec<String>,
    pub placeholders: Vec<String>,
    pub values: Vec<Value>,
    pub types: Vec<FieldType>,
    /// False when nothing besides the id would be written.
    pub found: bool,
}

impl Assignments {
    /// The column/value pairs, skipping the leading id of an update.
    pub fn column_values(&self) -> impl Iterator<Item = (&String, &Value)> {
        let skip = self.values.len() - self.columns.len();
        self.columns.iter().zip(self.values.iter().skip(skip))
    }

    /// The id bound ahead of the columns of an update.
    pub fn update_id(&self) -> Option<&Value> {
        if self.values.len() > self.columns.len() {
            self.values.first()
        } else {
            None
        }
    }

    pub fn to_row(&self) -> Map<String, Value> {
        self.column_values()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// An entity-shaped value stands for its id.
fn reference_value(v: &Value) -> Value {
    match v {
        Value::Object(m) => m.get(ID_FIELD).cloned().unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// Map a caller key onto a schema field: the field itself, or the reference
/// field an alias stands for.
fn field_for_key(model: &ModelDescriptor, key: &str) -> Result<String, ConfigError> {
    if key == ID_FIELD || model.has_field(key) {
        return Ok(key.to_string());
    }
    let as_ref = alias_to_ref(key);
    if model.has_field(&as_ref) {
        return Ok(as_ref);
    }
    Err(ConfigError::UnknownField {
        model: model.name().to_string(),
        field: key.to_string(),
    })
}

/// Turn the keys of a data object into typed columns and bound values.
///
/// `keys` chooses the columns; values are looked up in `values`, where a
/// reference field prefers its alias (`car` over `_car_ref`).
pub fn build<'k, I>(
    keys: I,
    values: &Map<String, Value>,
    op: Operation,
    model: &ModelDescriptor,
) -> Result<Assignments, ConfigError>
where
    I: IntoIterator<Item = &'k str>,
{
    let mut a = Assignments::default();
    if op == Operation::Update {
        a.values
            .push(values.get(ID_FIELD).cloned().unwrap_or(Value::Null));
    }

    let mut seen = std::collections::HashSet::new();
    for key in keys {
        let field = field_for_key(model, key)?;
        if !seen.insert(field.clone()) {
            continue;
        }
        let (ty, value) = if field == ID_FIELD {
            if op == Operation::Update {
                continue;
            }
            (ID_TYPE, values.get(ID_FIELD).cloned())
        } else {
            let ty = model.field_type(&field).cloned().ok_or_else(|| {
                ConfigError::UnknownField {
                    model: model.name().to_string(),
                    field: field.clone(),
                }
            })?;
            let value = match ref_to_alias(&field) {
                Some(alias) => values
                    .get(&alias)
                    .map(reference_value)
                    .or_else(|| values.get(&field).map(reference_value)),
                None => values.get(&field).cloned(),
            };
            (ty, value)
        };
        a.values.push(value.unwrap_or(Value::Null));
        a.placeholders.push(ty.placeholder(a.values.len()));
        a.columns.push(field);
        a.types.push(ty);
    }
    a.found = a.columns.iter().any(|c| c != ID_FIELD);
    Ok(a)
}

fn assignment_params(q: &mut QueryBuf, a: &Assignments) {
    let offset = a.values.len() - a.columns.len();
    if offset == 1 {
        q.push_param(a.values[0].clone(), ID_TYPE);
    }
    for (i, ty) in a.types.iter().enumerate() {
        q.push_param(a.values[offset + i].clone(), ty.clone());
    }
}

/// INSERT into the bare table, returning the stored row.
pub fn insert(model: &ModelDescriptor, a: &Assignments, settings: &Settings) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = table_name(model, settings);
    assignment_params(&mut q, a);
    q.sql = if a.columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", table)
    } else {
        let cols: Vec<String> = a.columns.iter().map(|c| quoted(c)).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            table,
            cols.join(", "),
            a.placeholders.join(", ")
        )
    };
    q
}

/// UPDATE by id (`$1`), returning the id and every column that was set.
pub fn update(model: &ModelDescriptor, a: &Assignments, settings: &Settings) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = table_name(model, settings);
    assignment_params(&mut q, a);
    let sets: Vec<String> = a
        .columns
        .iter()
        .zip(&a.placeholders)
        .map(|(c, ph)| format!("{} = {}", quoted(c), ph))
        .collect();
    let mut returning = vec![quoted(ID_FIELD)];
    returning.extend(a.columns.iter().map(|c| quoted(c)));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        table,
        sets.join(", "),
        quoted(ID_FIELD),
        ID_TYPE.placeholder(1),
        returning.join(", ")
    );
    q
}

/// DELETE by id. Caller binds the id as `$1`.
pub fn delete(model: &ModelDescriptor, settings: &Settings) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        table_name(model, settings),
        quoted(ID_FIELD),
        ID_TYPE.placeholder(1),
        quoted(ID_FIELD)
    );
    q
}

/// Discriminator of the row with id `$1`, read through the view so every
/// subtype's table is searched.
pub fn locate(model: &ModelDescriptor, id: &Value, settings: &Settings) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone(), ID_TYPE);
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        quoted(TYPE_FIELD),
        view_name(model, settings),
        quoted(ID_FIELD),
        ID_TYPE.placeholder(n)
    );
    q
}

/// SELECT by id through the read view. Caller binds the id as `$1`.
pub fn select_by_id(model: &ModelDescriptor, settings: &Settings) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "SELECT * FROM {} WHERE {} = {}",
        view_name(model, settings),
        quoted(ID_FIELD),
        ID_TYPE.placeholder(1)
    );
    q
}

/// SELECT by a single field (external id lookups).
pub fn select_by_field(
    model: &ModelDescriptor,
    field: &str,
    value: &Value,
    settings: &Settings,
) -> Result<QueryBuf, ConfigError> {
    let ty = model
        .field_type(field)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownField {
            model: model.name().to_string(),
            field: field.to_string(),
        })?;
    let mut q = QueryBuf::new();
    let n = q.push_param(value.clone(), ty.clone());
    q.sql = format!(
        "SELECT * FROM {} WHERE {} = {} ORDER BY {} LIMIT 1",
        view_name(model, settings),
        quoted(field),
        ty.placeholder(n),
        quoted(ID_FIELD)
    );
    Ok(q)
}

/// Rows of `model` whose `ref_field` points at `id`, narrowed by a filter tree.
pub fn select_to_me(
    model: &ModelDescriptor,
    ref_field: &str,
    id: &Value,
    filters: &Value,
    settings: &Settings,
) -> Result<QueryBuf, ConfigError> {
    let ty = model
        .field_type(ref_field)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownField {
            model: model.name().to_string(),
            field: ref_field.to_string(),
        })?;
    let mut q = QueryBuf::new();
    let n = q.push_param(id.clone(), ty.clone());
    let mut where_clause = format!("{} = {}", quoted(ref_field), ty.placeholder(n));

    let clause = build_filter(filters, model, q.params.len(), BoolOp::And)?;
    if !clause.sql.is_empty() {
        where_clause.push_str(&format!(" AND ({})", clause.sql));
        q.params.extend(clause.values);
        q.types.extend(clause.types);
    }
    q.sql = format!(
        "SELECT * FROM {} WHERE {} ORDER BY {}",
        view_name(model, settings),
        where_clause,
        quoted(ID_FIELD)
    );
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelDefinition;
    use crate::schema::Registry;
    use serde_json::json;
    use std::sync::Arc;

    fn tire() -> Arc<ModelDescriptor> {
        let mut b = Registry::builder();
        b.define(
            ModelDefinition::new("Tire")
                .table("tires")
                .field("position", FieldType::Text)
                .field("pressure", FieldType::Float)
                .field("_car_ref", FieldType::Integer),
        )
        .unwrap();
        b.build().unwrap().model("Tire").unwrap().clone()
    }

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_binds_supplied_columns_in_order() {
        let m = tire();
        let data = obj(json!({ "position": "front-left", "_car_ref": 4 }));
        let a = build(["position", "_car_ref"], &data, Operation::Create, &m).unwrap();
        assert_eq!(a.columns, ["position", "_car_ref"]);
        assert_eq!(a.placeholders, ["$1::text", "$2::bigint"]);
        assert_eq!(a.values, [json!("front-left"), json!(4)]);
        assert!(a.found);

        let q = insert(&m, &a, &Settings::default());
        assert_eq!(
            q.sql,
            "INSERT INTO \"public\".\"tires\" (\"position\", \"_car_ref\") VALUES ($1::text, $2::bigint) RETURNING *"
        );
        assert_eq!(q.params.len(), 2);
    }

    #[test]
    fn insert_may_carry_an_id() {
        let m = tire();
        let data = obj(json!({ "id": 9, "position": "rear" }));
        let a = build(["id", "position"], &data, Operation::Insert, &m).unwrap();
        assert_eq!(a.columns, ["id", "position"]);
        assert_eq!(a.placeholders[0], "$1::bigint");
    }

    #[test]
    fn update_binds_id_first_and_skips_it_in_set() {
        let m = tire();
        let data = obj(json!({ "id": 3, "pressure": 2.2 }));
        let a = build(["id", "pressure"], &data, Operation::Update, &m).unwrap();
        assert_eq!(a.columns, ["pressure"]);
        assert_eq!(a.values, [json!(3), json!(2.2)]);
        assert_eq!(a.placeholders, ["$2::double precision"]);
        assert_eq!(a.to_row(), obj(json!({ "pressure": 2.2 })));

        let q = update(&m, &a, &Settings::default());
        assert_eq!(
            q.sql,
            "UPDATE \"public\".\"tires\" SET \"pressure\" = $2::double precision WHERE \"id\" = $1::bigint RETURNING \"id\", \"pressure\""
        );
        assert_eq!(q.params, [json!(3), json!(2.2)]);
        assert_eq!(q.types, [FieldType::Integer, FieldType::Float]);
    }

    #[test]
    fn update_with_only_id_finds_nothing() {
        let m = tire();
        let data = obj(json!({ "id": 3 }));
        let a = build(["id"], &data, Operation::Update, &m).unwrap();
        assert!(!a.found);
    }

    #[test]
    fn alias_value_wins_over_raw_reference() {
        let m = tire();
        let data = obj(json!({ "car": { "id": 12, "make": "x" }, "_car_ref": 1 }));
        let a = build(["_car_ref"], &data, Operation::Create, &m).unwrap();
        assert_eq!(a.values, [json!(12)]);

        let by_alias = build(["car"], &data, Operation::Create, &m).unwrap();
        assert_eq!(by_alias.columns, ["_car_ref"]);
        assert_eq!(by_alias.values, [json!(12)]);

        let raw = obj(json!({ "_car_ref": 1 }));
        let a = build(["_car_ref"], &raw, Operation::Create, &m).unwrap();
        assert_eq!(a.values, [json!(1)]);
    }

    #[test]
    fn unknown_fields_are_config_errors() {
        let m = tire();
        let data = obj(json!({ "colour": "red" }));
        assert!(matches!(
            build(["colour"], &data, Operation::Create, &m),
            Err(ConfigError::UnknownField { .. })
        ));
        assert!(matches!(
            build([TYPE_FIELD], &data, Operation::Create, &m),
            Err(ConfigError::UnknownField { .. })
        ));
    }

    #[test]
    fn selects_read_through_the_view() {
        let m = tire();
        let s = Settings::default();
        assert_eq!(
            select_by_id(&m, &s).sql,
            "SELECT * FROM \"public\".\"v_tires\" WHERE \"id\" = $1::bigint"
        );
        assert_eq!(
            delete(&m, &s).sql,
            "DELETE FROM \"public\".\"tires\" WHERE \"id\" = $1::bigint RETURNING \"id\""
        );
        let q = select_by_field(&m, "position", &json!("rear"), &s).unwrap();
        assert!(q.sql.starts_with("SELECT * FROM \"public\".\"v_tires\" WHERE \"position\" = $1::text"));
    }

    #[test]
    fn to_me_appends_filter_after_reference() {
        let m = tire();
        let filters = json!({ "or": [{ "position": "front-left" }, { "position": "rear" }] });
        let q = select_to_me(&m, "_car_ref", &json!(4), &filters, &Settings::default()).unwrap();
        assert_eq!(
            q.sql,
            "SELECT * FROM \"public\".\"v_tires\" WHERE \"_car_ref\" = $1::bigint AND ((\"position\" = $2::text OR \"position\" = $3::text)) ORDER BY \"id\""
        );
        assert_eq!(q.params, [json!(4), json!("front-left"), json!("rear")]);

        let plain = select_to_me(&m, "_car_ref", &json!(4), &Value::Null, &Settings::default()).unwrap();
        assert_eq!(plain.params.len(), 1);
        assert!(!plain.sql.contains("AND"));
    }

    #[test]
    fn locate_reads_the_discriminator_through_the_view() {
        let q = locate(&tire(), &json!(7), &Settings::default());
        assert_eq!(
            q.sql,
            "SELECT \"_type\" FROM \"public\".\"v_tires\" WHERE \"id\" = $1::bigint"
        );
        assert_eq!(q.params, [json!(7)]);
        assert_eq!(q.types, [ID_TYPE]);
    }
}
