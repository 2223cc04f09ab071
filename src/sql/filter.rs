//! Recursive AND/OR filter trees.
//!
//! Grammar: an array joins its children with the current operator; an object
//! key `or` / `and` (any case) recurses with that operator; any other key is
//! an equality test on a schema field. Several keys in one object join with
//! the current operator. Compiled to SQL for PostgreSQL and evaluated
//! directly against rows for in-memory peers; both give the same answer.

use crate::error::ConfigError;
use crate::schema::{FieldType, ModelDescriptor, ID_FIELD};
use crate::sql::builder::{quoted, ID_TYPE};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    fn keyword(key: &str) -> Option<BoolOp> {
        if key.eq_ignore_ascii_case("and") {
            Some(BoolOp::And)
        } else if key.eq_ignore_ascii_case("or") {
            Some(BoolOp::Or)
        } else {
            None
        }
    }

    fn sql(self) -> &'static str {
        match self {
            BoolOp::And => " AND ",
            BoolOp::Or => " OR ",
        }
    }
}

/// Compiled condition. `sql` is empty when the tree constrains nothing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Clause {
    pub sql: String,
    pub values: Vec<Value>,
    pub types: Vec<FieldType>,
}

fn field_type(model: &ModelDescriptor, field: &str) -> Result<FieldType, ConfigError> {
    if field == ID_FIELD {
        return Ok(ID_TYPE);
    }
    model
        .field_type(field)
        .cloned()
        .ok_or_else(|| ConfigError::UnknownField {
            model: model.name().to_string(),
            field: field.to_string(),
        })
}

fn invalid(node: &Value) -> ConfigError {
    ConfigError::InvalidFilter(format!("unsupported filter node: {}", node))
}

/// Compile a filter tree. Placeholders start at `$offset+1` and follow the
/// emitted text left to right. A `null` tree is an empty clause.
pub fn build_filter(
    tree: &Value,
    model: &ModelDescriptor,
    offset: usize,
    op: BoolOp,
) -> Result<Clause, ConfigError> {
    let mut clause = Clause::default();
    if tree.is_null() {
        return Ok(clause);
    }
    if let Some(sql) = compile(tree, model, offset, op, &mut clause)? {
        clause.sql = sql;
    }
    Ok(clause)
}

/// Reject a tree that would not compile against `model`.
pub fn validate(tree: &Value, model: &ModelDescriptor) -> Result<(), ConfigError> {
    build_filter(tree, model, 0, BoolOp::And).map(|_| ())
}

fn join(parts: Vec<String>, op: BoolOp) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(format!("({})", parts.join(op.sql()))),
    }
}

fn compile(
    node: &Value,
    model: &ModelDescriptor,
    offset: usize,
    op: BoolOp,
    out: &mut Clause,
) -> Result<Option<String>, ConfigError> {
    match node {
        Value::Array(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                if let Some(part) = compile(child, model, offset, op, out)? {
                    parts.push(part);
                }
            }
            Ok(join(parts, op))
        }
        Value::Object(map) => {
            let mut parts = Vec::with_capacity(map.len());
            for (key, value) in map {
                if let Some(inner) = BoolOp::keyword(key) {
                    if let Some(part) = compile(value, model, offset, inner, out)? {
                        parts.push(part);
                    }
                    continue;
                }
                let ty = field_type(model, key)?;
                if value.is_null() {
                    parts.push(format!("{} IS NULL", quoted(key)));
                    continue;
                }
                let shape_ok = match (&ty, value) {
                    (FieldType::Json, _) | (FieldType::Array(_), Value::Array(_)) => true,
                    (_, Value::Array(_) | Value::Object(_)) => false,
                    _ => true,
                };
                if !shape_ok {
                    return Err(ConfigError::InvalidFilter(format!(
                        "field '{}' cannot be compared with {}",
                        key, value
                    )));
                }
                out.values.push(value.clone());
                out.types.push(ty.clone());
                let n = offset + out.values.len();
                parts.push(format!("{} = {}", quoted(key), ty.placeholder(n)));
            }
            Ok(join(parts, op))
        }
        other => Err(invalid(other)),
    }
}

/// Loose equality for row values. Integers compare exactly; a float on
/// either side compares numerically.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) if n.is_f64() || m.is_f64() => {
            n.as_f64() == m.as_f64()
        }
        _ => a == b,
    }
}

/// A scalar as PostgreSQL would read it after the text bind and the
/// placeholder cast. Values that would not parse are left alone.
pub fn coerce(value: &Value, ty: &FieldType) -> Value {
    match (ty, value) {
        (FieldType::Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| value.clone()),
        (FieldType::Float, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        (FieldType::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "on" | "1" => Value::Bool(true),
            "false" | "f" | "no" | "off" | "0" => Value::Bool(false),
            _ => value.clone(),
        },
        (FieldType::Text, Value::Number(n)) => Value::String(n.to_string()),
        (FieldType::Text, Value::Bool(b)) => Value::String(b.to_string()),
        (FieldType::Array(inner), Value::Array(items)) => {
            Value::Array(items.iter().map(|v| coerce(v, inner)).collect())
        }
        _ => value.clone(),
    }
}

/// Evaluate a filter tree against one row of `model` with the same result
/// PostgreSQL gives for the compiled clause. Trees that constrain nothing
/// match every row.
pub fn matches(
    tree: &Value,
    row: &Map<String, Value>,
    model: &ModelDescriptor,
    op: BoolOp,
) -> Result<bool, ConfigError> {
    validate(tree, model)?;
    if tree.is_null() {
        return Ok(true);
    }
    eval(tree, row, model, op).map(|r| r.unwrap_or(true))
}

/// `None` where the node constrains nothing, mirroring `join`.
fn eval(
    node: &Value,
    row: &Map<String, Value>,
    model: &ModelDescriptor,
    op: BoolOp,
) -> Result<Option<bool>, ConfigError> {
    let mut results = Vec::new();
    match node {
        Value::Array(children) => {
            for child in children {
                results.extend(eval(child, row, model, op)?);
            }
        }
        Value::Object(map) => {
            for (key, value) in map {
                if let Some(inner) = BoolOp::keyword(key) {
                    results.extend(eval(value, row, model, inner)?);
                    continue;
                }
                let cell = row.get(key).unwrap_or(&Value::Null);
                if value.is_null() {
                    results.push(cell.is_null());
                    continue;
                }
                let ty = field_type(model, key)?;
                results.push(!cell.is_null() && value_eq(&coerce(cell, &ty), &coerce(value, &ty)));
            }
        }
        other => return Err(invalid(other)),
    }
    Ok(combine(results, op))
}

fn combine(results: Vec<bool>, op: BoolOp) -> Option<bool> {
    if results.is_empty() {
        return None;
    }
    Some(match op {
        BoolOp::And => results.into_iter().all(|r| r),
        BoolOp::Or => results.into_iter().any(|r| r),
    })
}
