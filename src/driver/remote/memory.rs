//! In-process peer answering the remote protocol from memory.
//!
//! Reads are hierarchy-aware like the PostgreSQL views: reading a model
//! sees its subtypes' rows projected to its own columns plus `_type`.

use super::protocol::{OperationName, RemoteRequest, RemoteResponse, RequestKind, Transport, TransportError};
use crate::driver::Row;
use crate::schema::{ModelDescriptor, Registry, ID_FIELD, TYPE_FIELD};
use crate::sql::filter::{self, value_eq, BoolOp};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
struct Store {
    /// Stored rows by concrete model name, in insertion order.
    rows: HashMap<String, Vec<Row>>,
    next_id: i64,
    writes: usize,
    log: Vec<RemoteRequest>,
}

#[derive(Debug)]
pub struct MemoryPeer {
    registry: Arc<Registry>,
    store: Mutex<Store>,
}

impl MemoryPeer {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            store: Mutex::new(Store::default()),
        }
    }

    /// Mutations accepted so far. Rejected requests are not counted.
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    /// Every request received, oldest first.
    pub fn requests(&self) -> Vec<RemoteRequest> {
        self.lock().log.clone()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&self, request: &RemoteRequest) -> Result<Value, String> {
        let op = OperationName::parse(&request.operation)
            .ok_or_else(|| format!("unknown operation '{}'", request.operation))?;
        let args = &request.arguments;
        let mut store = self.lock();
        let value = match op {
            OperationName::GetById(name) => {
                let model = self.model(name)?;
                let id = arg(args, ID_FIELD)?;
                self.visible(&store, model)
                    .into_iter()
                    .find(|row| row.get(ID_FIELD).is_some_and(|v| value_eq(v, id)))
                    .map(Value::Object)
                    .unwrap_or(Value::Null)
            }
            OperationName::GetByXid(name) => {
                let model = self.model(name)?;
                let field = model
                    .xid()
                    .ok_or_else(|| format!("model '{}' has no external id", name))?;
                let xid = arg(args, "xid")?;
                self.visible(&store, model)
                    .into_iter()
                    .find(|row| row.get(field).is_some_and(|v| value_eq(v, xid)))
                    .map(Value::Object)
                    .unwrap_or(Value::Null)
            }
            OperationName::GetByRef(plural) => {
                let model = self
                    .registry
                    .models()
                    .find(|m| m.plural() == plural)
                    .ok_or_else(|| format!("unknown model plural '{}'", plural))?;
                let ref_field = arg(args, "ref")?
                    .as_str()
                    .ok_or("'ref' must be a field name")?;
                let id = arg(args, ID_FIELD)?;
                let filters = args.get("filters").unwrap_or(&Value::Null);
                let mut out = Vec::new();
                for row in self.visible(&store, model) {
                    let hit = row.get(ref_field).is_some_and(|v| value_eq(v, id))
                        && filter::matches(filters, &row, model, BoolOp::And).map_err(|e| e.to_string())?;
                    if hit {
                        out.push(Value::Object(row));
                    }
                }
                Value::Array(out)
            }
            OperationName::Create(name) => {
                let model = self.model(name)?;
                let data = object_arg(args, "data")?;
                if let Some(key) = data.keys().find(|k| *k != ID_FIELD && !model.has_field(k)) {
                    return Err(format!("model '{}' has no field '{}'", name, key));
                }
                let mut row = Map::new();
                store.next_id += 1;
                row.insert(ID_FIELD.to_string(), Value::from(store.next_id));
                for (column, _) in model.columns() {
                    row.insert(column.to_string(), Value::Null);
                }
                for (key, v) in data {
                    if key != ID_FIELD {
                        row.insert(key.clone(), v.clone());
                    }
                }
                if model.has_discriminator() {
                    row.insert(TYPE_FIELD.to_string(), Value::String(name.to_string()));
                }
                store
                    .rows
                    .entry(name.to_string())
                    .or_default()
                    .push(row.clone());
                Value::Object(row)
            }
            OperationName::Update(name) => {
                let model = self.model(name)?;
                let id = arg(args, ID_FIELD)?.clone();
                let data = object_arg(args, "data")?;
                for key in data.keys() {
                    if !model.has_field(key) {
                        return Err(format!("model '{}' has no field '{}'", name, key));
                    }
                }
                match self.find_mut(&mut store, model, &id) {
                    Some(row) => {
                        let mut written = Map::new();
                        written.insert(ID_FIELD.to_string(), id);
                        for (key, v) in data {
                            row.insert(key.clone(), v.clone());
                            written.insert(key.clone(), v.clone());
                        }
                        Value::Object(written)
                    }
                    None => Value::Null,
                }
            }
            OperationName::Delete(name) => {
                let model = self.model(name)?;
                let id = arg(args, ID_FIELD)?;
                let mut deleted = Value::Null;
                for concrete in self.family(model) {
                    if let Some(rows) = store.rows.get_mut(concrete.name()) {
                        if let Some(pos) = rows
                            .iter()
                            .position(|r| r.get(ID_FIELD).is_some_and(|v| value_eq(v, id)))
                        {
                            let row = rows.remove(pos);
                            let mut out = Map::new();
                            out.insert(
                                ID_FIELD.to_string(),
                                row.get(ID_FIELD).cloned().unwrap_or(Value::Null),
                            );
                            deleted = Value::Object(out);
                            break;
                        }
                    }
                }
                deleted
            }
        };
        if request.kind == RequestKind::Mutation {
            store.writes += 1;
        }
        Ok(project(value, &request.fields))
    }

    fn model(&self, name: &str) -> Result<&Arc<ModelDescriptor>, String> {
        self.registry.model(name).map_err(|e| e.to_string())
    }

    /// The model and all its subtypes.
    fn family<'a>(&'a self, model: &'a Arc<ModelDescriptor>) -> Vec<&'a Arc<ModelDescriptor>> {
        let mut family = vec![model];
        family.extend(self.registry.descendants(model.name()));
        family
    }

    /// Rows readable through `model`, projected to its columns, in id order.
    fn visible(&self, store: &Store, model: &Arc<ModelDescriptor>) -> Vec<Row> {
        let mut out = Vec::new();
        for concrete in self.family(model) {
            for stored in store.rows.get(concrete.name()).into_iter().flatten() {
                let mut row = Map::new();
                row.insert(
                    ID_FIELD.to_string(),
                    stored.get(ID_FIELD).cloned().unwrap_or(Value::Null),
                );
                for (column, _) in model.columns() {
                    row.insert(
                        column.to_string(),
                        stored.get(column).cloned().unwrap_or(Value::Null),
                    );
                }
                let discriminator = stored
                    .get(TYPE_FIELD)
                    .cloned()
                    .unwrap_or_else(|| Value::String(model.name().to_string()));
                row.insert(TYPE_FIELD.to_string(), discriminator);
                out.push(row);
            }
        }
        out.sort_by_key(|row| row.get(ID_FIELD).and_then(Value::as_i64));
        out
    }

    fn find_mut<'s>(
        &self,
        store: &'s mut Store,
        model: &Arc<ModelDescriptor>,
        id: &Value,
    ) -> Option<&'s mut Row> {
        let names: Vec<String> = self
            .family(model)
            .iter()
            .map(|m| m.name().to_string())
            .collect();
        store
            .rows
            .iter_mut()
            .filter(|(name, _)| names.iter().any(|n| n == *name))
            .flat_map(|(_, rows)| rows.iter_mut())
            .find(|row| row.get(ID_FIELD).is_some_and(|v| value_eq(v, id)))
    }
}

fn arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a Value, String> {
    args.get(name)
        .ok_or_else(|| format!("missing argument '{}'", name))
}

fn object_arg<'a>(args: &'a Map<String, Value>, name: &str) -> Result<&'a Map<String, Value>, String> {
    arg(args, name)?
        .as_object()
        .ok_or_else(|| format!("argument '{}' must be an object", name))
}

/// Keep only the requested fields; an empty list keeps everything.
fn project(value: Value, fields: &[String]) -> Value {
    if fields.is_empty() {
        return value;
    }
    let keep = |row: Map<String, Value>| {
        Value::Object(
            row.into_iter()
                .filter(|(k, _)| fields.iter().any(|f| f == k))
                .collect(),
        )
    };
    match value {
        Value::Object(row) => keep(row),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => keep(row),
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

#[async_trait]
impl Transport for MemoryPeer {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError> {
        tracing::debug!(operation = %request.operation, "memory peer");
        let response = match self.handle(&request) {
            Ok(value) => RemoteResponse::ok(&request.operation, value),
            Err(message) => RemoteResponse::error(message),
        };
        self.lock().log.push(request);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelDefinition;
    use crate::schema::FieldType;
    use serde_json::json;

    fn peer() -> MemoryPeer {
        let mut b = Registry::builder();
        b.define(
            ModelDefinition::new("Parent")
                .table("parents")
                .field("title", FieldType::Text),
        )
        .unwrap();
        b.define(
            ModelDefinition::new("Child")
                .extends("Parent")
                .table("children")
                .field("ctitle", FieldType::Text),
        )
        .unwrap();
        MemoryPeer::new(Arc::new(b.build().unwrap()))
    }

    async fn send(peer: &MemoryPeer, req: RemoteRequest) -> RemoteResponse {
        peer.send(req).await.unwrap()
    }

    #[tokio::test]
    async fn parent_reads_see_subtype_rows() {
        let peer = peer();
        let created = send(
            &peer,
            RemoteRequest::mutation("createChild".into())
                .arg("data", json!({ "title": "t", "ctitle": "c" })),
        )
        .await;
        let id = created.data["createChild"]["id"].clone();
        assert_eq!(created.data["createChild"]["_type"], json!("Child"));

        let read = send(&peer, RemoteRequest::query("getParentByID".into()).arg("id", id)).await;
        let row = read.data["getParentByID"].as_object().unwrap();
        assert_eq!(row["_type"], json!("Child"));
        assert_eq!(row["title"], json!("t"));
        assert!(!row.contains_key("ctitle"));
        assert_eq!(peer.writes(), 1);
        assert_eq!(peer.requests().len(), 2);
    }

    #[tokio::test]
    async fn missing_rows_are_null_and_bad_requests_are_errors() {
        let peer = peer();
        let read = send(&peer, RemoteRequest::query("getParentByID".into()).arg("id", json!(99))).await;
        assert_eq!(read.data["getParentByID"], Value::Null);
        assert!(read.errors.is_empty());

        let bad = send(&peer, RemoteRequest::query("getBoatByID".into()).arg("id", json!(1))).await;
        assert_eq!(bad.errors.len(), 1);

        let unknown = send(
            &peer,
            RemoteRequest::mutation("createParent".into()).arg("data", json!({ "colour": "red" })),
        )
        .await;
        assert!(unknown.errors[0].message.contains("colour"));
    }

    #[tokio::test]
    async fn rejected_mutations_neither_count_nor_take_an_id() {
        let peer = peer();
        let rejected = send(
            &peer,
            RemoteRequest::mutation("createParent".into())
                .arg("data", json!({ "title": "x", "colour": "red" })),
        )
        .await;
        assert_eq!(rejected.errors.len(), 1);
        let no_data = send(&peer, RemoteRequest::mutation("createParent".into())).await;
        assert_eq!(no_data.errors.len(), 1);
        assert_eq!(peer.writes(), 0);

        let created = send(
            &peer,
            RemoteRequest::mutation("createParent".into()).arg("data", json!({ "title": "x" })),
        )
        .await;
        assert_eq!(created.data["createParent"]["id"], json!(1));
        assert_eq!(peer.writes(), 1);
        assert_eq!(peer.requests().len(), 3);
    }

    #[tokio::test]
    async fn requested_fields_narrow_the_row() {
        let peer = peer();
        send(
            &peer,
            RemoteRequest::mutation("createParent".into()).arg("data", json!({ "title": "x" })),
        )
        .await;
        let read = send(
            &peer,
            RemoteRequest::query("getParentByID".into())
                .arg("id", json!(1))
                .fields(["id"]),
        )
        .await;
        assert_eq!(read.data["getParentByID"], json!({ "id": 1 }));
    }
}
