//! Remote driver: every operation becomes one request to a model service
//! behind a [`Transport`].

pub mod memory;
pub mod protocol;

pub use memory::MemoryPeer;
pub use protocol::{
    RemoteErrorPayload, RemoteFailure, RemoteRequest, RemoteResponse, RequestKind, Transport,
    TransportError,
};

use crate::driver::{Driver, Row};
use crate::error::{ConfigError, OrmError, Result, StoreContext};
use crate::id::Id;
use crate::schema::{ModelDescriptor, ID_FIELD, TYPE_FIELD};
use crate::sql::Assignments;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct RemoteDriver {
    transport: Arc<dyn Transport>,
}

impl RemoteDriver {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Send one request and pull the operation's entry out of the response.
    async fn call(&self, request: RemoteRequest, context: &str) -> Result<Value> {
        tracing::debug!(
            operation = %request.operation,
            arguments = ?request.arguments,
            "remote request"
        );
        let operation = request.operation.clone();
        let mut response = self.transport.send(request).await.store_context(|| context)?;
        if !response.errors.is_empty() {
            let messages = response.errors.into_iter().map(|e| e.message).collect();
            return Err(OrmError::store(context, RemoteFailure { messages }));
        }
        Ok(response.data.remove(&operation).unwrap_or(Value::Null))
    }
}

/// Everything a read wants back: id, stored columns, discriminator.
fn read_fields(model: &ModelDescriptor) -> Vec<String> {
    let mut fields = vec![ID_FIELD.to_string()];
    fields.extend(model.columns().map(|(name, _)| name.to_string()));
    if !model.has_discriminator() {
        fields.push(TYPE_FIELD.to_string());
    }
    fields
}

fn malformed(context: &str, got: &Value) -> OrmError {
    OrmError::store(
        context,
        TransportError::Malformed(format!("expected an object, got {}", got)),
    )
}

fn into_row(value: Value, context: &str) -> Result<Option<Row>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(row) => Ok(Some(row)),
        other => Err(malformed(context, &other)),
    }
}

#[async_trait]
impl Driver for RemoteDriver {
    async fn insert(&self, model: &ModelDescriptor, a: &Assignments) -> Result<Row> {
        let context = format!("insert into {}", model.name());
        let request = RemoteRequest::mutation(protocol::create_op(model))
            .arg("data", Value::Object(a.to_row()))
            .fields(read_fields(model));
        let value = self.call(request, &context).await?;
        into_row(value, &context)?.ok_or_else(|| malformed(&context, &Value::Null))
    }

    async fn select_by_id(&self, model: &ModelDescriptor, id: &Id) -> Result<Option<Row>> {
        let context = format!("select {} by id", model.name());
        let request = RemoteRequest::query(protocol::get_by_id_op(model))
            .arg(ID_FIELD, id.to_value())
            .fields(read_fields(model));
        into_row(self.call(request, &context).await?, &context)
    }

    async fn select_by_xid(&self, model: &ModelDescriptor, xid: &Value) -> Result<Option<Row>> {
        let field = model
            .xid()
            .ok_or_else(|| ConfigError::MissingXid(model.name().to_string()))?;
        let context = format!("select {} by {}", model.name(), field);
        let request = RemoteRequest::query(protocol::get_by_xid_op(model))
            .arg("xid", xid.clone())
            .fields(read_fields(model));
        into_row(self.call(request, &context).await?, &context)
    }

    async fn update(&self, model: &ModelDescriptor, a: &Assignments) -> Result<Option<Row>> {
        let context = format!("update {}", model.name());
        let id = a.update_id().cloned().unwrap_or(Value::Null);
        let mut fields = vec![ID_FIELD.to_string()];
        fields.extend(a.columns.iter().cloned());
        let request = RemoteRequest::mutation(protocol::update_op(model))
            .arg(ID_FIELD, id)
            .arg("data", Value::Object(a.to_row()))
            .fields(fields);
        into_row(self.call(request, &context).await?, &context)
    }

    async fn delete(&self, model: &ModelDescriptor, id: &Id) -> Result<Option<Id>> {
        let context = format!("delete from {}", model.name());
        let request = RemoteRequest::mutation(protocol::delete_op(model))
            .arg(ID_FIELD, id.to_value())
            .fields([ID_FIELD]);
        let deleted = match self.call(request, &context).await? {
            Value::Object(row) => row.get(ID_FIELD).and_then(Id::from_value),
            other => Id::from_value(&other),
        };
        Ok(deleted)
    }

    async fn select_to_me(
        &self,
        model: &ModelDescriptor,
        ref_field: &str,
        id: &Id,
        filters: &Value,
    ) -> Result<Vec<Row>> {
        let context = format!("select {} by {}", model.name(), ref_field);
        let request = RemoteRequest::query(protocol::get_by_ref_op(model))
            .arg("ref", Value::String(ref_field.to_string()))
            .arg(ID_FIELD, id.to_value())
            .arg("filters", filters.clone())
            .fields(read_fields(model));
        match self.call(request, &context).await? {
            Value::Null => Ok(Vec::new()),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(row) => Ok(row),
                    other => Err(malformed(&context, &other)),
                })
                .collect(),
            other => Err(malformed(&context, &other)),
        }
    }
}
