//! Request/response protocol spoken with a remote model service.

use crate::schema::ModelDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Query,
    Mutation,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub kind: RequestKind,
    pub operation: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Columns the caller wants back.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl RemoteRequest {
    pub fn query(operation: String) -> Self {
        Self {
            kind: RequestKind::Query,
            operation,
            arguments: Map::new(),
            fields: Vec::new(),
        }
    }

    pub fn mutation(operation: String) -> Self {
        Self {
            kind: RequestKind::Mutation,
            ..Self::query(operation)
        }
    }

    pub fn arg(mut self, name: &str, value: Value) -> Self {
        self.arguments.insert(name.to_string(), value);
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteErrorPayload {
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteResponse {
    /// Results keyed by operation name. A null entry means not found.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RemoteErrorPayload>,
}

impl RemoteResponse {
    pub fn ok(operation: &str, value: Value) -> Self {
        let mut data = Map::new();
        data.insert(operation.to_string(), value);
        Self {
            data,
            errors: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Map::new(),
            errors: vec![RemoteErrorPayload {
                message: message.into(),
            }],
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors reported by the peer inside an otherwise delivered response.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("remote peer reported: {}", .messages.join("; "))]
pub struct RemoteFailure {
    pub messages: Vec<String>,
}

/// Sends one request and returns the peer's structured response.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: RemoteRequest) -> Result<RemoteResponse, TransportError>;
}

pub fn get_by_id_op(model: &ModelDescriptor) -> String {
    format!("get{}ByID", model.name())
}

pub fn get_by_xid_op(model: &ModelDescriptor) -> String {
    format!("get{}ByXID", model.name())
}

pub fn create_op(model: &ModelDescriptor) -> String {
    format!("create{}", model.name())
}

pub fn update_op(model: &ModelDescriptor) -> String {
    format!("update{}", model.name())
}

pub fn delete_op(model: &ModelDescriptor) -> String {
    format!("delete{}", model.name())
}

pub fn get_by_ref_op(model: &ModelDescriptor) -> String {
    format!("get{}ByRef", model.plural())
}

/// Operation names a peer recognizes, split into verb and model part.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationName<'a> {
    GetById(&'a str),
    GetByXid(&'a str),
    Create(&'a str),
    Update(&'a str),
    Delete(&'a str),
    /// Carries the plural name.
    GetByRef(&'a str),
}

impl<'a> OperationName<'a> {
    pub fn parse(op: &'a str) -> Option<Self> {
        if let Some(rest) = op.strip_prefix("get") {
            if let Some(m) = rest.strip_suffix("ByXID") {
                return Some(OperationName::GetByXid(m));
            }
            if let Some(m) = rest.strip_suffix("ByID") {
                return Some(OperationName::GetById(m));
            }
            if let Some(m) = rest.strip_suffix("ByRef") {
                return Some(OperationName::GetByRef(m));
            }
            return None;
        }
        if let Some(m) = op.strip_prefix("create") {
            return Some(OperationName::Create(m));
        }
        if let Some(m) = op.strip_prefix("update") {
            return Some(OperationName::Update(m));
        }
        op.strip_prefix("delete").map(OperationName::Delete)
    }
}
