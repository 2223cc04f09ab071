//! Persistence drivers. The client prepares each operation with the query
//! builder and a driver executes it against its backing store.

pub mod postgres;
pub mod remote;

use crate::error::Result;
use crate::id::Id;
use crate::schema::ModelDescriptor;
use crate::sql::Assignments;
use async_trait::async_trait;
use serde_json::Value;

/// One stored row as returned by a driver: column name to JSON value.
pub type Row = serde_json::Map<String, Value>;

pub use postgres::{PgDriver, TableOptions};
pub use remote::{MemoryPeer, RemoteDriver, Transport};

#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Store a new row and return it as stored, including its id.
    async fn insert(&self, model: &ModelDescriptor, a: &Assignments) -> Result<Row>;

    async fn select_by_id(&self, model: &ModelDescriptor, id: &Id) -> Result<Option<Row>>;

    /// First row (by id) whose external id field equals `xid`. Fails with
    /// [`ConfigError::MissingXid`](crate::ConfigError::MissingXid) when the
    /// model declares none.
    async fn select_by_xid(&self, model: &ModelDescriptor, xid: &Value) -> Result<Option<Row>>;

    /// Apply an update built with [`Operation::Update`](crate::sql::Operation).
    /// Returns the id and the written columns, or `None` if no row matched.
    async fn update(&self, model: &ModelDescriptor, a: &Assignments) -> Result<Option<Row>>;

    async fn delete(&self, model: &ModelDescriptor, id: &Id) -> Result<Option<Id>>;

    /// Rows of `model` whose `ref_field` holds `id`, narrowed by a filter
    /// tree, in id order.
    async fn select_to_me(
        &self,
        model: &ModelDescriptor,
        ref_field: &str,
        id: &Id,
        filters: &Value,
    ) -> Result<Vec<Row>>;
}
