//! Model ORM: declarative model schemas with single-table-inheritance style
//! hierarchies, selector-based relationships, and polymorphic reads over
//! PostgreSQL or a remote model service.

pub mod client;
pub mod collection;
pub mod config;
pub mod driver;
pub mod entity;
pub mod error;
pub mod id;
pub mod relation;
pub mod schema;
pub mod sql;

pub use client::{Client, Model};
pub use collection::Collection;
pub use config::{build_registry, load_from_file, load_from_str, ModelDefinition, ModelsConfig, Settings, TableLayout};
pub use driver::{Driver, MemoryPeer, PgDriver, RemoteDriver, Row, TableOptions, Transport};
pub use entity::{Entity, FlattenOptions, Related};
pub use error::{ConfigError, OrmError, Result};
pub use id::Id;
pub use relation::{Direction, Relation};
pub use schema::{Cardinality, FieldType, ModelDescriptor, Registry, RegistryBuilder};
