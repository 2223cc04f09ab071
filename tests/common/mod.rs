#![allow(dead_code)]

use model_orm::{build_registry, load_from_str, Client, MemoryPeer, Registry, RemoteDriver};
use std::sync::Arc;

pub const MODELS: &str = r#"{
    "models": [
        { "name": "Person", "table": "people", "plural": "people",
          "fields": { "name": "text", "email": "text", "ssn": "text" },
          "sensitive": ["ssn"], "xid": "email" },
        { "name": "Car", "table": "cars", "plural": "cars",
          "fields": { "make": "text", "vin": "text", "_owner_ref": "integer" },
          "transmodel": { "owner": "Person" },
          "relations": { "owner": "many" },
          "xid": "vin" },
        { "name": "Tire", "table": "tires", "plural": "tires",
          "fields": { "position": "text", "brand": "text", "size": "integer", "_car_ref": "integer" },
          "relations": { "car": "many" } },
        { "name": "Engine", "table": "engines",
          "fields": { "hp": "integer", "_car_ref": "integer" },
          "relations": { "car": "one" } },
        { "name": "Parent", "table": "parents",
          "fields": { "title": "text", "secret": "text" },
          "sensitive": ["secret"] },
        { "name": "Child", "extends": "Parent", "table": "children",
          "fields": { "ctitle": "text" } }
    ]
}"#;

pub fn registry() -> Arc<Registry> {
    let config = load_from_str(MODELS).expect("fixture models load");
    Arc::new(build_registry(&config).expect("fixture registry builds"))
}

pub fn client() -> (Client, Arc<MemoryPeer>) {
    let registry = registry();
    let peer = Arc::new(MemoryPeer::new(registry.clone()));
    let client = Client::new(registry, RemoteDriver::new(peer.clone()));
    (client, peer)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("model_orm=debug"))
        .with_test_writer()
        .try_init();
}
