//! Demo consumer: loads model definitions, creates their tables and views,
//! and walks the Parent/Child and Car/Tire scenarios against PostgreSQL.
//!
//! Run from repo root: `cargo run -p demo-consumer`
//! `MODELS_FILE` overrides the bundled `models.json`.

use model_orm::{build_registry, load_from_file, Client, FlattenOptions, PgDriver, Settings, TableOptions};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("model_orm=info")),
        )
        .init();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/model_orm".into());
    let models_file = std::env::var("MODELS_FILE")
        .unwrap_or_else(|_| concat!(env!("CARGO_MANIFEST_DIR"), "/models.json").into());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    let registry = Arc::new(build_registry(&load_from_file(&models_file)?)?);
    let settings = Settings::from_env()?;
    let driver = PgDriver::new(pool, registry.clone(), settings);
    driver
        .create_all(TableOptions {
            drop_existing: true,
        })
        .await?;
    let client = Client::new(registry, driver);

    let child = client
        .model("Child")?
        .create_one(json!({ "title": "parent title", "ctitle": "child title", "secret": "s3cr3t" }))
        .await?;
    let read = client
        .model("Parent")?
        .get_by_id(child.id().clone())
        .await?
        .ok_or("child row vanished")?;
    tracing::info!(
        requested = read.requested_as(),
        concrete = read.model().name(),
        data = %read.flatten(FlattenOptions::default()),
        "polymorphic read"
    );

    let mut car = client
        .model("Car")?
        .create_one(json!({ "make": "Saab", "vin": "YS3AK35E", "tags": ["classic", "turbo"] }))
        .await?;
    let tires = client.model("Tire")?;
    for (position, size) in [("front-left", 15), ("front-right", 15), ("rear-left", 16), ("rear-right", 16)] {
        tires
            .create_one(json!({ "position": position, "brand": "acme", "size": size, "car": { "id": car.id() } }))
            .await?;
    }
    let rear = car
        .read_in(
            "tires",
            Some(&json!({ "or": [{ "position": "rear-left" }, { "position": "rear-right" }] })),
        )
        .await?;
    tracing::info!(rear = rear.many().map(|c| c.len()).unwrap_or(0), "rear tires");
    car.read_in("tires", None).await?;
    tracing::info!(car = %car.flatten(FlattenOptions::default()), "car with tires");

    let found = client.model("Car")?.get_by_xid("YS3AK35E").await?;
    tracing::info!(found = found.is_some(), "lookup by vin");
    Ok(())
}
