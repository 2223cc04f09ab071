//! Load model definitions from JSON and fold them into a registry.

use crate::config::types::{ModelDefinition, ModelsConfig};
use crate::config::{parents_first, validate};
use crate::error::ConfigError;
use crate::schema::Registry;
use std::path::Path;

/// Accepts either `{ "models": [...] }` or a bare array of definitions.
pub fn load_from_str(json: &str) -> Result<ModelsConfig, ConfigError> {
    let value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))?;
    let config = if value.is_array() {
        let models: Vec<ModelDefinition> =
            serde_json::from_value(value).map_err(|e| ConfigError::Load(e.to_string()))?;
        ModelsConfig { models }
    } else {
        serde_json::from_value(value).map_err(|e| ConfigError::Load(e.to_string()))?
    };
    validate(&config)?;
    Ok(config)
}

pub fn load_from_file(path: impl AsRef<Path>) -> Result<ModelsConfig, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_str(&json)
}

/// Build a frozen registry from a validated config, defining parents before
/// their subtypes regardless of file order.
pub fn build_registry(config: &ModelsConfig) -> Result<Registry, ConfigError> {
    validate(config)?;
    let mut builder = Registry::builder();
    for i in parents_first(config)? {
        builder.define(config.models[i].clone())?;
    }
    let registry = builder.build()?;
    tracing::info!(models = config.models.len(), "model registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Cardinality;

    const MODELS: &str = r#"{
        "models": [
            { "name": "Child", "extends": "Parent", "table": "children",
              "fields": { "ctitle": "text" } },
            { "name": "Parent", "table": "parents",
              "fields": { "title": "text", "tags": "text[]" } },
            { "name": "Tire", "table": "tires", "plural": "tires",
              "fields": { "_car_ref": "integer", "position": "text" },
              "relations": { "car": "many" } },
            { "name": "Car", "table": "cars", "fields": { "vin": "text" }, "xid": "vin" }
        ]
    }"#;

    #[test]
    fn file_order_does_not_matter() {
        let config = load_from_str(MODELS).unwrap();
        let reg = build_registry(&config).unwrap();
        let names: Vec<_> = reg.models().map(|m| m.name().to_string()).collect();
        assert_eq!(names, ["Parent", "Tire", "Car", "Child"]);
        assert!(reg.model("Child").unwrap().has_field("title"));
        assert_eq!(reg.model("Tire").unwrap().relation("car"), Some(Cardinality::Many));
        assert_eq!(reg.model("Car").unwrap().xid(), Some("vin"));
    }

    #[test]
    fn bare_arrays_are_accepted() {
        let config = load_from_str(r#"[{ "name": "A", "table": "a" }]"#).unwrap();
        assert_eq!(config.models.len(), 1);
    }

    #[test]
    fn broken_configs_are_rejected() {
        assert!(matches!(load_from_str("{"), Err(ConfigError::Load(_))));
        assert!(matches!(
            load_from_str(r#"[{ "name": "A", "table": "a", "fields": { "x": "blob" } }]"#),
            Err(ConfigError::Load(_))
        ));
        assert_eq!(
            load_from_str(r#"[{ "name": "A" }]"#).unwrap_err(),
            ConfigError::MissingTable("A".into())
        );
        assert_eq!(
            load_from_str(r#"[{ "name": "A", "table": "a" }, { "name": "A", "table": "b" }]"#)
                .unwrap_err(),
            ConfigError::DuplicateModel("A".into())
        );
        assert_eq!(
            load_from_str(r#"[{ "name": "B", "table": "b", "extends": "Z" }]"#).unwrap_err(),
            ConfigError::UnknownModel("Z".into())
        );
        let cycle = load_from_str(
            r#"[{ "name": "A", "table": "a", "extends": "B" },
                { "name": "B", "table": "b", "extends": "A" }]"#,
        )
        .unwrap();
        assert!(matches!(build_registry(&cycle), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn missing_files_are_load_errors() {
        assert!(matches!(
            load_from_file("/nonexistent/models.json"),
            Err(ConfigError::Load(_))
        ));
    }
}
