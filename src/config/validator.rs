//! Config validation: unique names and resolvable parents.

use crate::config::ModelsConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &ModelsConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for m in &config.models {
        if !names.insert(m.name.as_str()) {
            return Err(ConfigError::DuplicateModel(m.name.clone()));
        }
        if m.table.is_none() {
            return Err(ConfigError::MissingTable(m.name.clone()));
        }
    }

    let mut tables = HashSet::new();
    for m in &config.models {
        if let Some(table) = m.table.as_deref() {
            if !tables.insert(table) {
                return Err(ConfigError::Validation(format!(
                    "table '{}' is used by more than one model",
                    table
                )));
            }
        }
        if let Some(parent) = m.extends.as_deref() {
            if !names.contains(parent) {
                return Err(ConfigError::UnknownModel(parent.to_string()));
            }
        }
        for target in m.transmodel.values() {
            if !names.contains(target.as_str()) {
                return Err(ConfigError::UnknownModel(target.clone()));
            }
        }
    }
    Ok(())
}

/// Definitions reordered so every parent precedes its subtypes. Fails on
/// inheritance cycles.
pub fn parents_first(config: &ModelsConfig) -> Result<Vec<usize>, ConfigError> {
    let mut placed: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(config.models.len());
    while order.len() < config.models.len() {
        let before = order.len();
        for (i, m) in config.models.iter().enumerate() {
            if placed.contains(m.name.as_str()) {
                continue;
            }
            let ready = m
                .extends
                .as_deref()
                .map(|p| placed.contains(p))
                .unwrap_or(true);
            if ready {
                placed.insert(m.name.as_str());
                order.push(i);
            }
        }
        if order.len() == before {
            let stuck: Vec<&str> = config
                .models
                .iter()
                .filter(|m| !placed.contains(m.name.as_str()))
                .map(|m| m.name.as_str())
                .collect();
            return Err(ConfigError::Validation(format!(
                "inheritance cycle among: {}",
                stuck.join(", ")
            )));
        }
    }
    Ok(order)
}
