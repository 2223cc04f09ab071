//! Driver settings read from the environment: table schema, view prefix,
//! inheritance layout.

use crate::error::ConfigError;
use crate::schema::check_identifier;

/// How subtype tables get their parent's columns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TableLayout {
    /// PostgreSQL `INHERITS`: parent reads see subtype rows natively.
    #[default]
    Inherit,
    /// Copy every inherited column into the subtype table; parent views
    /// union their descendants' tables.
    Duplicate,
}

impl std::str::FromStr for TableLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inherit" | "inherits" => Ok(TableLayout::Inherit),
            "duplicate" | "copy" => Ok(TableLayout::Duplicate),
            other => Err(ConfigError::Validation(format!(
                "unknown table layout '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// PostgreSQL schema holding model tables and views.
    pub schema: String,
    /// Read views are named `<view_prefix><table>`.
    pub view_prefix: String,
    pub layout: TableLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            schema: "public".into(),
            view_prefix: "v_".into(),
            layout: TableLayout::Inherit,
        }
    }
}

impl Settings {
    /// From `MODEL_ORM_SCHEMA`, `MODEL_ORM_VIEW_PREFIX` and
    /// `MODEL_ORM_TABLE_LAYOUT`, each falling back to the default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Settings::default();
        let settings = Settings {
            schema: std::env::var("MODEL_ORM_SCHEMA").unwrap_or(defaults.schema),
            view_prefix: std::env::var("MODEL_ORM_VIEW_PREFIX").unwrap_or(defaults.view_prefix),
            layout: match std::env::var("MODEL_ORM_TABLE_LAYOUT") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.layout,
            },
        };
        settings.check()?;
        Ok(settings)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        check_identifier(&self.schema)?;
        check_identifier(&self.view_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_parse() {
        assert_eq!("inherit".parse::<TableLayout>().unwrap(), TableLayout::Inherit);
        assert_eq!("Duplicate".parse::<TableLayout>().unwrap(), TableLayout::Duplicate);
        assert!("sharded".parse::<TableLayout>().is_err());
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let settings = Settings {
            schema: "public; drop schema x".into(),
            ..Settings::default()
        };
        assert!(settings.check().is_err());
        assert!(Settings::default().check().is_ok());
    }
}
