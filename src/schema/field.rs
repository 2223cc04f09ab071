//! Field type tags, reserved column names and reference-field naming.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::OnceLock;

/// Identifier column, present on every model and never part of its field map.
pub const ID_FIELD: &str = "id";
/// Discriminator column naming the concrete model of a row.
pub const TYPE_FIELD: &str = "_type";

/// Primitive type of a stored field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum FieldType {
    Text,
    Integer,
    Float,
    Boolean,
    Timestamp,
    Uuid,
    Json,
    /// Array of a scalar type. Nested arrays are rejected at parse time.
    Array(Box<FieldType>),
}

impl FieldType {
    pub fn array_of(inner: FieldType) -> Self {
        FieldType::Array(Box::new(inner))
    }

    /// PostgreSQL type name used for DDL and parameter casts.
    pub fn pg_type(&self) -> String {
        match self {
            FieldType::Text => "text".into(),
            FieldType::Integer => "bigint".into(),
            FieldType::Float => "double precision".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Timestamp => "timestamptz".into(),
            FieldType::Uuid => "uuid".into(),
            FieldType::Json => "jsonb".into(),
            FieldType::Array(inner) => format!("{}[]", inner.pg_type()),
        }
    }

    /// Typed placeholder for parameter `n`. Every bind value travels as text,
    /// so the cast is what gives the column its type. Arrays travel as a JSON
    /// document and are unpacked server-side.
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            FieldType::Array(inner) => format!(
                "ARRAY(SELECT jsonb_array_elements_text(${}::jsonb))::{}[]",
                n,
                inner.pg_type()
            ),
            other => format!("${}::{}", n, other.pg_type()),
        }
    }

    fn tag(&self) -> String {
        match self {
            FieldType::Text => "text".into(),
            FieldType::Integer => "integer".into(),
            FieldType::Float => "float".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Timestamp => "timestamp".into(),
            FieldType::Uuid => "uuid".into(),
            FieldType::Json => "json".into(),
            FieldType::Array(inner) => format!("{}[]", inner.tag()),
        }
    }
}

impl FromStr for FieldType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_ascii_lowercase();
        if let Some(inner) = tag.strip_suffix("[]") {
            let inner: FieldType = inner.parse()?;
            if matches!(inner, FieldType::Array(_) | FieldType::Json) {
                return Err(ConfigError::Validation(format!(
                    "unsupported array element type in '{}'",
                    s
                )));
            }
            return Ok(FieldType::array_of(inner));
        }
        Ok(match tag.as_str() {
            "text" | "string" => FieldType::Text,
            "integer" | "int" => FieldType::Integer,
            "float" | "number" => FieldType::Float,
            "boolean" | "bool" => FieldType::Boolean,
            "timestamp" | "datetime" => FieldType::Timestamp,
            "uuid" => FieldType::Uuid,
            "json" => FieldType::Json,
            _ => {
                return Err(ConfigError::Validation(format!(
                    "unknown field type '{}'",
                    s
                )))
            }
        })
    }
}

impl TryFrom<String> for FieldType {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldType> for String {
    fn from(t: FieldType) -> Self {
        t.tag()
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.tag())
    }
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"))
}

fn ref_field_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^_([a-z0-9][a-z0-9_]*)_ref$").expect("static regex"))
}

/// Table, column and model names end up inside SQL text, so only plain
/// identifiers are accepted.
pub fn check_identifier(name: &str) -> Result<(), ConfigError> {
    if identifier_re().is_match(name) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}

/// Loose shape test: `_<anything>_ref`.
pub fn is_ref_field(name: &str) -> bool {
    name.len() > "__ref".len() && name.starts_with('_') && name.ends_with("_ref")
}

/// Strict form accepted in schemas: lower-case name between `_` and `_ref`.
pub fn is_valid_ref_field(name: &str) -> bool {
    ref_field_re().is_match(name)
}

/// `_car_ref` -> `car`.
pub fn ref_to_alias(field: &str) -> Option<String> {
    if !is_ref_field(field) {
        return None;
    }
    Some(field[1..field.len() - "_ref".len()].to_lowercase())
}

/// `Car` / `car` -> `_car_ref`.
pub fn alias_to_ref(alias: &str) -> String {
    format!("_{}_ref", alias.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_naming_round_trips() {
        for field in ["_car_ref", "_owner_ref", "_x_ref", "_tire_set_ref", "_a1_ref"] {
            assert!(is_valid_ref_field(field), "{}", field);
            let alias = ref_to_alias(field).unwrap();
            assert_eq!(alias_to_ref(&alias), field);
        }
    }

    #[test]
    fn alias_is_lower_cased() {
        assert_eq!(ref_to_alias("_Car_ref").as_deref(), Some("car"));
        assert_eq!(alias_to_ref("Car"), "_car_ref");
        assert!(!is_valid_ref_field("_Car_ref"));
    }

    #[test]
    fn non_references_have_no_alias() {
        assert_eq!(ref_to_alias("title"), None);
        assert_eq!(ref_to_alias("__ref"), None);
        assert_eq!(ref_to_alias("_ref"), None);
        assert!(!is_ref_field("car_ref"));
    }

    #[test]
    fn type_tags_parse() {
        assert_eq!("text".parse::<FieldType>().unwrap(), FieldType::Text);
        assert_eq!(
            "integer[]".parse::<FieldType>().unwrap(),
            FieldType::array_of(FieldType::Integer)
        );
        assert!("text[][]".parse::<FieldType>().is_err());
        assert!("blob".parse::<FieldType>().is_err());
        let t: FieldType = serde_json::from_str("\"timestamp\"").unwrap();
        assert_eq!(t, FieldType::Timestamp);
        assert_eq!(serde_json::to_string(&FieldType::array_of(FieldType::Text)).unwrap(), "\"text[]\"");
    }

    #[test]
    fn placeholders_carry_casts() {
        assert_eq!(FieldType::Integer.placeholder(2), "$2::bigint");
        assert_eq!(
            FieldType::array_of(FieldType::Uuid).placeholder(1),
            "ARRAY(SELECT jsonb_array_elements_text($1::jsonb))::uuid[]"
        );
    }

    #[test]
    fn identifiers_are_checked() {
        assert!(check_identifier("cars").is_ok());
        assert!(check_identifier("_type").is_ok());
        assert!(check_identifier("cars; drop table x").is_err());
        assert!(check_identifier("1cars").is_err());
        assert!(check_identifier("").is_err());
    }
}
