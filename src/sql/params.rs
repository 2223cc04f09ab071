//! Convert serde_json::Value to text parameters that sqlx can bind.

use crate::schema::FieldType;
use serde_json::Value;
use sqlx::encode::{Encode, IsNull};
use sqlx::postgres::{PgTypeInfo, Postgres};
use sqlx::Database;

/// A value bound as `TEXT`. Every placeholder carries an explicit cast
/// (`$n::bigint`, `$n::jsonb`, ...), so PostgreSQL parses the text into the
/// column's type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PgBindValue {
    Null,
    Text(String),
}

impl PgBindValue {
    pub fn from_json(v: &Value, ty: &FieldType) -> Self {
        match (v, ty) {
            (Value::Null, _) => PgBindValue::Null,
            (v, FieldType::Json | FieldType::Array(_)) => PgBindValue::Text(v.to_string()),
            (Value::String(s), _) => PgBindValue::Text(s.clone()),
            (Value::Bool(b), _) => PgBindValue::Text(b.to_string()),
            (Value::Number(n), _) => PgBindValue::Text(n.to_string()),
            (other, _) => PgBindValue::Text(other.to_string()),
        }
    }
}

impl<'q> Encode<'q, Postgres> for PgBindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        match self {
            PgBindValue::Null => Ok(IsNull::Yes),
            PgBindValue::Text(s) => <&str as Encode<Postgres>>::encode_by_ref(&s.as_str(), buf),
        }
    }
}

impl sqlx::Type<Postgres> for PgBindValue {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("TEXT")
    }
}
