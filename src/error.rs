//! Typed errors: configuration mistakes, bad input, wrapped store failures.

use thiserror::Error;

/// Programming or registration mistakes. Never wrapped, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("model '{0}' has no schema")]
    MissingSchema(String),
    #[error("model '{0}' has no table name")]
    MissingTable(String),
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("model '{0}' is defined twice")]
    DuplicateModel(String),
    #[error("model '{model}': unknown selector '{selector}'")]
    UnknownSelector { model: String, selector: String },
    #[error("model '{model}': unknown field '{field}'")]
    UnknownField { model: String, field: String },
    #[error("model '{model}': field '{field}' is reserved")]
    ReservedField { model: String, field: String },
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("model '{0}' declares no external id field")]
    MissingXid(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum OrmError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A backing-store or transport failure, tagged with what was being attempted.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl OrmError {
    pub fn store(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        OrmError::Store {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, OrmError::Config(_))
    }
}

pub type Result<T, E = OrmError> = std::result::Result<T, E>;

/// Attach the operation's intent to a low-level store error.
pub(crate) trait StoreContext<T> {
    fn store_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> StoreContext<T> for std::result::Result<T, E>
where
    E: Into<BoxError>,
{
    fn store_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| OrmError::store(f(), e))
    }
}
