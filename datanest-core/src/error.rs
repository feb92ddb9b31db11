/// Structured error types shared by every datanest backend.
///
/// Library crates return [`StoreError`]; binaries are free to wrap it in
/// `anyhow` for reporting.
use std::error::Error as StdError;

use thiserror::Error;

use crate::config::BackendKind;

/// Boxed cause carried by connection and operation failures
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type alias for datanest operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main error type for CRUD operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Input failed the compiled schema. Raised before any I/O.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No handle could be established for the backend
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The underlying store call failed after a handle existed
    #[error("{context}: {source}")]
    Operation {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Predicate, placeholder or identifier problems
    #[error("malformed query: {reason}")]
    MalformedQuery { reason: String },

    /// The schema declaration itself is invalid
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl StoreError {
    /// Wrap an underlying store failure with the operation it interrupted
    pub fn operation(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Operation {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Create a malformed query error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedQuery {
            reason: reason.into(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::MalformedQuery { .. })
    }
}

/// A record failed insert- or update-time validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("supplied document is not an object")]
    NotAnObject,

    #[error("supplied document is empty")]
    Empty,

    #[error("supplied batch is empty")]
    EmptyBatch,

    #[error("'{field}' is not allowed")]
    UnknownField { field: String },

    #[error("'{field}' is required")]
    Missing { field: String },

    #[error("'{field}' must be a {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("'{field}' {reason}")]
    InvalidFormat { field: String, reason: &'static str },

    #[error("'{field}' length must be at least {min}")]
    TooShort { field: String, min: f64 },

    #[error("'{field}' length must be at most {max}")]
    TooLong { field: String, max: f64 },

    #[error("'{field}' must be greater than or equal to {min}")]
    BelowMinimum { field: String, min: f64 },

    #[error("'{field}' must be less than or equal to {max}")]
    AboveMaximum { field: String, max: f64 },
}

impl ValidationError {
    /// Field the error refers to, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::NotAnObject | Self::Empty | Self::EmptyBatch => None,
            Self::UnknownField { field }
            | Self::Missing { field }
            | Self::WrongType { field, .. }
            | Self::InvalidFormat { field, .. }
            | Self::TooShort { field, .. }
            | Self::TooLong { field, .. }
            | Self::BelowMinimum { field, .. }
            | Self::AboveMaximum { field, .. } => Some(field),
        }
    }
}

/// Handle creation failed. The connection manager logs it and hands it back
/// as an explicit error instead of a null handle.
#[derive(Error, Debug)]
#[error("unable to connect to {backend} at {target}: {source}")]
pub struct ConnectionError {
    pub backend: BackendKind,
    /// Connection target with credentials masked
    pub target: String,
    #[source]
    pub source: BoxError,
}

impl ConnectionError {
    pub fn new(backend: BackendKind, target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            backend,
            target: target.into(),
            source: source.into(),
        }
    }
}

/// A field declaration cannot be compiled
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("unknown field type '{name}'")]
    UnknownType { name: String },

    #[error("'{name}' is not a valid identifier")]
    InvalidIdentifier { name: String },

    #[error("'{field}' is managed by the store and cannot be declared")]
    ReservedField { field: String },

    #[error("'{field}' accepts a regex but declares no pattern")]
    MissingPattern { field: String },

    #[error("'{field}' has an invalid pattern: {reason}")]
    InvalidPattern { field: String, reason: String },

    #[error("'{field}' declares min greater than max")]
    InvalidRange { field: String },

    #[error("'{field}' default value is invalid: {reason}")]
    InvalidDefault { field: String, reason: String },

    #[error("invalid schema declaration: {reason}")]
    InvalidDeclaration { reason: String },
}

/// Configuration could not be loaded
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown backend '{0}' (expected 'mongodb' or 'postgre')")]
    UnknownBackend(String),

    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}
