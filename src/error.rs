//! Error types for the codec, resolver, store, and registry

use thiserror::Error;

/// Result type for crate-level operations
pub type Result<T> = std::result::Result<T, Error>;

/// Malformed schema declarations. Raised only while a schema is built or
/// registered, never during encode/decode.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Duplicate field name: {0}")]
    DuplicateField(String),

    #[error("Required field '{0}' must not declare a default")]
    RequiredWithDefault(String),

    #[error("Optional field '{0}' must declare a default")]
    MissingDefault(String),

    #[error("Default for field '{field}' does not match declared type {expected}")]
    DefaultTypeMismatch { field: String, expected: String },

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Unsupported field type for '{field}': {found}")]
    UnsupportedType { field: String, found: String },

    #[error("Invalid schema format: {0}")]
    InvalidFormat(String),

    #[error("Schema immutability violation: cannot modify existing schema {name} {version}")]
    ImmutabilityViolation { name: String, version: String },

    #[error("Schema version not registered: {0}")]
    UnknownVersion(String),
}

/// Per-call encode failures. Never leave store or relay state modified.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Type mismatch for field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("Value for field '{field}' is too large to encode: {len} bytes")]
    TooLarge { field: String, len: usize },
}

/// Per-call decode and resolution failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Truncated data in field '{field}': needed {needed} bytes, {remaining} remaining")]
    Truncated {
        field: String,
        needed: usize,
        remaining: usize,
    },

    #[error("{remaining} trailing bytes after last field")]
    TrailingData { remaining: usize },

    #[error("Incompatible schema at field '{field}': {reason}")]
    IncompatibleSchema { field: String, reason: String },

    #[error("Invalid UTF-8 in field '{field}'")]
    InvalidUtf8 { field: String },

    #[error("Invalid boolean byte {byte:#04x} in field '{field}'")]
    InvalidBoolean { field: String, byte: u8 },

    #[error("Varint overflow in field '{field}'")]
    VarintOverflow { field: String },

    #[error("Value out of range for field '{field}'")]
    OutOfRange { field: String },
}

/// Record store failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Record not found: {id}")]
    NotFound { id: i64 },

    #[error("Writer schema version not registered: {version}")]
    UnknownVersion { version: String },

    #[error("No record id left after {last}")]
    IdExhausted { last: i64 },

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Top-level error for operations that cross module boundaries
#[derive(Error, Debug)]
pub enum Error {
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),
}
