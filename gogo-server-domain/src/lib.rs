use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

pub mod channel;
pub mod classify;
pub mod player;
pub mod store;

#[cfg(test)]
mod mock;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("invalid player fields: {}", invalid_fields(.0).join(", "))]
    Validation(ValidationErrors),

    #[error("email already exists")]
    EmailExists { player_id: String },

    #[error("username already exists")]
    UsernameExists { player_id: String },

    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("update of player {player_id} affected {rows} rows")]
    Consistency { player_id: String, rows: u64 },

    #[error("persistence error in {operation} ({correlation})")]
    Persistence {
        operation: &'static str,
        correlation: String,
        detail: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    EmailExists,
    UsernameExists,
    NotFound,
    Consistency,
    Persistence,
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::EmailExists { .. } => ErrorKind::EmailExists,
            StoreError::UsernameExists { .. } => ErrorKind::UsernameExists,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Consistency { .. } => ErrorKind::Consistency,
            StoreError::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Raw backing-store text, for logs and operators only.
    pub fn detail(&self) -> Option<&str> {
        match self {
            StoreError::Persistence { detail, .. } => Some(detail),
            _ => None,
        }
    }

    /// Whether the caller is expected to recover from this error by itself.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            StoreError::Consistency { .. } | StoreError::Persistence { .. }
        )
    }

    pub fn not_found<T, R>(what: T) -> StoreResult<R>
    where
        T: Into<String>,
    {
        Err(StoreError::NotFound { what: what.into() })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Names of the fields that failed validation, sorted. Never the values.
pub fn invalid_fields(errors: &ValidationErrors) -> Vec<String> {
    let mut fields: Vec<String> = errors
        .field_errors()
        .keys()
        .map(|k| k.to_string())
        .collect();
    fields.sort();
    fields
}

#[derive(Debug, Clone, Serialize)]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

/// The `{ data, error }` result shape handed to callers. Exactly one side is set.
#[derive(Debug, Clone, Serialize)]
pub struct StoreEnvelope<T> {
    pub data: Option<T>,
    pub error: Option<EnvelopeError>,
}

impl<T> From<StoreResult<T>> for StoreEnvelope<T> {
    fn from(result: StoreResult<T>) -> Self {
        match result {
            Ok(data) => StoreEnvelope {
                data: Some(data),
                error: None,
            },
            Err(e) => {
                let fields = match &e {
                    StoreError::Validation(errors) => Some(invalid_fields(errors)),
                    _ => None,
                };
                StoreEnvelope {
                    data: None,
                    error: Some(EnvelopeError {
                        kind: e.kind(),
                        message: e.to_string(),
                        fields,
                    }),
                }
            }
        }
    }
}
