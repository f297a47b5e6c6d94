use std::panic::Location;
use std::time::Duration;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Document-store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not connected to document store")]
    NotConnected,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("no document found in {collection}")]
    NotFound { collection: String },

    #[error("decode error{field_note}: {message}", field_note = field_note(.field))]
    Decode {
        field: Option<String>,
        message: String,
    },

    #[error("only {inserted} of {expected} documents inserted")]
    InsertCountMismatch { expected: u64, inserted: u64 },

    #[error("update at index {index} matched no documents")]
    UpdateNotMatched { index: usize },

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("backend error: {0}")]
    Backend(String),

    /// Call-site annotation wrapped around another error.
    #[error("[{operation} {location}] {source}")]
    Context {
        operation: &'static str,
        location: &'static Location<'static>,
        #[source]
        source: Box<StoreError>,
    },
}

fn field_note(field: &Option<String>) -> String {
    match field {
        Some(field) => format!(" at field `{field}`"),
        None => String::new(),
    }
}

impl StoreError {
    /// Decode failure attributed to a specific field.
    pub fn decode_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Decode failure without a known field.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            field: None,
            message: message.into(),
        }
    }

    /// Wrap with the operation name and the caller's source location.
    #[track_caller]
    pub fn context(self, operation: &'static str) -> Self {
        Self::Context {
            operation,
            location: Location::caller(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any annotations.
    pub fn root(&self) -> &StoreError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Operation names from the annotation chain, outermost first.
    pub fn operations(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        let mut current = self;
        while let Self::Context {
            operation, source, ..
        } = current
        {
            names.push(*operation);
            current = source;
        }
        names
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }

    pub fn is_decode(&self) -> bool {
        matches!(self.root(), Self::Decode { .. })
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self.root(), Self::NotConnected)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Self::Timeout { .. })
    }
}

/// Annotates errors in a `StoreResult` with call-site context.
pub trait ResultExt<T> {
    fn context(self, operation: &'static str) -> StoreResult<T>;
}

impl<T> ResultExt<T> for StoreResult<T> {
    #[track_caller]
    fn context(self, operation: &'static str) -> StoreResult<T> {
        match self {
            Ok(value) => Ok(value),
            Err(err) => Err(err.context(operation)),
        }
    }
}
