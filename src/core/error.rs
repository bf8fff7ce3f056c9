use std::fmt;
use crate::core::types::BulkOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    NotFound,
    Conflict,
    MalformedResponse,
    InvalidFilter,
    InvalidSchema,
    PartialBatchFailure,
    InvalidArgument,
    Serialization,
    Internal,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
    /// HTTP-style status reported by the store, when there was one
    pub status: Option<u16>,
    /// Failed entries of a bulk write (only set for PartialBatchFailure)
    pub failures: Vec<BulkOutcome>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error {
            kind,
            context,
            status: None,
            failures: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn conflict(context: String) -> Self {
        Error::new(ErrorKind::Conflict, context).with_status(409)
    }

    pub fn not_found(context: String) -> Self {
        Error::new(ErrorKind::NotFound, context).with_status(404)
    }

    pub fn invalid_filter(context: String) -> Self {
        Error::new(ErrorKind::InvalidFilter, context)
    }

    pub fn invalid_schema(context: String) -> Self {
        Error::new(ErrorKind::InvalidSchema, context)
    }

    pub fn malformed(context: String) -> Self {
        Error::new(ErrorKind::MalformedResponse, context)
    }

    /// Aggregate fault for a bulk write where some entries failed
    pub fn partial_batch(failures: Vec<BulkOutcome>, total: usize) -> Self {
        let ids: Vec<&str> = failures
            .iter()
            .map(|f| f.id.as_deref().unwrap_or("<unknown>"))
            .collect();
        Error {
            kind: ErrorKind::PartialBatchFailure,
            context: format!(
                "Unable to update {} of {} document(s): {}",
                failures.len(),
                total,
                ids.join(", ")
            ),
            status: None,
            failures,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{:?} ({}): {}", self.kind, status, self.context),
            None => write!(f, "{:?}: {}", self.kind, self.context),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::Serialization, err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::new(ErrorKind::InvalidFilter, format!("Regex error: {}", err))
    }
}

impl From<chrono::ParseError> for Error {
    fn from(err: chrono::ParseError) -> Self {
        Error::new(ErrorKind::MalformedResponse, format!("Date error: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
