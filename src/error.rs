use crate::access::Action;
use crate::model::{Role, SchoolStatus};

/// Errors raised by the library services.
#[derive(Debug, thiserror::Error)]
pub enum FreeBooksError {
    #[error("submission rejected: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("school {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: SchoolStatus,
        to: SchoolStatus,
    },

    #[error("insufficient stock: {requested} books requested, {remaining} remaining")]
    InsufficientStock { requested: u64, remaining: u64 },

    #[error("student {0} has already been issued books")]
    AlreadyIssued(String),

    #[error("role {role} may not access {action}")]
    Forbidden { role: Role, action: Action },

    #[error("not logged in")]
    NotAuthenticated,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("{0}")]
    InvalidInput(String),

    #[error("missing required CSV headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XLSX error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

pub type Result<T> = std::result::Result<T, FreeBooksError>;
