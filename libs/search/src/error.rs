//! Error types for the search compiler

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown item type: {0}")]
    UnknownItemType(String),

    #[error("Catalog error for '{itemtype}': {message}")]
    Catalog { itemtype: String, message: String },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Hierarchy error on {table}.{field}: {message}")]
    Hierarchy {
        table: String,
        field: String,
        message: String,
    },

    #[error("Query execution failed")]
    Execution(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Message safe to show to an untrusted caller.
    ///
    /// Execution errors keep the underlying SQL and driver detail out of the
    /// user-visible string; the full chain is logged where the error is raised.
    pub fn user_message(&self) -> String {
        match self {
            Error::Execution(_) => "The search could not be executed".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_hides_driver_detail() {
        let err = Error::Execution(sqlx::Error::PoolTimedOut);
        assert_eq!(err.user_message(), "The search could not be executed");
    }

    #[test]
    fn catalog_error_is_user_visible() {
        let err = Error::UnknownItemType("Frobnicator".to_string());
        assert!(err.user_message().contains("Frobnicator"));
    }
}
