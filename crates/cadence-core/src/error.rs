use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Transaction failed: {0}")]
    TransactionFailure(#[source] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Ambiguous short ID. Did you mean one of these?")]
    AmbiguousId(Vec<(String, String)>), // Vec of (ID, Title)
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                CoreError::Conflict(db_err.message().to_string())
            }
            _ => CoreError::TransactionFailure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_transaction_failure() {
        let err: CoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, CoreError::TransactionFailure(sqlx::Error::RowNotFound)));
    }

    #[test]
    fn messages_carry_context() {
        let err = CoreError::InvalidRule("FREQ is required".to_string());
        assert_eq!(err.to_string(), "Invalid recurrence rule: FREQ is required");
    }
}
