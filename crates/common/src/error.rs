use thiserror::Error;

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Price feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: f64, available: f64 },

    #[error("Borrow capacity exceeded: requested ${requested_usd:.2}, available ${available_usd:.2}")]
    BorrowCapacityExceeded {
        requested_usd: f64,
        available_usd: f64,
    },

    #[error("Health factor too low: {health_factor:.4} is below {minimum}")]
    HealthFactorTooLow { health_factor: f64, minimum: f64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error is a rejected user action rather than a system fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::InsufficientBalance { .. }
                | AppError::BorrowCapacityExceeded { .. }
                | AppError::HealthFactorTooLow { .. }
        )
    }
}
