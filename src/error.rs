use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Auth error: {0}")]
    AuthError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Payment gateway error: {0}")]
    PaymentError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl AppError {
    /// Stable machine-readable code for outer layers.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::PermissionDenied => "FORBIDDEN",
            AppError::PaymentError(_) => "PAYMENT_ERROR",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ConfigError(_) => "CONFIG_ERROR",
            AppError::InternalError(_) | AppError::SerdeJsonError(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::ValidationError(_) => 400,
            AppError::AuthError(_) => 401,
            AppError::PermissionDenied => 403,
            AppError::NotFound(_) => 404,
            AppError::Conflict(_) => 409,
            AppError::PaymentError(_) => 502,
            _ => 500,
        }
    }

    /// Message safe to hand to a client; internal failures are masked.
    pub fn public_message(&self) -> String {
        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::PaymentError(msg) => msg.clone(),
            AppError::PermissionDenied => "Permission denied".to_string(),
            AppError::DatabaseError(err) => {
                log::error!("Database error: {err}");
                "Database error".to_string()
            }
            _ => {
                log::error!("Internal error: {self}");
                "Internal server error".to_string()
            }
        }
    }
}
