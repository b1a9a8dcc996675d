use crate::error::{AppError, AppResult};
use bcrypt::{hash, verify};

/// Password policy for local accounts.
pub fn validate_password(password: &str) -> AppResult<()> {
    let length = password.chars().count();
    if !(8..=128).contains(&length) {
        return Err(AppError::ValidationError(
            "Password must be between 8 and 128 characters".to_string(),
        ));
    }

    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_lowercase || !has_uppercase || !has_digit {
        return Err(AppError::ValidationError(
            "Password must contain upper and lower case letters and a digit".to_string(),
        ));
    }

    Ok(())
}

pub fn hash_password(password: &str, cost: u32) -> AppResult<String> {
    hash(password, cost).map_err(|e| AppError::InternalError(format!("Password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    verify(password, hash)
        .map_err(|e| AppError::InternalError(format!("Password verification failed: {e}")))
}
