//! Input validation utilities.
//!
//! Centralized validation helpers used across API routes.

use validator::Validate;

use crate::error::IdentError;

/// Validate a request body, returning an IdentError::Validation on failure.
pub fn validate_request<T: Validate>(body: &T) -> Result<(), IdentError> {
    body.validate().map_err(|e| IdentError::Validation {
        message: format_validation_errors(e),
    })
}

/// Format validation errors into a human-readable string.
fn format_validation_errors(errors: validator::ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value for '{field}'"))
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

/// A 3PID medium is a short lowercase-insensitive ASCII token (`email`, `msisdn`).
pub fn validate_medium(medium: &str) -> Result<(), IdentError> {
    let valid = !medium.is_empty()
        && medium.len() <= 32
        && medium.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_');
    if !valid {
        return Err(IdentError::Validation { message: format!("Invalid medium '{medium}'") });
    }
    Ok(())
}
