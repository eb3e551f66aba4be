use crate::error::ApiError;

pub mod boards;
pub mod columns;
pub mod health;
pub mod tasks;

/// Trimmed value of a required text field; blank counts as missing.
pub(crate) fn require_text(field: &str, value: Option<&str>) -> Result<String, ApiError> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ApiError::BadRequest(format!("{field} is required"))),
    }
}

pub(crate) fn require_position(position: Option<i32>) -> Result<i32, ApiError> {
    match position {
        Some(position) if position >= 0 => Ok(position),
        Some(_) => Err(ApiError::BadRequest(
            "position must be a non-negative integer".to_string(),
        )),
        None => Err(ApiError::BadRequest("position is required".to_string())),
    }
}

/// Optional positions on create may be omitted but never negative.
pub(crate) fn check_optional_position(position: Option<i32>) -> Result<(), ApiError> {
    match position {
        Some(position) if position < 0 => Err(ApiError::BadRequest(
            "position must be a non-negative integer".to_string(),
        )),
        _ => Ok(()),
    }
}
