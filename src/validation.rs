use crate::error::ApiError;

/// Longest free-text column value accepted from clients.
pub const MAX_TEXT_LEN: usize = 10_000;

/// Workflow states a subcontrol can be in.
pub const SUBCONTROL_STATUSES: &[&str] = &["Waiting", "In progress", "Done"];

pub fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<(), ApiError> {
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between {min} and {max} characters (got {len})"
        )));
    }
    Ok(())
}

/// Vendor review and risk labels are free text chosen by the reviewer.
pub fn check_label(field: &str, value: &str) -> Result<(), ApiError> {
    check_length(field, value, 0, 255)
}

pub fn check_status(value: &str) -> Result<(), ApiError> {
    if SUBCONTROL_STATUSES.contains(&value) {
        return Ok(());
    }
    Err(ApiError::BadRequest(format!(
        "status must be one of: {}",
        SUBCONTROL_STATUSES.join(", ")
    )))
}

pub fn check_title(value: &str) -> Result<(), ApiError> {
    check_length("title", value.trim(), 1, 255)
}

pub fn check_url(value: &str) -> Result<(), ApiError> {
    check_length("website", value, 1, 2048)?;
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ApiError::BadRequest(
            "website must use http or https scheme".into(),
        ));
    }
    Ok(())
}

/// Ids in paths are serial keys and therefore positive.
pub fn check_id(field: &str, id: i32) -> Result<(), ApiError> {
    if id <= 0 {
        return Err(ApiError::BadRequest(format!("{field} must be positive")));
    }
    Ok(())
}
