//! Input validation for the ventures API.
//!
//! Validators collect every problem instead of stopping at the first, so a
//! client sees all of them in the `details` array of one 400 response.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{CreateVentureRequest, UpdateVentureRequest};

// =============================================================================
// Validation Constants
// =============================================================================

/// Maximum length for venture names, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

/// Maximum length for venture descriptions, in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Validate a venture name.
///
/// Rules:
/// - Must not be blank after trimming
/// - Must not exceed 100 characters
/// - Must not contain control characters
fn check_name(name: &str, details: &mut Vec<String>) {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        details.push("name cannot be empty".to_string());
        return;
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        details.push(format!("name cannot exceed {MAX_NAME_LENGTH} characters"));
    }

    if let Some(pos) = trimmed.chars().position(char::is_control) {
        details.push(format!(
            "name contains invalid control character at position {pos}"
        ));
    }
}

fn check_description(description: &str, details: &mut Vec<String>) {
    if description.chars().count() > MAX_DESCRIPTION_LENGTH {
        details.push(format!(
            "description cannot exceed {MAX_DESCRIPTION_LENGTH} characters"
        ));
    }
}

fn finish(details: Vec<String>) -> AppResult<()> {
    if details.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation {
            message: "Validation failed".to_string(),
            details,
        })
    }
}

/// Validate a create request.
pub fn validate_create(request: &CreateVentureRequest) -> AppResult<()> {
    let mut details = Vec::new();
    check_name(&request.name, &mut details);
    check_description(&request.description, &mut details);
    finish(details)
}

/// Validate an update request. At least one field must be present.
pub fn validate_update(request: &UpdateVentureRequest) -> AppResult<()> {
    let mut details = Vec::new();

    if request.is_empty() {
        details.push("at least one of name, description, stage is required".to_string());
    }
    if let Some(name) = &request.name {
        check_name(name, &mut details);
    }
    if let Some(description) = &request.description {
        check_description(description, &mut details);
    }

    finish(details)
}

/// Parse a venture id path segment.
pub fn parse_venture_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("Invalid venture id: {raw}")))
}

/// Map a JSON body rejection to an error.
///
/// Bodies that arrive but do not parse are validation failures, with the
/// rejection text as the detail. Everything else (oversized bodies, a missing
/// `Content-Type`) keeps the status the extractor chose.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonSyntaxError(_) | JsonRejection::JsonDataError(_) => {
                AppError::Validation {
                    message: "Invalid request body".to_string(),
                    details: vec![rejection.body_text()],
                }
            }
            other => match other.status() {
                StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge(other.body_text()),
                StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                    AppError::UnsupportedMediaType(other.body_text())
                }
                _ => AppError::BadRequest(other.body_text()),
            },
        }
    }
}
