//! Input validators for request payloads.
//!
//! Length limits keep oversized input away from the password hasher and the
//! store; format checks keep obviously broken addresses out of the user table.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MAX_NAME_LENGTH: usize = 256;
const MAX_PASSWORD_LENGTH: usize = 1024;

lazy_static! {
    // RFC 5322 simplified email regex (practical validation)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    EmptyField(&'static str),
    #[error("{0} is too long (maximum {1} characters)")]
    TooLong(&'static str, usize),
    #[error("{0} has invalid format")]
    InvalidFormat(&'static str),
    #[error("{0} contains invalid characters")]
    SuspiciousContent(&'static str),
}

/// Trim `value` and reject it when nothing is left.
pub fn require<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    Ok(trimmed)
}

/// Validates an email address for account creation
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = require("email", email)?;

    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong("email", MAX_EMAIL_LENGTH));
    }

    if !EMAIL_REGEX.is_match(trimmed) || trimmed.matches('@').count() != 1 {
        return Err(ValidationError::InvalidFormat("email"));
    }

    // The local part is capped at 64 octets by RFC 5321
    if let Some(at_pos) = trimmed.find('@') {
        if at_pos > 64 {
            return Err(ValidationError::InvalidFormat("email"));
        }
    }

    Ok(trimmed.to_string())
}

/// Validates a display name
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = require("name", name)?;

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong("name", MAX_NAME_LENGTH));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::SuspiciousContent("name"));
    }

    Ok(trimmed.to_string())
}

/// Validates a password before it reaches the hasher
pub fn is_valid_password(password: &str) -> Result<String, ValidationError> {
    let trimmed = require("password", password)?;

    if trimmed.len() > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong("password", MAX_PASSWORD_LENGTH));
    }

    Ok(trimmed.to_string())
}
