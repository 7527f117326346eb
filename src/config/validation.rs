//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Reject cookie names a browser would not round-trip
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TrellisConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::TrellisConfig;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Characters not allowed in a cookie name.
const COOKIE_SEPARATORS: &[char] = &[
    '(', ')', '<', '>', '@', ',', ';', ':', '\\', '"', '/', '[', ']', '?', '=', '{', '}', ' ', '\t',
];

/// Upper bound for `sessions.lifetime_secs`: ten years.
pub const MAX_SESSION_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

pub fn validate_config(config: &TrellisConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if config.http.max_body_size == 0 {
        errors.push(ValidationError::new("http.max_body_size", "must be greater than 0"));
    }
    if config.http.request_timeout_secs == 0 {
        errors.push(ValidationError::new("http.request_timeout_secs", "must be greater than 0"));
    }

    let cookie_name = &config.sessions.cookie_name;
    if cookie_name.is_empty() {
        errors.push(ValidationError::new("sessions.cookie_name", "must not be empty"));
    } else if cookie_name
        .chars()
        .any(|c| c.is_control() || !c.is_ascii() || COOKIE_SEPARATORS.contains(&c))
    {
        errors.push(ValidationError::new(
            "sessions.cookie_name",
            format!("`{cookie_name}` contains characters not allowed in a cookie name"),
        ));
    }
    if config.sessions.lifetime_secs > MAX_SESSION_LIFETIME_SECS {
        errors.push(ValidationError::new(
            "sessions.lifetime_secs",
            format!("must be at most {MAX_SESSION_LIFETIME_SECS} (use 0 for no expiry)"),
        ));
    }
    if !config.sessions.cookie_path.starts_with('/') {
        errors.push(ValidationError::new("sessions.cookie_path", "must start with `/`"));
    }

    if config.websocket.max_message_size == 0 {
        errors.push(ValidationError::new("websocket.max_message_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&TrellisConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = TrellisConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.http.max_body_size = 0;
        config.sessions.cookie_name = "bad;name".into();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "also nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            [
                "listener.bind_address",
                "http.max_body_size",
                "sessions.cookie_name",
                "observability.metrics_address",
            ]
        );
    }

    #[test]
    fn test_empty_cookie_name() {
        let mut config = TrellisConfig::default();
        config.sessions.cookie_name.clear();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].to_string(), "sessions.cookie_name: must not be empty");
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = TrellisConfig::default();
        config.observability.metrics_address = "not checked".into();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_session_lifetime_upper_bound() {
        let mut config = TrellisConfig::default();
        config.sessions.lifetime_secs = MAX_SESSION_LIFETIME_SECS;
        assert!(validate_config(&config).is_ok());

        config.sessions.lifetime_secs = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "sessions.lifetime_secs");
    }
}
