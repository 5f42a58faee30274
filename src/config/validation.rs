//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, header names and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::HeaderName;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("audit.{list} contains invalid header name {name:?}")]
    HeaderName { list: &'static str, name: String },

    #[error("audit.body_content_types contains an empty entry")]
    EmptyContentType,

    #[error("audit.quiet_down_period_secs must be > 0 when quiet_down_routes is set")]
    QuietDownPeriod,

    #[error("audit.quiet_down_routes entry {0:?} must start with '/'")]
    QuietDownRoute(String),

    #[error("audit.panic_stack_depth must be > 0")]
    StackDepth,
}

pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let audit = &config.audit;
    for (list, names) in [
        ("request_headers", &audit.request_headers),
        ("response_headers", &audit.response_headers),
    ] {
        for name in names {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::HeaderName {
                    list,
                    name: name.clone(),
                });
            }
        }
    }

    if audit.body_content_types.iter().any(|t| t.trim().is_empty()) {
        errors.push(ValidationError::EmptyContentType);
    }

    if !audit.quiet_down_routes.is_empty() && audit.quiet_down_period_secs == 0 {
        errors.push(ValidationError::QuietDownPeriod);
    }
    for route in &audit.quiet_down_routes {
        if !route.starts_with('/') {
            errors.push(ValidationError::QuietDownRoute(route.clone()));
        }
    }

    if audit.panic_stack_depth == 0 {
        errors.push(ValidationError::StackDepth);
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
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&AppConfig::default()), Ok(()));
    }

    #[test]
    fn test_all_errors_are_reported() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "localhost".into();
        config.audit.request_headers = vec!["Origin".into(), "bad header".into()];
        config.audit.body_content_types.push(" ".into());
        config.audit.quiet_down_routes = vec!["noisy".into()];
        config.audit.quiet_down_period_secs = 0;
        config.audit.panic_stack_depth = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::BindAddress("localhost".into()),
                ValidationError::HeaderName {
                    list: "request_headers",
                    name: "bad header".into()
                },
                ValidationError::EmptyContentType,
                ValidationError::QuietDownPeriod,
                ValidationError::QuietDownRoute("noisy".into()),
                ValidationError::StackDepth,
            ]
        );
    }
}
