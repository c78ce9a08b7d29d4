//! # Error Handling and Validation
//!
//! Standardized patterns for turning an internal failure (`anyhow::Error`,
//! a validation predicate, a retryable operation) into a [`GatewayError`]
//! with consistent logging attached at the point of conversion rather than
//! scattered through call sites.
//!
//! ```rust
//! use synaxis_gateway::error_handling::{ErrorHandler, ErrorType};
//!
//! let result = ErrorHandler::handle_sync_operation(
//!     || -> anyhow::Result<String> { Ok("success".to_string()) },
//!     "database operation",
//!     ErrorType::Internal,
//! );
//! ```

use crate::gateway_error::GatewayError;
use anyhow::Result;
use std::fmt;
use tracing::{error, info, warn};

/// Error categories that map onto a [`GatewayError`] variant, used by
/// [`ErrorHandler::log_and_convert`] to pick both the log level and the
/// resulting error shape.
#[derive(Debug, Clone, Copy)]
pub enum ErrorType {
    Config,
    Auth,
    RateLimit,
    InvalidRequest,
    Internal,
}

/// Standardized error handling patterns for the gateway.
pub struct ErrorHandler;

impl ErrorHandler {
    /// Convert an anyhow error to a `GatewayError::Internal`, logging the
    /// failure with the given context prefix.
    pub fn anyhow_to_gateway<T>(result: Result<T>, context: &str) -> Result<T, GatewayError> {
        result.map_err(|e| {
            let message = format!("{context}: {e}");
            error!("{}", message);
            GatewayError::Internal { message }
        })
    }

    pub fn config_error(message: &str) -> GatewayError {
        warn!("Configuration error: {}", message);
        GatewayError::Validation {
            message: message.to_string(),
        }
    }

    pub fn auth_error(message: &str) -> GatewayError {
        warn!("Authentication error: {}", message);
        GatewayError::Auth {
            message: message.to_string(),
        }
    }

    pub fn rate_limit_error(message: &str) -> GatewayError {
        info!("Rate limit exceeded: {}", message);
        GatewayError::RateLimit {
            message: message.to_string(),
        }
    }

    pub fn internal_error(message: &str) -> GatewayError {
        error!("Internal error: {}", message);
        GatewayError::Internal {
            message: message.to_string(),
        }
    }

    pub fn invalid_request(message: &str) -> GatewayError {
        warn!("Invalid request: {}", message);
        GatewayError::Validation {
            message: message.to_string(),
        }
    }

    /// Log `error` at a level chosen by `error_type` and convert it to the
    /// matching `GatewayError` variant.
    pub fn log_and_convert<E: fmt::Display + fmt::Debug>(
        error: E,
        context: &str,
        error_type: ErrorType,
    ) -> GatewayError {
        let message = format!("{context}: {error}");

        match error_type {
            ErrorType::Config => {
                warn!("Configuration error: {}", message);
                GatewayError::Validation { message }
            }
            ErrorType::Auth => {
                warn!("Authentication error: {}", message);
                GatewayError::Auth { message }
            }
            ErrorType::RateLimit => {
                info!("Rate limit error: {}", message);
                GatewayError::RateLimit { message }
            }
            ErrorType::InvalidRequest => {
                warn!("Invalid request: {}", message);
                GatewayError::Validation { message }
            }
            ErrorType::Internal => {
                error!("Internal error: {}", message);
                GatewayError::Internal { message }
            }
        }
    }

    /// Run an async operation, converting any error via [`Self::log_and_convert`].
    pub async fn handle_async_operation<F, Fut, T>(
        operation: F,
        context: &str,
        error_type: ErrorType,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        operation()
            .await
            .map_err(|e| Self::log_and_convert(e, context, error_type))
    }

    /// Run a sync operation, converting any error via [`Self::log_and_convert`].
    pub fn handle_sync_operation<F, T>(
        operation: F,
        context: &str,
        error_type: ErrorType,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Result<T, anyhow::Error>,
    {
        operation().map_err(|e| Self::log_and_convert(e, context, error_type))
    }

    /// Run `validator` against `value`, returning `value` unchanged on
    /// success or a `GatewayError::Validation` carrying `context` on failure.
    pub fn validate_config<T, F>(value: T, validator: F, context: &str) -> Result<T, GatewayError>
    where
        F: FnOnce(&T) -> Result<(), String>,
    {
        validator(&value).map(|()| value).map_err(|message| {
            let message = format!("{context}: {message}");
            warn!("Configuration validation failed: {}", message);
            GatewayError::Validation { message }
        })
    }

    pub fn require_some<T>(value: Option<T>, context: &str) -> Result<T, GatewayError> {
        value.ok_or_else(|| {
            let message = format!("{context}: value is required but was None");
            warn!("Required value missing: {}", message);
            GatewayError::Validation { message }
        })
    }

    pub fn validate_string(
        value: &str,
        context: &str,
        min_length: usize,
    ) -> Result<(), GatewayError> {
        if value.len() < min_length {
            let message = format!("{context}: string too short (minimum {min_length} characters)");
            warn!("String validation failed: {}", message);
            return Err(GatewayError::Validation { message });
        }
        Ok(())
    }

    pub fn validate_range<T: PartialOrd + fmt::Display>(
        value: T,
        min: T,
        max: T,
        context: &str,
    ) -> Result<(), GatewayError> {
        if value < min || value > max {
            let message = format!("{context}: value {value} is outside valid range [{min}, {max}]");
            warn!("Range validation failed: {}", message);
            return Err(GatewayError::Validation { message });
        }
        Ok(())
    }
}

/// Extension trait for `Result` to add error handling utilities.
pub trait ResultExt<T, E> {
    fn with_gateway_context(self, context: &str) -> Result<T, GatewayError>
    where
        E: Into<anyhow::Error>,
        T: fmt::Debug;

    fn log_and_convert(self, context: &str, error_type: ErrorType) -> Result<T, GatewayError>
    where
        E: fmt::Display + fmt::Debug;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    fn with_gateway_context(self, context: &str) -> Result<T, GatewayError>
    where
        E: Into<anyhow::Error>,
    {
        self.map_err(|e| {
            let anyhow_error: anyhow::Error = e.into();
            let message = format!("{context}: {anyhow_error}");
            error!("{}", message);
            GatewayError::Internal { message }
        })
    }

    fn log_and_convert(self, context: &str, error_type: ErrorType) -> Result<T, GatewayError>
    where
        E: fmt::Display + fmt::Debug,
    {
        self.map_err(|e| ErrorHandler::log_and_convert(e, context, error_type))
    }
}

/// Extension trait for `Option` to add error handling utilities.
pub trait OptionExt<T> {
    fn ok_or_gateway_error(self, context: &str) -> Result<T, GatewayError>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_gateway_error(self, context: &str) -> Result<T, GatewayError> {
        self.ok_or_else(|| ErrorHandler::config_error(&format!("{context}: value is required")))
    }
}

/// Richer error context than a bare string: which module/operation failed,
/// the request/user it happened for, and how loudly to log it.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub module: String,
    pub operation: String,
    pub details: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: Option<String>,
    pub user_id: Option<String>,
    pub severity: ErrorSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorContext {
    pub fn new(module: &str, operation: &str, details: &str) -> Self {
        Self {
            module: module.to_string(),
            operation: operation.to_string(),
            details: details.to_string(),
            timestamp: chrono::Utc::now(),
            request_id: None,
            user_id: None,
            severity: ErrorSeverity::Medium,
        }
    }

    pub fn with_request_id(mut self, request_id: String) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    pub fn format(&self) -> String {
        let mut parts = vec![
            format!("[{}] {}", self.module, self.operation),
            format!("Details: {}", self.details),
            format!("Timestamp: {}", self.timestamp),
        ];

        if let Some(request_id) = &self.request_id {
            parts.push(format!("Request ID: {request_id}"));
        }
        if let Some(user_id) = &self.user_id {
            parts.push(format!("User ID: {user_id}"));
        }
        parts.push(format!("Severity: {:?}", self.severity));

        parts.join(" | ")
    }

    pub fn is_critical(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Critical)
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Low | ErrorSeverity::Medium)
    }

    fn log(&self, message: &str) {
        match self.severity {
            ErrorSeverity::Low => tracing::debug!("{}", message),
            ErrorSeverity::Medium => tracing::warn!("{}", message),
            ErrorSeverity::High => tracing::error!("{}", message),
            ErrorSeverity::Critical => tracing::error!("CRITICAL ERROR: {}", message),
        }
    }

    fn into_gateway_error(&self, message: String) -> GatewayError {
        match self.module.as_str() {
            "config" => GatewayError::Validation { message },
            "auth" => GatewayError::Auth { message },
            "rate_limit" => GatewayError::RateLimit { message },
            _ => GatewayError::Internal { message },
        }
    }
}

impl ErrorHandler {
    /// Run `operation`, logging and converting any failure through `context`.
    pub fn handle_with_context<T, F>(operation: F, context: ErrorContext) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Result<T, anyhow::Error>,
    {
        operation().map_err(|e| {
            let message = format!("{}: {}", context.format(), e);
            context.log(&message);
            context.into_gateway_error(message)
        })
    }

    pub async fn handle_async_with_context<F, Fut, T>(
        operation: F,
        context: ErrorContext,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        operation().await.map_err(|e| {
            let message = format!("{}: {}", context.format(), e);
            context.log(&message);
            context.into_gateway_error(message)
        })
    }

    pub fn validate_with_context<T, F>(
        value: T,
        validator: F,
        context: ErrorContext,
    ) -> Result<T, GatewayError>
    where
        F: FnOnce(&T) -> Result<(), String>,
    {
        validator(&value).map(|()| value).map_err(|error_msg| {
            let message = format!("{}: {}", context.format(), error_msg);
            context.log(&message);
            GatewayError::Validation { message }
        })
    }

    pub fn validate_string_with_constraints(
        value: &str,
        context: ErrorContext,
        min_length: usize,
        max_length: Option<usize>,
    ) -> Result<(), GatewayError> {
        if value.len() < min_length {
            let message = format!(
                "{}: string too short: {} chars (minimum: {})",
                context.format(),
                value.len(),
                min_length
            );
            return Err(GatewayError::Validation { message });
        }
        if let Some(max_len) = max_length {
            if value.len() > max_len {
                let message = format!(
                    "{}: string too long: {} chars (maximum: {})",
                    context.format(),
                    value.len(),
                    max_len
                );
                return Err(GatewayError::Validation { message });
            }
        }
        Ok(())
    }

    pub fn validate_range_with_context<T: PartialOrd + fmt::Display>(
        value: T,
        min: T,
        max: T,
        context: ErrorContext,
    ) -> Result<(), GatewayError> {
        if value < min || value > max {
            let message = format!(
                "{}: value {value} out of range [{min}, {max}]",
                context.format()
            );
            return Err(GatewayError::Validation { message });
        }
        Ok(())
    }

    /// Retry `operation` up to `max_retries` times with exponential backoff
    /// (capped at 30s), starting from `initial_delay`.
    pub async fn retry_with_backoff<F, Fut, T>(
        mut operation: F,
        max_retries: u32,
        initial_delay: std::time::Duration,
        context: ErrorContext,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
    {
        let mut delay = initial_delay;
        let mut last_error_message = None;

        for attempt in 0..=max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    last_error_message = Some(e.to_string());

                    if attempt < max_retries {
                        tracing::warn!(
                            "Attempt {} failed in {}: {}. Retrying in {:?}",
                            attempt + 1,
                            context.operation,
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        delay =
                            std::cmp::min(delay.mul_f64(2.0), std::time::Duration::from_secs(30));
                    } else {
                        tracing::error!(
                            "All {} attempts failed in {}: {}",
                            max_retries + 1,
                            context.operation,
                            e,
                        );
                    }
                }
            }
        }

        Err(GatewayError::Internal {
            message: last_error_message.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Build an [`ErrorContext`] inline.
#[macro_export]
macro_rules! error_context {
    ($module:expr, $operation:expr, $details:expr) => {
        $crate::error_handling::ErrorContext::new($module, $operation, $details)
    };
}

/// Log-and-convert a result through an [`ErrorType`].
#[macro_export]
macro_rules! handle_error {
    ($result:expr, $context:expr, $error_type:expr) => {
        match $result {
            Ok(value) => Ok(value),
            Err(e) => Err($crate::error_handling::ErrorHandler::log_and_convert(
                e, $context, $error_type,
            )),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_validation() {
        let error = ErrorHandler::config_error("test error");
        assert!(matches!(error, GatewayError::Validation { .. }));
    }

    #[test]
    fn auth_error_maps_to_auth() {
        let error = ErrorHandler::auth_error("test auth error");
        assert!(matches!(error, GatewayError::Auth { .. }));
    }

    #[test]
    fn rate_limit_error_maps_to_rate_limit() {
        let error = ErrorHandler::rate_limit_error("test rate limit error");
        assert!(matches!(error, GatewayError::RateLimit { .. }));
    }

    #[test]
    fn validate_string_enforces_minimum_length() {
        assert!(ErrorHandler::validate_string("test", "test", 3).is_ok());
        assert!(ErrorHandler::validate_string("ab", "test", 3).is_err());
    }

    #[test]
    fn validate_range_enforces_bounds() {
        assert!(ErrorHandler::validate_range(5, 1, 10, "test").is_ok());
        assert!(ErrorHandler::validate_range(0, 1, 10, "test").is_err());
        assert!(ErrorHandler::validate_range(11, 1, 10, "test").is_err());
    }

    #[test]
    fn require_some_rejects_none() {
        assert!(ErrorHandler::require_some(Some(42), "test").is_ok());
        assert!(ErrorHandler::require_some(None::<i32>, "test").is_err());
    }

    #[test]
    fn result_ext_converts_and_logs() {
        let result: Result<i32, anyhow::Error> = Ok(42);
        assert!(result.with_gateway_context("test").is_ok());

        let result: Result<i32, anyhow::Error> = Err(anyhow::anyhow!("test error"));
        assert!(result.log_and_convert("test", ErrorType::Config).is_err());
    }

    #[test]
    fn option_ext_converts_none() {
        let option: Option<i32> = Some(42);
        assert!(option.ok_or_gateway_error("test").is_ok());

        let option: Option<i32> = None;
        assert!(option.ok_or_gateway_error("test").is_err());
    }

    #[test]
    fn error_context_tracks_severity() {
        let ctx = ErrorContext::new("config", "load", "bad toml")
            .with_severity(ErrorSeverity::Critical);
        assert!(ctx.is_critical());
        assert!(!ctx.should_retry());
    }

    #[tokio::test]
    async fn retry_with_backoff_gives_up_after_max_retries() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), GatewayError> = ErrorHandler::retry_with_backoff(
            || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(anyhow::anyhow!("always fails")) }
            },
            2,
            std::time::Duration::from_millis(1),
            ErrorContext::new("test", "retry", "always fails"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
