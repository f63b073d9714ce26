//! Generic error handling utilities
//!
//! Lets the binary report any crate error with the right level of detail
//! without knowing which subsystem produced it.

/// Trait for errors that can distinguish between user-actionable and system errors
///
/// When `is_user_actionable()` returns `true`, `user_message()` must return
/// `Some(message)` with a message the operator can act on (a bad configuration
/// value, a duplicate registration). System errors (broker outages, lock
/// poisoning) return `false` and `None`.
pub trait ContextualError: std::error::Error {
    /// Returns true if this error carries a message the operator can act on
    fn is_user_actionable(&self) -> bool;

    /// The operator-facing message, present only for user-actionable errors
    fn user_message(&self) -> Option<&str>;
}

/// Log an error with detail appropriate to its kind
///
/// User-actionable errors show their specific message; system errors show the
/// operation context, with the full error available at debug level.
///
/// # Examples
/// ```rust,no_run
/// # use brokerpool::core::error_handling::log_error_with_context;
/// # use brokerpool::container::api::ContainerError;
/// let error = ContainerError::Configuration {
///     message: "receive-timeout-ms must be greater than zero".to_string(),
/// };
/// log_error_with_context(&error, "Loading container configuration");
/// // Logs: "FATAL: receive-timeout-ms must be greater than zero"
/// ```
pub fn log_error_with_context<E: ContextualError + std::fmt::Display + std::fmt::Debug>(
    error: &E,
    operation_context: &str,
) {
    match error.user_message() {
        Some(user_msg) if error.is_user_actionable() => log::error!("FATAL: {}", user_msg),
        _ => log::error!("FATAL: {}", operation_context),
    }
    log::debug!("DETAIL: {}", error);
    log::debug!("DEBUG_DETAILS: {:?}", error);
}
