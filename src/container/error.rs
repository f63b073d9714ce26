//! Container Error Types

use crate::broker::api::BrokerError;
use crate::core::error_handling::ContextualError;

/// Failure at a unit-of-work boundary
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkError {
    #[error("Could not begin unit of work: {source}")]
    Begin { source: BrokerError },

    #[error("Could not complete unit of work: {source}")]
    End { source: BrokerError },

    #[error("Could not roll back unit of work: {source}")]
    Rollback { source: BrokerError },
}

impl WorkError {
    /// The broker failure underneath
    pub fn broker_error(&self) -> &BrokerError {
        match self {
            WorkError::Begin { source } | WorkError::End { source } | WorkError::Rollback { source } => {
                source
            }
        }
    }
}

impl ContextualError for WorkError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        None
    }
}

/// Failure raised by an application message handler
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler wrapped the original failure; the container reports the cause
    #[error("Handler invocation failed: {source}")]
    Invocation {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Handler failed: {message}")]
    Failed { message: String },

    #[error("Handler panicked: {message}")]
    Panicked { message: String },
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed {
            message: message.into(),
        }
    }

    pub fn invocation(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        HandlerError::Invocation {
            source: Box::new(source),
        }
    }

    /// Text of the failure worth reporting; invocation wrappers are unwrapped
    pub fn root_cause(&self) -> String {
        match self {
            HandlerError::Invocation { source } => {
                let mut cause: &(dyn std::error::Error + 'static) = source.as_ref();
                while let Some(next) = cause.source() {
                    cause = next;
                }
                cause.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl ContextualError for HandlerError {
    fn is_user_actionable(&self) -> bool {
        false
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            HandlerError::Failed { message } | HandlerError::Panicked { message } => Some(message),
            HandlerError::Invocation { .. } => None,
        }
    }
}

/// Container configuration and lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("Invalid container configuration: {message}")]
    Configuration { message: String },

    #[error("Container for {destination} has been shut down")]
    Shutdown { destination: String },

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Unit of work error: {0}")]
    Work(#[from] WorkError),

    #[error("Internal container error: {message}")]
    Internal { message: String },
}

impl ContainerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ContainerError::Configuration {
            message: message.into(),
        }
    }
}

impl ContextualError for ContainerError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, ContainerError::Configuration { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ContainerError::Configuration { message } => Some(message),
            _ => None,
        }
    }
}

/// Result type for container operations
pub type ContainerResult<T> = Result<T, ContainerError>;
