//! Broker Error Types

/// Failures reported by a broker client or transaction manager
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection failure: {message}")]
    Connection { message: String },

    #[error("{resource} is closed")]
    Closed { resource: String },

    #[error("Receive was interrupted")]
    Interrupted,

    #[error("Transaction failure: {message}")]
    Transaction { message: String },

    #[error("Invalid destination: {destination}")]
    InvalidDestination { destination: String },

    #[error("Broker operation failed: {message}")]
    OperationFailed { message: String },
}

impl BrokerError {
    pub fn connection(message: impl Into<String>) -> Self {
        BrokerError::Connection {
            message: message.into(),
        }
    }

    pub fn closed(resource: impl Into<String>) -> Self {
        BrokerError::Closed {
            resource: resource.into(),
        }
    }

    pub fn transaction(message: impl Into<String>) -> Self {
        BrokerError::Transaction {
            message: message.into(),
        }
    }
}

impl crate::core::error_handling::ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        matches!(self, BrokerError::InvalidDestination { .. })
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            BrokerError::InvalidDestination { destination } => Some(destination),
            _ => None,
        }
    }
}

/// Result type for broker operations
pub type BrokerResult<T> = Result<T, BrokerError>;
