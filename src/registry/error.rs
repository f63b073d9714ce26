//! Registry Error Types

use crate::container::api::ContainerError;
use crate::core::error_handling::ContextualError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("A container for {destination} is already registered")]
    Duplicate { destination: String },

    #[error("No container is registered for {destination}")]
    NotRegistered { destination: String },

    #[error("Container for {destination} failed: {source}")]
    Container {
        destination: String,
        #[source]
        source: ContainerError,
    },

    #[error("Internal registry error: {message}")]
    Internal { message: String },
}

impl ContextualError for RegistryError {
    fn is_user_actionable(&self) -> bool {
        match self {
            RegistryError::Duplicate { .. } | RegistryError::NotRegistered { .. } => true,
            RegistryError::Container { source, .. } => source.is_user_actionable(),
            RegistryError::Internal { .. } => false,
        }
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            RegistryError::Duplicate { destination }
            | RegistryError::NotRegistered { destination } => Some(destination),
            RegistryError::Container { source, .. } => source.user_message(),
            RegistryError::Internal { .. } => None,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;
