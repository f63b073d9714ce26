//! Application-facing callback traits

use crate::broker::api::{BrokerError, Message};
use crate::container::error::HandlerError;

/// Processes one message inside the container's unit of work
///
/// Returning an error (or panicking) rolls the unit of work back; for
/// client-acknowledge and transacted sessions the message is redelivered.
///
/// Closures with the right signature are handlers:
///
/// ```rust
/// use brokerpool::broker::api::Message;
/// use brokerpool::container::api::{HandlerError, MessageHandler};
///
/// fn accepts(handler: impl MessageHandler) {}
///
/// accepts(|message: &Message| {
///     if message.body.is_empty() {
///         return Err(HandlerError::failed("empty body"));
///     }
///     Ok(())
/// });
/// ```
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: &Message) -> Result<(), HandlerError>;
}

impl<F> MessageHandler for F
where
    F: Fn(&Message) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_message(&self, message: &Message) -> Result<(), HandlerError> {
        self(message)
    }
}

/// Notified of every broker failure that ends a receiver execution
pub trait ExceptionListener: Send + Sync {
    fn on_exception(&self, destination: &str, error: &BrokerError);
}

impl<F> ExceptionListener for F
where
    F: Fn(&str, &BrokerError) + Send + Sync,
{
    fn on_exception(&self, destination: &str, error: &BrokerError) {
        self(destination, error)
    }
}
