//! Container registry
//!
//! Keeps every [`MessageContainer`](crate::container::api::MessageContainer)
//! of the process keyed by destination URI and drives them together on
//! runtime lifecycle events: start on startup, pause/resume, shutdown on exit.

pub(crate) mod error;
pub(crate) mod manager;

pub mod api;

#[cfg(test)]
mod tests;
