//! Adaptive message container
//!
//! A [`MessageContainer`](api::MessageContainer) consumes one destination with
//! a pool of receivers that grows towards `max-receivers` while messages keep
//! arriving and shrinks back to `min-receivers` once receivers sit idle.
//!
//! ```text
//!                     ┌──────────────── MessageContainer ────────────────┐
//!   TaskExecutor ◀────┤ lifecycle lock: receivers, paused, active count  │
//!        │            │ ConnectionManager: shared connection, refresh    │
//!        ▼            └──────────────────────────────────────────────────┘
//!   Receiver::run ── receive ── UnitOfWork ── MessageHandler
//!        │
//!        └── reschedule / park / retire
//! ```
//!
//! Every receive happens inside a [`UnitOfWork`](api::UnitOfWork) chosen from
//! the session mode, so a failing handler rolls the message back for
//! redelivery. Broker failures close the failing receiver's resources and
//! trigger a single connection refresh per failure episode.

pub(crate) mod config;
pub(crate) mod connection;
pub(crate) mod error;
pub(crate) mod executor;
pub(crate) mod manager;
pub(crate) mod monitor;
pub(crate) mod receiver;
pub(crate) mod statistics;
pub(crate) mod traits;
pub(crate) mod unit_of_work;

pub mod api;

#[cfg(test)]
mod tests;
