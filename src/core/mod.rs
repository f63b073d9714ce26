//! Core services and infrastructure shared by every subsystem

pub mod error_handling;
pub mod logging;
pub mod retry;
pub mod shutdown;
pub mod sync;
pub mod time;
