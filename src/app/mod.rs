//! Binary entry point: CLI, configuration file and runtime wiring

pub mod args;
pub mod config;
pub mod startup;
