//! Command line arguments

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "brokerpool")]
#[command(about = "Adaptive pool of message receivers")]
#[command(version, long_version = crate::long_version())]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "simple", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<String>,

    /// Force colored log output
    #[arg(long = "color", overrides_with = "no_color")]
    pub color: bool,

    /// Disable colored log output
    #[arg(long = "no-color", overrides_with = "color")]
    pub no_color: bool,

    /// Publish COUNT demo messages into every configured destination
    #[arg(short = 'n', long = "demo-messages", value_name = "COUNT")]
    pub demo_messages: Option<usize>,

    /// Stop after SECONDS instead of waiting for a shutdown signal
    #[arg(short = 't', long = "run-for", value_name = "SECONDS")]
    pub run_for: Option<u64>,
}

impl Args {
    /// Explicit color choice; `None` leaves it to the config file or the terminal
    pub fn color_choice(&self) -> Option<bool> {
        match (self.color, self.no_color) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }

    pub fn run_for(&self) -> Option<Duration> {
        self.run_for.map(Duration::from_secs)
    }
}
