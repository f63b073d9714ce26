pub mod app;
pub mod broker;
pub mod container;
pub mod core;
pub mod registry;

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Version string shown by `--version`, including build metadata
pub fn long_version() -> String {
    format!(
        "{} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        GIT_HASH,
        BUILD_TIME
    )
}
