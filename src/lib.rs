
pub mod config;
pub mod ingest_core;
pub mod pipeline;
pub mod report;

pub use config::Config;

/// Initialise env_logger on stderr, defaulting to `info`
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
}
