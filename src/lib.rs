pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;
pub use config::{toml_config::TomlConfig, CleanSettings};

pub use core::{
    aggregator::ResultAggregator,
    engine::{CleaningEngine, EngineSummary},
    processor::ChunkProcessor,
    splitter::split,
};
pub use utils::error::{CleanError, Result};
