//! Core types, configuration, and error handling for Chronos.
//!
//! This crate provides the shared foundation used by the history engine:
//! - [`ChronosError`]: fault type using `thiserror`
//! - [`HistoryUnavailable`]: why temporal signals could not be produced
//! - [`ChronosConfig`]: configuration loaded from `.chronos.toml`

mod config;
mod error;

pub use config::{
    CacheConfig, ChronosConfig, ChurnConfig, CoChangeConfig, ExtractConfig, CONFIG_FILE_NAME,
};
pub use error::{ChronosError, HistoryUnavailable};

/// A convenience `Result` type for Chronos operations.
pub type Result<T> = std::result::Result<T, ChronosError>;
