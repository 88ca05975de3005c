//! chatmark-common: infrastructure shared by the chatmark crates.
//!
//! - `cache` - bounded cache over mini-moka-wasm, sync on native, unsync on WASM
//! - `config` - file-backed configuration loading and saving
//! - `perf` - timing helpers that log through tracing
//! - `telemetry` - tracing subscriber + prometheus recorder (feature `telemetry`)

pub mod cache;
pub mod config;
pub mod error;
pub mod perf;
#[cfg(feature = "telemetry")]
pub mod telemetry;

pub use crate::error::ConfigError;
