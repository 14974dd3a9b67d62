// src/config/mod.rs

//! Configuration loading and validation for the worker host.
//!
//! - `model.rs`: the TOML-backed data model.
//! - `loader.rs`: reading a config file from disk.
//! - `validate.rs`: `RawConfigFile` → `ConfigFile` with semantic checks.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, EngineSection, JobConfig, JobSpec, RawConfigFile, RecordConfig, StorageSection,
    TelemetrySection,
};
pub use validate::parse_duration;
