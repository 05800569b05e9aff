//! # callsight-settings
//!
//! Settings for the callsight pipeline: compiled defaults, JSON file deep
//! merge, environment variable overrides (highest priority).

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{load_settings, load_settings_from_path};
pub use types::{CallsightSettings, IngestSettings, PoolSettings, ServerSettings, StoreSettings};
