//! # fncmp-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`FncmpSettings::default()`])
//! 2. **Settings file**: `~/.fncmp/settings.json` or an explicit path,
//!    deep-merged over the defaults
//! 3. **Environment variables**: `FNCMP_*` overrides
//!
//! There is no process-wide settings instance; callers load once and pass
//! the relevant section into the engine and cache constructors.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{CacheSettings, FncmpSettings, LoggingSettings, ServerSettings};
