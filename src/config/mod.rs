//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! conf.yaml (YAML, or TOML for .toml files)
//!     → loader.rs (read & parse into an untyped RawConfig tree)
//!     → validation.rs (walk the schema, collect every violation)
//!     → ValidatedConfig (typed, immutable)
//!     → shared via Arc with the server instance
//! ```
//!
//! # Design Decisions
//! - Config is immutable once validated
//! - The loader never injects defaults; absence survives into validation
//! - Validation reports all violations so a config can be fixed in one pass

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_and_validate, load_config, ConfigError, RawConfig, DEFAULT_CONFIG_PATH};
pub use schema::{ServerConfig, ValidatedConfig};
pub use validation::{validate, Reason, ValidationError};
