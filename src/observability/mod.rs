//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields
//!
//! Consumers (logging.rs):
//!     → console sink (stderr, colourised, operator-chosen level)
//!     → file sink (logs/debug_<date>.log, DEBUG, rotated, stack traces on errors)
//! ```

pub mod logging;

pub use logging::{init_logging, LogSettings, LogSinkSet, LoggingInitError};
