//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (bootstrap.rs):
//!     Init logging → Banner → Arm cleanup → Load + validate config
//!         → Construct server → Hand off to network runtime
//!
//! Shutdown:
//!     Signal received (signals.rs) → Runtime returns
//!         → CleanupGuard (cleanup.rs) clears the cache → Exit
//!
//! Failure:
//!     Any error or panic → logged once → CleanupGuard → Exit nonzero
//! ```
//!
//! # Design Decisions
//! - Ordered startup: logging first, listeners last
//! - Cleanup runs on every path out of the bootstrapper, exactly once
//! - Process states are recorded (state.rs) and returned to the caller

pub mod bootstrap;
pub mod cleanup;
pub mod environment;
pub mod signals;
pub mod state;

pub use bootstrap::{BootstrapError, BootstrapOptions, BootstrapReport, Bootstrapper};
pub use cleanup::CleanupGuard;
pub use state::{Lifecycle, LifecycleState};
