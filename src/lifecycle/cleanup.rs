//! Scoped cleanup of process-wide resources.

use std::io;
use std::panic::{self, AssertUnwindSafe};

pub(crate) type CleanupAction = Box<dyn FnOnce() -> io::Result<()> + Send>;

/// Runs a cleanup action exactly once: on [`CleanupGuard::run`] or on drop,
/// whichever comes first.
///
/// Drop also covers unwinding, so a panic between arming and the normal
/// teardown still clears the resource. The action never propagates errors
/// or panics; both are logged.
pub struct CleanupGuard {
    name: &'static str,
    action: Option<CleanupAction>,
}

impl CleanupGuard {
    pub fn arm<F>(name: &'static str, action: F) -> Self
    where
        F: FnOnce() -> io::Result<()> + Send + 'static,
    {
        tracing::debug!(cleanup = name, "Cleanup registered");
        Self {
            name,
            action: Some(Box::new(action)),
        }
    }

    /// Whether the action is still pending.
    pub fn is_armed(&self) -> bool {
        self.action.is_some()
    }

    /// Run the action now. Returns `true` only if it ran in this call and
    /// succeeded.
    pub fn run(&mut self) -> bool {
        let Some(action) = self.action.take() else {
            return false;
        };

        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => {
                tracing::debug!(cleanup = self.name, "Cleanup finished");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(cleanup = self.name, error = %e, "Cleanup failed");
                false
            }
            Err(_) => {
                tracing::warn!(cleanup = self.name, "Cleanup panicked");
                false
            }
        }
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.run();
    }
}
