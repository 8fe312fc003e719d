//! Process lifecycle states.
//!
//! ```text
//! Starting → LoggingReady → ConfigValidated → ServerConstructed → Running
//!     → Terminating → CacheCleared → Exited
//!
//! FatalConfigError / FatalStartupError → Terminating → ... → Exited
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    LoggingReady,
    ConfigValidated,
    ServerConstructed,
    /// Listener bound, accepting connections.
    Running,
    Terminating,
    CacheCleared,
    Exited,
    FatalConfigError,
    FatalStartupError,
}

impl LifecycleState {
    /// Whether `next` may follow `self`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Starting, LoggingReady)
            | (LoggingReady, ConfigValidated)
            | (ConfigValidated, ServerConstructed)
            | (ServerConstructed, Running)
            | (Running, Terminating)
            | (Terminating, CacheCleared)
            | (Terminating, Exited)
            | (CacheCleared, Exited)
            | (FatalConfigError, Terminating)
            | (FatalStartupError, Terminating)
            | (LoggingReady, FatalConfigError) => true,
            // Cleanup is not armed yet when logging fails.
            (FatalStartupError, Exited) => true,
            (from, FatalStartupError) => !from.is_terminal() && !from.is_fatal(),
            _ => false,
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            LifecycleState::FatalConfigError | LifecycleState::FatalStartupError
        )
    }

    fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::Terminating | LifecycleState::CacheCleared | LifecycleState::Exited
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Records the states the process has passed through.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    history: Vec<LifecycleState>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            history: vec![LifecycleState::Starting],
        }
    }

    pub fn current(&self) -> LifecycleState {
        self.history
            .last()
            .copied()
            .unwrap_or(LifecycleState::Starting)
    }

    /// Move to `next`. Unexpected transitions are logged but still recorded.
    pub fn advance(&mut self, next: LifecycleState) {
        let from = self.current();
        if !from.can_transition_to(next) {
            tracing::warn!(from = %from, to = %next, "Unexpected lifecycle transition");
        }
        tracing::debug!(from = %from, to = %next, "Lifecycle transition");
        self.history.push(next);
    }

    pub fn history(&self) -> &[LifecycleState] {
        &self.history
    }

    pub fn into_history(self) -> Vec<LifecycleState> {
        self.history
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}
