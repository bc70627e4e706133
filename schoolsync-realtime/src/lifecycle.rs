//! Foreground/background reactor.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppState {
    #[default]
    Foreground,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Reopen the channel if needed and refresh every subscribed key.
    Resume,
    Noop,
}

/// Turns app-state signals into actions. Holds no subscriptions.
#[derive(Debug, Clone, Default)]
pub struct LifecycleController {
    state: AppState,
}

impl LifecycleController {
    pub fn new(initial: AppState) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn on_signal(&mut self, next: AppState) -> LifecycleAction {
        let previous = std::mem::replace(&mut self.state, next);
        match (previous, next) {
            (AppState::Background, AppState::Foreground) => LifecycleAction::Resume,
            _ => LifecycleAction::Noop,
        }
    }
}
