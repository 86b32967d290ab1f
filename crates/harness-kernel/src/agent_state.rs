use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Process-wide stop flag shared between the control surface and the running task.
///
/// Cancellation is cooperative: the task runner polls the flag between agent
/// steps and winds down at the next boundary.
#[derive(Debug, Default)]
pub struct AgentState {
    stop_requested: AtomicBool,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        debug!("stop requested");
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn flag_round_trips_across_clones() {
        let state = Arc::new(AgentState::new());
        let shared = Arc::clone(&state);
        assert!(!state.is_stop_requested());

        shared.request_stop();
        shared.request_stop();
        assert!(state.is_stop_requested());

        state.clear_stop();
        assert!(!shared.is_stop_requested());
    }
}
