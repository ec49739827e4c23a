//! Shared handler state.

use speakeval::pipeline::Executor;
use std::time::Duration;

/// State handed to every request handler.
#[derive(Debug, Clone)]
pub struct AppState {
    executor: Executor,
    request_timeout: Duration,
}

impl AppState {
    /// Creates handler state around a configured executor.
    #[must_use]
    pub fn new(executor: Executor, request_timeout: Duration) -> Self {
        Self {
            executor,
            request_timeout,
        }
    }

    /// The executor that runs the assessment graph.
    #[must_use]
    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Budget for one assessment.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
