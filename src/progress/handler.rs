//! Progress handler trait and events

use crate::workflow::AppAction;
use std::path::PathBuf;
use std::time::Duration;

/// Events emitted while a run processes applications
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Applications discovered, processing about to begin
    RunStarted { apps_dir: PathBuf, total: usize },

    /// One application picked up by a worker
    AppStarted {
        name: String,
        index: usize,
        total: usize,
    },

    /// Application finished without error
    AppCompleted {
        name: String,
        action: AppAction,
        version: i64,
        duration: Duration,
    },

    /// Application failed; the run continues
    AppFailed { name: String, error: String },

    /// Every application has been handled
    RunCompleted {
        processed: usize,
        failed: usize,
        total_time: Duration,
    },
}

/// Trait for handling progress events during a run
pub trait ProgressHandler: Send + Sync {
    /// Called when a progress event occurs
    fn on_progress(&self, event: &ProgressEvent);
}

/// No-op handler that ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl ProgressHandler for NoOpHandler {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    impl ProgressHandler for CountingHandler {
        fn on_progress(&self, _event: &ProgressEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpHandler;
        handler.on_progress(&ProgressEvent::AppStarted {
            name: "foo".to_string(),
            index: 1,
            total: 1,
        });
    }

    #[test]
    fn test_progress_events() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = CountingHandler {
            count: count.clone(),
        };

        handler.on_progress(&ProgressEvent::RunStarted {
            apps_dir: PathBuf::from("apps"),
            total: 1,
        });
        handler.on_progress(&ProgressEvent::AppCompleted {
            name: "foo".to_string(),
            action: AppAction::Created,
            version: 1,
            duration: Duration::from_millis(50),
        });
        handler.on_progress(&ProgressEvent::RunCompleted {
            processed: 1,
            failed: 0,
            total_time: Duration::from_secs(1),
        });

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_event_debug() {
        let event = ProgressEvent::AppFailed {
            name: "foo".to_string(),
            error: "boom".to_string(),
        };
        let debug_str = format!("{:?}", event);
        assert!(debug_str.contains("AppFailed"));
        assert!(debug_str.contains("boom"));
    }
}
