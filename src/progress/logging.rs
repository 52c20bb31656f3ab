//! Logging-based progress handler

use super::{ProgressEvent, ProgressHandler};
use crate::workflow::AppAction;
use tracing::{debug, info, warn};

/// Handler that logs progress events using tracing
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ProgressHandler for LoggingHandler {
    fn on_progress(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::RunStarted { apps_dir, total } => {
                info!(apps_dir = %apps_dir.display(), applications = total, "Starting run");
            }
            ProgressEvent::AppStarted { name, index, total } => {
                info!(
                    app = %name,
                    progress = format!("{}/{}", index, total),
                    "Processing application"
                );
            }
            ProgressEvent::AppCompleted {
                name,
                action,
                version,
                duration,
            } => match action {
                AppAction::Unchanged => {
                    debug!(
                        app = %name,
                        version,
                        duration_ms = duration.as_millis(),
                        "No changes"
                    );
                }
                _ => {
                    info!(
                        app = %name,
                        action = %action,
                        version,
                        duration_ms = duration.as_millis(),
                        "Application processed"
                    );
                }
            },
            ProgressEvent::AppFailed { name, error } => {
                warn!(app = %name, error = %error, "Application failed");
            }
            ProgressEvent::RunCompleted {
                processed,
                failed,
                total_time,
            } => {
                if *failed > 0 {
                    warn!(
                        processed,
                        failed,
                        total_time_ms = total_time.as_millis(),
                        "Run complete with failures"
                    );
                } else {
                    info!(
                        processed,
                        total_time_ms = total_time.as_millis(),
                        "Run complete"
                    );
                }
            }
        }
    }
}
