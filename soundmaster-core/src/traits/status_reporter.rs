use crate::models::error::RoutingError;
use crate::models::report::LatencyReport;
use crate::models::state::SessionState;

/// Receives routing status for display (notification, tray, log).
///
/// Methods are called from capture and sampler threads, not the UI thread.
/// Implementations should marshal to the UI thread if needed.
pub trait StatusReporter: Send + Sync {
    /// Called when a session changes state.
    fn on_session_state(&self, application_id: &str, state: &SessionState);

    /// Called once per sampling interval.
    fn on_latency(&self, report: &LatencyReport);

    /// Called when a session hits an error it cannot recover from.
    fn on_error(&self, application_id: &str, error: &RoutingError);
}
