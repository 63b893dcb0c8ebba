use super::protocol::DriverError;

/// Where the dispatcher sends failures it handles on a connection.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, peer: &str, error: &DriverError);
}

/// Logs through `tracing`: connection-ending failures at `warn`, request
/// failures at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, peer: &str, error: &DriverError) {
        if error.is_fatal() {
            tracing::warn!("Driver connection {} failed: {}", peer, error);
        } else {
            tracing::debug!("Request from {} failed: {}", peer, error);
        }
    }
}

/// Drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ErrorReporter for SilentReporter {
    fn report(&self, _peer: &str, _error: &DriverError) {}
}
