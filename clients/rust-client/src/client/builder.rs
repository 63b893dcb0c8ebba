use std::time::Duration;
use tokio::net::TcpStream;

use super::ProxyConnection;
use crate::protocol::{DriverError, DEFAULT_MAX_FRAME_SIZE};

/// Builder for creating a ProxyConnection with additional options
#[derive(Debug, Clone)]
pub struct ConnectionBuilder {
    addr: String,
    max_frame_size: Option<usize>,
    timeout_ms: Option<u64>,
}

impl ConnectionBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            max_frame_size: None,
            timeout_ms: None,
        }
    }

    /// Largest frame accepted from or sent to the server.
    pub fn max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = Some(bytes);
        self
    }

    /// Bound the dial. Calls made on the connection are never timed out.
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Dial the server once. There is no retry.
    pub async fn build(self) -> Result<ProxyConnection, DriverError> {
        let dial = TcpStream::connect(&self.addr);
        let stream = match self.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), dial)
                .await
                .map_err(|_| {
                    DriverError::ConnectionError(format!(
                        "Timed out connecting to {} after {}ms",
                        self.addr, ms
                    ))
                })?,
            None => dial.await,
        }
        .map_err(|e| {
            DriverError::ConnectionError(format!("Failed to connect to {}: {}", self.addr, e))
        })?;

        stream.set_nodelay(true).map_err(|e| {
            DriverError::ConnectionError(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        tracing::debug!("Connected to {}", self.addr);
        Ok(ProxyConnection::from_stream(
            stream,
            &self.addr,
            self.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME_SIZE),
        ))
    }
}
