//! Connection handler for the proxy protocol
//!
//! Reads one request at a time, runs it against the backend and writes the
//! response before reading the next frame.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use super::protocol::error::kind;
use super::protocol::{
    decode_request, encode_response, read_frame, write_frame, DriverError, ErrorResponse,
    Request, Response,
};
use super::reporter::{ErrorReporter, TracingReporter};
use crate::backend::Backend;
use crate::config::ServerConfig;

/// Handler shared by every connection of one server
#[derive(Clone)]
pub struct DriverHandler {
    backend: Arc<dyn Backend>,
    reporter: Arc<dyn ErrorReporter>,
    max_frame_size: usize,
    query_timeout: Option<Duration>,
}

impl DriverHandler {
    pub fn new(backend: Arc<dyn Backend>, config: &ServerConfig) -> Self {
        Self {
            backend,
            reporter: Arc::new(TracingReporter),
            max_frame_size: config.max_frame_size,
            query_timeout: config.query_timeout,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Serve requests on `stream` until the peer disconnects or a frame or
    /// protocol failure ends the connection.
    pub async fn handle_connection<S>(&self, mut stream: S, addr: String)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::info!("Driver connection from {}", addr);

        loop {
            let payload = match read_frame(&mut stream, self.max_frame_size).await {
                Ok(Some(payload)) => payload,
                Ok(None) => {
                    tracing::debug!("Driver connection closed: {}", addr);
                    break;
                }
                Err(e) => {
                    self.reporter.report(&addr, &e);
                    if matches!(e, DriverError::ProtocolError(_)) {
                        self.send_error(&mut stream, &addr, &e).await;
                    }
                    break;
                }
            };

            let request = match decode_request(&payload) {
                Ok(request) => request,
                Err(e) => {
                    self.reporter.report(&addr, &e);
                    let sent = self.send_error(&mut stream, &addr, &e).await;
                    if e.is_fatal() || !sent {
                        break;
                    }
                    continue;
                }
            };

            tracing::debug!("{:?} request from {}: {}", request.kind(), addr, request.text());

            let response = self.execute(request, &addr).await;

            if let Err(e) = self.send_response(&mut stream, &response).await {
                self.reporter.report(&addr, &e);
                break;
            }
        }
    }

    /// Run one request on the blocking pool, bounded by the query timeout.
    async fn execute(&self, request: Request, addr: &str) -> Response {
        let backend = self.backend.clone();
        let task = tokio::task::spawn_blocking(move || match request {
            Request::Query(req) => backend.query(&req.text, &req.args).map(Response::Query),
            Request::Exec(req) => backend.execute(&req.text, &req.args).map(Response::Exec),
        });

        let joined = match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, task).await {
                Ok(joined) => joined,
                Err(_) => {
                    // The backend call keeps running; its result is dropped.
                    let message = format!("query exceeded {}ms", limit.as_millis());
                    self.reporter
                        .report(addr, &DriverError::ExecutionError(message.clone()));
                    return Response::Error(ErrorResponse::new(kind::TIMEOUT, message));
                }
            },
            None => task.await,
        };

        let err = match joined {
            Ok(Ok(response)) => return response,
            Ok(Err(e)) => DriverError::from(e),
            Err(e) => DriverError::ExecutionError(format!("Backend task failed: {}", e)),
        };
        self.reporter.report(addr, &err);
        Response::error(&err)
    }

    /// Send a response to the client. A result that does not fit in one
    /// frame is replaced by a `result_too_large` error.
    async fn send_response<S>(&self, stream: &mut S, response: &Response) -> Result<(), DriverError>
    where
        S: AsyncWrite + Unpin,
    {
        let mut payload = encode_response(response)?;
        if payload.len() > self.max_frame_size {
            let message = format!(
                "response of {} bytes exceeds maximum frame size {}",
                payload.len(),
                self.max_frame_size
            );
            payload = encode_response(&Response::Error(ErrorResponse::new(
                kind::RESULT_TOO_LARGE,
                message,
            )))?;
        }
        write_frame(stream, &payload, self.max_frame_size).await
    }

    /// Best-effort error response. Returns whether it reached the socket.
    async fn send_error<S>(&self, stream: &mut S, addr: &str, err: &DriverError) -> bool
    where
        S: AsyncWrite + Unpin,
    {
        match self.send_response(stream, &Response::error(err)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to send error response to {}: {}", addr, e);
                false
            }
        }
    }
}
