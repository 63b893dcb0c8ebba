mod builder;
mod rows;
mod statement;

pub use builder::ConnectionBuilder;
pub use rows::{ProxyRows, Row};
pub use statement::{ExecOutcome, ProxyStatement};

use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::protocol::{
    decode_response, encode_request, read_frame, write_frame, DriverError, ProtocolErrorKind,
    Request, Response, Value,
};

#[derive(Debug)]
enum SessionState {
    Connected(TcpStream),
    Closed,
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    max_frame_size: usize,
}

/// A connection to a proxy server.
///
/// Cloning is cheap and every clone shares the same socket. The protocol has
/// no request ids, so each exchange holds the session lock from the moment
/// the request is written until its response has been read; calls issued
/// concurrently on one connection are queued in arrival order.
#[derive(Clone, Debug)]
pub struct ProxyConnection {
    session: Arc<Mutex<Session>>,
    addr: Arc<str>,
}

impl ProxyConnection {
    /// Dial `addr` once with default settings.
    pub async fn connect(addr: &str) -> Result<Self, DriverError> {
        ConnectionBuilder::new(addr).build().await
    }

    pub(crate) fn from_stream(stream: TcpStream, addr: &str, max_frame_size: usize) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session {
                state: SessionState::Connected(stream),
                max_frame_size,
            })),
            addr: Arc::from(addr),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Create a statement. Nothing is sent until it is executed.
    pub fn prepare(&self, text: impl Into<String>) -> ProxyStatement {
        ProxyStatement::new(self.clone(), text.into())
    }

    /// Transactions are not supported by the proxy.
    pub fn begin(&self) -> Result<(), DriverError> {
        Err(DriverError::UnsupportedOperation(
            "transactions are not supported".to_string(),
        ))
    }

    /// Run a read with a one-off statement.
    pub async fn query(&self, text: &str, args: &[Value]) -> Result<ProxyRows, DriverError> {
        self.prepare(text).query(args).await
    }

    /// Run a write with a one-off statement.
    pub async fn exec(&self, text: &str, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.prepare(text).exec(args).await
    }

    pub async fn is_closed(&self) -> bool {
        matches!(self.session.lock().await.state, SessionState::Closed)
    }

    /// Shut the socket down. Closing an already closed connection is a no-op.
    pub async fn close(&self) -> Result<(), DriverError> {
        let mut session = self.session.lock().await;
        if let SessionState::Connected(mut stream) =
            std::mem::replace(&mut session.state, SessionState::Closed)
        {
            tracing::debug!("Closing connection to {}", self.addr);
            stream
                .shutdown()
                .await
                .map_err(|e| DriverError::ConnectionError(format!("Shutdown failed: {}", e)))?;
        }
        Ok(())
    }

    /// Send one request and wait for its response.
    ///
    /// Error responses are converted into typed errors. Any fatal failure,
    /// local or reported by the server, leaves the connection closed.
    ///
    /// The stream is taken out of the session while the exchange is in
    /// flight. If the call is dropped before the response is read, the stream
    /// goes with it and the connection stays closed.
    pub(crate) async fn round_trip(&self, request: &Request) -> Result<Response, DriverError> {
        let mut session = self.session.lock().await;
        let max_frame_size = session.max_frame_size;
        let mut stream = match std::mem::replace(&mut session.state, SessionState::Closed) {
            SessionState::Connected(stream) => stream,
            SessionState::Closed => {
                return Err(DriverError::ConnectionError("connection closed".to_string()));
            }
        };

        let result = match exchange(&mut stream, request, max_frame_size).await {
            Ok(Response::Error(err)) => Err(err.into_error()),
            Ok(response) if Some(response.opcode()) != request.opcode().response() => {
                Err(DriverError::ProtocolError(
                    ProtocolErrorKind::UnexpectedOpcode(response.opcode().as_byte()),
                ))
            }
            other => other,
        };

        match &result {
            Err(err) if err.is_fatal() => {
                tracing::warn!("Connection to {} failed: {}", self.addr, err);
            }
            _ => session.state = SessionState::Connected(stream),
        }
        result
    }
}

async fn exchange(
    stream: &mut TcpStream,
    request: &Request,
    max_frame_size: usize,
) -> Result<Response, DriverError> {
    let payload = encode_request(request)?;
    write_frame(stream, &payload, max_frame_size).await?;

    let reply = read_frame(stream, max_frame_size)
        .await?
        .ok_or_else(|| DriverError::ConnectionError("connection closed by server".to_string()))?;
    decode_response(&reply)
}
