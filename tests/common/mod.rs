//! Shared fixtures for the proxy integration tests
//!
//! - `FakeBackend`: scripted engine that records every call
//! - `RecordingReporter`: keeps the errors the dispatcher reported
//! - `spawn_server`: in-process server on an ephemeral port

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlproxy::{Backend, BackendError, BackendResult, ErrorReporter, Server, ServerConfig};
use sqlproxy_client::protocol::{DriverError, ExecResponse, QueryResponse, Value};

pub const USERS_QUERY: &str = "SELECT id, name FROM users";
pub const UPDATE_NAME: &str = "UPDATE users SET name=? WHERE id=?";
pub const INSERT_USER: &str = "INSERT INTO users (name) VALUES (?)";
pub const SLOW_QUERY: &str = "SELECT sleep";
pub const ECHO_QUERY: &str = "SELECT echo";

/// Which capability a request reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Query,
    Execute,
}

#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<(Call, String)>>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(Call, String)> {
        self.calls.lock().clone()
    }
}

impl Backend for FakeBackend {
    fn query(&self, text: &str, args: &[Value]) -> BackendResult<QueryResponse> {
        self.calls.lock().push((Call::Query, text.to_string()));

        match text {
            USERS_QUERY => Ok(QueryResponse {
                columns: vec!["id".to_string(), "name".to_string()],
                rows: vec![
                    vec![Value::Int64(1), Value::from("Alice")],
                    vec![Value::Int64(2), Value::from("Bob")],
                ],
            }),
            SLOW_QUERY => {
                std::thread::sleep(Duration::from_millis(500));
                Ok(QueryResponse::default())
            }
            ECHO_QUERY => Ok(QueryResponse {
                columns: (0..args.len()).map(|i| format!("arg{}", i)).collect(),
                rows: vec![args.to_vec()],
            }),
            other => Err(BackendError::Execution(format!("no such table: {}", other))),
        }
    }

    fn execute(&self, text: &str, args: &[Value]) -> BackendResult<ExecResponse> {
        self.calls.lock().push((Call::Execute, text.to_string()));

        match text {
            UPDATE_NAME => {
                let hit = args.get(1) == Some(&Value::Int64(1));
                Ok(ExecResponse {
                    rows_affected: i64::from(hit),
                    last_insert_id: 0,
                })
            }
            INSERT_USER if args.first() == Some(&Value::from("Alice")) => Err(
                BackendError::Execution("UNIQUE constraint failed: users.name".to_string()),
            ),
            INSERT_USER => Ok(ExecResponse {
                rows_affected: 1,
                last_insert_id: 3,
            }),
            _ => Ok(ExecResponse::default()),
        }
    }
}

/// Keeps `(kind, message)` for every reported error.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn kinds(&self) -> Vec<String> {
        self.reports.lock().iter().map(|(kind, _)| kind.clone()).collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, _peer: &str, error: &DriverError) {
        self.reports
            .lock()
            .push((error.kind().to_string(), error.detail()));
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::new("127.0.0.1:0")
}

/// Start a server for `backend` and return its address.
pub async fn spawn_server(
    backend: Arc<dyn Backend>,
    config: ServerConfig,
) -> (SocketAddr, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::default());
    let server = Server::bind(&config, backend)
        .await
        .expect("Failed to bind test server")
        .with_reporter(reporter.clone());
    let addr = server.local_addr().expect("Failed to read local address");

    tokio::spawn(async move {
        let _ = server.serve().await;
    });

    (addr, reporter)
}
