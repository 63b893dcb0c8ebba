//! Driver/Server Tests
//!
//! End-to-end exchanges between the async client and an in-process server:
//! - Query and exec round trips
//! - Error responses and connection survival
//! - Ordering and concurrent use of one connection
//! - Raw-socket protocol violations

mod common;

use std::time::Duration;

use common::*;
use serde::Serialize;
use sqlproxy_client::driver::{Connection, Driver, ExecResult, Rows, Statement};
use sqlproxy_client::protocol::{
    decode_response, encode_request, read_frame, ArgumentErrorKind, DriverError,
    ProtocolErrorKind, Request, Response, Value, DEFAULT_MAX_FRAME_SIZE,
};
use sqlproxy_client::{ConnectionBuilder, ProxyConnection, SqlProxyDriver};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

async fn connect(addr: std::net::SocketAddr) -> ProxyConnection {
    ProxyConnection::connect(&addr.to_string())
        .await
        .expect("Failed to connect")
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = (payload.len() as u32).to_be_bytes().to_vec();
    buf.extend_from_slice(payload);
    buf
}

async fn read_response(stream: &mut TcpStream) -> Option<Response> {
    read_frame(stream, DEFAULT_MAX_FRAME_SIZE)
        .await
        .expect("Failed to read frame")
        .map(|payload| decode_response(&payload).expect("Failed to decode response"))
}

fn error_kind(response: Option<Response>) -> String {
    match response {
        Some(Response::Error(err)) => err.kind,
        other => panic!("expected error response, got {:?}", other),
    }
}

// ============================================================================
// Round Trips
// ============================================================================

#[tokio::test]
async fn test_query_returns_all_rows() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let mut rows = conn.query(USERS_QUERY, &[]).await.unwrap();
    assert_eq!(rows.columns(), ["id", "name"]);

    let first = rows.next_row().unwrap();
    assert_eq!(first.values(), [Value::Int64(1), Value::from("Alice")]);
    let second = rows.next_row().unwrap();
    assert_eq!(second.get_by_name("name"), Some(&Value::from("Bob")));

    assert!(rows.next_row().is_none());
    assert!(rows.next_row().is_none());
}

#[tokio::test]
async fn test_exec_update() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let outcome = conn
        .exec(UPDATE_NAME, &[Value::from("Bob"), Value::Int64(1)])
        .await
        .unwrap();
    assert_eq!(outcome.rows_affected(), 1);
    assert_eq!(outcome.last_insert_id(), 0);
}

#[tokio::test]
async fn test_execution_error_keeps_connection() {
    let (addr, reporter) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let err = conn
        .exec(INSERT_USER, &[Value::from("Alice")])
        .await
        .unwrap_err();
    match &err {
        DriverError::ExecutionError(msg) => assert!(msg.contains("UNIQUE constraint failed")),
        other => panic!("expected execution error, got {:?}", other),
    }
    assert!(!err.is_fatal());
    assert!(!conn.is_closed().await);

    let outcome = conn.exec(INSERT_USER, &[Value::from("Carol")]).await.unwrap();
    assert_eq!(outcome.last_insert_id(), 3);

    assert_eq!(reporter.kinds(), ["execution"]);
}

#[tokio::test]
async fn test_opcode_selects_capability() {
    let backend = FakeBackend::new();
    let (addr, _) = spawn_server(backend.clone(), test_config()).await;
    let conn = connect(addr).await;

    // Same text, routed only by how it was sent.
    conn.query(USERS_QUERY, &[]).await.unwrap();
    conn.exec(USERS_QUERY, &[]).await.unwrap();
    conn.query(USERS_QUERY, &[]).await.unwrap();

    assert_eq!(
        backend.calls(),
        vec![
            (Call::Query, USERS_QUERY.to_string()),
            (Call::Execute, USERS_QUERY.to_string()),
            (Call::Query, USERS_QUERY.to_string()),
        ]
    );
}

#[tokio::test]
async fn test_values_survive_round_trip() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let ts = chrono::DateTime::parse_from_rfc3339("2024-02-29T23:59:59.123456789Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let args = vec![
        Value::Null,
        Value::Bool(false),
        Value::Int64(-42),
        Value::Int64(1),
        Value::Float64(1.0),
        Value::from(""),
        Value::Bytes(Vec::new()),
        Value::Timestamp(ts),
    ];

    let mut rows = conn.query(ECHO_QUERY, &args).await.unwrap();
    assert_eq!(rows.columns().len(), args.len());
    assert_eq!(rows.next_row().unwrap().into_values(), args);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_sequential_requests_answered_in_order() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    for i in 0..25 {
        let mut rows = conn.query(ECHO_QUERY, &[Value::Int64(i)]).await.unwrap();
        assert_eq!(rows.next_row().unwrap().get(0), Some(&Value::Int64(i)));
    }
}

#[tokio::test]
async fn test_concurrent_calls_on_one_connection() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            let mut rows = conn
                .query(ECHO_QUERY, &[Value::Int64(i), Value::from(format!("task-{}", i))])
                .await
                .unwrap();
            (i, rows.next_row().unwrap().into_values())
        }));
    }

    for task in tasks {
        let (i, values) = task.await.unwrap();
        assert_eq!(values, [Value::Int64(i), Value::from(format!("task-{}", i))]);
    }
}

#[tokio::test]
async fn test_pipelined_frames_answered_in_order() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut batch = Vec::new();
    for i in 0..3 {
        let request = Request::query(ECHO_QUERY, vec![Value::Int64(i)]);
        batch.extend(frame(&encode_request(&request).unwrap()));
    }
    stream.write_all(&batch).await.unwrap();

    for i in 0..3 {
        match read_response(&mut stream).await {
            Some(Response::Query(resp)) => assert_eq!(resp.rows, vec![vec![Value::Int64(i)]]),
            other => panic!("expected query response, got {:?}", other),
        }
    }
}

// ============================================================================
// Local Operations
// ============================================================================

#[tokio::test]
async fn test_begin_unsupported() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    assert!(matches!(
        conn.begin(),
        Err(DriverError::UnsupportedOperation(_))
    ));
    assert!(matches!(
        Connection::begin(&conn),
        Err(DriverError::UnsupportedOperation(_))
    ));

    // Still usable afterwards.
    conn.query(USERS_QUERY, &[]).await.unwrap();
}

#[tokio::test]
async fn test_closed_statement() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let mut stmt = conn.prepare(USERS_QUERY);
    assert_eq!(stmt.text(), USERS_QUERY);
    assert!(stmt.query(&[]).await.is_ok());

    stmt.close();
    stmt.close();
    assert!(stmt.is_closed());
    assert_eq!(
        stmt.query(&[]).await.unwrap_err(),
        DriverError::ExecutionError("statement is closed".to_string())
    );

    // Other statements on the connection are unaffected.
    assert!(conn.prepare(USERS_QUERY).query(&[]).await.is_ok());
}

#[tokio::test]
async fn test_closed_connection() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    conn.close().await.unwrap();
    conn.close().await.unwrap();
    assert!(conn.is_closed().await);

    assert_eq!(
        conn.query(USERS_QUERY, &[]).await.unwrap_err(),
        DriverError::ConnectionError("connection closed".to_string())
    );
}

#[tokio::test]
async fn test_connect_refused() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = ConnectionBuilder::new(&addr.to_string())
        .timeout_ms(2_000)
        .build()
        .await
        .unwrap_err();
    assert!(matches!(err, DriverError::ConnectionError(_)));
}

#[tokio::test]
async fn test_generic_driver() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let driver = SqlProxyDriver::default();

    let conn = driver.open(&addr.to_string()).await.unwrap();
    let mut stmt = Connection::prepare(&conn, USERS_QUERY).unwrap();
    assert_eq!(Statement::num_input(&stmt), None);

    let mut rows = Statement::query(&stmt, &[]).await.unwrap();
    assert_eq!(Rows::columns(&rows), ["id", "name"]);
    let mut names = Vec::new();
    while let Some(row) = Rows::next_row(&mut rows) {
        names.push(row.get(1).and_then(Value::as_str).unwrap().to_string());
    }
    assert_eq!(names, ["Alice", "Bob"]);
    Rows::close(&mut rows).unwrap();

    let update = Connection::prepare(&conn, UPDATE_NAME).unwrap();
    let result = Statement::exec(&update, &[Value::from("Bob"), Value::Int64(2)])
        .await
        .unwrap();
    assert_eq!(ExecResult::rows_affected(&result), 0);

    Statement::close(&mut stmt).unwrap();
    Connection::close(&conn).await.unwrap();
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_timeout_keeps_connection() {
    let config = test_config().with_query_timeout(Duration::from_millis(100));
    let (addr, reporter) = spawn_server(FakeBackend::new(), config).await;
    let conn = connect(addr).await;

    let err = conn.query(SLOW_QUERY, &[]).await.unwrap_err();
    match err {
        DriverError::ExecutionError(msg) => assert!(msg.contains("exceeded")),
        other => panic!("expected execution error, got {:?}", other),
    }

    let mut rows = conn.query(USERS_QUERY, &[]).await.unwrap();
    assert_eq!(rows.remaining(), 2);
    assert!(rows.next_row().is_some());
    assert_eq!(reporter.kinds(), ["execution"]);
}

#[tokio::test]
async fn test_cancelled_call_closes_connection() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let conn = connect(addr).await;

    let cancelled =
        tokio::time::timeout(Duration::from_millis(50), conn.query(SLOW_QUERY, &[])).await;
    assert!(cancelled.is_err());

    // The slow response is still owed on the socket; it must never surface
    // as the answer to a later call.
    assert_eq!(
        conn.query(ECHO_QUERY, &[Value::Int64(42)]).await.unwrap_err(),
        DriverError::ConnectionError("connection closed".to_string())
    );
    assert!(conn.is_closed().await);

    // A fresh connection is unaffected.
    let fresh = connect(addr).await;
    let mut rows = fresh.query(ECHO_QUERY, &[Value::Int64(42)]).await.unwrap();
    assert_eq!(rows.next_row().unwrap().get(0), Some(&Value::Int64(42)));
}

// ============================================================================
// Protocol Violations
// ============================================================================

#[tokio::test]
async fn test_unknown_opcode_closes_connection() {
    let (addr, reporter) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&frame(&[0x42, 0x80])).await.unwrap();
    assert_eq!(error_kind(read_response(&mut stream).await), "unknown_opcode");
    assert!(read_response(&mut stream).await.is_none());
    assert_eq!(reporter.kinds(), ["unknown_opcode"]);
}

#[tokio::test]
async fn test_empty_payload_closes_connection() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&frame(&[])).await.unwrap();
    assert_eq!(error_kind(read_response(&mut stream).await), "unknown_opcode");
    assert!(read_response(&mut stream).await.is_none());
}

#[tokio::test]
async fn test_response_opcode_rejected() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(&frame(&[0x81, 0x80])).await.unwrap();
    assert_eq!(
        error_kind(read_response(&mut stream).await),
        "unexpected_opcode"
    );
    assert!(read_response(&mut stream).await.is_none());
}

#[tokio::test]
async fn test_malformed_body_closes_connection() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // 0xc1 is never valid MessagePack.
    stream.write_all(&frame(&[0x01, 0xc1])).await.unwrap();
    assert_eq!(error_kind(read_response(&mut stream).await), "malformed_body");
    assert!(read_response(&mut stream).await.is_none());
}

#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let config = test_config().with_max_frame_size(1024);
    let (addr, _) = spawn_server(FakeBackend::new(), config).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // Only the length prefix is sent; the server must not wait for the body.
    stream.write_all(&4096u32.to_be_bytes()).await.unwrap();
    assert_eq!(error_kind(read_response(&mut stream).await), "frame_too_large");
    assert!(read_response(&mut stream).await.is_none());
}

#[tokio::test]
async fn test_oversized_request_closes_client() {
    let config = test_config().with_max_frame_size(256);
    let (addr, _) = spawn_server(FakeBackend::new(), config).await;
    let conn = connect(addr).await;

    let err = conn
        .query(ECHO_QUERY, &[Value::from("x".repeat(1024))])
        .await
        .unwrap_err();
    // The server may reset the socket before its error response is read.
    match &err {
        DriverError::ProtocolError(ProtocolErrorKind::PeerRejected { kind, .. }) => {
            assert_eq!(kind, "frame_too_large")
        }
        DriverError::ConnectionError(_) => {}
        other => panic!("expected rejection, got {:?}", other),
    }
    assert!(err.is_fatal());
    assert!(conn.is_closed().await);
}

#[derive(Serialize)]
struct RawValue {
    #[serde(rename = "type")]
    tag: &'static str,
    value: &'static str,
}

#[derive(Serialize)]
struct RawQuery {
    text: &'static str,
    args: Vec<RawValue>,
}

#[tokio::test]
async fn test_type_coercion_keeps_connection() {
    let (addr, reporter) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut payload = vec![0x01];
    payload.extend(
        rmp_serde::to_vec_named(&RawQuery {
            text: ECHO_QUERY,
            args: vec![RawValue {
                tag: "uuid",
                value: "0b7e7c52-53a4-4c1b-9bd6-0c6c5f1b2a7e",
            }],
        })
        .unwrap(),
    );
    stream.write_all(&frame(&payload)).await.unwrap();
    assert_eq!(error_kind(read_response(&mut stream).await), "type_coercion");

    let request = Request::query(USERS_QUERY, vec![]);
    stream
        .write_all(&frame(&encode_request(&request).unwrap()))
        .await
        .unwrap();
    match read_response(&mut stream).await {
        Some(Response::Query(resp)) => assert_eq!(resp.rows.len(), 2),
        other => panic!("expected query response, got {:?}", other),
    }

    assert_eq!(reporter.kinds(), ["type_coercion"]);
}

#[tokio::test]
async fn test_type_coercion_maps_to_argument_error() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let mut payload = vec![0x02];
    payload.extend(
        rmp_serde::to_vec_named(&RawQuery {
            text: UPDATE_NAME,
            args: vec![RawValue {
                tag: "int64",
                value: "not a number",
            }],
        })
        .unwrap(),
    );
    stream.write_all(&frame(&payload)).await.unwrap();

    match read_response(&mut stream).await {
        Some(Response::Error(err)) => assert!(matches!(
            err.into_error(),
            DriverError::ArgumentError(ArgumentErrorKind::TypeCoercion(_))
        )),
        other => panic!("expected error response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_survives_bad_client() {
    let (addr, _) = spawn_server(FakeBackend::new(), test_config()).await;

    let mut bad = TcpStream::connect(addr).await.unwrap();
    bad.write_all(&frame(&[0x7f])).await.unwrap();
    assert_eq!(error_kind(read_response(&mut bad).await), "unknown_opcode");

    let conn = connect(addr).await;
    assert!(conn.query(USERS_QUERY, &[]).await.is_ok());
}

#[tokio::test]
async fn test_shared_backend_across_connections() {
    let backend = FakeBackend::new();
    let (addr, _) = spawn_server(backend.clone(), test_config()).await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        tasks.push(tokio::spawn(async move {
            let conn = connect(addr).await;
            conn.exec(UPDATE_NAME, &[Value::from("Bob"), Value::Int64(1)])
                .await
                .unwrap()
                .rows_affected()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }

    assert_eq!(backend.calls().len(), 4);
}
