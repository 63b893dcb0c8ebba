//! Generic data-access contract and its proxy implementation.
//!
//! Code written against these traits does not need to know that statements
//! are executed by a remote process:
//!
//! ```rust,no_run
//! use sqlproxy_client::driver::{Connection, Driver, Rows, Statement};
//! use sqlproxy_client::{DriverError, SqlProxyDriver, Value};
//!
//! async fn list_users<D: Driver>(driver: &D, addr: &str) -> Result<(), DriverError> {
//!     let conn = driver.open(addr).await?;
//!     let stmt = conn.prepare("SELECT id, name FROM users WHERE id > ?")?;
//!     let mut rows = stmt.query(&[Value::Int64(0)]).await?;
//!     while let Some(row) = rows.next_row() {
//!         println!("{:?}", row.values());
//!     }
//!     conn.close().await
//! }
//!
//! # async fn run() -> Result<(), DriverError> {
//! list_users(&SqlProxyDriver::default(), "127.0.0.1:8888").await
//! # }
//! ```

use async_trait::async_trait;

use crate::client::{
    ConnectionBuilder, ExecOutcome, ProxyConnection, ProxyRows, ProxyStatement, Row,
};
use crate::protocol::{DriverError, Value, DEFAULT_MAX_FRAME_SIZE};

#[async_trait]
pub trait Driver: Send + Sync {
    type Conn: Connection;

    async fn open(&self, addr: &str) -> Result<Self::Conn, DriverError>;
}

#[async_trait]
pub trait Connection: Send + Sync {
    type Stmt: Statement;

    fn prepare(&self, text: &str) -> Result<Self::Stmt, DriverError>;

    fn begin(&self) -> Result<(), DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait Statement: Send + Sync {
    type Rows: Rows;
    type Result: ExecResult;

    /// Number of placeholders, `None` when unknown.
    fn num_input(&self) -> Option<usize>;

    async fn query(&self, args: &[Value]) -> Result<Self::Rows, DriverError>;

    async fn exec(&self, args: &[Value]) -> Result<Self::Result, DriverError>;

    fn close(&mut self) -> Result<(), DriverError>;
}

pub trait Rows: Send {
    fn columns(&self) -> &[String];

    /// Next row, or `None` once exhausted (and on every call after that).
    fn next_row(&mut self) -> Option<Row>;

    fn close(&mut self) -> Result<(), DriverError>;
}

pub trait ExecResult: Send {
    fn rows_affected(&self) -> i64;

    fn last_insert_id(&self) -> i64;
}

/// Driver that opens connections to a proxy server.
#[derive(Debug, Clone)]
pub struct SqlProxyDriver {
    max_frame_size: usize,
    timeout_ms: Option<u64>,
}

impl Default for SqlProxyDriver {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            timeout_ms: None,
        }
    }
}

impl SqlProxyDriver {
    pub fn new(max_frame_size: usize, timeout_ms: Option<u64>) -> Self {
        Self {
            max_frame_size,
            timeout_ms,
        }
    }
}

#[async_trait]
impl Driver for SqlProxyDriver {
    type Conn = ProxyConnection;

    async fn open(&self, addr: &str) -> Result<ProxyConnection, DriverError> {
        let mut builder = ConnectionBuilder::new(addr).max_frame_size(self.max_frame_size);
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout_ms(ms);
        }
        builder.build().await
    }
}

#[async_trait]
impl Connection for ProxyConnection {
    type Stmt = ProxyStatement;

    fn prepare(&self, text: &str) -> Result<ProxyStatement, DriverError> {
        Ok(ProxyConnection::prepare(self, text))
    }

    fn begin(&self) -> Result<(), DriverError> {
        ProxyConnection::begin(self)
    }

    async fn close(&self) -> Result<(), DriverError> {
        ProxyConnection::close(self).await
    }
}

#[async_trait]
impl Statement for ProxyStatement {
    type Rows = ProxyRows;
    type Result = ExecOutcome;

    fn num_input(&self) -> Option<usize> {
        ProxyStatement::num_input(self)
    }

    async fn query(&self, args: &[Value]) -> Result<ProxyRows, DriverError> {
        ProxyStatement::query(self, args).await
    }

    async fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        ProxyStatement::exec(self, args).await
    }

    fn close(&mut self) -> Result<(), DriverError> {
        ProxyStatement::close(self);
        Ok(())
    }
}

impl Rows for ProxyRows {
    fn columns(&self) -> &[String] {
        ProxyRows::columns(self)
    }

    fn next_row(&mut self) -> Option<Row> {
        ProxyRows::next_row(self)
    }

    fn close(&mut self) -> Result<(), DriverError> {
        ProxyRows::close(self);
        Ok(())
    }
}

impl ExecResult for ExecOutcome {
    fn rows_affected(&self) -> i64 {
        ExecOutcome::rows_affected(self)
    }

    fn last_insert_id(&self) -> i64 {
        ExecOutcome::last_insert_id(self)
    }
}
