//! Blocking facade over the async driver.
//!
//! Each handle owns (a share of) a private tokio runtime and blocks the
//! calling thread until the server answers. Do not use these types from
//! inside an async context; `block_on` panics there.

use std::sync::Arc;
use tokio::runtime::Runtime;

use crate::client::{ConnectionBuilder, ExecOutcome, ProxyConnection, ProxyRows, ProxyStatement};
use crate::protocol::{DriverError, Value};

#[derive(Clone)]
pub struct Connection {
    inner: ProxyConnection,
    runtime: Arc<Runtime>,
}

fn runtime() -> Result<Runtime, DriverError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("sqlproxy-client")
        .enable_all()
        .build()
        .map_err(|e| DriverError::ConnectionError(format!("Failed to start runtime: {}", e)))
}

impl Connection {
    pub fn connect(addr: &str) -> Result<Self, DriverError> {
        Self::connect_with(ConnectionBuilder::new(addr))
    }

    pub fn connect_with(builder: ConnectionBuilder) -> Result<Self, DriverError> {
        let runtime = runtime()?;
        let inner = runtime.block_on(builder.build())?;
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    pub fn prepare(&self, text: impl Into<String>) -> Statement {
        Statement {
            inner: self.inner.prepare(text),
            runtime: Arc::clone(&self.runtime),
        }
    }

    pub fn begin(&self) -> Result<(), DriverError> {
        self.inner.begin()
    }

    pub fn query(&self, text: &str, args: &[Value]) -> Result<ProxyRows, DriverError> {
        self.runtime.block_on(self.inner.query(text, args))
    }

    pub fn exec(&self, text: &str, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.runtime.block_on(self.inner.exec(text, args))
    }

    pub fn close(&self) -> Result<(), DriverError> {
        self.runtime.block_on(self.inner.close())
    }
}

pub struct Statement {
    inner: ProxyStatement,
    runtime: Arc<Runtime>,
}

impl Statement {
    pub fn text(&self) -> &str {
        self.inner.text()
    }

    pub fn query(&self, args: &[Value]) -> Result<ProxyRows, DriverError> {
        self.runtime.block_on(self.inner.query(args))
    }

    pub fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.runtime.block_on(self.inner.exec(args))
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}
