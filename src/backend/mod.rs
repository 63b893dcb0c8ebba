//! Backing engine capability.
//!
//! The dispatcher only ever talks to a database through [`Backend`]. Calls
//! are blocking and may come from many connection workers at once; an
//! implementation serializes or pools internally as it sees fit.

mod sqlite;

pub use sqlite::SqliteBackend;

use sqlproxy_client::protocol::{ExecResponse, QueryResponse, Value};

use crate::error::BackendResult;

pub trait Backend: Send + Sync {
    /// Run a read and materialize every row. Each row must hold exactly
    /// `columns.len()` values.
    fn query(&self, text: &str, args: &[Value]) -> BackendResult<QueryResponse>;

    /// Run a write. Counts the engine cannot report are returned as 0.
    fn execute(&self, text: &str, args: &[Value]) -> BackendResult<ExecResponse>;
}
