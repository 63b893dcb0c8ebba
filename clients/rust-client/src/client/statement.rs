use super::{ProxyConnection, ProxyRows};
use crate::protocol::{DriverError, ExecResponse, Request, Response, Value};

/// Result of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    rows_affected: i64,
    last_insert_id: i64,
}

impl ExecOutcome {
    /// Rows changed by the statement, 0 when the engine cannot tell.
    pub fn rows_affected(&self) -> i64 {
        self.rows_affected
    }

    /// Id of the inserted row, 0 when the engine cannot tell.
    pub fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }
}

impl From<ExecResponse> for ExecOutcome {
    fn from(resp: ExecResponse) -> Self {
        Self {
            rows_affected: resp.rows_affected,
            last_insert_id: resp.last_insert_id,
        }
    }
}

/// A query text bound to a connection. Holds no server-side state.
pub struct ProxyStatement {
    conn: ProxyConnection,
    text: String,
    closed: bool,
}

impl ProxyStatement {
    pub(crate) fn new(conn: ProxyConnection, text: String) -> Self {
        Self {
            conn,
            text,
            closed: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Placeholder count is not known locally; any number of arguments is
    /// forwarded as given.
    pub fn num_input(&self) -> Option<usize> {
        None
    }

    fn ensure_open(&self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::ExecutionError("statement is closed".to_string()));
        }
        Ok(())
    }

    /// Execute as a read and buffer every row.
    pub async fn query(&self, args: &[Value]) -> Result<ProxyRows, DriverError> {
        self.ensure_open()?;
        match self
            .conn
            .round_trip(&Request::query(self.text.clone(), args.to_vec()))
            .await?
        {
            Response::Query(resp) => Ok(ProxyRows::new(resp)),
            // round_trip only lets the matching response through
            other => Err(DriverError::malformed(format!(
                "unexpected response {:?}",
                other.opcode()
            ))),
        }
    }

    /// Execute as a write.
    pub async fn exec(&self, args: &[Value]) -> Result<ExecOutcome, DriverError> {
        self.ensure_open()?;
        match self
            .conn
            .round_trip(&Request::exec(self.text.clone(), args.to_vec()))
            .await?
        {
            Response::Exec(resp) => Ok(resp.into()),
            other => Err(DriverError::malformed(format!(
                "unexpected response {:?}",
                other.opcode()
            ))),
        }
    }

    /// Local only; safe to call repeatedly.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
