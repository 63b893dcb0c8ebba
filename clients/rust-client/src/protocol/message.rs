//! Request and response envelopes.
//!
//! Every frame payload starts with a one byte opcode followed by a
//! MessagePack body with named fields:
//!
//! | opcode | body            |
//! |--------|-----------------|
//! | `0x01` | `QueryRequest`  |
//! | `0x02` | `ExecRequest`   |
//! | `0x81` | `QueryResponse` |
//! | `0x82` | `ExecResponse`  |
//! | `0xFF` | `ErrorResponse` |
//!
//! The opcode is the only thing that separates a read from a write; the SQL
//! text is never inspected.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};

use super::error::{kind, DriverError, ProtocolErrorKind};
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Query = 0x01,
    Exec = 0x02,
    QueryResponse = 0x81,
    ExecResponse = 0x82,
    Error = 0xFF,
}

impl Opcode {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// The success response that answers this request opcode.
    pub fn response(self) -> Option<Opcode> {
        match self {
            Opcode::Query => Some(Opcode::QueryResponse),
            Opcode::Exec => Some(Opcode::ExecResponse),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = DriverError;

    fn try_from(byte: u8) -> Result<Self, DriverError> {
        match byte {
            0x01 => Ok(Opcode::Query),
            0x02 => Ok(Opcode::Exec),
            0x81 => Ok(Opcode::QueryResponse),
            0x82 => Ok(Opcode::ExecResponse),
            0xFF => Ok(Opcode::Error),
            other => Err(DriverError::ProtocolError(ProtocolErrorKind::UnknownOpcode(
                other,
            ))),
        }
    }
}

/// Whether a request reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecRequest {
    pub text: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Query(QueryRequest),
    Exec(ExecRequest),
}

impl Request {
    pub fn query(text: impl Into<String>, args: Vec<Value>) -> Self {
        Request::Query(QueryRequest {
            text: text.into(),
            args,
        })
    }

    pub fn exec(text: impl Into<String>, args: Vec<Value>) -> Self {
        Request::Exec(ExecRequest {
            text: text.into(),
            args,
        })
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Query(_) => Opcode::Query,
            Request::Exec(_) => Opcode::Exec,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            Request::Query(_) => RequestKind::Read,
            Request::Exec(_) => RequestKind::Write,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Request::Query(req) => &req.text,
            Request::Exec(req) => &req.text,
        }
    }
}

/// Fully materialized result set. Every row holds exactly `columns.len()`
/// values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Outcome of a write. Fields the backing engine cannot report are 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecResponse {
    pub rows_affected: i64,
    pub last_insert_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Rebuild the typed error the peer reported.
    pub fn into_error(self) -> DriverError {
        match self.kind.as_str() {
            kind::TYPE_COERCION => DriverError::type_coercion(self.message),
            kind::UNSUPPORTED => DriverError::UnsupportedOperation(self.message),
            kind::INCOMPLETE_FRAME
            | kind::FRAME_TOO_LARGE
            | kind::UNKNOWN_OPCODE
            | kind::UNEXPECTED_OPCODE
            | kind::MALFORMED_BODY => {
                DriverError::ProtocolError(ProtocolErrorKind::PeerRejected {
                    kind: self.kind,
                    message: self.message,
                })
            }
            // execution, timeout, result_too_large and anything newer
            _ => DriverError::ExecutionError(self.message),
        }
    }
}

impl From<&DriverError> for ErrorResponse {
    fn from(err: &DriverError) -> Self {
        ErrorResponse::new(err.kind(), err.detail())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Query(QueryResponse),
    Exec(ExecResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn opcode(&self) -> Opcode {
        match self {
            Response::Query(_) => Opcode::QueryResponse,
            Response::Exec(_) => Opcode::ExecResponse,
            Response::Error(_) => Opcode::Error,
        }
    }

    pub fn error(err: &DriverError) -> Self {
        Response::Error(ErrorResponse::from(err))
    }
}

/// Body shape of a request with the values left uninterpreted.
#[derive(Deserialize)]
#[allow(dead_code)]
struct StatementEnvelope {
    text: String,
    args: Vec<IgnoredAny>,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct RowsetEnvelope {
    columns: Vec<String>,
    rows: Vec<Vec<IgnoredAny>>,
}

/// Split a request payload into its kind and body.
///
/// Only the opcode byte is consulted. Response opcodes are rejected as
/// unexpected, anything else as unknown.
pub fn classify(payload: &[u8]) -> Result<(RequestKind, &[u8]), DriverError> {
    let (&first, body) = payload
        .split_first()
        .ok_or(DriverError::ProtocolError(ProtocolErrorKind::UnknownOpcode(0)))?;

    match Opcode::try_from(first)? {
        Opcode::Query => Ok((RequestKind::Read, body)),
        Opcode::Exec => Ok((RequestKind::Write, body)),
        other => Err(DriverError::ProtocolError(
            ProtocolErrorKind::UnexpectedOpcode(other.as_byte()),
        )),
    }
}

fn encode_body<T: Serialize>(opcode: Opcode, body: &T) -> Result<Vec<u8>, DriverError> {
    let mut payload = vec![opcode.as_byte()];
    rmp_serde::encode::write_named(&mut payload, body)
        .map_err(|e| DriverError::malformed(format!("Serialization failed: {}", e)))?;
    Ok(payload)
}

/// Decode `body` as `T`. When that fails but the envelope `E` (same shape,
/// values ignored) decodes, the fault lies in a value and is reported as a
/// type coercion error rather than a malformed body.
fn decode_body<T, E>(body: &[u8]) -> Result<T, DriverError>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    rmp_serde::from_slice::<T>(body).map_err(|err| {
        if rmp_serde::from_slice::<E>(body).is_ok() {
            DriverError::type_coercion(err.to_string())
        } else {
            DriverError::malformed(format!("Deserialization failed: {}", err))
        }
    })
}

pub fn encode_request(request: &Request) -> Result<Vec<u8>, DriverError> {
    match request {
        Request::Query(req) => encode_body(Opcode::Query, req),
        Request::Exec(req) => encode_body(Opcode::Exec, req),
    }
}

pub fn decode_request(payload: &[u8]) -> Result<Request, DriverError> {
    match classify(payload)? {
        (RequestKind::Read, body) => {
            decode_body::<QueryRequest, StatementEnvelope>(body).map(Request::Query)
        }
        (RequestKind::Write, body) => {
            decode_body::<ExecRequest, StatementEnvelope>(body).map(Request::Exec)
        }
    }
}

pub fn encode_response(response: &Response) -> Result<Vec<u8>, DriverError> {
    match response {
        Response::Query(resp) => encode_body(Opcode::QueryResponse, resp),
        Response::Exec(resp) => encode_body(Opcode::ExecResponse, resp),
        Response::Error(resp) => encode_body(Opcode::Error, resp),
    }
}

pub fn decode_response(payload: &[u8]) -> Result<Response, DriverError> {
    let (&first, body) = payload
        .split_first()
        .ok_or(DriverError::ProtocolError(ProtocolErrorKind::UnknownOpcode(0)))?;

    match Opcode::try_from(first)? {
        Opcode::QueryResponse => {
            let resp: QueryResponse = decode_body::<_, RowsetEnvelope>(body)?;
            let width = resp.columns.len();
            if let Some(idx) = resp.rows.iter().position(|row| row.len() != width) {
                return Err(DriverError::malformed(format!(
                    "row {} has {} values, expected {}",
                    idx,
                    resp.rows[idx].len(),
                    width
                )));
            }
            Ok(Response::Query(resp))
        }
        Opcode::ExecResponse => {
            rmp_serde::from_slice(body)
                .map(Response::Exec)
                .map_err(|e| DriverError::malformed(format!("Deserialization failed: {}", e)))
        }
        Opcode::Error => rmp_serde::from_slice(body)
            .map(Response::Error)
            .map_err(|e| DriverError::malformed(format!("Deserialization failed: {}", e))),
        other => Err(DriverError::ProtocolError(
            ProtocolErrorKind::UnexpectedOpcode(other.as_byte()),
        )),
    }
}
