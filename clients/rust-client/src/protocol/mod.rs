//! Wire protocol definitions for the proxy driver
//!
//! Length-prefixed frames carrying an opcode byte and a MessagePack body.

pub mod codec;
pub mod error;
pub mod message;
pub mod value;

pub use codec::{encode_frame, read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
pub use error::{ArgumentErrorKind, DriverError, ProtocolErrorKind};
pub use message::{
    classify, decode_request, decode_response, encode_request, encode_response, ErrorResponse,
    ExecRequest, ExecResponse, Opcode, QueryRequest, QueryResponse, Request, RequestKind,
    Response,
};
pub use value::{decode_value, encode_value, Value};
