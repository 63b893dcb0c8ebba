//! Server side of the proxy protocol
//!
//! Every connection carries a strict request/response exchange:
//! - **Request Frame**: `[length: 4 bytes BE][opcode: 0x01 query | 0x02 exec][msgpack body]`
//! - **Response Frame**: `[length: 4 bytes BE][opcode: 0x81 | 0x82 | 0xFF error][msgpack body]`
//!
//! The wire types live in the client crate and are shared as-is.

pub use sqlproxy_client::protocol;

pub mod handler;
pub mod reporter;

pub use handler::DriverHandler;
pub use reporter::{ErrorReporter, SilentReporter, TracingReporter};
