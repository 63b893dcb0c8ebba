pub mod backend;
pub mod config;
pub mod driver;
pub mod error;
pub mod server;

pub use backend::{Backend, SqliteBackend};
pub use config::ServerConfig;
pub use driver::{DriverHandler, ErrorReporter, SilentReporter, TracingReporter};
pub use error::{BackendError, BackendResult, ServerError};
pub use server::Server;
