//! sqlproxy Rust client
//!
//! Driver for the sqlproxy remote SQL executor. Statements are sent over a
//! plain TCP connection and executed by the server against its database;
//! results come back fully buffered.
//!
//! # Example
//!
//! ```rust,no_run
//! use sqlproxy_client::{ProxyConnection, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sqlproxy_client::DriverError> {
//!     let conn = ProxyConnection::connect("127.0.0.1:8888").await?;
//!
//!     let result = conn
//!         .exec("UPDATE users SET name = ? WHERE id = ?", &["Bob".into(), 1.into()])
//!         .await?;
//!     println!("updated {} rows", result.rows_affected());
//!
//!     let rows = conn.query("SELECT id, name FROM users", &[]).await?;
//!     for row in rows {
//!         println!("{:?}", row.get_by_name("name"));
//!     }
//!
//!     conn.close().await
//! }
//! ```

pub mod blocking;
pub mod client;
pub mod driver;
pub mod protocol;

pub use client::{ConnectionBuilder, ExecOutcome, ProxyConnection, ProxyRows, ProxyStatement, Row};
pub use driver::SqlProxyDriver;
pub use protocol::{DriverError, Value};
