//! SSH remote-execution primitives
//!
//! A [`Context`] holds the credentials, a [`Connection`] is one authenticated
//! transport to one host, and `exec`/`copy` each run in their own short-lived
//! session on that connection.

pub mod command;
pub mod connection;
pub mod context;
pub mod handler;
pub mod sanitize;
pub mod scp;

// Re-exports
pub use command::CommandOutput;
pub use connection::{Connection, ConnectionState};
pub use context::Context;
pub use handler::SshHandler;
pub use sanitize::{quote_remote_path, sanitize_command, validate_file_name, validate_permission};
pub use scp::{control_line, write_transfer};
