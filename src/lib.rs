//! ssh-remote - run commands and push files on remote hosts over SSH
//!
//! A thin layer over `russh`: build a credential [`Context`] from a private
//! key once, open a [`Connection`] per host, then run commands or push
//! in-memory buffers with the SCP protocol.
//!
//! # Features
//!
//! - Public-key authentication from an OpenSSH/PEM key file
//! - Dial and handshake bounded by a configurable timeout
//! - `exec`: combined stdout/stderr, partial output kept on failure
//! - `copy`: single-file SCP push of an in-memory buffer
//! - Explicit connection lifecycle (`Unopened`, `Open`, `Closed`)
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use ssh_remote::Context;
//!
//! # async fn run() -> ssh_remote::Result<()> {
//! let ctx = Context::new("/home/me/.ssh/id_ed25519", "deploy", Duration::from_secs(5))?;
//! let conn = ctx.open("10.0.0.7:22").await?;
//!
//! let uptime = conn.exec("uptime").await?;
//! println!("{}", String::from_utf8_lossy(&uptime));
//!
//! conn.copy(b"hello".to_vec(), "greeting.txt", "/tmp", "0644").await?;
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ssh;

// Re-exports for convenience
pub use config::{Args, Config, DEFAULT_SCP_COMMAND, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use ssh::{CommandOutput, Connection, ConnectionState, Context};
