//! Error types for ssh-remote

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for ssh-remote
#[derive(Debug, Error)]
pub enum Error {
    /// Private key file could not be read
    #[error("Failed to read private key {path}: {source}")]
    KeyRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Private key could not be parsed
    #[error("Failed to parse private key: {0}")]
    KeyParse(String),

    /// TCP connection failed or timed out
    #[error("Failed to connect to {addr}: {reason}")]
    Dial { addr: String, reason: String },

    /// SSH negotiation or authentication failed
    #[error("SSH handshake with {addr} failed: {reason}")]
    Handshake { addr: String, reason: String },

    /// Handshake did not finish before the connection deadline
    #[error("SSH handshake with {addr} did not complete within {timeout_ms}ms")]
    Deadline { addr: String, timeout_ms: u64 },

    /// Session channel could not be opened
    #[error("Failed to open session: {0}")]
    SessionOpen(String),

    /// Remote command failed; `output` holds whatever it wrote before failing
    #[error("Remote command failed: {reason}")]
    RemoteCommand {
        reason: String,
        exit_status: Option<u32>,
        exit_signal: Option<String>,
        output: Vec<u8>,
    },

    /// Operation not allowed in the connection's current state
    #[error("Invalid connection state: {0}")]
    InvalidState(String),

    /// File name or permission would corrupt the copy control line
    #[error("Invalid transfer parameters: {0}")]
    InvalidTransfer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a dial error
    pub fn dial(addr: impl Into<String>, reason: impl ToString) -> Self {
        Error::Dial {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a handshake error
    pub fn handshake(addr: impl Into<String>, reason: impl ToString) -> Self {
        Error::Handshake {
            addr: addr.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a session open error
    pub fn session_open(msg: impl Into<String>) -> Self {
        Error::SessionOpen(msg.into())
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Create an invalid transfer error
    pub fn invalid_transfer(msg: impl Into<String>) -> Self {
        Error::InvalidTransfer(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Output captured from the remote side before a `RemoteCommand` failure
    pub fn output(&self) -> Option<&[u8]> {
        match self {
            Error::RemoteCommand { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Remote exit status, when the failure carried one
    pub fn exit_status(&self) -> Option<u32> {
        match self {
            Error::RemoteCommand { exit_status, .. } => *exit_status,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::dial("10.0.0.1:22", "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to connect to 10.0.0.1:22: connection refused"
        );

        let err = Error::Deadline {
            addr: "host:22".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "SSH handshake with host:22 did not complete within 5000ms"
        );
    }

    #[test]
    fn test_remote_command_keeps_output() {
        let err = Error::RemoteCommand {
            reason: "exit status 1".to_string(),
            exit_status: Some(1),
            exit_signal: None,
            output: b"partial".to_vec(),
        };
        assert_eq!(err.output(), Some(&b"partial"[..]));
        assert_eq!(err.exit_status(), Some(1));
        assert_eq!(err.to_string(), "Remote command failed: exit status 1");
    }

    #[test]
    fn test_output_absent_for_other_errors() {
        let err = Error::session_open("channel refused");
        assert!(err.output().is_none());
        assert!(err.exit_status().is_none());
    }
}
