//! SSH client handler implementation
//!
//! Implements the `russh::client::Handler` trait to handle SSH connection events.

use russh::keys::ssh_key::HashAlg;
use tracing::debug;

/// SSH client handler for russh
///
/// Accepts every server host key and logs its fingerprint. Host key
/// verification is left to the caller's network setup.
#[derive(Debug, Clone)]
pub struct SshHandler {
    /// Address being connected to, for log context
    addr: String,
}

impl SshHandler {
    /// Create a new SSH handler for `addr`
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl russh::client::Handler for SshHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(
            "Server {} presented host key {}",
            self.addr,
            server_public_key.fingerprint(HashAlg::Sha256)
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_creation() {
        let handler = SshHandler::new("10.0.0.5:22");
        assert_eq!(handler.addr(), "10.0.0.5:22");
        assert!(format!("{:?}", handler).contains("SshHandler"));
    }
}
