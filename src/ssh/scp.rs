//! Single-file push over the SCP protocol
//!
//! The remote side runs the receiver (`scp -qrt <dir>` by default). A
//! dedicated writer task feeds it, in order:
//!
//! ```text
//! C<permission> <length> <file name>\n
//! <length bytes of payload>
//! \0
//! ```
//!
//! then shuts its half of the stream down, while the calling task waits for
//! the receiver to exit.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::command::{collect_output, CommandOutput};
use super::connection::Connection;
use super::sanitize::{
    quote_remote_path, validate_file_name, validate_permission, validate_remote_dir,
};
use crate::error::{Error, Result};

/// End-of-transfer marker following the payload
pub const END_OF_TRANSFER: u8 = 0;

/// How long to wait for the writer task once the receiver has exited
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Build the control line announcing a file
///
/// ```
/// use ssh_remote::ssh::scp::control_line;
///
/// assert_eq!(control_line("0644", 5, "greeting.txt"), "C0644 5 greeting.txt\n");
/// ```
pub fn control_line(permission: &str, len: usize, file_name: &str) -> String {
    format!("C{} {} {}\n", permission, len, file_name)
}

/// Write control line, payload and terminator into `writer`
pub async fn write_transfer<W>(
    writer: &mut W,
    data: &[u8],
    file_name: &str,
    permission: &str,
) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(control_line(permission, data.len(), file_name).as_bytes())
        .await?;
    writer.write_all(data).await?;
    writer.write_all(&[END_OF_TRANSFER]).await?;
    writer.flush().await
}

/// Drop the protocol status bytes (`\0` acks, `\x01`/`\x02` error markers)
/// from the receiver's output, leaving its messages
fn receiver_message(output: &[u8]) -> String {
    let text: Vec<u8> = output
        .iter()
        .copied()
        .filter(|b| !matches!(b, 0 | 1 | 2))
        .collect();
    String::from_utf8_lossy(&text).trim().to_string()
}

impl Connection {
    /// Push `data` to `remote_dir/file_name` with mode `permission`
    ///
    /// The receiver is the context's scp command followed by `remote_dir`.
    /// File name, permission and directory are validated first, since they
    /// are interpolated into the control line and the receiver command.
    ///
    /// # Errors
    /// * `Error::InvalidTransfer` - parameters would corrupt the protocol
    /// * `Error::InvalidState` - the connection is not open
    /// * `Error::SessionOpen` - the session channel could not be opened
    /// * `Error::RemoteCommand` - the receiver failed or the write broke
    pub async fn copy(
        &self,
        data: impl Into<Vec<u8>>,
        file_name: &str,
        remote_dir: &str,
        permission: &str,
    ) -> Result<()> {
        validate_file_name(file_name)
            .and_then(|_| validate_permission(permission))
            .and_then(|_| validate_remote_dir(remote_dir))
            .inspect_err(|e| error!("Copy to {} rejected: {}", self.address(), e))?;

        let data = data.into();
        let (mut channel, settings) = self.open_session().await?;
        let op_timeout = settings.operation_timeout;

        let command = format!(
            "{} {}",
            settings.scp_command.trim_end(),
            quote_remote_path(remote_dir)
        );
        debug!(
            "Copying {} bytes as {}/{} to {} via '{}'",
            data.len(),
            remote_dir,
            file_name,
            self.address(),
            command
        );

        if let Err(e) = channel.exec(true, command.as_str()).await {
            let _ = channel.close().await;
            error!("Start receiver on {} failed: {}", self.address(), e);
            return Err(Error::RemoteCommand {
                reason: format!("failed to start receiver: {}", e),
                exit_status: None,
                exit_signal: None,
                output: Vec::new(),
            });
        }

        let mut writer = channel.make_writer();
        let file = file_name.to_string();
        let mode = permission.to_string();
        let mut writer_task = tokio::spawn(async move {
            let result = write_transfer(&mut writer, &data, &file, &mode).await;
            // EOF tells the receiver nothing else follows, even after a failed write
            if let Err(e) = writer.shutdown().await {
                debug!("Closing copy stream failed: {}", e);
            }
            result
        });

        let mut output = CommandOutput::new();
        let timed_out = match op_timeout {
            None => {
                collect_output(&mut channel, &mut output).await;
                false
            }
            Some(limit) => timeout(limit, collect_output(&mut channel, &mut output))
                .await
                .is_err(),
        };
        let _ = channel.close().await;

        let write_result = match timeout(WRITER_GRACE, &mut writer_task).await {
            Ok(Ok(result)) => result.map_err(|e| e.to_string()),
            Ok(Err(join_err)) => Err(join_err.to_string()),
            Err(_) => {
                writer_task.abort();
                Err("writer did not finish after receiver exited".to_string())
            }
        };

        let failure = if timed_out {
            Some(format!(
                "timed out after {}ms",
                op_timeout.unwrap_or_default().as_millis()
            ))
        } else if !output.success() {
            let message = receiver_message(&output.output);
            let status = match (&output.exit_signal, output.exit_status) {
                (Some(signal), _) => format!("receiver killed by signal {}", signal),
                (None, Some(status)) => format!("receiver exit status {}", status),
                (None, None) => "receiver closed without exit status".to_string(),
            };
            Some(if message.is_empty() {
                status
            } else {
                format!("{}: {}", status, message)
            })
        } else if let Err(e) = &write_result {
            Some(format!("payload write failed: {}", e))
        } else {
            None
        };

        if let Err(e) = &write_result {
            warn!("Copy writer to {} ended with: {}", self.address(), e);
        }

        match failure {
            None => {
                debug!("Copied {} to {}:{}", file_name, self.address(), remote_dir);
                Ok(())
            }
            Some(reason) => {
                error!(
                    "Copy of {} to {}:{} failed: {}",
                    file_name,
                    self.address(),
                    remote_dir,
                    reason
                );
                Err(Error::RemoteCommand {
                    reason,
                    exit_status: output.exit_status,
                    exit_signal: output.exit_signal,
                    output: output.output,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_line() {
        assert_eq!(control_line("0644", 5, "greeting.txt"), "C0644 5 greeting.txt\n");
        assert_eq!(control_line("0755", 0, "empty"), "C0755 0 empty\n");
    }

    #[tokio::test]
    async fn test_write_transfer_framing() {
        let mut wire: Vec<u8> = Vec::new();
        write_transfer(&mut wire, b"hello", "greeting.txt", "0644")
            .await
            .unwrap();

        assert_eq!(wire, b"C0644 5 greeting.txt\nhello\0");
    }

    #[tokio::test]
    async fn test_write_transfer_binary_payload() {
        let payload: Vec<u8> = (0..=255u8).collect();
        let mut wire: Vec<u8> = Vec::new();
        write_transfer(&mut wire, &payload, "blob.bin", "0600")
            .await
            .unwrap();

        let header = b"C0600 256 blob.bin\n";
        assert_eq!(&wire[..header.len()], header);
        assert_eq!(&wire[header.len()..header.len() + 256], &payload[..]);
        assert_eq!(wire.len(), header.len() + 256 + 1);
        assert_eq!(wire.last(), Some(&END_OF_TRANSFER));
    }

    #[tokio::test]
    async fn test_write_transfer_through_pipe() {
        // Small pipe forces the reader and writer to interleave
        let (mut tx, mut rx) = tokio::io::duplex(8);
        let payload = vec![b'x'; 1024];

        let writer = tokio::spawn(async move {
            write_transfer(&mut tx, &payload, "big.txt", "0644").await.unwrap();
            tx.shutdown().await.unwrap();
        });

        let mut wire = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut rx, &mut wire)
            .await
            .unwrap();
        writer.await.unwrap();

        assert!(wire.starts_with(b"C0644 1024 big.txt\n"));
        assert_eq!(wire.len(), "C0644 1024 big.txt\n".len() + 1024 + 1);
        assert_eq!(wire.last(), Some(&0));
    }

    #[test]
    fn test_receiver_message() {
        assert_eq!(receiver_message(b"\0\0\0"), "");
        assert_eq!(
            receiver_message(b"\x01scp: /missing: No such file or directory\n"),
            "scp: /missing: No such file or directory"
        );
    }

    #[tokio::test]
    async fn test_copy_rejects_bad_file_name_before_connecting() {
        let conn = Connection::new("127.0.0.1:22");
        let err = conn
            .copy(b"x".to_vec(), "a\nb", "/tmp", "0644")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer(_)));
    }

    #[tokio::test]
    async fn test_copy_rejects_bad_permission() {
        let conn = Connection::new("127.0.0.1:22");
        let err = conn
            .copy(&b"x"[..], "a.txt", "/tmp", "rw")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransfer(_)));
    }

    #[tokio::test]
    async fn test_copy_on_unopened_connection() {
        let conn = Connection::new("127.0.0.1:22");
        let err = conn
            .copy(b"hello".to_vec(), "greeting.txt", "/tmp", "0644")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }
}
