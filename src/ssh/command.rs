//! Command execution over SSH
//!
//! Provides the `CommandOutput` struct and the `exec` family of operations
//! on a [`Connection`].

use std::time::Duration;

use russh::client::Msg;
use russh::{Channel, ChannelMsg};
use tokio::time::timeout;
use tracing::{debug, error};

use super::connection::Connection;
use crate::error::{Error, Result};

/// Output from a command execution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Stdout and stderr interleaved in arrival order
    pub output: Vec<u8>,

    /// Exit status of the command (if reported)
    pub exit_status: Option<u32>,

    /// Signal that terminated the command (if any)
    pub exit_signal: Option<String>,
}

impl CommandOutput {
    /// Create a new empty CommandOutput
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the command succeeded (exit status 0, no signal)
    pub fn success(&self) -> bool {
        self.exit_signal.is_none() && self.exit_status == Some(0)
    }

    /// Combined output decoded lossily as UTF-8
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    /// Turn a non-successful run into `Error::RemoteCommand` carrying the output
    pub fn into_result(self) -> Result<Vec<u8>> {
        if self.success() {
            return Ok(self.output);
        }

        let reason = match (&self.exit_signal, self.exit_status) {
            (Some(signal), _) => format!("killed by signal {}", signal),
            (None, Some(status)) => format!("exit status {}", status),
            (None, None) => "channel closed without exit status".to_string(),
        };

        Err(Error::RemoteCommand {
            reason,
            exit_status: self.exit_status,
            exit_signal: self.exit_signal,
            output: self.output,
        })
    }
}

impl Connection {
    /// Run `command` and return its combined stdout/stderr
    ///
    /// A non-zero exit status is returned as `Error::RemoteCommand`; the
    /// output produced before the failure is available through
    /// [`Error::output`].
    ///
    /// # Errors
    /// * `Error::InvalidState` - the connection is not open
    /// * `Error::SessionOpen` - the session channel could not be opened
    /// * `Error::RemoteCommand` - the command failed or the channel broke
    pub async fn exec(&self, command: &str) -> Result<Vec<u8>> {
        let output = self.exec_output(command).await?;
        output.into_result().inspect_err(|e| {
            error!("Command '{}' on {} failed: {}", command, self.address(), e);
        })
    }

    /// Run `command` and return its output and exit status without
    /// interpreting the status
    pub async fn exec_output(&self, command: &str) -> Result<CommandOutput> {
        let (mut channel, settings) = self.open_session().await?;

        debug!("Executing '{}' on {}", command, self.address());
        let result = run_command(&mut channel, command, settings.operation_timeout).await;

        // Channel is closed on every exit path
        let _ = channel.close().await;

        result.inspect_err(|e| {
            error!("Command '{}' on {} failed: {}", command, self.address(), e);
        })
    }
}

/// Send the exec request and collect output, bounded by `op_timeout`
pub(crate) async fn run_command(
    channel: &mut Channel<Msg>,
    command: &str,
    op_timeout: Option<Duration>,
) -> Result<CommandOutput> {
    channel.exec(true, command).await.map_err(|e| Error::RemoteCommand {
        reason: format!("failed to start command: {}", e),
        exit_status: None,
        exit_signal: None,
        output: Vec::new(),
    })?;

    let mut output = CommandOutput::new();
    match op_timeout {
        None => collect_output(channel, &mut output).await,
        Some(limit) => {
            if timeout(limit, collect_output(channel, &mut output))
                .await
                .is_err()
            {
                return Err(Error::RemoteCommand {
                    reason: format!("timed out after {}ms", limit.as_millis()),
                    exit_status: None,
                    exit_signal: None,
                    output: output.output,
                });
            }
        }
    }

    debug!(
        "Command completed: exit_status={:?}, exit_signal={:?}, output_len={}",
        output.exit_status,
        output.exit_signal,
        output.output.len()
    );

    Ok(output)
}

/// Collect channel messages into `output` until the channel closes
///
/// Exit status may arrive before or after EOF, so the loop runs until the
/// channel is gone rather than stopping at EOF.
pub(crate) async fn collect_output(channel: &mut Channel<Msg>, output: &mut CommandOutput) {
    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => {
                output.output.extend_from_slice(&data);
            }
            ChannelMsg::ExtendedData { data, ext } => {
                // ext == 1 is stderr
                if ext == 1 {
                    output.output.extend_from_slice(&data);
                }
            }
            ChannelMsg::ExitStatus { exit_status } => {
                output.exit_status = Some(exit_status);
            }
            ChannelMsg::ExitSignal { signal_name, .. } => {
                output.exit_signal = Some(format!("{:?}", signal_name));
            }
            ChannelMsg::Close => {
                break;
            }
            _ => {}
        }
    }
}
