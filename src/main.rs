//! ssh-remote - Entry point
//!
//! Parses CLI arguments, builds the credential context, opens one
//! connection, runs the requested operation and closes the connection.

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use ssh_remote::config::{Action, Args, Config, OutputFormat};
use ssh_remote::error::{Error, Result};
use ssh_remote::ssh::{Connection, Context};

/// JSON report of an exec run
#[derive(Debug, Serialize)]
struct ExecReport<'a> {
    host: &'a str,
    command: &'a str,
    exit_status: Option<u32>,
    exit_signal: Option<&'a str>,
    output: String,
}

/// JSON report of a copy
#[derive(Debug, Serialize)]
struct CopyReport<'a> {
    host: &'a str,
    remote_dir: &'a str,
    name: &'a str,
    mode: &'a str,
    bytes: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_args(args)?;

    // Logs go to stderr; stdout carries command output
    FmtSubscriber::builder()
        .with_max_level(if config.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    info!("ssh-remote v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut ctx = match &config.passphrase {
        Some(passphrase) => {
            Context::with_passphrase(&config.key, passphrase, &config.user, config.timeout)?
        }
        None => Context::new(&config.key, &config.user, config.timeout)?,
    }
    .with_scp_command(&config.scp_command);
    if let Some(limit) = config.operation_timeout {
        ctx = ctx.with_operation_timeout(limit);
    }

    let addr = config.address();
    let conn = ctx.open(addr.as_str()).await?;

    let result = run(&config, &conn, &addr).await;

    if let Err(e) = conn.close().await {
        error!("Closing connection to {} failed: {}", addr, e);
    }

    let code = result?;
    if code != 0 {
        std::process::exit(code);
    }

    info!("ssh-remote finished");
    Ok(())
}

/// Run the configured action, returning the process exit code
async fn run(config: &Config, conn: &Connection, addr: &str) -> Result<i32> {
    match &config.action {
        Action::Exec { command } => {
            let output = conn.exec_output(command).await?;

            match config.format {
                OutputFormat::Text => {
                    print!("{}", output.output_lossy());
                }
                OutputFormat::Json => {
                    let report = ExecReport {
                        host: addr,
                        command,
                        exit_status: output.exit_status,
                        exit_signal: output.exit_signal.as_deref(),
                        output: output.output_lossy(),
                    };
                    print_json(&report)?;
                }
            }

            if output.success() {
                Ok(0)
            } else {
                error!(
                    "Command exited with status {:?} signal {:?}",
                    output.exit_status, output.exit_signal
                );
                Ok(output
                    .exit_status
                    .and_then(|s| i32::try_from(s).ok())
                    .filter(|s| *s != 0)
                    .unwrap_or(1))
            }
        }
        Action::Copy {
            local,
            remote_dir,
            name,
            mode,
        } => {
            let data = tokio::fs::read(local).await.map_err(|e| {
                error!("Read {} failed: {}", local.display(), e);
                Error::Io(e)
            })?;
            let bytes = data.len();

            conn.copy(data, name, remote_dir, mode).await?;
            info!("Copied {} ({} bytes) to {}:{}", name, bytes, addr, remote_dir);

            if config.format == OutputFormat::Json {
                print_json(&CopyReport {
                    host: addr,
                    remote_dir,
                    name,
                    mode,
                    bytes,
                })?;
            }

            Ok(0)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    println!("{}", text);
    Ok(())
}
