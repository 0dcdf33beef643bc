//! Configuration and CLI argument parsing for ssh-remote

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::{Error, Result};
use crate::ssh::sanitize::{sanitize_command, validate_file_name, validate_permission};

/// Default dial and handshake timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default remote receiver for copy; the destination directory is appended
pub const DEFAULT_SCP_COMMAND: &str = "/usr/bin/scp -qrt";

/// Default mode of copied files
pub const DEFAULT_FILE_MODE: &str = "0644";

/// ssh-remote CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ssh-remote")]
#[command(version)]
#[command(about = "Run commands and push files on a remote host over SSH")]
pub struct Args {
    /// SSH host to connect to
    #[arg(long, env = "SSH_REMOTE_HOST")]
    pub host: String,

    /// SSH port
    #[arg(long, default_value = "22", env = "SSH_REMOTE_PORT")]
    pub port: u16,

    /// SSH username
    #[arg(long, env = "SSH_REMOTE_USER")]
    pub user: String,

    /// Path to SSH private key file
    #[arg(long, env = "SSH_REMOTE_KEY")]
    pub key: PathBuf,

    /// Passphrase of an encrypted private key
    #[arg(long, env = "SSH_REMOTE_KEY_PASSPHRASE")]
    pub passphrase: Option<String>,

    /// Dial and handshake timeout in milliseconds
    #[arg(long, default_value = "5000", env = "SSH_REMOTE_TIMEOUT")]
    pub timeout: u64,

    /// Timeout for the exec/copy operation in milliseconds (0 = none)
    #[arg(long, default_value = "0", env = "SSH_REMOTE_OPERATION_TIMEOUT")]
    pub operation_timeout: u64,

    /// Remote receiver command used by copy
    #[arg(long, default_value = DEFAULT_SCP_COMMAND, env = "SSH_REMOTE_SCP_COMMAND")]
    pub scp_command: String,

    /// Output format
    #[arg(long, value_enum, default_value = "text", env = "SSH_REMOTE_FORMAT")]
    pub format: OutputFormat,

    /// Enable debug logging
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Operation to run on the remote host
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute a command and print its combined output
    Exec {
        /// Command line to run
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Push a local file into a remote directory
    Copy {
        /// Local file to send
        local: PathBuf,

        /// Remote destination directory
        remote_dir: String,

        /// Remote file name (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,

        /// Remote file mode
        #[arg(long, default_value = DEFAULT_FILE_MODE)]
        mode: String,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Validated operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Exec {
        command: String,
    },
    Copy {
        local: PathBuf,
        remote_dir: String,
        name: String,
        mode: String,
    },
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SSH host
    pub host: String,

    /// SSH port
    pub port: u16,

    /// SSH username
    pub user: String,

    /// Path to SSH private key
    pub key: PathBuf,

    /// Passphrase for the key
    pub passphrase: Option<String>,

    /// Dial and handshake timeout
    pub timeout: Duration,

    /// Operation timeout (None = unbounded)
    pub operation_timeout: Option<Duration>,

    /// Remote receiver command for copy
    pub scp_command: String,

    pub format: OutputFormat,

    pub verbose: bool,

    pub action: Action,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        let action = validate_args(&args)?;

        Ok(Config {
            host: args.host,
            port: args.port,
            user: args.user,
            key: args.key,
            passphrase: args.passphrase.filter(|p| !p.is_empty()),
            timeout: Duration::from_millis(args.timeout),
            operation_timeout: match args.operation_timeout {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            scp_command: args.scp_command,
            format: args.format,
            verbose: args.verbose,
            action,
        })
    }

    /// `host:port`, bracketing IPv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Validate CLI arguments, collecting every problem into one error
fn validate_args(args: &Args) -> Result<Action> {
    let mut errors = Vec::new();

    if args.host.is_empty() {
        errors.push("Missing required --host".to_string());
    }

    if args.user.is_empty() {
        errors.push("Missing required --user".to_string());
    }

    if !args.key.exists() {
        errors.push(format!("SSH key file not found: {}", args.key.display()));
    }

    if args.timeout == 0 {
        errors.push("--timeout must be greater than 0".to_string());
    }

    if args.scp_command.trim().is_empty() {
        errors.push("--scp-command cannot be empty".to_string());
    }

    let action = match &args.command {
        Command::Exec { command } => match sanitize_command(&command.join(" ")) {
            Ok(command) => Some(Action::Exec { command }),
            Err(e) => {
                errors.push(e.to_string());
                None
            }
        },
        Command::Copy {
            local,
            remote_dir,
            name,
            mode,
        } => {
            if !local.is_file() {
                errors.push(format!("Local file not found: {}", local.display()));
            }

            let name = name.clone().or_else(|| {
                local
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
            });
            match &name {
                Some(n) => {
                    if let Err(e) = validate_file_name(n) {
                        errors.push(e.to_string());
                    }
                }
                None => errors.push(format!(
                    "Cannot derive a file name from {}; pass --name",
                    local.display()
                )),
            }

            if let Err(e) = validate_permission(mode) {
                errors.push(e.to_string());
            }

            name.map(|name| Action::Copy {
                local: local.clone(),
                remote_dir: remote_dir.clone(),
                name,
                mode: mode.clone(),
            })
        }
    };

    match action {
        Some(action) if errors.is_empty() => Ok(action),
        _ => Err(Error::config(format!(
            "Configuration error:\n{}",
            errors.join("\n")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str], key: &std::path::Path) -> std::result::Result<Args, clap::Error> {
        let key = key.to_string_lossy().into_owned();
        let mut argv = vec![
            "ssh-remote",
            "--host",
            "10.0.0.7",
            "--user",
            "deploy",
            "--key",
            key.as_str(),
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn test_exec_defaults() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let args = parse(&["exec", "ls", "-la", "/tmp"], key.path()).unwrap();
        let config = Config::from_args(args).unwrap();

        assert_eq!(config.port, 22);
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.operation_timeout, None);
        assert_eq!(config.scp_command, DEFAULT_SCP_COMMAND);
        assert_eq!(config.format, OutputFormat::Text);
        assert_eq!(config.address(), "10.0.0.7:22");
        assert_eq!(
            config.action,
            Action::Exec {
                command: "ls -la /tmp".to_string()
            }
        );
    }

    #[test]
    fn test_copy_name_from_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("greeting.txt");
        std::fs::write(&local, b"hello").unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();

        let local_arg = local.to_string_lossy().into_owned();
        let args = parse(
            &["--operation-timeout", "1500", "copy", &local_arg, "/srv/in"],
            key.path(),
        )
        .unwrap();
        let config = Config::from_args(args).unwrap();

        assert_eq!(config.operation_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(
            config.action,
            Action::Copy {
                local,
                remote_dir: "/srv/in".to_string(),
                name: "greeting.txt".to_string(),
                mode: DEFAULT_FILE_MODE.to_string(),
            }
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing_key = dir.path().join("id_missing");
        let missing_local = dir.path().join("nothing").to_string_lossy().into_owned();

        let args = parse(
            &[
                "--timeout",
                "0",
                "copy",
                &missing_local,
                "/tmp",
                "--mode",
                "rw-r--r--",
            ],
            &missing_key,
        )
        .unwrap();
        let err = Config::from_args(args).unwrap_err().to_string();

        assert!(err.contains("SSH key file not found"));
        assert!(err.contains("--timeout must be greater than 0"));
        assert!(err.contains("Local file not found"));
        assert!(err.contains("octal digits"));
    }

    #[test]
    fn test_copy_rejects_bad_name() {
        let local = tempfile::NamedTempFile::new().unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();
        let local_arg = local.path().to_string_lossy().into_owned();

        let args = parse(&["copy", &local_arg, "/tmp", "--name", "a/b"], key.path()).unwrap();
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn test_ipv6_address() {
        let key = tempfile::NamedTempFile::new().unwrap();
        let mut args = parse(&["exec", "true"], key.path()).unwrap();
        args.host = "fe80::1".to_string();
        args.port = 2222;

        let config = Config::from_args(args).unwrap();
        assert_eq!(config.address(), "[fe80::1]:2222");
    }

    #[test]
    fn test_exec_requires_command() {
        let key = tempfile::NamedTempFile::new().unwrap();
        assert!(parse(&["exec"], key.path()).is_err());
    }
}
