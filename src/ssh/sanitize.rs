//! Input validation and escaping utilities
//!
//! Checks values that get interpolated into remote command lines or into the
//! line-oriented copy protocol before anything is sent.

use crate::error::{Error, Result};

/// Sanitize a command before execution
///
/// Trims surrounding whitespace and rejects empty commands.
///
/// # Examples
/// ```
/// use ssh_remote::ssh::sanitize::sanitize_command;
///
/// let cmd = sanitize_command("  uptime  ").unwrap();
/// assert_eq!(cmd, "uptime");
/// assert!(sanitize_command("   ").is_err());
/// ```
pub fn sanitize_command(command: &str) -> Result<String> {
    let trimmed = command.trim();

    if trimmed.is_empty() {
        return Err(Error::config("Command cannot be empty"));
    }

    Ok(trimmed.to_string())
}

/// Validate a file name for the copy control line
///
/// The name ends the control line, so it must not contain a newline,
/// carriage return or NUL. It names a single entry in the destination
/// directory, so it must not contain `/` either.
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_transfer("File name cannot be empty"));
    }

    if name == "." || name == ".." {
        return Err(Error::invalid_transfer(format!(
            "File name '{}' is not a regular file name",
            name
        )));
    }

    if let Some(c) = name.chars().find(|c| matches!(c, '/' | '\n' | '\r' | '\0')) {
        return Err(Error::invalid_transfer(format!(
            "File name {:?} contains forbidden character {:?}",
            name, c
        )));
    }

    Ok(())
}

/// Validate a permission string such as `0644` or `755`
///
/// Must be 3 or 4 octal digits.
pub fn validate_permission(permission: &str) -> Result<()> {
    let valid = matches!(permission.len(), 3 | 4)
        && permission.bytes().all(|b| (b'0'..=b'7').contains(&b));

    if !valid {
        return Err(Error::invalid_transfer(format!(
            "Permission {:?} must be 3 or 4 octal digits",
            permission
        )));
    }

    Ok(())
}

/// Validate the destination directory of a copy
pub fn validate_remote_dir(dir: &str) -> Result<()> {
    if dir.trim().is_empty() {
        return Err(Error::invalid_transfer("Destination directory cannot be empty"));
    }

    if dir.contains(['\n', '\r', '\0']) {
        return Err(Error::invalid_transfer(format!(
            "Destination directory {:?} contains a line break or NUL",
            dir
        )));
    }

    Ok(())
}

/// Escape single quotes so the value can sit inside a single-quoted shell
/// string
///
/// # Example
/// ```
/// use ssh_remote::ssh::sanitize::escape_for_single_quotes;
///
/// let escaped = escape_for_single_quotes("it's");
/// assert_eq!(escaped, "it'\"'\"'s");
/// ```
pub fn escape_for_single_quotes(value: &str) -> String {
    // 'word' becomes '"'"'word'"'"'
    value.replace('\'', "'\"'\"'")
}

/// Quote a remote path for the shell unless it only holds plain characters
///
/// Plain paths are left untouched so `~` keeps expanding on the remote side.
pub fn quote_remote_path(path: &str) -> String {
    let plain = path
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '~' | '-'));

    if plain {
        path.to_string()
    } else {
        format!("'{}'", escape_for_single_quotes(path))
    }
}
