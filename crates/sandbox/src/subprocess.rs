// SPDX-License-Identifier: MIT

//! Subprocess execution helpers

use std::process::Output;
use std::time::Duration;
use tokio::process::Command;

/// Default timeout for `ip` netns/link commands.
pub const IP_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a subprocess command with a timeout.
///
/// Wraps `Command::output()` with `tokio::time::timeout`, converting
/// timeout expiration into a descriptive error message. The child process
/// is killed automatically if the timeout elapses (via the tokio `Child`
/// drop implementation).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(io_err)) => Err(format!("{} failed: {}", description, io_err)),
        Err(_elapsed) => Err(format!(
            "{} timed out after {}s",
            description,
            timeout.as_secs()
        )),
    }
}

/// Run a command and require exit 0, returning stderr in the error.
pub async fn run_checked(
    cmd: Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    let output = run_with_timeout(cmd, timeout, description).await?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(format!(
            "{} exited {}: {}",
            description,
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
