//! Local execution without a network transport.
//!
//! Used for hosts addressed as the gateway itself and as a convenient
//! backend in tests.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{CommandResult, Connection, ConnectionError, ConnectionResult, ExecuteOptions};

/// Connection that runs commands on the current host.
#[derive(Debug, Clone)]
pub struct LocalConnection {
    identifier: String,
}

impl LocalConnection {
    /// Create a new local connection named after the gateway's hostname.
    pub fn new() -> Self {
        let identifier = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "localhost".to_string());

        Self { identifier }
    }

    /// Create a local connection with a custom identifier.
    pub fn with_identifier(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }

    fn build_command(&self, command: &str, options: &ExecuteOptions) -> Command {
        let mut cmd = if options.escalate {
            let method = options.escalate_method.as_deref().unwrap_or("sudo");
            let user = options.escalate_user.as_deref().unwrap_or("root");

            match method {
                "su" => {
                    let mut c = Command::new("su");
                    c.arg("-").arg(user).arg("-c").arg(command);
                    c
                }
                "doas" => {
                    let mut c = Command::new("doas");
                    c.arg("-u").arg(user).arg("sh").arg("-c").arg(command);
                    c
                }
                _ => {
                    let mut c = Command::new("sudo");
                    c.arg("-u").arg(user);
                    if options.escalate_password.is_some() {
                        c.arg("-S");
                    }
                    c.arg("--").arg("sh").arg("-c").arg(command);
                    c
                }
            }
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(command);
            c
        };

        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        cmd
    }
}

impl Default for LocalConnection {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        let options = options.unwrap_or_default();
        debug!(command = %command, "executing local command");

        let mut cmd = self.build_command(command, &options);

        let mut child = cmd.spawn().map_err(|e| {
            ConnectionError::ExecutionFailed(format!("failed to spawn process: {}", e))
        })?;

        if options.escalate {
            if let Some(password) = &options.escalate_password {
                if let Some(mut stdin) = child.stdin.take() {
                    stdin
                        .write_all(format!("{}\n", password).as_bytes())
                        .await
                        .map_err(|e| {
                            ConnectionError::ExecutionFailed(format!(
                                "failed to write escalation password: {}",
                                e
                            ))
                        })?;
                }
            }
        }

        let output = if let Some(timeout_secs) = options.timeout {
            let timeout = tokio::time::Duration::from_secs(timeout_secs);
            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(result) => result.map_err(|e| {
                    ConnectionError::ExecutionFailed(format!(
                        "failed to wait for process: {}",
                        e
                    ))
                })?,
                Err(_) => return Err(ConnectionError::Timeout(timeout_secs)),
            }
        } else {
            child.wait_with_output().await.map_err(|e| {
                ConnectionError::ExecutionFailed(format!("failed to wait for process: {}", e))
            })?
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if exit_code == 0 {
            Ok(CommandResult::success(stdout, stderr))
        } else {
            Ok(CommandResult::failure(exit_code, stdout, stderr))
        }
    }

    async fn upload_content(
        &self,
        content: &[u8],
        remote_path: &Path,
    ) -> ConnectionResult<()> {
        if let Some(parent) = remote_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(remote_path, content).await?;
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}
