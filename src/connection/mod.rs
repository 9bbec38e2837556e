//! Connection layer: the trusted transport primitive.
//!
//! The engine treats transports as an opaque capability: connect,
//! authenticate, run a command, capture stdout/stderr/exit status, push file
//! content. Everything behind the [`Connection`] trait; the
//! [`ConnectionFactory`] trait is the seam through which tests (and future
//! transports) plug in.

pub mod local;
pub mod ssh;

pub use local::LocalConnection;
pub use ssh::{SshConnection, SshConnectionFactory};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::inventory::HostRecord;

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to establish the initial connection.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected by the remote host.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Command execution failed (distinct from a non-zero exit code).
    #[error("command execution failed: {0}")]
    ExecutionFailed(String),

    /// File upload failed.
    #[error("file transfer failed: {0}")]
    TransferFailed(String),

    /// Connection or operation timed out.
    #[error("connection timeout after {0} seconds")]
    Timeout(u64),

    /// Connection was closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Wraps russh::Error for compatibility with the russh Handler trait.
#[derive(Debug)]
pub struct RusshError(pub ::russh::Error);

impl From<::russh::Error> for RusshError {
    fn from(err: ::russh::Error) -> Self {
        RusshError(err)
    }
}

impl std::fmt::Display for RusshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "russh error: {}", self.0)
    }
}

impl std::error::Error for RusshError {}

impl From<::russh::Error> for ConnectionError {
    fn from(err: ::russh::Error) -> Self {
        ConnectionError::ConnectionFailed(format!("russh error: {}", err))
    }
}

/// The result of executing a command over a connection.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code of the command (0 indicates success).
    pub exit_code: i32,
    /// Content written to standard output.
    pub stdout: String,
    /// Content written to standard error.
    pub stderr: String,
    /// Convenience flag: `true` if `exit_code == 0`.
    pub success: bool,
}

impl CommandResult {
    /// Create a successful command result.
    pub fn success(stdout: String, stderr: String) -> Self {
        Self {
            exit_code: 0,
            stdout,
            stderr,
            success: true,
        }
    }

    /// Create a failed command result.
    pub fn failure(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            success: false,
        }
    }
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Environment variables prepended to the command
    pub env: HashMap<String, String>,
    /// Timeout in seconds (None for no timeout)
    pub timeout: Option<u64>,
    /// Run the command with privilege escalation
    pub escalate: bool,
    /// Method for privilege escalation (sudo, su, doas)
    pub escalate_method: Option<String>,
    /// User to escalate to (default: root)
    pub escalate_user: Option<String>,
    /// Password for privilege escalation
    pub escalate_password: Option<String>,
}

impl ExecuteOptions {
    /// Create new execute options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive options from a host record's escalation variables and the
    /// engine defaults.
    pub fn for_host(host: &HostRecord, config: &EngineConfig) -> Self {
        let mut options = Self {
            timeout: Some(config.connect_timeout_secs),
            ..Self::default()
        };

        if host.become_enabled() {
            options.escalate = true;
            options.escalate_method = Some(host.become_method().to_string());
            options.escalate_user = Some(host.become_user().to_string());
            options.escalate_password = host.become_password().map(str::to_string);
        }

        for (key, value) in &config.extra_vars {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            options.env.insert(key.clone(), rendered);
        }

        options
    }

    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: u64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enable privilege escalation.
    pub fn with_escalation(mut self, user: Option<String>) -> Self {
        self.escalate = true;
        self.escalate_user = user;
        self
    }
}

/// The transport trait every connection implements.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Connection identifier (user@host:port or hostname).
    fn identifier(&self) -> &str;

    /// Execute a command on the target.
    async fn execute(
        &self,
        command: &str,
        options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult>;

    /// Write content directly to a file on the target.
    async fn upload_content(
        &self,
        content: &[u8],
        remote_path: &Path,
    ) -> ConnectionResult<()>;

    /// Close the connection.
    async fn close(&self) -> ConnectionResult<()>;
}

/// Factory turning a host record into a live connection.
///
/// The engine only ever sees this trait; the default implementation speaks
/// SSH, test doubles return canned connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a connection to the given host, applying engine defaults for
    /// anything the record does not carry.
    async fn connect(
        &self,
        host: &HostRecord,
        config: &EngineConfig,
    ) -> ConnectionResult<Arc<dyn Connection>>;
}

/// Escalation-aware command prefix shared by the transports.
///
/// russh has no request_env equivalent, so environment variables are
/// prepended as exports.
pub(crate) fn build_command(command: &str, options: &ExecuteOptions) -> String {
    let mut parts = Vec::new();

    for (key, value) in &options.env {
        let escaped = value.replace('\'', "'\\''");
        parts.push(format!("export {key}='{escaped}'; "));
    }

    if options.escalate {
        let method = options.escalate_method.as_deref().unwrap_or("sudo");
        let user = options.escalate_user.as_deref().unwrap_or("root");

        match method {
            "su" => parts.push(format!("su - {user} -c ")),
            "doas" => parts.push(format!("doas -u {user} ")),
            _ => {
                if options.escalate_password.is_some() {
                    parts.push(format!("sudo -S -u {user} -- "));
                } else {
                    parts.push(format!("sudo -u {user} -- "));
                }
            }
        }
    }

    parts.push(command.to_string());
    parts.concat()
}
