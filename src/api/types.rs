//! Wire types for the WebSocket gateway.

use serde::{Deserialize, Serialize};

use crate::inventory::{HostDescriptor, DEFAULT_SSH_PORT};

/// A single-host execution request: the original browser-client shape.
/// `pass` may be a login password or stand alongside a configured key.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecRequest {
    /// Display name; defaults to the address
    #[serde(default)]
    pub hostname: Option<String>,

    /// Target address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default, rename = "pass")]
    pub password: Option<String>,

    /// Shell command to run
    pub cmd: String,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl ExecRequest {
    /// The inventory descriptor for this request's target.
    pub fn descriptor(&self) -> HostDescriptor {
        HostDescriptor {
            hostname: self.hostname.clone(),
            ip: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            ..HostDescriptor::new(self.host.clone())
        }
    }

    /// The host pattern the command runs against.
    pub fn pattern(&self) -> &str {
        self.hostname.as_deref().unwrap_or(&self.host)
    }
}

/// Multi-host form: full descriptors plus an explicit module invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiExecRequest {
    pub hosts: Vec<HostDescriptor>,

    #[serde(default = "default_pattern")]
    pub pattern: String,

    #[serde(default = "default_module")]
    pub module: String,

    #[serde(default)]
    pub args: String,
}

fn default_pattern() -> String {
    "all".to_string()
}

fn default_module() -> String {
    "shell".to_string()
}

/// Anything a client may send over the socket.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum WsRequest {
    Multi(MultiExecRequest),
    Single(ExecRequest),
}

/// Error frame sent back for rejected or malformed requests.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl ErrorReply {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            variable: None,
        }
    }

    pub fn rejection(notice: &crate::executor::RejectionNotice) -> Self {
        Self {
            error: notice.message.clone(),
            variable: Some(notice.variable.clone()),
        }
    }
}
