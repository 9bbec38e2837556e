//! Task modules executed over a connection.
//!
//! A small catalog in the Ansible mold: `shell`, `command`, `raw`, `script`,
//! `copy` and `setup`. Every module runs on the target through the
//! [`Connection`](crate::connection::Connection) trait and reports a JSON
//! payload shaped like the corresponding Ansible module's result
//! (`stdout`/`stderr`/`rc` for command-style modules).

mod setup;

pub use setup::gather_facts;

use serde_json::{json, Value as JsonValue};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::connection::{Connection, ExecuteOptions};

/// Errors raised while dispatching or running a module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for module operations.
pub type ModuleResult<T> = Result<T, ModuleError>;

/// What a module run produced: the wire payload and whether the target
/// counted it as a failure.
#[derive(Debug, Clone)]
pub struct ModuleOutput {
    pub result: JsonValue,
    pub failed: bool,
}

impl ModuleOutput {
    fn from_command(cmd: &str, result: &crate::connection::CommandResult) -> Self {
        Self {
            result: json!({
                "cmd": cmd,
                "stdout": result.stdout.trim_end(),
                "stderr": result.stderr.trim_end(),
                "rc": result.exit_code,
                "changed": true,
            }),
            failed: !result.success,
        }
    }
}

/// Names the dispatcher recognizes.
pub const MODULE_NAMES: &[&str] = &["shell", "command", "raw", "script", "copy", "setup"];

/// Run a named module against an open connection.
///
/// `scratch_dir` is the per-run staging directory used by `script` for the
/// uploaded payload.
pub async fn run_module(
    conn: &Arc<dyn Connection>,
    module: &str,
    args: &str,
    options: ExecuteOptions,
    scratch_dir: Option<&Path>,
) -> ModuleResult<ModuleOutput> {
    debug!(module = %module, target = %conn.identifier(), "running module");

    match module {
        "shell" | "raw" => run_shell(conn, args, options).await,
        "command" => run_command(conn, args, options).await,
        "script" => run_script(conn, args, options, scratch_dir).await,
        "copy" => run_copy(conn, args).await,
        "setup" => gather_facts(conn, options).await,
        other => Err(ModuleError::NotFound(other.to_string())),
    }
}

/// `shell` and `raw`: the argument string goes to the remote shell verbatim.
async fn run_shell(
    conn: &Arc<dyn Connection>,
    args: &str,
    options: ExecuteOptions,
) -> ModuleResult<ModuleOutput> {
    if args.trim().is_empty() {
        return Err(ModuleError::MissingParameter("cmd".to_string()));
    }

    let result = conn
        .execute(args, Some(options))
        .await
        .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;

    Ok(ModuleOutput::from_command(args, &result))
}

/// `command`: the argument string is tokenized and re-quoted so shell
/// metacharacters lose their meaning.
async fn run_command(
    conn: &Arc<dyn Connection>,
    args: &str,
    options: ExecuteOptions,
) -> ModuleResult<ModuleOutput> {
    let words = shell_words::split(args)
        .map_err(|e| ModuleError::InvalidParameter(format!("unparsable command: {}", e)))?;
    if words.is_empty() {
        return Err(ModuleError::MissingParameter("cmd".to_string()));
    }

    let quoted = shell_words::join(words.iter().map(String::as_str));
    let result = conn
        .execute(&quoted, Some(options))
        .await
        .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;

    Ok(ModuleOutput::from_command(&quoted, &result))
}

/// `script`: upload a local script to the scratch directory on the target,
/// mark it executable and run it.
async fn run_script(
    conn: &Arc<dyn Connection>,
    args: &str,
    options: ExecuteOptions,
    scratch_dir: Option<&Path>,
) -> ModuleResult<ModuleOutput> {
    let mut words = shell_words::split(args)
        .map_err(|e| ModuleError::InvalidParameter(format!("unparsable arguments: {}", e)))?;
    if words.is_empty() {
        return Err(ModuleError::MissingParameter("script".to_string()));
    }

    let script_path = PathBuf::from(words.remove(0));
    let content = tokio::fs::read(&script_path).await.map_err(|e| {
        ModuleError::InvalidParameter(format!(
            "cannot read script {}: {}",
            script_path.display(),
            e
        ))
    })?;

    let file_name = script_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "script".to_string());
    let remote_path = scratch_dir
        .unwrap_or_else(|| Path::new("/tmp"))
        .join(&file_name);

    conn.upload_content(&content, &remote_path)
        .await
        .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;

    let remote = shell_words::quote(&remote_path.to_string_lossy()).into_owned();
    let script_args = shell_words::join(words.iter().map(String::as_str));
    let cmd = if script_args.is_empty() {
        format!("chmod +x {remote} && {remote}")
    } else {
        format!("chmod +x {remote} && {remote} {script_args}")
    };

    let result = conn
        .execute(&cmd, Some(options))
        .await
        .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;

    Ok(ModuleOutput::from_command(&cmd, &result))
}

/// `copy`: `src=... dest=...` or `content=... dest=...` key/value arguments.
async fn run_copy(conn: &Arc<dyn Connection>, args: &str) -> ModuleResult<ModuleOutput> {
    let params = parse_kv_args(args)?;

    let dest = params
        .iter()
        .find(|(k, _)| k == "dest")
        .map(|(_, v)| v.clone())
        .ok_or_else(|| ModuleError::MissingParameter("dest".to_string()))?;

    let content = if let Some((_, content)) = params.iter().find(|(k, _)| k == "content") {
        content.clone().into_bytes()
    } else if let Some((_, src)) = params.iter().find(|(k, _)| k == "src") {
        tokio::fs::read(src)
            .await
            .map_err(|e| ModuleError::InvalidParameter(format!("cannot read {}: {}", src, e)))?
    } else {
        return Err(ModuleError::MissingParameter("src or content".to_string()));
    };

    let size = content.len();
    conn.upload_content(&content, Path::new(&dest))
        .await
        .map_err(|e| ModuleError::ExecutionFailed(e.to_string()))?;

    Ok(ModuleOutput {
        result: json!({
            "dest": dest,
            "size": size,
            "changed": true,
        }),
        failed: false,
    })
}

/// Parse `key=value` module arguments, honoring shell quoting.
fn parse_kv_args(args: &str) -> ModuleResult<Vec<(String, String)>> {
    let words = shell_words::split(args)
        .map_err(|e| ModuleError::InvalidParameter(format!("unparsable arguments: {}", e)))?;

    let mut params = Vec::with_capacity(words.len());
    for word in words {
        let (key, value) = word
            .split_once('=')
            .ok_or_else(|| ModuleError::InvalidParameter(format!("expected key=value: {word}")))?;
        params.push((key.to_string(), value.to_string()));
    }
    Ok(params)
}
