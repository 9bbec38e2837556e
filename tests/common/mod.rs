//! Shared test doubles: a scripted connection factory and a scratch
//! implementation that counts purge calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use opsgate::config::EngineConfig;
use opsgate::connection::{
    CommandResult, Connection, ConnectionError, ConnectionFactory, ConnectionResult,
    ExecuteOptions,
};
use opsgate::executor::Scratch;
use opsgate::inventory::HostRecord;

/// What a scripted host does when contacted.
#[derive(Debug, Clone)]
pub enum HostBehavior {
    /// Connects; every command succeeds with this stdout.
    Ok(String),
    /// Connects; every command exits with this code and stderr.
    Fail(i32, String),
    /// Connection attempt fails.
    Unreachable,
}

/// Connection whose execute() plays back a fixed behavior.
pub struct StaticConnection {
    identifier: String,
    behavior: HostBehavior,
}

#[async_trait]
impl Connection for StaticConnection {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    async fn execute(
        &self,
        command: &str,
        _options: Option<ExecuteOptions>,
    ) -> ConnectionResult<CommandResult> {
        match &self.behavior {
            HostBehavior::Ok(stdout) => {
                // Mirror echo so end-to-end assertions see real output.
                let stdout = if let Some(rest) = command.strip_prefix("echo ") {
                    format!("{}\n", rest)
                } else {
                    stdout.clone()
                };
                Ok(CommandResult::success(stdout, String::new()))
            }
            HostBehavior::Fail(code, stderr) => {
                Ok(CommandResult::failure(*code, String::new(), stderr.clone()))
            }
            HostBehavior::Unreachable => Err(ConnectionError::ConnectionClosed),
        }
    }

    async fn upload_content(&self, _content: &[u8], _remote_path: &Path) -> ConnectionResult<()> {
        Ok(())
    }

    async fn close(&self) -> ConnectionResult<()> {
        Ok(())
    }
}

/// Factory handing out scripted connections by host name.
#[derive(Default)]
pub struct MockConnectionFactory {
    behaviors: HashMap<String, HostBehavior>,
    connects: AtomicUsize,
}

impl MockConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, name: impl Into<String>, behavior: HostBehavior) -> Self {
        self.behaviors.insert(name.into(), behavior);
        self
    }

    /// How many connection attempts were made.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockConnectionFactory {
    async fn connect(
        &self,
        host: &HostRecord,
        _config: &EngineConfig,
    ) -> ConnectionResult<Arc<dyn Connection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let behavior = self
            .behaviors
            .get(&host.name)
            .cloned()
            .unwrap_or(HostBehavior::Unreachable);

        match behavior {
            HostBehavior::Unreachable => Err(ConnectionError::ConnectionFailed(format!(
                "no route to {}",
                host.name
            ))),
            other => Ok(Arc::new(StaticConnection {
                identifier: host.name.clone(),
                behavior: other,
            })),
        }
    }
}

/// Scratch that records how often it was purged.
pub struct CountingScratch {
    path: PathBuf,
    purges: Arc<AtomicUsize>,
}

impl CountingScratch {
    pub fn new(purges: Arc<AtomicUsize>) -> Self {
        Self {
            path: std::env::temp_dir(),
            purges,
        }
    }
}

impl Scratch for CountingScratch {
    fn path(&self) -> &Path {
        &self.path
    }

    fn purge(&mut self) -> io::Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
