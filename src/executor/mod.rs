//! The execution engine.
//!
//! Two entry points: [`ExecutionEngine::run_named_module`] for ad-hoc work
//! and [`ExecutionEngine::run_playbook`] for multi-task playbooks. Both
//! resolve a host pattern against a caller-built inventory, fan out across
//! the matched hosts bounded by the forks limit, and route every per-host
//! outcome into the caller's [`ResultCollector`]. Nothing propagates past
//! these entry points: validation failures come back as a
//! [`RejectionNotice`], everything else resolves to collector data. The
//! engine runs inside a long-lived service process and must never crash the
//! request handler.

pub mod playbook;
pub mod runtime;

pub use playbook::{Play, PlayTask, Playbook, PlaybookError};
pub use runtime::{Scratch, TaskRuntime, TempScratch};

use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::callback::ResultCollector;
use crate::config::EngineConfig;
use crate::connection::{ConnectionFactory, ExecuteOptions, SshConnectionFactory};
use crate::inventory::{HostRecord, Inventory};
use crate::modules;
use crate::safety::{DenyListFilter, SafetyFilter};

/// Errors internal to the engine. These never cross the public entry
/// points; they are logged and converted to collector data.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error(transparent)]
    Playbook(#[from] PlaybookError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Synthetic notice returned when user-supplied text references a protected
/// variable. Distinct from an OutcomeRecord: execution never started.
#[derive(Debug, Clone, Serialize)]
pub struct RejectionNotice {
    /// The offending deny-listed name.
    pub variable: String,
    /// Human-readable refusal message.
    pub message: String,
}

impl RejectionNotice {
    pub fn new(variable: impl Into<String>) -> Self {
        let variable = variable.into();
        let message = format!("refusing to run: references protected variable '{}'", variable);
        Self { variable, message }
    }
}

/// Factory closure producing the scratch implementation for each run.
type ScratchFactory = dyn Fn() -> Box<dyn Scratch> + Send + Sync;

/// The engine. Holds only per-instance configuration set at construction;
/// all run state (inventory, collector, runtime) is per-call.
pub struct ExecutionEngine {
    config: EngineConfig,
    factory: Arc<dyn ConnectionFactory>,
    filter: Arc<dyn SafetyFilter>,
    scratch_factory: Option<Arc<ScratchFactory>>,
}

impl ExecutionEngine {
    /// Engine with the default SSH transport and deny-list filter.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            factory: Arc::new(SshConnectionFactory),
            filter: Arc::new(DenyListFilter),
            scratch_factory: None,
        }
    }

    /// Swap the connection factory (tests, alternative transports).
    pub fn with_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Swap the safety filter implementation.
    pub fn with_filter(mut self, filter: Arc<dyn SafetyFilter>) -> Self {
        self.filter = filter;
        self
    }

    /// Swap the per-run scratch implementation (tests).
    pub fn with_scratch_factory(
        mut self,
        factory: Arc<ScratchFactory>,
    ) -> Self {
        self.scratch_factory = Some(factory);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ad-hoc execution with the safety check applied to the argument text.
    ///
    /// Returns a rejection notice (and performs no execution) when the
    /// arguments reference a protected variable; otherwise outcomes land in
    /// the collector.
    pub async fn run_named_module(
        &self,
        inventory: &Inventory,
        module: &str,
        args: &str,
        pattern: &str,
        collector: &Arc<ResultCollector>,
    ) -> Option<RejectionNotice> {
        if let Some(variable) = self.filter.scan(args) {
            warn!(module = %module, variable = %variable, "rejected module arguments");
            return Some(RejectionNotice::new(variable));
        }

        self.run_module(inventory, module, args, pattern, collector)
            .await;
        None
    }

    /// Ad-hoc execution without the safety check. Used internally and by
    /// callers whose payload does not originate from free-text user input.
    pub async fn run_module(
        &self,
        inventory: &Inventory,
        module: &str,
        args: &str,
        pattern: &str,
        collector: &Arc<ResultCollector>,
    ) {
        info!(module = %module, pattern = %pattern, "running ad-hoc module");

        let mut runtime = match self.make_runtime() {
            Ok(rt) => Some(rt),
            Err(e) => {
                error!(error = %e, "failed to set up task runtime");
                None
            }
        };

        if let Some(rt) = runtime.as_ref() {
            let hosts: Vec<HostRecord> =
                inventory.resolve_hosts(pattern).into_iter().cloned().collect();

            if hosts.is_empty() {
                debug!(pattern = %pattern, "no hosts matched");
                collector.record_no_hosts_matched();
            } else {
                self.dispatch_task(rt, &hosts, module, module, args, collector)
                    .await;
            }
        }

        // Guarded teardown: the runtime may never have been created.
        match runtime.as_mut() {
            Some(rt) => rt.teardown(),
            None => debug!("no runtime to tear down"),
        }
    }

    /// Playbook execution: read, scan, parse, then run every play's tasks
    /// in file order. Each play resolves its own `hosts` pattern.
    pub async fn run_playbook(
        &self,
        inventory: &Inventory,
        path: &Path,
        collector: &Arc<ResultCollector>,
    ) -> Option<RejectionNotice> {
        info!(path = %path.display(), "running playbook");

        let source = match tokio::fs::read_to_string(path).await {
            Ok(s) => s,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot read playbook");
                return None;
            }
        };

        if let Some(variable) = self.filter.scan(&source) {
            warn!(path = %path.display(), variable = %variable, "rejected playbook");
            return Some(RejectionNotice::new(variable));
        }

        let playbook = match Playbook::parse(&source) {
            Ok(p) => p,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot parse playbook");
                return None;
            }
        };

        let mut runtime = match self.make_runtime() {
            Ok(rt) => Some(rt),
            Err(e) => {
                error!(error = %e, "failed to set up task runtime");
                None
            }
        };

        if let Some(rt) = runtime.as_ref() {
            let mut any_matched = false;

            for play in &playbook.plays {
                let hosts: Vec<HostRecord> = inventory
                    .resolve_hosts(&play.hosts)
                    .into_iter()
                    .cloned()
                    .collect();

                if hosts.is_empty() {
                    debug!(play = %play.display_name(), "no hosts matched for play");
                    continue;
                }
                any_matched = true;

                let tasks = match play.resolve_tasks() {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        error!(play = %play.display_name(), error = %e, "invalid play");
                        continue;
                    }
                };

                // Linear strategy: every host finishes a task before the
                // next task starts.
                for task in &tasks {
                    self.dispatch_task(
                        rt,
                        &hosts,
                        &task.name,
                        &task.module,
                        &task.args,
                        collector,
                    )
                    .await;
                }
            }

            if !any_matched {
                collector.record_no_hosts_matched();
            }
        }

        match runtime.as_mut() {
            Some(rt) => rt.teardown(),
            None => debug!("no runtime to tear down"),
        }

        None
    }

    fn make_runtime(&self) -> ExecutorResult<TaskRuntime> {
        match &self.scratch_factory {
            Some(factory) => Ok(TaskRuntime::with_scratch(self.config.forks, factory())),
            None => TaskRuntime::new(self.config.forks),
        }
    }

    /// Fan one task out across the hosts, bounded by the forks limit, and
    /// wait for every host to report.
    async fn dispatch_task(
        &self,
        runtime: &TaskRuntime,
        hosts: &[HostRecord],
        task_name: &str,
        module: &str,
        args: &str,
        collector: &Arc<ResultCollector>,
    ) {
        let scratch = runtime.scratch_path();
        let semaphore = runtime.semaphore();

        let mut handles = Vec::with_capacity(hosts.len());
        for host in hosts {
            let host = host.clone();
            let collector = Arc::clone(collector);
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let semaphore = Arc::clone(&semaphore);
            let scratch = scratch.clone();
            let task_name = task_name.to_string();
            let module = module.to_string();
            let args = args.to_string();

            handles.push(tokio::spawn(async move {
                let _permit = match TaskRuntime::acquire(semaphore).await {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(host = %host.name, error = %e, "failed to acquire fork slot");
                        collector.record_failed(
                            &host.name,
                            &task_name,
                            json!({ "msg": e.to_string() }),
                        );
                        return;
                    }
                };

                execute_on_host(
                    &host, &factory, &config, &task_name, &module, &args, &scratch, &collector,
                )
                .await;
            }));
        }

        join_all(handles).await;
    }
}

/// Connect to one host and run one module invocation, recording exactly one
/// outcome. Connect and auth failures are unreachable; everything after a
/// successful connect is ok or failed.
#[allow(clippy::too_many_arguments)]
async fn execute_on_host(
    host: &HostRecord,
    factory: &Arc<dyn ConnectionFactory>,
    config: &EngineConfig,
    task_name: &str,
    module: &str,
    args: &str,
    scratch: &Path,
    collector: &Arc<ResultCollector>,
) {
    if config.check {
        debug!(host = %host.name, module = %module, "check mode, skipping execution");
        collector.record_ok(
            &host.name,
            task_name,
            json!({ "changed": false, "check_mode": true }),
        );
        return;
    }

    let conn = match factory.connect(host, config).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!(host = %host.name, error = %e, "host unreachable");
            collector.record_unreachable(
                &host.name,
                task_name,
                json!({ "msg": e.to_string(), "unreachable": true }),
            );
            return;
        }
    };

    let options = ExecuteOptions::for_host(host, config);
    match modules::run_module(&conn, module, args, options, Some(scratch)).await {
        Ok(output) if output.failed => {
            collector.record_failed(&host.name, task_name, output.result);
        }
        Ok(output) => {
            collector.record_ok(&host.name, task_name, output.result);
        }
        Err(e) => {
            warn!(host = %host.name, module = %module, error = %e, "module failed");
            collector.record_failed(&host.name, task_name, json!({ "msg": e.to_string() }));
        }
    }

    if let Err(e) = conn.close().await {
        debug!(host = %host.name, error = %e, "error closing connection");
    }
}
