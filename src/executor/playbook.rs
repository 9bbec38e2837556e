//! Playbook parsing.
//!
//! A playbook is a YAML sequence of plays; each play names a host pattern
//! and carries an ordered list of tasks. A task entry holds a `name` plus
//! one module key whose value is the module's argument string (or a mapping
//! rendered to `key=value` form).

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use thiserror::Error;

/// Task keys that are not module names.
const RESERVED_TASK_KEYS: &[&str] = &[
    "name",
    "become",
    "become_user",
    "become_method",
    "when",
    "register",
    "vars",
    "tags",
];

#[derive(Debug, Error)]
pub enum PlaybookError {
    #[error("failed to parse playbook: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid playbook: {0}")]
    Invalid(String),
}

pub type PlaybookResult<T> = Result<T, PlaybookError>;

/// A parsed playbook.
#[derive(Debug)]
pub struct Playbook {
    pub plays: Vec<Play>,
}

impl Playbook {
    /// Parse a playbook from YAML text.
    pub fn parse(source: &str) -> PlaybookResult<Self> {
        let plays: Vec<Play> = serde_yaml::from_str(source)?;
        if plays.is_empty() {
            return Err(PlaybookError::Invalid("playbook has no plays".to_string()));
        }
        Ok(Self { plays })
    }
}

/// One play: a host pattern and its tasks.
#[derive(Debug, Deserialize)]
pub struct Play {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_hosts")]
    pub hosts: String,

    #[serde(default)]
    tasks: Vec<IndexMap<String, YamlValue>>,
}

fn default_hosts() -> String {
    "all".to_string()
}

impl Play {
    /// Display name for logging.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.hosts)
    }

    /// Extract the ordered task list, resolving each entry's module key.
    pub fn resolve_tasks(&self) -> PlaybookResult<Vec<PlayTask>> {
        let mut tasks = Vec::with_capacity(self.tasks.len());

        for (index, entry) in self.tasks.iter().enumerate() {
            let name = entry
                .get("name")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("task {}", index + 1));

            let module_entry = entry
                .iter()
                .find(|(key, _)| !RESERVED_TASK_KEYS.contains(&key.as_str()));

            let Some((module, value)) = module_entry else {
                return Err(PlaybookError::Invalid(format!(
                    "task '{}' names no module",
                    name
                )));
            };

            tasks.push(PlayTask {
                name,
                module: module.clone(),
                args: render_args(value),
            });
        }

        Ok(tasks)
    }
}

/// A task ready for dispatch.
#[derive(Debug, Clone)]
pub struct PlayTask {
    pub name: String,
    pub module: String,
    pub args: String,
}

/// Render a module value to an argument string. Mappings become
/// `key=value` pairs with shell quoting; scalars pass through.
fn render_args(value: &YamlValue) -> String {
    match value {
        YamlValue::String(s) => s.clone(),
        YamlValue::Mapping(map) => {
            let pairs: Vec<String> = map
                .iter()
                .filter_map(|(k, v)| {
                    let key = k.as_str()?;
                    let rendered = match v {
                        YamlValue::String(s) => s.clone(),
                        YamlValue::Bool(b) => b.to_string(),
                        YamlValue::Number(n) => n.to_string(),
                        other => serde_yaml::to_string(other)
                            .unwrap_or_default()
                            .trim_end()
                            .to_string(),
                    };
                    Some(format!("{}={}", key, shell_words::quote(&rendered)))
                })
                .collect();
            pairs.join(" ")
        }
        YamlValue::Null => String::new(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .unwrap_or_default()
            .trim_end()
            .to_string(),
    }
}
