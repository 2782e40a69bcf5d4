//! Workflow definition templates.
//!
//! Definitions are YAML files named `<workflow>.yaml`, resolved through the
//! ordered search paths in [`CrewPaths`](crate::config::CrewPaths). They are
//! immutable once loaded; all mutable run state lives in
//! [`state`](super::state).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::LazyLock;

use crate::adapters::Provider;
use crate::{clog_debug, Error, Result};

static WORKFLOW_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap());

pub const DEFAULT_MAX_CYCLES: u32 = 10;

fn default_max_cycles() -> u32 {
    DEFAULT_MAX_CYCLES
}

/// One step of a workflow, bound to a role and a provider/model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageDefinition {
    pub name: String,
    pub role: String,
    pub provider: Provider,
    pub model: String,
    /// Require explicit approval before this stage becomes active.
    #[serde(default)]
    pub human_gate: bool,
    /// Clear the agent's conversation context before prompting this stage.
    #[serde(default)]
    pub context_reset: bool,
    /// Tags recorded when this stage completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_complete: Option<Vec<String>>,
}

/// An immutable, named multi-stage workflow template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Loop back to stage 0 after the last stage instead of finishing.
    #[serde(default)]
    pub loop_on_changes: bool,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    pub stages: Vec<StageDefinition>,
}

impl WorkflowDefinition {
    /// Structural checks beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if self.stages.is_empty() {
            return Err(Error::InvalidDefinition(format!(
                "workflow '{}': stages must not be empty",
                self.name
            )));
        }
        for stage in &self.stages {
            if stage.name.is_empty() {
                return Err(Error::InvalidDefinition(format!(
                    "workflow '{}': stage name must not be empty",
                    self.name
                )));
            }
            if stage.role.is_empty() {
                return Err(Error::InvalidDefinition(format!(
                    "workflow '{}': stage '{}': role must not be empty",
                    self.name, stage.name
                )));
            }
        }
        Ok(())
    }
}

/// Load a named definition from the first search path that has it.
pub fn load_definition(name: &str, search_paths: &[PathBuf]) -> Result<WorkflowDefinition> {
    if !WORKFLOW_NAME_RE.is_match(name) {
        return Err(Error::InvalidDefinition(format!(
            "invalid workflow name: {}",
            name
        )));
    }
    for dir in search_paths {
        let path = dir.join(format!("{}.yaml", name));
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        clog_debug!("load_definition: found {} at {}", name, path.display());
        let def: WorkflowDefinition = serde_yaml::from_str(&raw)
            .map_err(|e| Error::InvalidDefinition(format!("{}: {}", name, e)))?;
        def.validate()?;
        return Ok(def);
    }
    Err(Error::WorkflowNotFound(name.to_string()))
}

/// Enumerate every loadable definition across the search paths, sorted by
/// name. An earlier search path shadows a later one, matching
/// [`load_definition`]; files that fail to load are skipped.
pub fn list_definitions(search_paths: &[PathBuf]) -> Vec<(String, WorkflowDefinition)> {
    let mut found: std::collections::BTreeMap<String, WorkflowDefinition> =
        std::collections::BTreeMap::new();
    for dir in search_paths {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let name = match path.file_stem().and_then(|s| s.to_str()) {
                Some(name) if WORKFLOW_NAME_RE.is_match(name) => name.to_string(),
                _ => continue,
            };
            if found.contains_key(&name) {
                continue;
            }
            match load_definition(&name, std::slice::from_ref(dir)) {
                Ok(def) => {
                    found.insert(name, def);
                }
                Err(e) => clog_debug!("Skipping {}: {}", path.display(), e),
            }
        }
    }
    found.into_iter().collect()
}
