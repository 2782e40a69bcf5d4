//! Stage completion signal files.
//!
//! An agent announces stage completion by writing
//! `.crew/signals/<role>.done` containing a small JSON payload. The
//! control loop consumes the file and advances the workflow. Signals are
//! one-shot; leftovers from a previous run are wiped before agents start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{clog_debug, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalPayload {
    /// Free-form result summary from the agent.
    pub result: String,
    /// Task identifiers the agent touched, if it reports them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<String>>,
}

fn signal_path(crew_dir: &Path, role: &str) -> PathBuf {
    crew_dir.join("signals").join(format!("{}.done", role))
}

/// Read a role's signal file. Missing or malformed files read as `None`;
/// a half-written signal is picked up on a later poll.
pub fn read_signal(crew_dir: &Path, role: &str) -> Option<SignalPayload> {
    let raw = std::fs::read_to_string(signal_path(crew_dir, role)).ok()?;
    serde_json::from_str(&raw).ok()
}

/// Delete a consumed signal. Absence is not an error.
pub fn remove_signal(crew_dir: &Path, role: &str) {
    let _ = std::fs::remove_file(signal_path(crew_dir, role));
}

/// Ensure the signals directory exists and is empty of stale signals.
pub fn clean_signals_dir(crew_dir: &Path) -> Result<()> {
    let dir = crew_dir.join("signals");
    std::fs::create_dir_all(&dir)?;
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        clog_debug!("Removing stale signal {}", entry.path().display());
        let _ = std::fs::remove_file(entry.path());
    }
    Ok(())
}
