//! Process liveness probing.
//!
//! The runner needs two facts about a hosted agent: is a PID still alive,
//! and which child PIDs a pane's shell currently has. [`SysProbe`] answers
//! both with `kill(pid, 0)` and `pgrep -P`; tests substitute a scripted
//! probe.

use std::process::Command;

use crate::{clog_trace, Error, Result};

pub trait ProcessProbe {
    /// Whether a signal can be delivered to the PID.
    fn is_alive(&self, pid: u32) -> bool;
    /// Direct children of the given PID. An empty list is not an error.
    fn child_pids(&self, pid: u32) -> Result<Vec<u32>>;
}

/// Probe backed by the host OS.
pub struct SysProbe;

impl ProcessProbe for SysProbe {
    fn is_alive(&self, pid: u32) -> bool {
        // Signal 0 performs the permission/existence check without delivering.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    fn child_pids(&self, pid: u32) -> Result<Vec<u32>> {
        clog_trace!("SysProbe::child_pids pid={}", pid);
        let output = Command::new("pgrep")
            .args(["-P", &pid.to_string()])
            .output()
            .map_err(|e| Error::Validation(format!("pgrep failed: {}", e)))?;
        // pgrep exits 1 when no processes match; that's an empty result.
        if !output.status.success() {
            return Ok(Vec::new());
        }
        let pids = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|l| l.trim().parse::<u32>().ok())
            .collect();
        Ok(pids)
    }
}
