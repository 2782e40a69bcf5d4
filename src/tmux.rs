//! Tmux transport for hosting agent processes.
//!
//! Every agent runs inside a pane of one detached tmux session. The
//! [`TmuxPort`] trait is the seam the agent runner talks through; [`Tmux`]
//! shells out to the tmux binary. Tests substitute a recording mock.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::{clog_debug, clog_trace, clog_warn, Error, Result};

/// Delay between typing text into a pane and pressing Enter. Some agent
/// TUIs drop the Enter keypress if it arrives in the same burst as the text.
pub const SEND_SETTLE_DELAY: Duration = Duration::from_millis(300);

/// Operations the agent runner needs from the hosting transport.
pub trait TmuxPort {
    fn has_session(&self, name: &str) -> bool;
    fn new_session(&self, name: &str) -> Result<()>;
    fn kill_session(&self, name: &str) -> Result<()>;
    fn split_window(&self, session: &str, direction: SplitDirection) -> Result<()>;
    fn select_layout(&self, session: &str, layout: &str) -> Result<()>;
    fn send_keys(&self, target: &str, keys: &str) -> Result<()>;
    /// Type text into a pane, wait for it to land, then press Enter.
    fn send_text(&self, target: &str, text: &str) -> Result<()>;
    /// Paste a file's content into a pane via tmux buffers, then press Enter.
    /// Used for multi-line prompts where send-keys would mangle newlines.
    fn send_prompt_file(&self, target: &str, file: &Path) -> Result<()>;
    fn capture_pane(&self, target: &str) -> Result<String>;
    fn pane_pid(&self, target: &str) -> Result<u32>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    Horizontal,
    Vertical,
}

/// Real tmux transport shelling out to the tmux binary.
pub struct Tmux;

impl Tmux {
    fn run(args: &[&str]) -> Result<String> {
        clog_trace!("tmux {}", args.join(" "));
        let output = Command::new("tmux").args(args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            clog_warn!("tmux {} failed: {}", args.first().unwrap_or(&""), stderr);
            return Err(Error::Tmux(stderr));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    pub fn is_available() -> bool {
        Command::new("tmux")
            .arg("-V")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn version() -> Result<String> {
        Self::run(&["-V"])
    }
}

impl TmuxPort for Tmux {
    fn has_session(&self, name: &str) -> bool {
        Command::new("tmux")
            .args(["has-session", "-t", name])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn new_session(&self, name: &str) -> Result<()> {
        clog_debug!("Tmux::new_session name={}", name);
        Self::run(&["new-session", "-d", "-s", name])?;
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        clog_debug!("Tmux::kill_session name={}", name);
        match Self::run(&["kill-session", "-t", name]) {
            Ok(_) => Ok(()),
            Err(Error::Tmux(msg)) if msg.contains("session not found") => {
                clog_debug!("Tmux session '{}' already gone", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn split_window(&self, session: &str, direction: SplitDirection) -> Result<()> {
        let flag = match direction {
            SplitDirection::Horizontal => "-h",
            SplitDirection::Vertical => "-v",
        };
        Self::run(&["split-window", flag, "-t", session])?;
        Ok(())
    }

    fn select_layout(&self, session: &str, layout: &str) -> Result<()> {
        Self::run(&["select-layout", "-t", session, layout])?;
        Ok(())
    }

    fn send_keys(&self, target: &str, keys: &str) -> Result<()> {
        clog_debug!("Tmux::send_keys target={} keys={}", target, keys);
        Self::run(&["send-keys", "-t", target, keys])?;
        Ok(())
    }

    fn send_text(&self, target: &str, text: &str) -> Result<()> {
        self.send_keys(target, text)?;
        std::thread::sleep(SEND_SETTLE_DELAY);
        self.send_keys(target, "Enter")
    }

    fn send_prompt_file(&self, target: &str, file: &Path) -> Result<()> {
        let path = file.display().to_string();
        Self::run(&["load-buffer", &path])?;
        Self::run(&["paste-buffer", "-p", "-t", target])?;
        std::thread::sleep(SEND_SETTLE_DELAY);
        self.send_keys(target, "Enter")
    }

    fn capture_pane(&self, target: &str) -> Result<String> {
        clog_trace!("Tmux::capture_pane target={}", target);
        let output = Command::new("tmux")
            .args(["capture-pane", "-t", target, "-p"])
            .output()?;
        if !output.status.success() {
            return Err(Error::Tmux(format!(
                "Failed to capture pane '{}': {}",
                target,
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        let content = String::from_utf8_lossy(&output.stdout).to_string();
        clog_trace!("capture_pane: {} bytes", content.len());
        Ok(content)
    }

    fn pane_pid(&self, target: &str) -> Result<u32> {
        let out = Self::run(&["display-message", "-t", target, "-p", "#{pane_pid}"])?;
        out.parse::<u32>()
            .map_err(|_| Error::Tmux(format!("invalid pane pid: {}", out)))
    }
}
