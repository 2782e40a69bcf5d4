//! Per-provider CLI adapters.
//!
//! Each supported agent CLI gets one [`CliAdapter`] implementation that
//! knows how to launch it, how to clear its context, and how to read its
//! status from captured pane output. The rest of the crate only talks to
//! the trait; provider names appear nowhere outside [`resolve_adapter`].
//!
//! ## Status detection
//!
//! Status is inferred from the last ~5 lines of pane output and is
//! inherently heuristic: a trailing shell/application prompt character
//! means the CLI is at rest, an error token means something blew up, and
//! anything else is treated as work in progress. Providers with unusual
//! prompt styles should override `detect_status`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

/// Lines of pane output considered when classifying agent status. Looking
/// further back causes false positives from historical output.
const STATUS_WINDOW_LINES: usize = 5;

/// A prompt character at end of line means the CLI returned to its prompt.
static PROMPT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)[$%#>]\s*$").unwrap());

/// Word-bounded error tokens; bare substring matching would trip on
/// phrases like "no errors found".
static ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:Error|ENOENT|EACCES|fatal|panic)\b").unwrap());

/// Coarse agent status inferred from pane output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// CLI is at its prompt, waiting for input.
    Idle,
    /// CLI appears to be producing output.
    Active,
    /// An error token surfaced in recent output.
    Error,
    /// Agent was explicitly stopped.
    Stopped,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Supported agent CLI providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    ClaudeCode,
    Codex,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::ClaudeCode => write!(f, "claude-code"),
            Provider::Codex => write!(f, "codex"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "claude-code" => Ok(Provider::ClaudeCode),
            "codex" => Ok(Provider::Codex),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Launch options passed through to the provider CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Skip the CLI's interactive permission prompts.
    pub auto_approve: bool,
}

/// Capability interface one provider CLI exposes to the core.
pub trait CliAdapter: Send + Sync {
    /// Shell command that launches the CLI in the working directory.
    fn start_command(&self, model: Option<&str>, cwd: &Path, options: LaunchOptions) -> String;
    /// In-band incantation that clears the CLI's conversation context.
    fn clear_command(&self) -> &'static str;
    /// Classify captured pane output into a coarse status.
    fn detect_status(&self, pane_output: &str) -> AgentStatus {
        detect_agent_status(pane_output)
    }
}

/// Shared status heuristic over the tail of pane output.
pub fn detect_agent_status(pane_output: &str) -> AgentStatus {
    let lines: Vec<&str> = pane_output.trim().lines().collect();
    let start = lines.len().saturating_sub(STATUS_WINDOW_LINES);
    let tail = lines[start..].join("\n");

    if PROMPT_RE.is_match(&tail) {
        return AgentStatus::Idle;
    }
    if ERROR_RE.is_match(&tail) {
        return AgentStatus::Error;
    }
    AgentStatus::Active
}

/// Wrap a value in single quotes for safe inclusion in a shell command.
pub fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Claude Code CLI adapter.
pub struct ClaudeCodeAdapter;

impl CliAdapter for ClaudeCodeAdapter {
    fn start_command(&self, model: Option<&str>, cwd: &Path, options: LaunchOptions) -> String {
        let model_flag = model
            .map(|m| format!(" --model {}", shell_escape(m)))
            .unwrap_or_default();
        let flags = if options.auto_approve {
            " --dangerously-skip-permissions"
        } else {
            ""
        };
        format!(
            "cd {} && claude{}{}",
            shell_escape(&cwd.display().to_string()),
            model_flag,
            flags
        )
    }

    fn clear_command(&self) -> &'static str {
        "/clear"
    }
}

/// Codex CLI adapter.
pub struct CodexAdapter;

impl CliAdapter for CodexAdapter {
    fn start_command(&self, model: Option<&str>, cwd: &Path, options: LaunchOptions) -> String {
        let model_flag = model
            .map(|m| format!(" --model {}", shell_escape(m)))
            .unwrap_or_default();
        let flags = if options.auto_approve { " --full-auto" } else { "" };
        format!(
            "cd {} && codex{}{}",
            shell_escape(&cwd.display().to_string()),
            model_flag,
            flags
        )
    }

    fn clear_command(&self) -> &'static str {
        // Codex has no slash command; ESC interrupts and the runner restarts it.
        "\x1b"
    }
}

/// Look up the adapter for a provider.
pub fn resolve_adapter(provider: Provider) -> Box<dyn CliAdapter> {
    match provider {
        Provider::ClaudeCode => Box::new(ClaudeCodeAdapter),
        Provider::Codex => Box::new(CodexAdapter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    // ---- detect_agent_status ----

    #[test]
    fn test_detect_idle_on_shell_prompt() {
        assert_eq!(detect_agent_status("some output\nuser@host ~ $"), AgentStatus::Idle);
        assert_eq!(detect_agent_status("zsh ready\n% "), AgentStatus::Idle);
        assert_eq!(detect_agent_status("root shell\n# "), AgentStatus::Idle);
        assert_eq!(detect_agent_status("app prompt\n> "), AgentStatus::Idle);
    }

    #[test]
    fn test_detect_error_tokens() {
        assert_eq!(
            detect_agent_status("building...\nError: missing semicolon"),
            AgentStatus::Error
        );
        assert_eq!(detect_agent_status("ENOENT: no such file"), AgentStatus::Error);
        assert_eq!(detect_agent_status("fatal: not a git repository"), AgentStatus::Error);
        assert_eq!(
            detect_agent_status("thread 'main' panicked\npanic occurred"),
            AgentStatus::Error
        );
    }

    #[test]
    fn test_detect_active_by_default() {
        assert_eq!(
            detect_agent_status("Compiling crate v0.1.0\nstill working..."),
            AgentStatus::Active
        );
    }

    #[test]
    fn test_detect_no_false_positive_on_no_errors_found() {
        // "errors" is not word-boundary "Error"
        assert_eq!(detect_agent_status("checked: no errors found..."), AgentStatus::Active);
    }

    #[test]
    fn test_detect_only_considers_recent_lines() {
        // Error far back in scrollback followed by fresh activity.
        let output = "Error: transient\nline\nline\nline\nline\nline\nworking on task...";
        assert_eq!(detect_agent_status(output), AgentStatus::Active);
    }

    #[test]
    fn test_detect_prompt_wins_over_error() {
        // CLI printed an error, then returned to its prompt: idle.
        let output = "Error: something failed\n$ ";
        assert_eq!(detect_agent_status(output), AgentStatus::Idle);
    }

    #[test]
    fn test_detect_empty_output_is_active() {
        assert_eq!(detect_agent_status(""), AgentStatus::Active);
    }

    // ---- shell_escape ----

    #[test]
    fn test_shell_escape_plain() {
        assert_eq!(shell_escape("hello"), "'hello'");
    }

    #[test]
    fn test_shell_escape_embedded_quote() {
        assert_eq!(shell_escape("it's"), r"'it'\''s'");
    }

    // ---- adapters ----

    #[test]
    fn test_claude_start_command() {
        let adapter = ClaudeCodeAdapter;
        let cmd = adapter.start_command(
            Some("claude-opus-4-6"),
            &PathBuf::from("/work/proj"),
            LaunchOptions::default(),
        );
        assert_eq!(cmd, "cd '/work/proj' && claude --model 'claude-opus-4-6'");
    }

    #[test]
    fn test_claude_start_command_auto_approve() {
        let adapter = ClaudeCodeAdapter;
        let cmd = adapter.start_command(
            None,
            &PathBuf::from("/work/proj"),
            LaunchOptions { auto_approve: true },
        );
        assert_eq!(cmd, "cd '/work/proj' && claude --dangerously-skip-permissions");
    }

    #[test]
    fn test_codex_start_command() {
        let adapter = CodexAdapter;
        let cmd = adapter.start_command(
            Some("codex-1"),
            &PathBuf::from("/work/proj"),
            LaunchOptions { auto_approve: true },
        );
        assert_eq!(cmd, "cd '/work/proj' && codex --model 'codex-1' --full-auto");
    }

    #[test]
    fn test_clear_commands() {
        assert_eq!(ClaudeCodeAdapter.clear_command(), "/clear");
        assert_eq!(CodexAdapter.clear_command(), "\x1b");
    }

    #[test]
    fn test_provider_parse_and_display() {
        assert_eq!("claude-code".parse::<Provider>().unwrap(), Provider::ClaudeCode);
        assert_eq!("codex".parse::<Provider>().unwrap(), Provider::Codex);
        assert!("gemini".parse::<Provider>().is_err());
        assert_eq!(Provider::ClaudeCode.to_string(), "claude-code");
    }

    #[test]
    fn test_provider_serde_format() {
        assert_eq!(
            serde_json::to_string(&Provider::ClaudeCode).unwrap(),
            r#""claude-code""#
        );
        let p: Provider = serde_json::from_str(r#""codex""#).unwrap();
        assert_eq!(p, Provider::Codex);
    }

    #[test]
    fn test_resolve_adapter_dispatch() {
        assert_eq!(resolve_adapter(Provider::ClaudeCode).clear_command(), "/clear");
        assert_eq!(resolve_adapter(Provider::Codex).clear_command(), "\x1b");
    }

    #[test]
    fn test_agent_status_serde_format() {
        assert_eq!(serde_json::to_string(&AgentStatus::Idle).unwrap(), r#""idle""#);
        assert_eq!(
            serde_json::to_string(&AgentStatus::Active).unwrap(),
            r#""active""#
        );
    }
}
