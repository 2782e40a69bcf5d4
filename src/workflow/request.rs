//! The `REQUEST.md` goal journal.
//!
//! Human-editable markdown in the working directory collects requests as
//! `## [YYYY-MM-DD HH:MM] title` entries. Entries marked `[done]` are
//! finished; the concatenation of the rest is the active goal handed to
//! agents. Appends go through a temp file plus rename, like the state file.

use chrono::Local;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::Result;

static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^## \s*(?:\[done\]\s*)?\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\]\s*(.+)$").unwrap()
});
static DONE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^## \s*\[done\]").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEntry {
    pub timestamp: String,
    pub title: String,
    pub body: String,
    pub done: bool,
}

/// Parse request entries out of the journal. Lines before the first
/// heading are ignored; lines after a heading accumulate into its body.
pub fn parse_request(content: &str) -> Vec<RequestEntry> {
    let mut entries: Vec<RequestEntry> = Vec::new();
    let mut current: Option<RequestEntry> = None;

    for line in content.lines() {
        if let Some(caps) = HEADING_RE.captures(line) {
            if let Some(entry) = current.take() {
                entries.push(entry);
            }
            current = Some(RequestEntry {
                timestamp: caps[1].to_string(),
                title: caps[2].trim().to_string(),
                body: String::new(),
                done: DONE_RE.is_match(line),
            });
            continue;
        }
        if let Some(entry) = current.as_mut() {
            entry.body.push_str(line);
            entry.body.push('\n');
        }
    }
    if let Some(entry) = current {
        entries.push(entry);
    }

    for entry in &mut entries {
        entry.body = entry.body.trim().to_string();
    }
    entries
}

/// Join all non-done entries into one goal text. Empty when everything
/// is done.
pub fn active_goal(entries: &[RequestEntry]) -> String {
    entries
        .iter()
        .filter(|e| !e.done)
        .map(|e| {
            let header = format!("[{}] {}", e.timestamp, e.title);
            if e.body.is_empty() {
                header
            } else {
                format!("{}\n{}", header, e.body)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format a fresh entry with a local-time minute-resolution timestamp.
pub fn format_new_entry(title: &str, body: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M");
    let heading = format!("## [{}] {}", timestamp, title);
    if body.is_empty() {
        heading
    } else {
        format!("{}\n\n{}", heading, body)
    }
}

/// Append an entry to `REQUEST.md`, creating the file with its `# Request`
/// header on first use.
pub fn append_request_entry(crew_dir: &Path, title: &str, body: &str) -> Result<()> {
    let path = crew_dir.join("REQUEST.md");
    let entry = format_new_entry(title, body);
    let existing = std::fs::read_to_string(&path).unwrap_or_default();
    let content = if existing.is_empty() {
        format!("# Request\n\n{}\n", entry)
    } else {
        format!("{}\n\n{}\n", existing.trim_end(), entry)
    };
    let tmp = crew_dir.join("REQUEST.md.tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// The active goal for a working directory: journal entries first, then
/// the persisted state's goal as a fallback, then empty.
pub fn load_active_goal(crew_dir: &Path) -> String {
    if let Ok(content) = std::fs::read_to_string(crew_dir.join("REQUEST.md")) {
        let goal = active_goal(&parse_request(&content));
        if !goal.is_empty() {
            return goal;
        }
    }
    super::state::read_state(crew_dir)
        .map(|s| s.goal)
        .unwrap_or_default()
}
