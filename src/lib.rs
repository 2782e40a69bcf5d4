//! crew orchestrates a pipeline of terminal-hosted AI coding agents
//! through named multi-stage workflows: stage sequencing with human
//! approval gates and cycle looping, tmux-pane agent lifecycle management
//! with health-driven respawn and idle nudging, and a polling control loop
//! tying the two together.

pub mod adapters;
pub mod commands;
pub mod config;
pub mod error;
pub mod log;
pub mod poll;
pub mod probe;
pub mod runner;
pub mod signal;
pub mod tmux;
pub mod workflow;

pub use error::{Error, Result};
