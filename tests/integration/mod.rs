//! Integration test suite for crew.
//!
//! These tests exercise whole workflows through the public API: the state
//! machine, the poll loop and agent lifecycle against scripted tmux and
//! process probe fakes. No real tmux sessions or provider CLIs are
//! involved, so they are safe to run in CI.

mod fixtures;

mod recovery;
mod workflow_e2e;
