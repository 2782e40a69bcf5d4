//! Workflow definitions, persisted run state, the goal journal, and the
//! engine that drives transitions between them.

pub mod engine;
pub mod request;
pub mod schema;
pub mod state;

pub use engine::WorkflowEngine;
pub use schema::{list_definitions, load_definition, StageDefinition, WorkflowDefinition};
pub use state::{
    read_state, write_state, StageState, StageStatus, WorkflowState, WorkflowStatus,
};
