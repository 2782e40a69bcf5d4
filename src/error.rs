use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Workflow already running")]
    AlreadyRunning,

    #[error("Workflow not running")]
    NotRunning,

    #[error("Gate pending: current stage requires approval")]
    GatePending,

    #[error("Max cycles exceeded")]
    MaxCyclesExceeded,

    #[error("Workflow already completed")]
    WorkflowCompleted,

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Session already exists: {0}")]
    SessionExists(String),

    #[error("Respawn failed: {0}")]
    RespawnFailed(String),

    #[error("Tmux error: {0}")]
    Tmux(String),

    #[error("Nudge failed: {0}")]
    NudgeFailed(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
