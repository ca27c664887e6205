//! Core types and error definitions for Taskfleet.
//!
//! This crate holds the plain data model shared by the orchestrator and by any
//! persistence collaborator: task records with their lifecycle state machine,
//! agent metadata, and the unified error type.
//!
//! # Main types
//!
//! - [`FleetError`] — Unified error enum for registry, engine, and config failures.
//! - [`FleetResult`] — Convenience alias for `Result<T, FleetError>`.
//! - [`TaskRecord`] — One unit of work and its lifecycle state.
//! - [`TaskStatus`] / [`TaskPriority`] — Ordered lifecycle and urgency tags.
//! - [`AgentProfile`] — Human-readable metadata for a registered agent id.

/// Agent metadata (roles and profiles).
pub mod profile;
/// Task records and the task lifecycle state machine.
pub mod task;

pub use profile::{AgentProfile, AgentRole};
pub use task::{TaskId, TaskParameters, TaskPriority, TaskRecord, TaskStatus};

// --- Error types ---

/// Top-level error type for Taskfleet.
///
/// Only structural misuse surfaces as an error to callers of the orchestrator.
/// Agent failures ([`FleetError::AgentUnresolved`], [`FleetError::AgentInvocation`])
/// are recorded on the task instead and exist here so that the failure text is
/// produced in one place.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    /// A referenced task or workflow does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A task id collided with an existing record at insert time.
    #[error("Duplicate task id: {0}")]
    DuplicateId(TaskId),

    /// Execution was requested for a task that already reached a terminal state.
    /// Carries the unchanged record.
    #[error("Task {} is already terminal ({})", .0.id(), .0.status())]
    AlreadyTerminal(Box<TaskRecord>),

    /// Execution was requested for a task another caller is currently running.
    #[error("Task {0} is already in progress")]
    InProgress(TaskId),

    /// A lifecycle transition that the state machine does not allow.
    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        /// Task whose transition was rejected.
        id: TaskId,
        /// Current status.
        from: TaskStatus,
        /// Requested status.
        to: TaskStatus,
    },

    /// No agent handle is registered for the task's agent id.
    #[error("agent not found: no handle registered for '{0}'")]
    AgentUnresolved(String),

    /// The agent reported or raised an error while executing a task.
    #[error("{0}")]
    AgentInvocation(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A TOML configuration file failed to parse.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`FleetError`].
pub type FleetResult<T> = Result<T, FleetError>;
