//! Task orchestration engine with priority scheduling, workflows, and statistics.
//!
//! Registers named agent handles, creates task records against agent ids,
//! dispatches each task to its agent, and records the outcome on the task.
//! Agent failures of any kind become FAILED tasks; only structural misuse
//! (unknown ids, duplicate ids, re-running finished tasks) is an error.
//!
//! # Main types
//!
//! - [`Orchestrator`] — Registers agents, creates and executes tasks, runs workflows.
//! - [`TaskRegistry`] — Append-only task store with priority-ordered retrieval.
//! - [`AgentHandle`] — The one-method interface every agent implements.
//! - [`AgentMonitor`] — Per-agent worker status and metrics.
//! - [`Statistics`] — Counts, success rate, and average duration over all tasks.
//! - [`Scheduler`] — Cron-based runner for the daily pipeline.

/// Agent handle interface and closure adapter.
pub mod agent;
/// Orchestrator configuration.
pub mod config;
/// Orchestration engine: execution, workflows, statistics.
pub mod engine;
/// Agent health and metrics monitoring.
pub mod monitor;
/// Canned pipeline definitions.
pub mod pipeline;
/// In-memory task registry.
pub mod registry;
/// Cron-based pipeline scheduler.
pub mod scheduler;
/// Statistics and progress views.
pub mod stats;

pub use agent::{AgentFailure, AgentHandle, FnAgent, DEFAULT_FAILURE_MESSAGE};
pub use config::{OrchestratorConfig, DEFAULT_PIPELINE_AGENT};
pub use engine::{Orchestrator, CANCELLED, INTERRUPTED};
pub use monitor::{AgentMetrics, AgentMonitor, AgentState, WorkerStatus};
pub use pipeline::{daily_pipeline_steps, project_manager_profile, PipelineStep};
pub use registry::TaskRegistry;
pub use scheduler::{ScheduledPipeline, Scheduler};
pub use stats::{Statistics, TaskProgress, WorkflowStatus};
pub use taskfleet_core::{
    AgentProfile, AgentRole, FleetError, FleetResult, TaskId, TaskParameters, TaskPriority,
    TaskRecord, TaskStatus,
};
pub use tokio_util::sync::CancellationToken;
