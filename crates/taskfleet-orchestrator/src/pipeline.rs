use crate::config::DEFAULT_PIPELINE_AGENT;
use taskfleet_core::{AgentProfile, AgentRole, TaskParameters, TaskPriority};

/// One step of a canned pipeline, before it becomes a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    /// Value of the `type` parameter the agent dispatches on.
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub priority: TaskPriority,
}

impl PipelineStep {
    /// Parameters for this step: `{"type": kind, "project_id": project_id}`.
    pub fn parameters(&self, project_id: Option<&str>) -> TaskParameters {
        let mut params = TaskParameters::new();
        params.insert("type".to_string(), serde_json::json!(self.kind));
        params.insert("project_id".to_string(), serde_json::json!(project_id));
        params
    }
}

/// The daily monitoring pipeline, in execution order.
pub fn daily_pipeline_steps() -> Vec<PipelineStep> {
    vec![
        PipelineStep {
            kind: "health_check",
            name: "Project health check",
            description: "Check the health status of the monitored project",
            priority: TaskPriority::High,
        },
        PipelineStep {
            kind: "stats_24h",
            name: "24h statistics",
            description: "Collect usage, error, and latency statistics for the past 24 hours",
            priority: TaskPriority::Normal,
        },
        PipelineStep {
            kind: "alert_check",
            name: "Alert check",
            description: "Evaluate alert thresholds against the collected statistics",
            priority: TaskPriority::High,
        },
        PipelineStep {
            kind: "daily_report",
            name: "Daily report",
            description: "Generate the daily report from the previous steps",
            priority: TaskPriority::Normal,
        },
    ]
}

/// Metadata for the agent the daily pipeline targets by default.
pub fn project_manager_profile() -> AgentProfile {
    AgentProfile::new(
        DEFAULT_PIPELINE_AGENT,
        "Project Manager",
        AgentRole::ProjectManager,
    )
    .with_description("Runs health checks, statistics, alerting, and daily reports")
}
