use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskfleet_core::{TaskId, TaskRecord, TaskStatus};

/// Aggregate view over every task an orchestrator knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub total_tasks: usize,
    pub pending: usize,
    pub assigned: usize,
    pub executing: usize,
    pub completed: usize,
    pub failed: usize,
    /// `completed / (completed + failed)`, or 0 when nothing has finished.
    pub success_rate: f64,
    /// Mean `completed_at - started_at` over completed tasks, or 0.
    pub average_duration_ms: f64,
    pub registered_agents: usize,
    pub workflows: usize,
}

impl Statistics {
    /// Scan `tasks` once. Never mutates anything.
    pub fn collect<'a>(
        tasks: impl IntoIterator<Item = &'a TaskRecord>,
        registered_agents: usize,
        workflows: usize,
    ) -> Self {
        let mut stats = Self {
            total_tasks: 0,
            pending: 0,
            assigned: 0,
            executing: 0,
            completed: 0,
            failed: 0,
            success_rate: 0.0,
            average_duration_ms: 0.0,
            registered_agents,
            workflows,
        };
        let mut total_duration_ms = 0i64;
        let mut timed = 0usize;

        for task in tasks {
            stats.total_tasks += 1;
            match task.status() {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Assigned => stats.assigned += 1,
                TaskStatus::Executing => stats.executing += 1,
                TaskStatus::Completed => {
                    stats.completed += 1;
                    if let Some(d) = task.duration() {
                        total_duration_ms += d.num_milliseconds();
                        timed += 1;
                    }
                }
                TaskStatus::Failed => stats.failed += 1,
            }
        }

        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 / finished as f64;
        }
        if timed > 0 {
            stats.average_duration_ms = total_duration_ms as f64 / timed as f64;
        }
        stats
    }
}

/// Progress of a named workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub workflow_id: String,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Everything not yet terminal, including tasks in flight.
    pub pending: usize,
    /// `"completed/total"`.
    pub progress: String,
}

impl WorkflowStatus {
    pub fn collect<'a>(
        workflow_id: &str,
        tasks: impl IntoIterator<Item = &'a TaskRecord>,
    ) -> Self {
        let (mut total, mut completed, mut failed) = (0, 0, 0);
        for task in tasks {
            total += 1;
            match task.status() {
                TaskStatus::Completed => completed += 1,
                TaskStatus::Failed => failed += 1,
                _ => {}
            }
        }
        Self {
            workflow_id: workflow_id.to_string(),
            total,
            completed,
            failed,
            pending: total - completed - failed,
            progress: format!("{completed}/{total}"),
        }
    }
}

/// Lightweight status view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    /// 0 pending, 25 assigned, 50 executing, 100 once terminal.
    pub percent: u8,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&TaskRecord> for TaskProgress {
    fn from(task: &TaskRecord) -> Self {
        let percent = match task.status() {
            TaskStatus::Pending => 0,
            TaskStatus::Assigned => 25,
            TaskStatus::Executing => 50,
            TaskStatus::Completed | TaskStatus::Failed => 100,
        };
        Self {
            id: task.id().clone(),
            name: task.name().to_string(),
            status: task.status(),
            percent,
            created_at: task.created_at(),
            completed_at: task.completed_at(),
        }
    }
}
