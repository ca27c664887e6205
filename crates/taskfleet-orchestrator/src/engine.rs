use crate::agent::AgentHandle;
use crate::config::OrchestratorConfig;
use crate::monitor::AgentMonitor;
use crate::pipeline::daily_pipeline_steps;
use crate::registry::TaskRegistry;
use crate::stats::{Statistics, TaskProgress, WorkflowStatus};
use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use taskfleet_core::{
    AgentProfile, FleetError, FleetResult, TaskId, TaskParameters, TaskPriority, TaskRecord,
    TaskStatus,
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Error recorded on tasks whose invocation was cancelled.
pub const CANCELLED: &str = "cancelled";

/// Error recorded on imported tasks that were mid-run when exported.
pub const INTERRUPTED: &str = "interrupted before completion";

/// The task orchestration engine.
///
/// Owns the agent handles, the task registry, and named workflows for one
/// fleet. Independent instances share nothing, so tests can build as many as
/// they like.
pub struct Orchestrator {
    config: OrchestratorConfig,
    agents: Arc<RwLock<HashMap<String, Arc<dyn AgentHandle>>>>,
    profiles: RwLock<HashMap<String, AgentProfile>>,
    registry: Arc<RwLock<TaskRegistry>>,
    workflows: RwLock<BTreeMap<String, Vec<TaskId>>>,
    monitor: Arc<AgentMonitor>,
    shutdown: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with default settings.
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    /// Create an orchestrator with the given settings.
    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self {
            config,
            agents: Arc::new(RwLock::new(HashMap::new())),
            profiles: RwLock::new(HashMap::new()),
            registry: Arc::new(RwLock::new(TaskRegistry::new())),
            workflows: RwLock::new(BTreeMap::new()),
            monitor: Arc::new(AgentMonitor::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Get a reference to the monitor.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Get a reference to the task registry.
    pub fn registry(&self) -> &Arc<RwLock<TaskRegistry>> {
        &self.registry
    }

    /// Cancel every in-flight invocation. Tasks still executing end up
    /// FAILED with [`CANCELLED`], as does anything executed afterwards.
    pub fn shutdown(&self) {
        info!("Orchestrator: shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// A token that is cancelled once this orchestrator shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }

    // --- Agents ---

    /// Register (or replace) the handle for `agent_id`.
    pub async fn register_agent(&self, agent_id: impl Into<String>, handle: Arc<dyn AgentHandle>) {
        let agent_id = agent_id.into();
        let replaced = self
            .agents
            .write()
            .await
            .insert(agent_id.clone(), handle)
            .is_some();
        self.monitor.track(&agent_id).await;
        info!(agent_id = %agent_id, replaced, "Agent registered");
    }

    /// Register a handle together with its descriptive profile.
    pub async fn register_agent_with_profile(
        &self,
        profile: AgentProfile,
        handle: Arc<dyn AgentHandle>,
    ) {
        let agent_id = profile.id.clone();
        self.profiles.write().await.insert(agent_id.clone(), profile);
        self.register_agent(agent_id, handle).await;
    }

    /// Profiles of registered agents, sorted by id.
    pub async fn agent_profiles(&self) -> Vec<AgentProfile> {
        let mut profiles: Vec<AgentProfile> =
            self.profiles.read().await.values().cloned().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub async fn registered_agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    // --- Tasks ---

    /// Create a pending task. The agent does not need to be registered yet;
    /// it is resolved when the task executes.
    pub async fn create_task(
        &self,
        agent_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: TaskParameters,
        priority: TaskPriority,
    ) -> FleetResult<TaskRecord> {
        let task = TaskRecord::new(agent_id, name, description)
            .with_parameters(parameters)
            .with_priority(priority);
        self.registry.write().await.insert(task.clone())?;
        info!(
            task_id = %task.id(),
            agent_id = %task.agent_id(),
            priority = %task.priority(),
            name = %task.name(),
            "Task created"
        );
        Ok(task)
    }

    pub async fn get_task(&self, task_id: &TaskId) -> FleetResult<TaskRecord> {
        self.registry.read().await.get(task_id).cloned()
    }

    /// Pending tasks, highest priority first, creation order within a priority.
    pub async fn pending_by_priority(&self) -> Vec<TaskRecord> {
        self.registry
            .read()
            .await
            .pending_by_priority()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every task in creation order.
    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.registry.read().await.snapshot()
    }

    pub async fn task_progress(&self, task_id: &TaskId) -> FleetResult<TaskProgress> {
        let registry = self.registry.read().await;
        Ok(TaskProgress::from(registry.get(task_id)?))
    }

    // --- Execution ---

    /// Run one task to a terminal state.
    ///
    /// An unregistered agent, an agent error, a panic inside the agent, a
    /// timeout, or a cancellation all produce a FAILED record rather than an
    /// error. Errors are reserved for unknown ids
    /// ([`FleetError::NotFound`]), finished tasks
    /// ([`FleetError::AlreadyTerminal`], record untouched), and tasks another
    /// caller is running ([`FleetError::InProgress`]).
    pub async fn execute_task(&self, task_id: &TaskId) -> FleetResult<TaskRecord> {
        self.run_task(task_id, &CancellationToken::new()).await
    }

    /// Execute tasks strictly in the given order, continuing past failures.
    ///
    /// Unknown ids and tasks already running elsewhere are skipped; finished
    /// tasks contribute their unchanged record.
    pub async fn execute_workflow<I>(&self, tasks: I) -> Vec<TaskRecord>
    where
        I: IntoIterator,
        I::Item: AsRef<TaskId>,
    {
        let ids: Vec<TaskId> = tasks.into_iter().map(|t| t.as_ref().clone()).collect();
        info!(tasks = ids.len(), "Executing workflow");

        let mut results = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.execute_task(id).await {
                Ok(record) => results.push(record),
                Err(FleetError::AlreadyTerminal(record)) => {
                    debug!(task_id = %id, status = %record.status(), "Workflow task already finished");
                    results.push(*record);
                }
                Err(e) => warn!(task_id = %id, error = %e, "Skipping workflow task"),
            }
        }

        let failed = results
            .iter()
            .filter(|t| t.status() == TaskStatus::Failed)
            .count();
        info!(
            executed = results.len(),
            failed,
            "Workflow finished"
        );
        results
    }

    /// Execute every pending task, up to `max_parallel` at a time, drawn in
    /// priority order. Results come back in that same order.
    ///
    /// Only for independent tasks: nothing orders one task after another.
    /// Cancelling `cancel` fails whatever is still executing with [`CANCELLED`].
    pub async fn execute_parallel(&self, cancel: &CancellationToken) -> Vec<TaskRecord> {
        let ids: Vec<TaskId> = self
            .registry
            .read()
            .await
            .pending_by_priority()
            .iter()
            .map(|t| t.id().clone())
            .collect();
        let width = self.config.max_parallel.max(1);
        info!(tasks = ids.len(), width, "Executing pending tasks in parallel");

        let results: Vec<Option<TaskRecord>> = stream::iter(ids.iter())
            .map(|id| async move {
                match self.run_task(id, cancel).await {
                    Ok(record) => Some(record),
                    Err(FleetError::AlreadyTerminal(record)) => Some(*record),
                    Err(e) => {
                        warn!(task_id = %id, error = %e, "Skipping task in parallel run");
                        None
                    }
                }
            })
            .buffered(width)
            .collect()
            .await;

        results.into_iter().flatten().collect()
    }

    async fn run_task(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> FleetResult<TaskRecord> {
        // Claim: only a pending task may move on.
        let claim = {
            let mut registry = self.registry.write().await;
            let task = registry.get_mut(task_id)?;
            match task.status() {
                TaskStatus::Pending => {}
                status if status.is_terminal() => {
                    return Err(FleetError::AlreadyTerminal(Box::new(task.clone())));
                }
                _ => return Err(FleetError::InProgress(task_id.clone())),
            }
            task.assign()?;
            Claim {
                task_id: task_id.clone(),
                agent_id: task.agent_id().to_string(),
                name: task.name().to_string(),
                parameters: task.parameters().clone(),
            }
        };
        debug!(task_id = %task_id, agent_id = %claim.agent_id, "Task assigned");

        // A claimed task always reaches an outcome. The run is detached from
        // this future, and dropping this future cancels the invocation.
        let scoped = cancel.child_token();
        let _cancel_on_drop = scoped.clone().drop_guard();
        let dispatch = self.dispatch();
        tokio::spawn(async move { dispatch.run(claim, scoped).await })
            .await
            .map_err(|e| FleetError::AgentInvocation(format!("task execution aborted: {e}")))?
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch {
            agents: Arc::clone(&self.agents),
            registry: Arc::clone(&self.registry),
            monitor: Arc::clone(&self.monitor),
            shutdown: self.shutdown.clone(),
            timeout: self.config.invocation_timeout(),
        }
    }

    // --- Workflows ---

    /// Build the daily monitoring pipeline for `project_id` against the
    /// configured pipeline agent. Nothing is executed.
    pub async fn create_daily_pipeline(&self, project_id: Option<&str>) -> FleetResult<Vec<TaskId>> {
        let agent_id = self.config.pipeline_agent_id.clone();
        let mut task_ids = Vec::new();
        for step in daily_pipeline_steps() {
            let task = self
                .create_task(
                    agent_id.as_str(),
                    step.name,
                    step.description,
                    step.parameters(project_id),
                    step.priority,
                )
                .await?;
            task_ids.push(task.id().clone());
        }

        let workflow_id = format!(
            "daily_pipeline:{}:{}",
            project_id.unwrap_or("all"),
            Utc::now().format("%Y%m%dT%H%M%S%.6f")
        );
        self.define_workflow(workflow_id.as_str(), task_ids.clone())
            .await?;
        info!(workflow_id = %workflow_id, tasks = task_ids.len(), "Daily pipeline created");
        Ok(task_ids)
    }

    /// Record an ordered list of tasks under a name. Replaces any workflow
    /// with the same name.
    pub async fn define_workflow(
        &self,
        workflow_id: impl Into<String>,
        task_ids: Vec<TaskId>,
    ) -> FleetResult<()> {
        {
            let registry = self.registry.read().await;
            if let Some(missing) = task_ids.iter().find(|id| !registry.contains(id)) {
                return Err(FleetError::NotFound(format!("task {missing}")));
            }
        }
        self.workflows
            .write()
            .await
            .insert(workflow_id.into(), task_ids);
        Ok(())
    }

    /// Names of all recorded workflows, sorted.
    pub async fn workflow_names(&self) -> Vec<String> {
        self.workflows.read().await.keys().cloned().collect()
    }

    /// Task ids of a recorded workflow, in order.
    pub async fn workflow_tasks(&self, workflow_id: &str) -> FleetResult<Vec<TaskId>> {
        self.workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("workflow {workflow_id}")))
    }

    pub async fn workflow_status(&self, workflow_id: &str) -> FleetResult<WorkflowStatus> {
        let ids = self.workflow_tasks(workflow_id).await?;
        let registry = self.registry.read().await;
        let tasks = ids
            .iter()
            .map(|id| registry.get(id))
            .collect::<FleetResult<Vec<_>>>()?;
        Ok(WorkflowStatus::collect(workflow_id, tasks))
    }

    // --- Statistics & persistence ---

    /// Counts per status, success rate, and mean duration. Read-only.
    pub async fn get_statistics(&self) -> Statistics {
        let registered_agents = self.registered_agent_count().await;
        let workflows = self.workflows.read().await.len();
        let registry = self.registry.read().await;
        Statistics::collect(registry.all(), registered_agents, workflows)
    }

    /// Plain copies of every task record, for a persistence collaborator.
    pub async fn export_tasks(&self) -> Vec<TaskRecord> {
        self.tasks().await
    }

    /// Load previously exported records. Either all are added or none are.
    ///
    /// Records caught ASSIGNED or EXECUTING have no run left to finish them,
    /// so they are imported FAILED with [`INTERRUPTED`].
    pub async fn import_tasks(&self, records: Vec<TaskRecord>) -> FleetResult<usize> {
        let mut registry = self.registry.write().await;
        let mut seen = HashSet::new();
        for record in &records {
            if registry.contains(record.id()) || !seen.insert(record.id()) {
                return Err(FleetError::DuplicateId(record.id().clone()));
            }
        }
        let count = records.len();
        for mut record in records {
            if matches!(record.status(), TaskStatus::Assigned | TaskStatus::Executing) {
                warn!(
                    task_id = %record.id(),
                    status = %record.status(),
                    "Imported task was in flight, marking it failed"
                );
                record.fail(INTERRUPTED)?;
            }
            registry.insert(record)?;
        }
        info!(count, "Tasks imported");
        Ok(count)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

/// A task that moved from PENDING to ASSIGNED and is now owned by one run.
struct Claim {
    task_id: TaskId,
    agent_id: String,
    name: String,
    parameters: TaskParameters,
}

/// Owned handles for running one claimed task to its outcome.
struct Dispatch {
    agents: Arc<RwLock<HashMap<String, Arc<dyn AgentHandle>>>>,
    registry: Arc<RwLock<TaskRegistry>>,
    monitor: Arc<AgentMonitor>,
    shutdown: CancellationToken,
    timeout: Option<Duration>,
}

impl Dispatch {
    async fn run(self, claim: Claim, cancel: CancellationToken) -> FleetResult<TaskRecord> {
        let Claim {
            task_id,
            agent_id,
            name,
            parameters,
        } = claim;

        let handle = self.agents.read().await.get(&agent_id).cloned();
        let Some(handle) = handle else {
            let reason = FleetError::AgentUnresolved(agent_id.clone()).to_string();
            warn!(task_id = %task_id, agent_id = %agent_id, "No handle registered for agent");
            return self.update(&task_id, |t| t.fail(reason)).await;
        };

        self.update(&task_id, TaskRecord::start).await?;
        self.monitor.start_task(&agent_id, &task_id).await;
        info!(task_id = %task_id, agent_id = %agent_id, name = %name, "Executing task");

        let start = Instant::now();
        let outcome = self.invoke(handle.as_ref(), &name, &parameters, &cancel).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.monitor.finish_task(&agent_id, &task_id, duration_ms).await;
                info!(task_id = %task_id, agent_id = %agent_id, duration_ms, "Task completed");
                self.update(&task_id, |t| t.complete(result)).await
            }
            Err(reason) => {
                self.monitor.record_failure(&agent_id, &task_id, duration_ms).await;
                error!(
                    task_id = %task_id,
                    agent_id = %agent_id,
                    error = %reason,
                    duration_ms,
                    "Task failed"
                );
                self.update(&task_id, |t| t.fail(reason)).await
            }
        }
    }

    /// Call the agent, turning every way it can go wrong into a message.
    async fn invoke(
        &self,
        handle: &dyn AgentHandle,
        name: &str,
        parameters: &TaskParameters,
        cancel: &CancellationToken,
    ) -> Result<Value, String> {
        let call = AssertUnwindSafe(handle.invoke(name, parameters)).catch_unwind();
        let limit = self.timeout;
        let bounded = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, call).await.ok(),
                None => Some(call.await),
            }
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(CANCELLED.to_string()),
            _ = cancel.cancelled() => Err(CANCELLED.to_string()),
            outcome = bounded => match outcome {
                Some(Ok(Ok(value))) => Ok(value),
                Some(Ok(Err(failure))) => {
                    Err(FleetError::AgentInvocation(failure.message().to_string()).to_string())
                }
                Some(Err(panic)) => Err(format!("agent panicked: {}", panic_message(panic.as_ref()))),
                None => Err(format!(
                    "agent invocation timed out after {}s",
                    limit.map(|d| d.as_secs()).unwrap_or_default()
                )),
            },
        }
    }

    async fn update<F>(&self, task_id: &TaskId, f: F) -> FleetResult<TaskRecord>
    where
        F: FnOnce(&mut TaskRecord) -> FleetResult<()>,
    {
        let mut registry = self.registry.write().await;
        let task = registry.get_mut(task_id)?;
        f(task)?;
        Ok(task.clone())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
