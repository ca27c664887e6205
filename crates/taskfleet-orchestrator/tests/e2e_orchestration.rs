//! End-to-end orchestration tests.
//!
//! Drives the orchestrator through its public API with in-process agents:
//! lifecycle ordering, priority scheduling, best-effort workflows, the daily
//! pipeline, statistics, parallel execution, timeouts, and cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use taskfleet_orchestrator::*;
use tokio::sync::{Barrier, RwLock};

// ---------------------------------------------------------------------------
// Test agents
// ---------------------------------------------------------------------------

fn echo_agent() -> Arc<dyn AgentHandle> {
    Arc::new(FnAgent::new(|name, params| {
        Ok(json!({ "echo": name, "type": params.get("type") }))
    }))
}

/// Records the order in which it is invoked.
fn recording_agent(log: Arc<Mutex<Vec<String>>>) -> Arc<dyn AgentHandle> {
    Arc::new(FnAgent::new(move |name, _| {
        log.lock().unwrap().push(name.to_string());
        Ok(json!(name))
    }))
}

/// Asserts, from inside the invocation, that its task is EXECUTING.
struct ObservingAgent {
    registry: Arc<RwLock<TaskRegistry>>,
    seen: Arc<Mutex<Vec<TaskStatus>>>,
}

#[async_trait]
impl AgentHandle for ObservingAgent {
    async fn invoke(&self, task_name: &str, _: &TaskParameters) -> Result<Value, AgentFailure> {
        let registry = self.registry.read().await;
        let task = registry
            .all()
            .into_iter()
            .find(|t| t.name() == task_name)
            .ok_or_else(|| AgentFailure::new("task not visible"))?;
        self.seen.lock().unwrap().push(task.status());
        Ok(json!("observed"))
    }
}

struct SlowAgent(Duration);

#[async_trait]
impl AgentHandle for SlowAgent {
    async fn invoke(&self, _: &str, _: &TaskParameters) -> Result<Value, AgentFailure> {
        tokio::time::sleep(self.0).await;
        Ok(json!("late"))
    }
}

/// Finishes "short" quickly and anything else slowly.
struct StaggeredAgent;

#[async_trait]
impl AgentHandle for StaggeredAgent {
    async fn invoke(&self, task_name: &str, _: &TaskParameters) -> Result<Value, AgentFailure> {
        let delay = if task_name == "short" { 20 } else { 500 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(json!(task_name))
    }
}

/// Completes only once `n` invocations are in flight at the same time.
struct RendezvousAgent(Arc<Barrier>);

#[async_trait]
impl AgentHandle for RendezvousAgent {
    async fn invoke(&self, task_name: &str, _: &TaskParameters) -> Result<Value, AgentFailure> {
        self.0.wait().await;
        Ok(json!(task_name))
    }
}

async fn create(orch: &Orchestrator, agent: &str, name: &str, priority: TaskPriority) -> TaskRecord {
    orch.create_task(agent, name, format!("{name} task"), TaskParameters::new(), priority)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_moves_forward_through_every_state() {
    let orch = Orchestrator::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    orch.register_agent(
        "observer",
        Arc::new(ObservingAgent {
            registry: orch.registry().clone(),
            seen: seen.clone(),
        }),
    )
    .await;

    let task = create(&orch, "observer", "watch", TaskPriority::Normal).await;
    assert_eq!(task.status(), TaskStatus::Pending);

    let done = orch.execute_task(task.id()).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![TaskStatus::Executing]);
    assert_eq!(done.status(), TaskStatus::Completed);
    assert!(done.started_at().unwrap() >= done.created_at());
    assert!(done.completed_at().unwrap() >= done.started_at().unwrap());
}

#[tokio::test]
async fn unregistered_agent_fails_without_raising() {
    let orch = Orchestrator::new();
    let task = create(&orch, "ghost", "haunt", TaskPriority::Normal).await;

    let failed = orch.execute_task(task.id()).await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    let error = failed.error().unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("agent not found"));
    assert!(error.contains("ghost"));
    assert!(failed.started_at().is_none());
    assert!(failed.completed_at().is_some());

    let stats = orch.get_statistics().await;
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.success_rate, 0.0);
}

#[tokio::test]
async fn reexecuting_terminal_task_is_a_noop() {
    let orch = Orchestrator::new();
    orch.register_agent("echo", echo_agent()).await;
    let ok = create(&orch, "echo", "once", TaskPriority::Normal).await;
    let bad = create(&orch, "ghost", "never", TaskPriority::Normal).await;

    for id in [ok.id(), bad.id()] {
        let first = orch.execute_task(id).await.unwrap();
        match orch.execute_task(id).await {
            Err(FleetError::AlreadyTerminal(record)) => assert_eq!(*record, first),
            other => panic!("expected AlreadyTerminal, got {other:?}"),
        }
        assert_eq!(orch.get_task(id).await.unwrap(), first);
    }
    assert_eq!(orch.monitor().get_state("echo").await.unwrap().metrics.invocations, 1);
}

#[tokio::test]
async fn agent_registered_after_task_creation_is_resolved() {
    let orch = Orchestrator::new();
    let task = create(&orch, "late", "pre-declared", TaskPriority::Normal).await;
    orch.register_agent("late", echo_agent()).await;

    let done = orch.execute_task(task.id()).await.unwrap();
    assert_eq!(done.status(), TaskStatus::Completed);
}

#[tokio::test]
async fn concurrent_execution_of_one_task_runs_it_once() {
    let orch = Orchestrator::new();
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_millis(100))))
        .await;
    let task = create(&orch, "slow", "contested", TaskPriority::Normal).await;

    let (a, b) = tokio::join!(orch.execute_task(task.id()), orch.execute_task(task.id()));
    let outcomes = [a, b];
    let completed = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(completed, 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(FleetError::InProgress(_)) | Err(FleetError::AlreadyTerminal(_))
    )));
    assert_eq!(orch.monitor().get_state("slow").await.unwrap().metrics.invocations, 1);
}

// ---------------------------------------------------------------------------
// Scheduling & workflows
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_by_priority_orders_urgency_then_age() {
    let orch = Orchestrator::new();
    create(&orch, "a", "low", TaskPriority::Low).await;
    create(&orch, "a", "high-1", TaskPriority::High).await;
    create(&orch, "a", "urgent", TaskPriority::Urgent).await;
    create(&orch, "a", "normal", TaskPriority::Normal).await;
    create(&orch, "a", "high-2", TaskPriority::High).await;

    let names: Vec<String> = orch
        .pending_by_priority()
        .await
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(names, vec!["urgent", "high-1", "high-2", "normal", "low"]);
}

#[tokio::test]
async fn priority_workflow_scenario() {
    let orch = Orchestrator::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    orch.register_agent("echo", recording_agent(log.clone())).await;

    create(&orch, "echo", "low", TaskPriority::Low).await;
    create(&orch, "echo", "urgent", TaskPriority::Urgent).await;
    create(&orch, "echo", "normal", TaskPriority::Normal).await;

    let results = orch.execute_workflow(orch.pending_by_priority().await).await;

    assert_eq!(*log.lock().unwrap(), vec!["urgent", "normal", "low"]);
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|t| t.status() == TaskStatus::Completed));
    let stats = orch.get_statistics().await;
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.success_rate, 1.0);
}

#[tokio::test]
async fn workflow_continues_past_failures_and_keeps_order() {
    let orch = Orchestrator::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    orch.register_agent("echo", recording_agent(log.clone())).await;

    let t1 = create(&orch, "echo", "collect", TaskPriority::Low).await;
    let t2 = create(&orch, "ghost", "analyze", TaskPriority::Urgent).await;
    let t3 = create(&orch, "echo", "report", TaskPriority::Normal).await;

    let results = orch
        .execute_workflow([t1.id().clone(), t2.id().clone(), t3.id().clone()])
        .await;

    let ids: Vec<&TaskId> = results.iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![t1.id(), t2.id(), t3.id()]);
    assert_eq!(results[0].status(), TaskStatus::Completed);
    assert_eq!(results[1].status(), TaskStatus::Failed);
    assert_eq!(results[2].status(), TaskStatus::Completed);
    assert_eq!(*log.lock().unwrap(), vec!["collect", "report"]);
}

#[tokio::test]
async fn workflow_skips_unknown_ids() {
    let orch = Orchestrator::new();
    orch.register_agent("echo", echo_agent()).await;
    let t1 = create(&orch, "echo", "one", TaskPriority::Normal).await;

    let results = orch
        .execute_workflow(vec![TaskId::from("task-missing"), t1.id().clone()])
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id(), t1.id());
}

#[tokio::test]
async fn daily_pipeline_builds_without_executing() {
    let orch = Orchestrator::new();
    let ids = orch.create_daily_pipeline(Some("demo-project")).await.unwrap();
    assert_eq!(ids.len(), 4);

    let tasks: Vec<TaskRecord> = {
        let mut out = Vec::new();
        for id in &ids {
            out.push(orch.get_task(id).await.unwrap());
        }
        out
    };
    assert!(tasks.iter().all(|t| t.status() == TaskStatus::Pending));
    assert!(tasks.iter().all(|t| t.agent_id() == DEFAULT_PIPELINE_AGENT));
    assert!(tasks.iter().all(|t| t.parameters()["project_id"] == "demo-project"));
    let kinds: Vec<&str> = tasks
        .iter()
        .map(|t| t.parameters()["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec!["health_check", "stats_24h", "alert_check", "daily_report"]
    );
    assert_eq!(tasks[0].priority(), TaskPriority::High);
    assert_eq!(tasks[1].priority(), TaskPriority::Normal);
    assert_eq!(tasks[2].priority(), TaskPriority::High);
    assert_eq!(tasks[3].priority(), TaskPriority::Normal);

    let workflows = orch.workflow_names().await;
    assert_eq!(workflows.len(), 1);
    assert!(workflows[0].starts_with("daily_pipeline:demo-project:"));
    let status = orch.workflow_status(&workflows[0]).await.unwrap();
    assert_eq!(status.total, 4);
    assert_eq!(status.pending, 4);
    assert_eq!(status.progress, "0/4");
}

#[tokio::test]
async fn daily_pipeline_runs_end_to_end() {
    let orch = Orchestrator::new();
    orch.register_agent_with_profile(project_manager_profile(), echo_agent())
        .await;

    let ids = orch.create_daily_pipeline(None).await.unwrap();
    let results = orch.execute_workflow(&ids).await;

    assert_eq!(results.len(), 4);
    assert_eq!(results[3].result().unwrap()["type"], "daily_report");
    let workflow = orch.workflow_names().await.remove(0);
    let status = orch.workflow_status(&workflow).await.unwrap();
    assert_eq!(status.completed, 4);
    assert_eq!(status.progress, "4/4");

    let profiles = orch.agent_profiles().await;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].role, AgentRole::ProjectManager);
}

// ---------------------------------------------------------------------------
// Statistics & persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_statistics() {
    let orch = Orchestrator::new();
    let stats = orch.get_statistics().await;
    assert_eq!(stats.total_tasks, 0);
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.average_duration_ms, 0.0);
}

#[tokio::test]
async fn statistics_mix_of_outcomes() {
    let orch = Orchestrator::new();
    orch.register_agent("echo", echo_agent()).await;
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_millis(20))))
        .await;

    let a = create(&orch, "slow", "a", TaskPriority::Normal).await;
    let b = create(&orch, "echo", "b", TaskPriority::Normal).await;
    let c = create(&orch, "ghost", "c", TaskPriority::Normal).await;
    create(&orch, "echo", "d", TaskPriority::Normal).await;
    orch.execute_workflow([&a, &b, &c]).await;

    let stats = orch.get_statistics().await;
    assert_eq!(stats.total_tasks, 4);
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending, 1);
    assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
    assert!(stats.average_duration_ms >= 10.0);
    assert_eq!(stats.registered_agents, 2);

    // Reading statistics changes nothing.
    assert_eq!(orch.get_statistics().await, stats);
}

#[tokio::test]
async fn export_and_import_roundtrip() {
    let source = Orchestrator::new();
    source.register_agent("echo", echo_agent()).await;
    let done = create(&source, "echo", "done", TaskPriority::High).await;
    create(&source, "echo", "waiting", TaskPriority::Low).await;
    source.execute_task(done.id()).await.unwrap();

    let json = serde_json::to_string(&source.export_tasks().await).unwrap();
    let records: Vec<TaskRecord> = serde_json::from_str(&json).unwrap();

    let target = Orchestrator::new();
    assert_eq!(target.import_tasks(records.clone()).await.unwrap(), 2);
    assert_eq!(target.tasks().await, source.tasks().await);
    assert!(matches!(
        target.execute_task(done.id()).await,
        Err(FleetError::AlreadyTerminal(_))
    ));

    // A second import collides and leaves the registry untouched.
    assert!(matches!(
        target.import_tasks(records).await,
        Err(FleetError::DuplicateId(_))
    ));
    assert_eq!(target.tasks().await.len(), 2);
}

// ---------------------------------------------------------------------------
// Parallel execution, timeouts, cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn parallel_run_overlaps_invocations() {
    let orch = Orchestrator::with_config(OrchestratorConfig::default().with_max_parallel(3));
    orch.register_agent("meet", Arc::new(RendezvousAgent(Arc::new(Barrier::new(3)))))
        .await;
    create(&orch, "meet", "low", TaskPriority::Low).await;
    create(&orch, "meet", "urgent", TaskPriority::Urgent).await;
    create(&orch, "meet", "normal", TaskPriority::Normal).await;

    let results = tokio::time::timeout(
        Duration::from_secs(5),
        orch.execute_parallel(&CancellationToken::new()),
    )
    .await
    .expect("invocations did not overlap");

    let names: Vec<&str> = results.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["urgent", "normal", "low"]);
    assert!(results.iter().all(|t| t.status() == TaskStatus::Completed));
}

#[tokio::test]
async fn parallel_run_isolates_failures() {
    let orch = Orchestrator::new();
    orch.register_agent("echo", echo_agent()).await;
    orch.register_agent(
        "crashy",
        Arc::new(FnAgent::new(|_, _| panic!("agent bug"))),
    )
    .await;
    create(&orch, "echo", "fine-1", TaskPriority::Normal).await;
    create(&orch, "crashy", "broken", TaskPriority::Normal).await;
    create(&orch, "ghost", "lost", TaskPriority::Normal).await;
    create(&orch, "echo", "fine-2", TaskPriority::Normal).await;

    let results = orch.execute_parallel(&CancellationToken::new()).await;
    let statuses: Vec<TaskStatus> = results.iter().map(|t| t.status()).collect();
    assert_eq!(
        statuses,
        vec![
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Failed,
            TaskStatus::Completed
        ]
    );
    assert!(results[1].error().unwrap().contains("agent bug"));
}

#[tokio::test]
async fn invocation_timeout_fails_task() {
    let orch = Orchestrator::with_config(
        OrchestratorConfig::default().with_invocation_timeout(Duration::from_secs(1)),
    );
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_secs(30))))
        .await;
    let task = create(&orch, "slow", "stuck", TaskPriority::Normal).await;

    let failed = orch.execute_task(task.id()).await.unwrap();
    assert_eq!(failed.status(), TaskStatus::Failed);
    assert!(failed.error().unwrap().contains("timed out"));
    assert_eq!(orch.monitor().get_state("slow").await.unwrap().status, WorkerStatus::Error);
}

#[tokio::test]
async fn cancelling_parallel_run_fails_in_flight_tasks() {
    let orch = Orchestrator::new();
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_secs(30))))
        .await;
    create(&orch, "slow", "a", TaskPriority::Normal).await;
    create(&orch, "slow", "b", TaskPriority::Normal).await;

    let token = CancellationToken::new();
    let (results, _) = tokio::join!(orch.execute_parallel(&token), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    assert_eq!(results.len(), 2);
    for task in &results {
        assert_eq!(task.status(), TaskStatus::Failed);
        assert_eq!(task.error(), Some(CANCELLED));
    }
}

#[tokio::test]
async fn shutdown_cancels_in_flight_execution() {
    let orch = Arc::new(Orchestrator::new());
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_secs(30))))
        .await;
    let task = create(&orch, "slow", "long", TaskPriority::Normal).await;

    let runner = {
        let orch = orch.clone();
        let id = task.id().clone();
        tokio::spawn(async move { orch.execute_task(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    orch.shutdown();

    let record = runner.await.unwrap().unwrap();
    assert_eq!(record.status(), TaskStatus::Failed);
    assert_eq!(record.error(), Some(CANCELLED));
    assert!(orch.is_shut_down());
}

/// Polls until the task reaches a terminal state.
async fn settled(orch: &Orchestrator, id: &TaskId) -> TaskRecord {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let task = orch.get_task(id).await.unwrap();
            if task.is_terminal() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("task never left its in-flight state")
}

#[tokio::test]
async fn caller_timeout_fails_task_as_cancelled() {
    let orch = Orchestrator::new();
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_secs(30))))
        .await;
    let task = create(&orch, "slow", "abandoned", TaskPriority::Normal).await;

    let gave_up = tokio::time::timeout(Duration::from_millis(50), orch.execute_task(task.id())).await;
    assert!(gave_up.is_err());

    let record = settled(&orch, task.id()).await;
    assert_eq!(record.status(), TaskStatus::Failed);
    assert_eq!(record.error(), Some(CANCELLED));
    assert!(matches!(
        orch.execute_task(task.id()).await,
        Err(FleetError::AlreadyTerminal(_))
    ));
    let state = orch.monitor().get_state("slow").await.unwrap();
    assert!(state.current_tasks.is_empty());
}

#[tokio::test]
async fn aborted_runner_fails_task_as_cancelled() {
    let orch = Arc::new(Orchestrator::new());
    orch.register_agent("slow", Arc::new(SlowAgent(Duration::from_secs(30))))
        .await;
    let task = create(&orch, "slow", "aborted", TaskPriority::Normal).await;

    let runner = {
        let orch = orch.clone();
        let id = task.id().clone();
        tokio::spawn(async move { orch.execute_task(&id).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    runner.abort();

    let record = settled(&orch, task.id()).await;
    assert_eq!(record.status(), TaskStatus::Failed);
    assert_eq!(record.error(), Some(CANCELLED));
}

#[tokio::test]
async fn agent_stays_working_until_its_last_parallel_task_ends() {
    let orch = Orchestrator::with_config(OrchestratorConfig::default().with_max_parallel(2));
    orch.register_agent("staggered", Arc::new(StaggeredAgent)).await;
    let long = create(&orch, "staggered", "long", TaskPriority::High).await;
    create(&orch, "staggered", "short", TaskPriority::Normal).await;

    // By 200ms "short" has finished and "long" is still running.
    let token = CancellationToken::new();
    let (results, mid_run) = tokio::join!(orch.execute_parallel(&token), async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        orch.monitor().get_state("staggered").await.unwrap()
    });

    assert_eq!(mid_run.status, WorkerStatus::Working);
    assert_eq!(mid_run.current_tasks, vec![long.id().clone()]);
    assert!(results.iter().all(|t| t.status() == TaskStatus::Completed));

    let after = orch.monitor().get_state("staggered").await.unwrap();
    assert_eq!(after.status, WorkerStatus::Idle);
    assert!(after.current_tasks.is_empty());
    assert_eq!(after.metrics.invocations, 2);
}

#[tokio::test]
async fn independent_orchestrators_share_nothing() {
    let a = Orchestrator::new();
    let b = Orchestrator::new();
    a.register_agent("echo", echo_agent()).await;
    create(&a, "echo", "only-in-a", TaskPriority::Normal).await;

    assert_eq!(a.tasks().await.len(), 1);
    assert!(b.tasks().await.is_empty());
    assert_eq!(b.registered_agent_count().await, 0);
}
