//! Build and run the daily monitoring pipeline against a simulated agent.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p taskfleet-orchestrator --example daily_pipeline -- taskfleet.toml
//! ```
//!
//! The config path is optional; defaults apply without it.

use std::sync::Arc;
use taskfleet_orchestrator::{
    project_manager_profile, AgentFailure, AgentProfile, FleetResult, FnAgent, Orchestrator,
    OrchestratorConfig,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> FleetResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => OrchestratorConfig::load(path).await?,
        None => OrchestratorConfig::default(),
    };

    let profile = project_manager_profile();
    let agent_id = config.pipeline_agent_id.clone();
    let orchestrator = Orchestrator::with_config(config);

    let simulated = FnAgent::new(|task_name, params| {
        let kind = params
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| AgentFailure::new("missing task type"))?;
        Ok(serde_json::json!({
            "task": task_name,
            "task_type": kind,
            "project_id": params.get("project_id"),
            "status": "simulated",
        }))
    });
    let profile = AgentProfile { id: agent_id, ..profile };
    orchestrator
        .register_agent_with_profile(profile, Arc::new(simulated))
        .await;

    let task_ids = orchestrator.create_daily_pipeline(Some("demo-project")).await?;
    let results = orchestrator.execute_workflow(&task_ids).await;
    for task in &results {
        info!(
            task = %task.name(),
            status = %task.status(),
            result = ?task.result(),
            error = ?task.error(),
            "Pipeline step"
        );
    }

    let stats = orchestrator.get_statistics().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
