use crate::scheduler::ScheduledPipeline;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use taskfleet_core::{FleetError, FleetResult};

/// Agent id the daily pipeline targets unless configured otherwise.
pub const DEFAULT_PIPELINE_AGENT: &str = "project_manager_001";

/// Orchestrator settings, usually read from a `taskfleet.toml`.
///
/// ```toml
/// invocation_timeout_secs = 120
/// max_parallel = 4
/// pipeline_agent_id = "project_manager_001"
///
/// [[schedules]]
/// name = "nightly"
/// cron_expression = "0 0 6 * * * *"
/// project_id = "demo"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Upper bound for a single agent invocation. Unset means no limit.
    #[serde(default)]
    pub invocation_timeout_secs: Option<u64>,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_pipeline_agent")]
    pub pipeline_agent_id: String,
    #[serde(default)]
    pub schedules: Vec<ScheduledPipeline>,
}

fn default_max_parallel() -> usize {
    4
}

fn default_pipeline_agent() -> String {
    DEFAULT_PIPELINE_AGENT.to_string()
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_secs: None,
            max_parallel: default_max_parallel(),
            pipeline_agent_id: default_pipeline_agent(),
            schedules: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> FleetResult<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> FleetResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            FleetError::Config(format!(
                "Failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> FleetResult<()> {
        if self.max_parallel == 0 {
            return Err(FleetError::Config("max_parallel must be at least 1".into()));
        }
        if self.invocation_timeout_secs == Some(0) {
            return Err(FleetError::Config(
                "invocation_timeout_secs must be positive when set".into(),
            ));
        }
        if self.pipeline_agent_id.trim().is_empty() {
            return Err(FleetError::Config("pipeline_agent_id must not be empty".into()));
        }
        Ok(())
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout_secs.map(Duration::from_secs)
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_pipeline_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.pipeline_agent_id = agent_id.into();
        self
    }
}
