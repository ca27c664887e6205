use serde::{Deserialize, Serialize};

/// Role an agent plays in the fleet. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Watches project health and produces reports.
    ProjectManager,
    /// Crunches usage and performance data.
    DataAnalyst,
    /// Implements changes.
    Developer,
    /// Reviews the output of other agents.
    Reviewer,
    /// Coordinates other agents.
    Manager,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::ProjectManager => write!(f, "project_manager"),
            AgentRole::DataAnalyst => write!(f, "data_analyst"),
            AgentRole::Developer => write!(f, "developer"),
            AgentRole::Reviewer => write!(f, "reviewer"),
            AgentRole::Manager => write!(f, "manager"),
        }
    }
}

/// Human-readable metadata for an agent id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub role: AgentRole,
    #[serde(default)]
    pub description: String,
}

impl AgentProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
