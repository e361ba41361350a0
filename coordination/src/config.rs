//! Engine configuration.
//!
//! Every field has a default, so an empty TOML table (or no file at all) yields
//! a working engine. The binary layers environment overrides on top.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debate::ManagerConfig;

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("duplicate team in roster: {0}")]
    DuplicateTeam(String),
}

/// Governance gating and quality-review thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    /// Synthesis confidence below this requires review.
    pub confidence_threshold: u8,
    /// Minimum score for a reviewer to approve.
    pub approval_score: u8,
    /// Any round below this confidence is a quality issue.
    pub confidence_floor: u8,
    /// Minimum evidence items per round.
    pub min_evidence: usize,
    /// Word-set similarity at which thesis and antithesis collide.
    pub similarity_threshold: f64,
    /// Run the optional generator pass inside reviewers.
    pub generator_pass: bool,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 70,
            approval_score: 70,
            confidence_floor: 30,
            min_evidence: 1,
            similarity_threshold: 0.8,
            generator_pass: true,
        }
    }
}

/// Periodic coaching sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Target success rate, 0–100.
    pub accuracy_benchmark: u32,
    /// Target mean latency per round in ms.
    pub latency_benchmark_ms: u32,
    /// Personas with fewer processed rounds are not coached.
    pub min_samples: u64,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            accuracy_benchmark: 80,
            latency_benchmark_ms: 20_000,
            min_samples: 3,
        }
    }
}

impl CoachingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// One debate team: a domain and its three persona actor ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamSpec {
    pub team: String,
    pub domain: String,
    pub optimist: String,
    pub pessimist: String,
    pub mediator: String,
}

impl TeamSpec {
    /// Team with conventional `{team}/{role}` actor ids.
    pub fn new(team: &str, domain: &str) -> Self {
        Self {
            team: team.to_string(),
            domain: domain.to_string(),
            optimist: format!("{team}/optimist"),
            pessimist: format!("{team}/pessimist"),
            mediator: format!("{team}/mediator"),
        }
    }

    /// Default roster.
    pub fn default_roster() -> Vec<TeamSpec> {
        vec![
            Self::new("bom-waste-team", "bom"),
            Self::new("inventory-team", "inventory"),
            Self::new("profitability-team", "profitability"),
            Self::new("cost-team", "cost"),
        ]
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_concurrent_debates: usize,
    pub history_limit: usize,
    /// Per-round generation timeout.
    pub round_timeout_secs: u64,
    pub governance: GovernanceConfig,
    pub coaching: CoachingConfig,
    /// Completed debates kept for cross-domain insights.
    pub insight_buffer: usize,
    /// Lifecycle event channel capacity.
    pub event_capacity: usize,
    pub teams: Vec<TeamSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_debates: 10,
            history_limit: 100,
            round_timeout_secs: 60,
            governance: GovernanceConfig::default(),
            coaching: CoachingConfig::default(),
            insight_buffer: 50,
            event_capacity: 256,
            teams: TeamSpec::default_roster(),
        }
    }
}

impl EngineConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            max_concurrent: self.max_concurrent_debates,
            history_limit: self.history_limit,
        }
    }

    pub fn team(&self, team: &str) -> Option<&TeamSpec> {
        self.teams.iter().find(|t| t.team == team)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_debates == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_debates",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.round_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "round_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.governance.confidence_threshold > 100 || self.governance.approval_score > 100 {
            return Err(ConfigError::Invalid {
                field: "governance",
                reason: "thresholds are percentages (0-100)".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.governance.similarity_threshold) {
            return Err(ConfigError::Invalid {
                field: "governance.similarity_threshold",
                reason: "must be within 0.0-1.0".to_string(),
            });
        }
        if self.coaching.enabled && self.coaching.interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "coaching.interval_secs",
                reason: "must be at least 1 when coaching is enabled".to_string(),
            });
        }
        if self.teams.is_empty() {
            return Err(ConfigError::Invalid {
                field: "teams",
                reason: "roster is empty".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for team in &self.teams {
            if team.team.is_empty() || team.optimist.is_empty() {
                return Err(ConfigError::Invalid {
                    field: "teams",
                    reason: "team name and actor ids must be non-empty".to_string(),
                });
            }
            if !seen.insert(team.team.as_str()) {
                return Err(ConfigError::DuplicateTeam(team.team.clone()));
            }
        }
        Ok(())
    }
}
