//! Cross-domain insight buffer.
//!
//! Each completed debate leaves a [`DomainInsight`]. The buffer keeps the most
//! recent ones and summarizes them per domain, plus actions that more than one
//! domain arrived at independently.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::{DebateId, DebatePhase, DebateRecord};

/// Condensed outcome of one completed debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainInsight {
    pub debate_id: DebateId,
    pub team: String,
    pub domain: String,
    pub topic: String,
    pub recommendation: String,
    pub confidence: u8,
    pub actions: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl DomainInsight {
    /// `None` unless the record is complete with a decision.
    pub fn from_record(record: &DebateRecord) -> Option<Self> {
        if record.current_phase != DebatePhase::Complete {
            return None;
        }
        let decision = record.final_decision.as_ref()?;
        Some(Self {
            debate_id: record.id.clone(),
            team: record.team.clone(),
            domain: record.domain.clone(),
            topic: record.topic.clone(),
            recommendation: decision.recommendation.clone(),
            confidence: decision.confidence,
            actions: decision.actions.clone(),
            completed_at: record.completed_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Per-domain rollup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSummary {
    pub domain: String,
    pub debates: usize,
    pub average_confidence: f64,
    pub latest_recommendation: String,
    pub latest_topic: String,
    pub latest_at: DateTime<Utc>,
}

/// An action suggested in more than one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringAction {
    pub action: String,
    pub domains: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossDomainSummary {
    pub total_debates: usize,
    pub domains: Vec<DomainSummary>,
    pub recurring_actions: Vec<RecurringAction>,
}

/// Bounded FIFO of recent insights.
#[derive(Debug, Clone)]
pub struct InsightBuffer {
    capacity: usize,
    entries: VecDeque<DomainInsight>,
}

impl InsightBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Append, evicting the oldest entry when full.
    pub fn push(&mut self, insight: DomainInsight) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(insight);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DomainInsight> {
        self.entries.iter()
    }

    pub fn summarize(&self) -> CrossDomainSummary {
        let mut by_domain: BTreeMap<&str, Vec<&DomainInsight>> = BTreeMap::new();
        let mut action_domains: BTreeMap<String, (String, BTreeSet<String>)> = BTreeMap::new();

        for insight in &self.entries {
            by_domain.entry(insight.domain.as_str()).or_default().push(insight);
            for action in &insight.actions {
                let key = normalize_action(action);
                if key.is_empty() {
                    continue;
                }
                action_domains
                    .entry(key)
                    .or_insert_with(|| (action.trim().to_string(), BTreeSet::new()))
                    .1
                    .insert(insight.domain.clone());
            }
        }

        let domains = by_domain
            .into_iter()
            .filter_map(|(domain, insights)| {
                let latest = insights.iter().max_by_key(|i| i.completed_at)?;
                let total: f64 = insights.iter().map(|i| f64::from(i.confidence)).sum();
                Some(DomainSummary {
                    domain: domain.to_string(),
                    debates: insights.len(),
                    average_confidence: total / insights.len() as f64,
                    latest_recommendation: latest.recommendation.clone(),
                    latest_topic: latest.topic.clone(),
                    latest_at: latest.completed_at,
                })
            })
            .collect();

        let recurring_actions = action_domains
            .into_values()
            .filter(|(_, domains)| domains.len() > 1)
            .map(|(action, domains)| RecurringAction {
                action,
                domains: domains.into_iter().collect(),
            })
            .collect();

        CrossDomainSummary {
            total_debates: self.entries.len(),
            domains,
            recurring_actions,
        }
    }
}

fn normalize_action(action: &str) -> String {
    action
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
