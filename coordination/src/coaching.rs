//! Coaching feedback and per-persona tunables.
//!
//! A small deterministic feedback loop: each coaching message nudges a
//! persona's confidence offset or verbosity by a bounded step.

use serde::{Deserialize, Serialize};

use crate::config::CoachingConfig;
use crate::persona::PersonaStats;

/// Lowest confidence offset a persona can be coached to.
pub const MIN_CONFIDENCE_OFFSET: i8 = -20;
/// Highest confidence offset a persona can be coached to.
pub const MAX_CONFIDENCE_OFFSET: i8 = 10;
/// Largest single adjustment.
pub const MAX_OFFSET_STEP: i8 = 5;

/// What a feedback score measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachingMetric {
    /// Share of usable rounds, 0–100.
    Accuracy,
    /// Mean round latency in ms. Lower is better.
    Latency,
    /// Share of accepted outcomes, 0–100.
    UserAcceptance,
}

/// One coaching observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingFeedback {
    pub metric: CoachingMetric,
    pub score: f64,
    pub benchmark: f64,
}

impl CoachingFeedback {
    pub fn new(metric: CoachingMetric, score: f64, benchmark: f64) -> Self {
        Self {
            metric,
            score,
            benchmark,
        }
    }
}

/// How much a persona writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Concise,
    #[default]
    Normal,
    Detailed,
}

impl Verbosity {
    pub fn more_concise(self) -> Self {
        match self {
            Self::Detailed => Self::Normal,
            _ => Self::Concise,
        }
    }

    pub fn more_detailed(self) -> Self {
        match self {
            Self::Concise => Self::Normal,
            _ => Self::Detailed,
        }
    }

    /// Length instruction for prompts.
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Concise => "Keep the reasoning to two sentences.",
            Self::Normal => "Keep the reasoning to one short paragraph.",
            Self::Detailed => "Give thorough reasoning with specific figures from the context.",
        }
    }
}

/// Per-persona adjustable state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    pub confidence_offset: i8,
    pub verbosity: Verbosity,
}

impl Tunables {
    /// Apply one feedback message. Returns true if anything changed.
    pub fn apply(&mut self, feedback: &CoachingFeedback) -> bool {
        let before = *self;
        match feedback.metric {
            CoachingMetric::Accuracy => self.shift_offset(feedback),
            CoachingMetric::UserAcceptance => {
                self.shift_offset(feedback);
                if feedback.score < feedback.benchmark {
                    self.verbosity = self.verbosity.more_detailed();
                }
            }
            CoachingMetric::Latency => {
                if feedback.score > feedback.benchmark {
                    self.verbosity = self.verbosity.more_concise();
                } else if feedback.score < feedback.benchmark / 2.0 {
                    self.verbosity = self.verbosity.more_detailed();
                }
            }
        }
        *self != before
    }

    /// Raw confidence with the offset applied, clamped to 0–100.
    pub fn adjust_confidence(&self, raw: u8) -> u8 {
        (i16::from(raw.min(100)) + i16::from(self.confidence_offset)).clamp(0, 100) as u8
    }

    fn shift_offset(&mut self, feedback: &CoachingFeedback) {
        let delta = ((feedback.score - feedback.benchmark) / 10.0).trunc();
        if !delta.is_finite() {
            return;
        }
        let step = delta.clamp(f64::from(-MAX_OFFSET_STEP), f64::from(MAX_OFFSET_STEP)) as i8;
        self.confidence_offset = self
            .confidence_offset
            .saturating_add(step)
            .clamp(MIN_CONFIDENCE_OFFSET, MAX_CONFIDENCE_OFFSET);
    }
}

/// Feedback for one persona derived from its counters. Empty until the
/// persona has processed enough rounds.
pub fn feedback_from_stats(stats: &PersonaStats, config: &CoachingConfig) -> Vec<CoachingFeedback> {
    if stats.processed < config.min_samples || stats.processed == 0 {
        return Vec::new();
    }
    let usable = stats.processed.saturating_sub(stats.fallbacks + stats.failed);
    let accuracy = usable as f64 * 100.0 / stats.processed as f64;

    let mut feedback = vec![CoachingFeedback::new(
        CoachingMetric::Accuracy,
        accuracy,
        f64::from(config.accuracy_benchmark),
    )];
    if let Some(latency) = stats.average_latency_ms() {
        feedback.push(CoachingFeedback::new(
            CoachingMetric::Latency,
            latency,
            f64::from(config.latency_benchmark_ms),
        ));
    }
    feedback
}
