//! Quality specialist: structural and argumentative checks on a debate.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::GovernanceConfig;
use crate::debate::{
    DebateRecord, GovernanceReview, IssueKind, IssueSeverity, PersonaRole, ReviewIssue,
    ReviewerRole,
};
use crate::generation::{generate_with_timeout, SharedTextGenerator};
use crate::parse::{parse_structured, word_similarity};

use super::{conclude_review, flag, reviewer_actor_id, ReviewResult, Reviewer};

const MISSING_ROUND_PENALTY: i32 = 40;
const COLLISION_PENALTY: i32 = 20;
const LOW_CONFIDENCE_PENALTY: i32 = 10;
const THIN_EVIDENCE_PENALTY: i32 = 10;
const ACTIONABILITY_PENALTY: i32 = 15;

/// Openers that make an action vague unless it names a quantity or date.
const VAGUE_OPENERS: [&str; 8] = [
    "consider",
    "look into",
    "monitor",
    "review",
    "improve",
    "optimize",
    "explore",
    "investigate",
];

/// An action is vague when it has fewer than four words, or opens with a
/// non-committal verb and contains no digit.
pub fn is_vague_action(action: &str) -> bool {
    let trimmed = action.trim();
    if trimmed.split_whitespace().count() < 4 {
        return true;
    }
    let lower = trimmed.to_lowercase();
    VAGUE_OPENERS.iter().any(|v| lower.starts_with(v))
        && !trimmed.chars().any(|c| c.is_ascii_digit())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VagueActionsAnswer {
    #[serde(alias = "vagueActions")]
    vague_actions: Vec<String>,
}

/// Scores a debate from 100 down, one penalty per failing category.
pub struct QualityReviewer {
    config: GovernanceConfig,
    generator: Option<SharedTextGenerator>,
    timeout: Duration,
}

impl QualityReviewer {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            config,
            generator: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Enable the generator pass that flags further vague actions.
    pub fn with_generator(mut self, generator: SharedTextGenerator, timeout: Duration) -> Self {
        self.generator = Some(generator);
        self.timeout = timeout;
        self
    }

    /// Deterministic checks. Returns the review (unconcluded) and its score.
    fn inspect(&self, record: &DebateRecord) -> (GovernanceReview, i32, Vec<String>) {
        let mut review = GovernanceReview::new(
            &record.id,
            ReviewerRole::QualitySpecialist,
            &reviewer_actor_id(ReviewerRole::QualitySpecialist),
        );
        let mut score = 100;

        let slots = [
            (PersonaRole::Optimist, record.thesis.as_ref()),
            (PersonaRole::Pessimist, record.antithesis.as_ref()),
            (PersonaRole::Mediator, record.synthesis.as_ref()),
        ];

        let missing: Vec<PersonaRole> = slots
            .iter()
            .filter(|(_, round)| round.is_none())
            .map(|(role, _)| *role)
            .collect();
        for role in &missing {
            flag(
                &mut review,
                ReviewIssue::new(
                    IssueKind::Structure,
                    IssueSeverity::Critical,
                    format!("{} round is missing", role.phase()),
                )
                .affecting(*role),
                "Rerun the debate so every round is present".to_string(),
            );
        }
        if !missing.is_empty() {
            score -= MISSING_ROUND_PENALTY;
        }

        if let (Some(thesis), Some(antithesis)) = (&record.thesis, &record.antithesis) {
            let similarity =
                word_similarity(&thesis.content.position, &antithesis.content.position);
            if similarity >= self.config.similarity_threshold {
                flag(
                    &mut review,
                    ReviewIssue::new(
                        IssueKind::Logic,
                        IssueSeverity::High,
                        format!("antithesis restates the thesis (similarity {similarity:.2})"),
                    )
                    .affecting(PersonaRole::Pessimist),
                    "Have the pessimist argue a distinct counter-position".to_string(),
                );
                score -= COLLISION_PENALTY;
            }
        }

        let mut low_confidence = false;
        let mut thin_evidence = false;
        for (role, round) in slots.iter().filter_map(|(r, round)| round.map(|x| (*r, x))) {
            if round.content.confidence < self.config.confidence_floor {
                low_confidence = true;
                flag(
                    &mut review,
                    ReviewIssue::new(
                        IssueKind::Quality,
                        IssueSeverity::Medium,
                        format!(
                            "{} confidence {} is below {}",
                            round.phase, round.content.confidence, self.config.confidence_floor
                        ),
                    )
                    .affecting(role),
                    "Strengthen low-confidence positions with more context".to_string(),
                );
            }
            if round.content.evidence.len() < self.config.min_evidence {
                thin_evidence = true;
                flag(
                    &mut review,
                    ReviewIssue::new(
                        IssueKind::Data,
                        IssueSeverity::Medium,
                        format!(
                            "{} cites {} evidence items, expected at least {}",
                            round.phase,
                            round.content.evidence.len(),
                            self.config.min_evidence
                        ),
                    )
                    .affecting(role),
                    "Support each position with evidence from the context".to_string(),
                );
            }
        }
        if low_confidence {
            score -= LOW_CONFIDENCE_PENALTY;
        }
        if thin_evidence {
            score -= THIN_EVIDENCE_PENALTY;
        }

        let actions = record
            .synthesis
            .as_ref()
            .map(|s| s.content.suggested_actions.clone())
            .unwrap_or_default();
        (review, score, actions)
    }

    async fn generator_vague_actions(&self, actions: &[String]) -> Vec<String> {
        let Some(generator) = self.generator.as_ref().filter(|_| self.config.generator_pass)
        else {
            return Vec::new();
        };
        if actions.is_empty() {
            return Vec::new();
        }

        let listed: Vec<String> = actions.iter().map(|a| format!("- {a}")).collect();
        let prompt = format!(
            "You review recommended business actions. List the ones that are too vague to \
             act on (no owner, quantity, or date).\n\n{}\n\nRespond with JSON only: \
             {{\"vague_actions\": [\"...\"]}}",
            listed.join("\n")
        );
        match generate_with_timeout(generator.as_ref(), &prompt, self.timeout).await {
            Ok(generation) => parse_structured::<VagueActionsAnswer>(&generation.text)
                .map(|answer| {
                    answer
                        .vague_actions
                        .into_iter()
                        .filter(|v| actions.iter().any(|a| a.trim() == v.trim()))
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Quality generator pass skipped");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Reviewer for QualityReviewer {
    fn role(&self) -> ReviewerRole {
        ReviewerRole::QualitySpecialist
    }

    async fn review(&self, record: &DebateRecord) -> ReviewResult<GovernanceReview> {
        let (mut review, mut score, actions) = self.inspect(record);

        if record.synthesis.is_some() {
            let mut vague: BTreeSet<String> = actions
                .iter()
                .filter(|a| is_vague_action(a))
                .map(|a| a.trim().to_string())
                .collect();
            vague.extend(
                self.generator_vague_actions(&actions)
                    .await
                    .into_iter()
                    .map(|a| a.trim().to_string()),
            );

            let all_vague = actions.iter().all(|a| vague.contains(a.trim()));
            if actions.is_empty() || all_vague {
                let description = if actions.is_empty() {
                    "synthesis lists no actions".to_string()
                } else {
                    "every synthesis action is vague".to_string()
                };
                flag(
                    &mut review,
                    ReviewIssue::new(IssueKind::Actionability, IssueSeverity::High, description)
                        .affecting(PersonaRole::Mediator),
                    "Give each action an owner, quantity, or date".to_string(),
                );
                score -= ACTIONABILITY_PENALTY;
            } else {
                for action in vague {
                    review
                        .recommendations
                        .push(format!("Make concrete: {action}"));
                }
            }
        }

        Ok(conclude_review(review, score, self.config.approval_score))
    }
}
