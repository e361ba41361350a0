//! Compliance auditor: rule-based scan of the debate transcript for personal
//! data, policy violations and overconfident language.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::GovernanceConfig;
use crate::debate::{
    render_transcript, DebateRecord, GovernanceReview, IssueKind, IssueSeverity, ReviewIssue,
    ReviewerRole,
};
use crate::generation::{generate_with_timeout, SharedTextGenerator};
use crate::parse::parse_structured;

use super::{conclude_review, flag, reviewer_actor_id, ReviewResult, Reviewer};

/// Characters of transcript sent to the generator pass.
const GENERATOR_EXCERPT_CHARS: usize = 4000;

/// One pattern-based rule. Each rule penalizes at most once per review.
pub struct ComplianceRule {
    pub name: &'static str,
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub penalty: i32,
    pub recommendation: &'static str,
    pattern: Regex,
}

impl ComplianceRule {
    fn new(
        name: &'static str,
        kind: IssueKind,
        severity: IssueSeverity,
        penalty: i32,
        recommendation: &'static str,
        pattern: &str,
    ) -> Self {
        Self {
            name,
            kind,
            severity,
            penalty,
            recommendation,
            pattern: Regex::new(pattern).expect("compliance rule regex should compile"),
        }
    }

    /// Number of matches in `text`.
    pub fn matches(&self, text: &str) -> usize {
        self.pattern.find_iter(text).count()
    }
}

const REDACT: &str = "Redact personal data from the debate context and rounds";

/// Built-in rule set.
pub static RULES: LazyLock<Vec<ComplianceRule>> = LazyLock::new(|| {
    use IssueKind::{Language, Policy, Privacy};
    use IssueSeverity::{Critical, Low};
    vec![
        ComplianceRule::new(
            "email address",
            Privacy,
            Critical,
            40,
            REDACT,
            r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b",
        ),
        ComplianceRule::new(
            "phone number",
            Privacy,
            Critical,
            40,
            REDACT,
            r"(?:\+\d{1,3}[ .-]?)?\(?\b\d{3}\)?[ .-]\d{3}[ .-]\d{4}\b",
        ),
        ComplianceRule::new(
            "national id number",
            Privacy,
            Critical,
            40,
            REDACT,
            r"\b\d{3}-\d{2}-\d{4}\b",
        ),
        ComplianceRule::new(
            "payment card number",
            Privacy,
            Critical,
            40,
            REDACT,
            r"\b\d{4}[ -]?\d{4}[ -]?\d{4}[ -]?\d{1,4}\b",
        ),
        ComplianceRule::new(
            "approval bypass",
            Policy,
            Critical,
            30,
            "Route the decision through the required approvals",
            r"(?i)\b(?:bypass|skip|circumvent|avoid)\w*\s+(?:the\s+)?(?:approval|sign-?off|authori[sz]ation)s?\b",
        ),
        ComplianceRule::new(
            "record falsification",
            Policy,
            Critical,
            30,
            "Remove any recommendation to alter or backdate records",
            r"(?i)\b(?:falsif\w*|backdat\w*|fabricat\w*\s+(?:the\s+)?(?:records?|data|figures))",
        ),
        ComplianceRule::new(
            "off-book handling",
            Policy,
            Critical,
            30,
            "Keep every transaction on the books",
            r"(?i)\boff[- ](?:the[- ])?books?\b",
        ),
        ComplianceRule::new(
            "absolute certainty",
            Language,
            Low,
            5,
            "Qualify absolute claims with their assumptions",
            r"(?i)\b(?:guarantee[sd]?|certainly|definitely|no risk|zero risk|cannot fail|100% (?:certain|sure))\b",
        ),
    ]
});

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RecommendationAnswer {
    recommendations: Vec<String>,
}

/// Regex rule scan with an optional generator pass for extra advice.
pub struct ComplianceReviewer {
    config: GovernanceConfig,
    generator: Option<SharedTextGenerator>,
    timeout: Duration,
}

impl ComplianceReviewer {
    pub fn new(config: GovernanceConfig) -> Self {
        Self {
            config,
            generator: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_generator(mut self, generator: SharedTextGenerator, timeout: Duration) -> Self {
        self.generator = Some(generator);
        self.timeout = timeout;
        self
    }

    /// Apply the rule set to `text`.
    pub fn scan(&self, debate_id: &str, text: &str) -> GovernanceReview {
        let mut review = GovernanceReview::new(
            debate_id,
            ReviewerRole::ComplianceAuditor,
            &reviewer_actor_id(ReviewerRole::ComplianceAuditor),
        );
        let mut score = 100;
        for rule in RULES.iter() {
            let hits = rule.matches(text);
            if hits == 0 {
                continue;
            }
            flag(
                &mut review,
                ReviewIssue::new(
                    rule.kind,
                    rule.severity,
                    format!("{} found ({hits} occurrence(s))", rule.name),
                ),
                rule.recommendation.to_string(),
            );
            score -= rule.penalty;
        }
        conclude_review(review, score, self.config.approval_score)
    }

    async fn generator_recommendations(&self, transcript: &str) -> Vec<String> {
        let Some(generator) = self.generator.as_ref().filter(|_| self.config.generator_pass)
        else {
            return Vec::new();
        };
        let excerpt: String = transcript.chars().take(GENERATOR_EXCERPT_CHARS).collect();
        let prompt = format!(
            "You audit business recommendations for compliance risk. Read the debate below \
             and suggest short compliance recommendations, if any.\n\n{excerpt}\n\n\
             Respond with JSON only: {{\"recommendations\": [\"...\"]}}"
        );
        match generate_with_timeout(generator.as_ref(), &prompt, self.timeout).await {
            Ok(generation) => parse_structured::<RecommendationAnswer>(&generation.text)
                .map(|answer| {
                    answer
                        .recommendations
                        .into_iter()
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                debug!(error = %e, "Compliance generator pass skipped");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl Reviewer for ComplianceReviewer {
    fn role(&self) -> ReviewerRole {
        ReviewerRole::ComplianceAuditor
    }

    async fn review(&self, record: &DebateRecord) -> ReviewResult<GovernanceReview> {
        let transcript = render_transcript(record);
        let mut review = self.scan(&record.id, &transcript);
        for rec in self.generator_recommendations(&transcript).await {
            if !review.recommendations.contains(&rec) {
                review.recommendations.push(rec);
            }
        }
        Ok(review)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{Generation, MockTextGenerator};
    use std::sync::Arc;

    fn reviewer() -> ComplianceReviewer {
        ComplianceReviewer::new(GovernanceConfig::default())
    }

    #[test]
    fn test_clean_text_passes() {
        let review = reviewer().scan(
            "d",
            "Lower safety stock by 20% for slow movers with 2 or more suppliers.",
        );
        assert_eq!(review.score, 100);
        assert!(review.approved);
    }

    #[test]
    fn test_pii_categories_each_penalize_once() {
        let text = "Contact ana@example.com or bob@example.com, call 555-123-4567.";
        let review = reviewer().scan("d", text);
        assert_eq!(review.score, 20);
        assert!(!review.approved);
        assert_eq!(review.issues.len(), 2);
        assert!(review.issues.iter().all(|i| i.kind == IssueKind::Privacy));
        assert_eq!(review.recommendations.len(), 1);
    }

    #[test]
    fn test_policy_violation_is_critical() {
        let review = reviewer().scan("d", "We could backdate the receipts to close the gap.");
        assert_eq!(review.score, 70);
        assert!(review.has_critical());
        assert!(!review.approved);
    }

    #[test]
    fn test_certainty_language_is_minor() {
        let review = reviewer().scan("d", "This will definitely work and carries zero risk.");
        assert_eq!(review.score, 95);
        assert!(review.approved);
        assert_eq!(review.issues[0].severity, IssueSeverity::Low);
    }

    #[test]
    fn test_card_and_national_id() {
        let review = reviewer().scan("d", "card 4111 1111 1111 1111, id 123-45-6789");
        let names: Vec<&str> = review.issues.iter().map(|i| i.description.as_str()).collect();
        assert!(names.iter().any(|n| n.starts_with("payment card number")));
        assert!(names.iter().any(|n| n.starts_with("national id number")));
    }

    #[tokio::test]
    async fn test_generator_adds_recommendations() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().returning(|_| {
            Ok(Generation::new(
                r#"{"recommendations": ["Document the supplier selection criteria"]}"#,
            ))
        });
        let reviewer = reviewer().with_generator(Arc::new(mock), Duration::from_secs(5));
        let record = DebateRecord::new("cost-team", "cost", "Freight tender", serde_json::json!({}));
        let review = reviewer.review(&record).await.unwrap();
        assert!(review.approved);
        assert_eq!(
            review.recommendations,
            vec!["Document the supplier selection criteria".to_string()]
        );
    }

    #[tokio::test]
    async fn test_transcript_metadata_is_not_flagged() {
        let record = DebateRecord::new(
            "inventory-team",
            "inventory",
            "Safety stock",
            serde_json::json!({"sku_count": 1200, "turns": 4.2}),
        );
        let review = reviewer().review(&record).await.unwrap();
        assert_eq!(review.score, 100, "unexpected issues: {:?}", review.issues);
    }
}
