//! Role strategies: prompt construction, output interpretation, and fallback
//! content for each persona role.
//!
//! One [`PersonaActor`](super::PersonaActor) type serves every role; what
//! differs between optimist, pessimist and mediator lives here.

use std::fmt::Write as _;

use crate::coaching::Verbosity;
use crate::config::GovernanceConfig;
use crate::debate::{DebateBrief, DebateContent, DebateRound, PersonaRole, RoundDirective};
use crate::parse::{parse_structured, word_similarity, StructuredPosition};

use super::fallback::fallback_entry;

/// Prompt version. Bump on any preamble change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// Characters of context data copied into directives and prompts.
const CONTEXT_EXCERPT_CHARS: usize = 600;

/// Confidence used when a generated thesis or antithesis omits one.
const DEFAULT_CONFIDENCE: u8 = 50;

const OPTIMIST_PREAMBLE: &str = "\
You are the Optimist on a business analysis team. Argue the strongest realistic \
case for the upside of the topic, grounded in the supplied context. Be specific \
and cite figures from the context as evidence.";

const PESSIMIST_PREAMBLE: &str = "\
You are the Pessimist on a business analysis team. Challenge the thesis below: \
name concrete risks, hidden costs and blind spots. Engage with its argument \
directly. Do not restate the thesis as your own position.";

const MEDIATOR_PREAMBLE: &str = "\
You are the Mediator on a business analysis team. Reconcile the thesis and the \
antithesis into one balanced position that a manager can act on. Reference both \
positions, weigh the risks realistically, and list concrete next actions with \
owners, quantities or dates where possible.";

const RESPONSE_FORMAT: &str = "\
Respond with a single JSON object and nothing else:
{\"position\": \"one sentence\", \"reasoning\": \"...\", \"evidence\": [\"...\"], \
\"confidence\": 0-100, \"suggested_actions\": [\"...\"]}";

/// Pessimism-weighted blend of the two prior confidences, pulled toward the
/// middle: `((0.4 * thesis + 0.6 * antithesis) * 0.8 + 10)`, rounded.
pub fn balanced_confidence(thesis: u8, antithesis: u8) -> u8 {
    let blended = 0.4 * f64::from(thesis) + 0.6 * f64::from(antithesis);
    (blended * 0.8 + 10.0).round().clamp(0.0, 100.0) as u8
}

/// Role-specific behavior injected into a persona actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoleStrategy {
    role: PersonaRole,
    /// Word-set similarity at which an antithesis counts as a restatement.
    restatement_threshold: f64,
}

impl RoleStrategy {
    pub fn new(role: PersonaRole) -> Self {
        Self {
            role,
            restatement_threshold: GovernanceConfig::default().similarity_threshold,
        }
    }

    pub fn with_restatement_threshold(mut self, threshold: f64) -> Self {
        self.restatement_threshold = threshold;
        self
    }

    pub fn role(&self) -> PersonaRole {
        self.role
    }

    /// Directive recorded with the round.
    pub fn directive(&self, brief: &DebateBrief) -> RoundDirective {
        RoundDirective::for_role(self.role, &context_excerpt(&brief.context))
    }

    /// Full prompt for the generator.
    pub fn build_prompt(
        &self,
        brief: &DebateBrief,
        directive: &RoundDirective,
        prior: &[&DebateRound],
        verbosity: Verbosity,
    ) -> String {
        let preamble = match self.role {
            PersonaRole::Optimist => OPTIMIST_PREAMBLE,
            PersonaRole::Pessimist => PESSIMIST_PREAMBLE,
            PersonaRole::Mediator => MEDIATOR_PREAMBLE,
        };

        let mut prompt = String::new();
        let _ = writeln!(prompt, "{preamble}\n");
        let _ = writeln!(prompt, "## Topic\n{}\n", brief.topic);
        let _ = writeln!(prompt, "## Domain\n{} (team {})\n", brief.domain, brief.team);
        let _ = writeln!(prompt, "## Context\n{}\n", directive.context_excerpt);
        for round in prior {
            let _ = writeln!(
                prompt,
                "## {} ({}% confidence)\n{}\n{}\n",
                round.phase, round.content.confidence, round.content.position, round.content.reasoning
            );
        }
        let _ = writeln!(prompt, "## Task\n{}", directive.task);
        let _ = writeln!(prompt, "Success criteria: {}", directive.success_criteria);
        let _ = writeln!(prompt, "{}\n", verbosity.instruction());
        prompt.push_str(RESPONSE_FORMAT);
        prompt
    }

    /// Turn generator output into round content, or `None` when it is not
    /// usable for this role.
    pub fn interpret(
        &self,
        brief: &DebateBrief,
        text: &str,
        prior: &[&DebateRound],
    ) -> Option<DebateContent> {
        let parsed: StructuredPosition = parse_structured(text)?;
        if !parsed.is_usable() {
            return None;
        }
        let position = parsed.position.clone().unwrap_or_default().trim().to_string();
        let mut content = DebateContent {
            reasoning: parsed.reasoning.clone().unwrap_or_default(),
            evidence: parsed.evidence.clone(),
            confidence: parsed.confidence_percent().unwrap_or(DEFAULT_CONFIDENCE),
            suggested_actions: parsed
                .suggested_actions
                .iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect(),
            position,
        };

        match self.role {
            PersonaRole::Optimist => {}
            PersonaRole::Pessimist => {
                let thesis = prior.first()?;
                if word_similarity(&content.position, &thesis.content.position)
                    >= self.restatement_threshold
                {
                    return None;
                }
            }
            PersonaRole::Mediator => {
                let (thesis, antithesis) = (prior.first()?, prior.get(1)?);
                let (t, a) = (thesis.content.confidence, antithesis.content.confidence);
                let raw = parsed
                    .confidence_percent()
                    .unwrap_or_else(|| balanced_confidence(t, a));
                content.confidence = raw.clamp(t.min(a), t.max(a));
                if content.suggested_actions.is_empty() {
                    content.suggested_actions = self.fallback(&brief.domain).suggested_actions;
                }
            }
        }
        Some(content)
    }

    /// Deterministic content for this role and domain.
    pub fn fallback(&self, domain: &str) -> DebateContent {
        fallback_entry(domain, self.role).to_content()
    }
}

/// Compact, char-boundary-safe excerpt of the context payload.
pub fn context_excerpt(context: &serde_json::Value) -> String {
    if context.is_null() {
        return String::new();
    }
    let text = match context {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= CONTEXT_EXCERPT_CHARS {
        return text;
    }
    let mut excerpt: String = text.chars().take(CONTEXT_EXCERPT_CHARS).collect();
    excerpt.push('…');
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::Priority;

    fn brief() -> DebateBrief {
        DebateBrief {
            debate_id: "d-1".to_string(),
            team: "inventory-team".to_string(),
            domain: "inventory".to_string(),
            topic: "Safety stock policy".to_string(),
            context: serde_json::json!({"turns": 4.2}),
            priority: Priority::Medium,
        }
    }

    fn round(role: PersonaRole, position: &str, confidence: u8) -> DebateRound {
        DebateRound::new(
            "d-1",
            role,
            "actor",
            DebateContent {
                position: position.to_string(),
                reasoning: "r".to_string(),
                evidence: vec![],
                confidence,
                suggested_actions: vec![],
            },
            RoundDirective::for_role(role, ""),
            vec![],
        )
    }

    #[test]
    fn test_balanced_confidence() {
        assert_eq!(balanced_confidence(75, 60), 63);
        assert_eq!(balanced_confidence(100, 100), 90);
        assert_eq!(balanced_confidence(0, 0), 10);
    }

    #[test]
    fn test_prompt_includes_prior_rounds() {
        let strategy = RoleStrategy::new(PersonaRole::Pessimist);
        let b = brief();
        let thesis = round(PersonaRole::Optimist, "Cut cover on slow movers", 70);
        let prompt = strategy.build_prompt(&b, &strategy.directive(&b), &[&thesis], Verbosity::Concise);
        assert!(prompt.contains("Safety stock policy"));
        assert!(prompt.contains("Cut cover on slow movers"));
        assert!(prompt.contains("\"turns\":4.2"));
        assert!(prompt.contains(Verbosity::Concise.instruction()));
    }

    #[test]
    fn test_optimist_interprets_json() {
        let strategy = RoleStrategy::new(PersonaRole::Optimist);
        let text = r#"Answer: {"position": "Trim slow movers", "reasoning": "cash", "evidence": ["turns 4.2"], "confidence": 81}"#;
        let content = strategy.interpret(&brief(), text, &[]).unwrap();
        assert_eq!(content.position, "Trim slow movers");
        assert_eq!(content.confidence, 81);
        assert_eq!(content.evidence.len(), 1);
    }

    #[test]
    fn test_unparseable_is_none() {
        let strategy = RoleStrategy::new(PersonaRole::Optimist);
        assert!(strategy.interpret(&brief(), "I think it is fine.", &[]).is_none());
        assert!(strategy
            .interpret(&brief(), r#"{"position": "  "}"#, &[])
            .is_none());
    }

    #[test]
    fn test_pessimist_restatement_rejected() {
        let strategy = RoleStrategy::new(PersonaRole::Pessimist);
        let thesis = round(PersonaRole::Optimist, "Trim cover on slow movers now", 70);
        let echo = r#"{"position": "Trim cover on slow movers now!", "confidence": 40}"#;
        assert!(strategy.interpret(&brief(), echo, &[&thesis]).is_none());

        let rebuttal = r#"{"position": "Single-sourced parts need their cover", "confidence": 40}"#;
        assert!(strategy.interpret(&brief(), rebuttal, &[&thesis]).is_some());
    }

    #[test]
    fn test_mediator_clamps_into_band_and_fills_actions() {
        let strategy = RoleStrategy::new(PersonaRole::Mediator);
        let thesis = round(PersonaRole::Optimist, "a", 80);
        let anti = round(PersonaRole::Pessimist, "b", 50);

        let high = r#"{"position": "Split by supply risk", "confidence": 95}"#;
        let content = strategy.interpret(&brief(), high, &[&thesis, &anti]).unwrap();
        assert_eq!(content.confidence, 80);
        assert!(!content.suggested_actions.is_empty());

        let missing = r#"{"position": "Split by supply risk"}"#;
        let content = strategy.interpret(&brief(), missing, &[&thesis, &anti]).unwrap();
        assert_eq!(content.confidence, balanced_confidence(80, 50));
    }

    #[test]
    fn test_restatement_threshold_override() {
        let default = RoleStrategy::new(PersonaRole::Pessimist);
        let strict = default.with_restatement_threshold(0.5);
        assert_ne!(strict, default);
        assert_eq!(strict, RoleStrategy::new(PersonaRole::Pessimist).with_restatement_threshold(0.5));
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let strategy = RoleStrategy::new(PersonaRole::Mediator);
        assert_eq!(strategy.fallback("cost"), strategy.fallback("cost"));
        assert_ne!(strategy.fallback("cost"), strategy.fallback("bom"));
    }

    #[test]
    fn test_context_excerpt_truncates_on_char_boundary() {
        let long = serde_json::Value::String("é".repeat(1000));
        let excerpt = context_excerpt(&long);
        assert_eq!(excerpt.chars().count(), CONTEXT_EXCERPT_CHARS + 1);
        assert_eq!(context_excerpt(&serde_json::Value::Null), "");
    }
}
