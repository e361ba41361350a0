//! Persona actor: one role-bound debate participant.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::bus::{ActorId, Envelope, MessageHandler, MessageKind, Payload, SharedMessageBus};
use crate::coaching::{CoachingFeedback, Tunables};
use crate::config::TeamSpec;
use crate::debate::{
    DebateBrief, DebateContent, DebateError, DebateRound, PersonaRole, RoundDirective,
    SharedDebateManager,
};
use crate::generation::{generate_with_timeout, SharedTextGenerator};

use super::strategy::RoleStrategy;

/// Current activity of a persona.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaStatus {
    #[default]
    Idle,
    Processing,
    Error,
}

/// Per-persona counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaStats {
    /// Rounds attempted.
    pub processed: u64,
    /// Rounds recorded and forwarded.
    pub succeeded: u64,
    /// Rounds that hit an unexpected error.
    pub failed: u64,
    /// Rounds that used fallback content.
    pub fallbacks: u64,
    /// Rounds dropped because the debate was no longer active.
    pub abandoned: u64,
    pub total_latency_ms: u64,
    pub last_latency_ms: Option<u64>,
    pub last_error: Option<String>,
}

impl PersonaStats {
    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.processed == 0 {
            None
        } else {
            Some(self.total_latency_ms as f64 / self.processed as f64)
        }
    }
}

/// Status view of a persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    pub actor_id: ActorId,
    pub team: String,
    pub role: PersonaRole,
    pub status: PersonaStatus,
    pub stats: PersonaStats,
    pub tunables: Tunables,
}

#[derive(Default)]
struct PersonaState {
    status: PersonaStatus,
    stats: PersonaStats,
    tunables: Tunables,
}

/// Wiring shared by every persona of an engine.
#[derive(Clone)]
pub struct PersonaContext {
    pub generator: SharedTextGenerator,
    pub manager: SharedDebateManager,
    pub bus: SharedMessageBus,
    /// Where mediators send their synthesis.
    pub orchestrator_id: ActorId,
    pub round_timeout: Duration,
}

/// A debate participant. Behavior is supplied by its [`RoleStrategy`].
pub struct PersonaActor {
    id: ActorId,
    team: TeamSpec,
    strategy: RoleStrategy,
    ctx: PersonaContext,
    state: Mutex<PersonaState>,
}

impl PersonaActor {
    pub fn new(team: &TeamSpec, strategy: RoleStrategy, ctx: PersonaContext) -> Self {
        let id = match strategy.role() {
            PersonaRole::Optimist => team.optimist.clone(),
            PersonaRole::Pessimist => team.pessimist.clone(),
            PersonaRole::Mediator => team.mediator.clone(),
        };
        Self {
            id,
            team: team.clone(),
            strategy,
            ctx,
            state: Mutex::new(PersonaState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn role(&self) -> PersonaRole {
        self.strategy.role()
    }

    pub fn team(&self) -> &TeamSpec {
        &self.team
    }

    /// Message kind this persona answers.
    pub fn trigger_kind(&self) -> MessageKind {
        match self.role() {
            PersonaRole::Optimist => MessageKind::DebateStart,
            PersonaRole::Pessimist => MessageKind::DebateThesis,
            PersonaRole::Mediator => MessageKind::DebateAntithesis,
        }
    }

    pub async fn snapshot(&self) -> PersonaSnapshot {
        let state = self.state.lock().await;
        PersonaSnapshot {
            actor_id: self.id.clone(),
            team: self.team.team.clone(),
            role: self.role(),
            status: state.status,
            stats: state.stats.clone(),
            tunables: state.tunables,
        }
    }

    /// Apply a coaching message and return the resulting tunables.
    pub async fn apply_coaching(&self, feedback: &CoachingFeedback) -> Tunables {
        let mut state = self.state.lock().await;
        let changed = state.tunables.apply(feedback);
        if changed {
            info!(
                actor = %self.id,
                metric = ?feedback.metric,
                score = feedback.score,
                benchmark = feedback.benchmark,
                offset = state.tunables.confidence_offset,
                verbosity = ?state.tunables.verbosity,
                "Coaching applied"
            );
        }
        state.tunables
    }

    /// Produce this role's content for a debate. Never fails: generation
    /// errors, timeouts and unusable output fall back to the domain table.
    pub async fn generate_position(
        &self,
        brief: &DebateBrief,
        directive: &RoundDirective,
        prior: &[&DebateRound],
    ) -> DebateContent {
        let tunables = self.state.lock().await.tunables;
        let prompt = self
            .strategy
            .build_prompt(brief, directive, prior, tunables.verbosity);

        let generated =
            match generate_with_timeout(self.ctx.generator.as_ref(), &prompt, self.ctx.round_timeout)
                .await
            {
                Ok(generation) => {
                    let content = self.strategy.interpret(brief, &generation.text, prior);
                    if content.is_none() {
                        debug!(actor = %self.id, debate_id = %brief.debate_id, "Unusable generator output");
                    }
                    content
                }
                Err(e) => {
                    debug!(actor = %self.id, debate_id = %brief.debate_id, error = %e, "Generation failed");
                    None
                }
            };

        let mut content = match generated {
            Some(content) => content,
            None => {
                self.state.lock().await.stats.fallbacks += 1;
                info!(actor = %self.id, debate_id = %brief.debate_id, domain = %brief.domain, "Using fallback position");
                self.strategy.fallback(&brief.domain)
            }
        };
        content.confidence = tunables.adjust_confidence(content.confidence.min(100));
        content
    }

    async fn run_round(&self, envelope: &Envelope, brief: &DebateBrief, prior: Vec<&DebateRound>) {
        let started = Instant::now();
        {
            let mut state = self.state.lock().await;
            state.status = PersonaStatus::Processing;
            state.stats.processed += 1;
        }

        let outcome = self.produce_and_forward(envelope, brief, &prior).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut state = self.state.lock().await;
        state.stats.total_latency_ms += elapsed_ms;
        state.stats.last_latency_ms = Some(elapsed_ms);
        match outcome {
            Ok(()) => state.stats.succeeded += 1,
            Err(RoundFailure::Inactive(e)) => {
                state.stats.abandoned += 1;
                info!(actor = %self.id, debate_id = %brief.debate_id, reason = %e, "Debate no longer active, stopping");
            }
            Err(RoundFailure::Other(e)) => {
                state.status = PersonaStatus::Error;
                state.stats.failed += 1;
                state.stats.last_error = Some(e.to_string());
                error!(actor = %self.id, debate_id = %brief.debate_id, error = %e, "Round failed");
            }
        }
        state.status = PersonaStatus::Idle;
    }

    async fn produce_and_forward(
        &self,
        envelope: &Envelope,
        brief: &DebateBrief,
        prior: &[&DebateRound],
    ) -> Result<(), RoundFailure> {
        let directive = self.strategy.directive(brief);
        let content = self.generate_position(brief, &directive, prior).await;
        let round = DebateRound::new(
            &brief.debate_id,
            self.role(),
            &self.id,
            content,
            directive,
            prior.iter().map(|r| r.id.clone()).collect(),
        );

        self.ctx
            .manager
            .record_round(&brief.debate_id, round.clone())
            .await
            .map_err(|e| match e {
                DebateError::NotActive { .. }
                | DebateError::AlreadyComplete(_)
                | DebateError::NotFound(_) => RoundFailure::Inactive(e),
                other => RoundFailure::Other(other.into()),
            })?;
        debug!(actor = %self.id, debate_id = %brief.debate_id, phase = %round.phase, confidence = round.content.confidence, "Round recorded");

        let brief = brief.clone();
        let (target, payload) = match self.role() {
            PersonaRole::Optimist => (
                self.team.pessimist.clone(),
                Payload::DebateThesis {
                    brief,
                    thesis: round,
                },
            ),
            PersonaRole::Pessimist => {
                let thesis = prior.first().ok_or(RoundFailure::missing("thesis"))?;
                (
                    self.team.mediator.clone(),
                    Payload::DebateAntithesis {
                        brief,
                        thesis: (*thesis).clone(),
                        antithesis: round,
                    },
                )
            }
            PersonaRole::Mediator => {
                let (thesis, antithesis) = match prior {
                    [t, a, ..] => ((*t).clone(), (*a).clone()),
                    _ => return Err(RoundFailure::missing("thesis and antithesis")),
                };
                (
                    self.ctx.orchestrator_id.clone(),
                    Payload::DebateSynthesis {
                        brief,
                        thesis,
                        antithesis,
                        synthesis: round,
                    },
                )
            }
        };

        self.ctx
            .bus
            .send(
                &self.id,
                &target,
                payload,
                envelope.priority,
                Some(envelope.reply_correlation()),
            )
            .map_err(|e| RoundFailure::Other(e.into()))?;
        Ok(())
    }
}

enum RoundFailure {
    /// The debate was cancelled or finished under us.
    Inactive(DebateError),
    Other(anyhow::Error),
}

impl RoundFailure {
    fn missing(what: &str) -> Self {
        Self::Other(anyhow::anyhow!("message is missing the {what} round"))
    }
}

#[async_trait]
impl MessageHandler for PersonaActor {
    async fn handle(&self, envelope: Envelope) -> anyhow::Result<()> {
        if let Payload::Coaching { feedback } = &envelope.payload {
            self.apply_coaching(feedback).await;
            return Ok(());
        }
        if envelope.kind() != self.trigger_kind() {
            warn!(actor = %self.id, kind = %envelope.kind(), "Ignoring message for another role");
            return Ok(());
        }

        let brief = match &envelope.payload {
            Payload::DebateStart { brief }
            | Payload::DebateThesis { brief, .. }
            | Payload::DebateAntithesis { brief, .. } => brief.clone(),
            _ => return Ok(()),
        };
        let prior = envelope.payload.rounds();
        self.run_round(&envelope, &brief, prior).await;
        Ok(())
    }
}

/// Build and subscribe the three personas of every team.
pub fn spawn_team(
    team: &TeamSpec,
    ctx: &PersonaContext,
    similarity_threshold: f64,
) -> Vec<Arc<PersonaActor>> {
    PersonaRole::all()
        .into_iter()
        .map(|role| {
            let strategy = RoleStrategy::new(role).with_restatement_threshold(similarity_threshold);
            let actor = Arc::new(PersonaActor::new(team, strategy, ctx.clone()));
            ctx.bus.subscribe_actor(actor.id(), actor.clone());
            actor
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;
    use crate::coaching::CoachingMetric;
    use crate::debate::{
        DebateManager, DebatePhase, DebateRequest, EventFeed, ManagerConfig, MemoryDebateStore,
        NullTranscriptSink,
    };
    use crate::generation::{DisabledGenerator, Generation, MockTextGenerator};
    use crate::persona::fallback::fallback_entry;

    fn context(generator: SharedTextGenerator) -> PersonaContext {
        PersonaContext {
            generator,
            manager: DebateManager::new(
                ManagerConfig::default(),
                MemoryDebateStore::new().shared(),
                Arc::new(NullTranscriptSink),
                EventFeed::default(),
            )
            .shared(),
            bus: MessageBus::new().shared(),
            orchestrator_id: "chief".to_string(),
            round_timeout: Duration::from_secs(5),
        }
    }

    fn actor(role: PersonaRole, generator: SharedTextGenerator) -> PersonaActor {
        PersonaActor::new(
            &TeamSpec::new("cost-team", "cost"),
            RoleStrategy::new(role),
            context(generator),
        )
    }

    fn brief() -> DebateBrief {
        DebateBrief {
            debate_id: "d-1".to_string(),
            team: "cost-team".to_string(),
            domain: "cost".to_string(),
            topic: "Supplier consolidation".to_string(),
            context: serde_json::json!({}),
            priority: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_disabled_generator_uses_fallback() {
        let persona = actor(PersonaRole::Optimist, Arc::new(DisabledGenerator));
        let b = brief();
        let directive = RoundDirective::for_role(PersonaRole::Optimist, "");
        let content = persona.generate_position(&b, &directive, &[]).await;
        assert_eq!(
            content,
            fallback_entry("cost", PersonaRole::Optimist).to_content()
        );
        assert_eq!(persona.snapshot().await.stats.fallbacks, 1);
    }

    #[tokio::test]
    async fn test_generated_content_gets_offset() {
        let mut mock = MockTextGenerator::new();
        mock.expect_generate().returning(|_| {
            Ok(Generation::new(
                r#"{"position": "Tender freight", "reasoning": "r", "evidence": ["x"], "confidence": 90}"#,
            ))
        });
        let persona = actor(PersonaRole::Optimist, Arc::new(mock));
        persona
            .apply_coaching(&CoachingFeedback::new(CoachingMetric::Accuracy, 20.0, 70.0))
            .await;

        let directive = RoundDirective::for_role(PersonaRole::Optimist, "");
        let content = persona.generate_position(&brief(), &directive, &[]).await;
        assert_eq!(content.position, "Tender freight");
        assert_eq!(content.confidence, 85);
        assert_eq!(persona.snapshot().await.stats.fallbacks, 0);
    }

    #[tokio::test]
    async fn test_round_into_cancelled_debate_is_abandoned() {
        let persona = actor(PersonaRole::Optimist, Arc::new(DisabledGenerator));
        let manager = persona.ctx.manager.clone();
        let admission = manager
            .initiate_debate(DebateRequest::new("cost-team", "cost", "t", serde_json::json!({})))
            .await;
        let id = admission.debate_id().unwrap().to_string();
        let record = manager.cancel_debate(&id, "stop").await.unwrap().record;
        assert_eq!(record.current_phase, DebatePhase::Cancelled);

        let envelope = Envelope::new("chief", Payload::DebateStart { brief: record.brief() })
            .to(persona.id());
        persona.handle(envelope).await.unwrap();

        let snap = persona.snapshot().await;
        assert_eq!(snap.status, PersonaStatus::Idle);
        assert_eq!(snap.stats.abandoned, 1);
        assert_eq!(snap.stats.failed, 0);
    }

    #[tokio::test]
    async fn test_unknown_debate_is_abandoned_not_error() {
        let persona = actor(PersonaRole::Optimist, Arc::new(DisabledGenerator));
        let envelope =
            Envelope::new("chief", Payload::DebateStart { brief: brief() }).to(persona.id());
        persona.handle(envelope).await.unwrap();
        let snap = persona.snapshot().await;
        assert_eq!(snap.stats.processed, 1);
        assert_eq!(snap.stats.abandoned, 1);
    }

    #[tokio::test]
    async fn test_wrong_kind_ignored() {
        let persona = actor(PersonaRole::Mediator, Arc::new(DisabledGenerator));
        let envelope =
            Envelope::new("chief", Payload::DebateStart { brief: brief() }).to(persona.id());
        persona.handle(envelope).await.unwrap();
        assert_eq!(persona.snapshot().await.stats.processed, 0);
    }
}
