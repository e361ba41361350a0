//! Engine wiring.
//!
//! [`EngineBuilder`] constructs every component explicitly: bus, manager,
//! personas for each roster team, governance actors and the chief
//! orchestrator, then subscribes them on the bus. Nothing is global.
//!
//! Building spawns bus dispatcher tasks, so it must run inside a Tokio
//! runtime.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{MessageBus, MessageKind, SharedMessageBus};
use crate::config::{ConfigError, EngineConfig};
use crate::debate::{
    DebateEvent, DebateId, DebateManager, DebatePhase, DebateRecord, EventFeed, HistoryFilter,
    MemoryDebateStore, NullTranscriptSink, PersistenceResult, RestoreReport, ReviewerRole,
    SharedDebateManager, SharedDebateStore, SharedTranscriptSink,
};
use crate::generation::{DisabledGenerator, SharedTextGenerator};
use crate::governance::{ComplianceReviewer, GovernanceActor, QualityReviewer, SharedReviewer};
use crate::orchestrator::{ChiefOrchestrator, ORCHESTRATOR_ID};
use crate::persona::{spawn_team, PersonaActor, PersonaContext};

/// Assembles a [`DebateEngine`].
pub struct EngineBuilder {
    config: EngineConfig,
    generator: SharedTextGenerator,
    store: SharedDebateStore,
    transcripts: SharedTranscriptSink,
    reviewers: Option<Vec<SharedReviewer>>,
}

impl EngineBuilder {
    /// Defaults: generation disabled (every round uses fallback content),
    /// in-memory store, no transcripts, quality and compliance reviewers.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            generator: Arc::new(DisabledGenerator),
            store: MemoryDebateStore::new().shared(),
            transcripts: Arc::new(NullTranscriptSink),
            reviewers: None,
        }
    }

    pub fn with_generator(mut self, generator: SharedTextGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_store(mut self, store: SharedDebateStore) -> Self {
        self.store = store;
        self
    }

    pub fn with_transcripts(mut self, transcripts: SharedTranscriptSink) -> Self {
        self.transcripts = transcripts;
        self
    }

    /// Replace the default reviewer set. An empty set disables governance.
    pub fn with_reviewers(mut self, reviewers: Vec<SharedReviewer>) -> Self {
        self.reviewers = Some(reviewers);
        self
    }

    fn default_reviewers(&self) -> Vec<SharedReviewer> {
        let governance = self.config.governance.clone();
        let timeout = self.config.round_timeout();
        let mut quality = QualityReviewer::new(governance.clone());
        let mut compliance = ComplianceReviewer::new(governance.clone());
        if governance.generator_pass {
            quality = quality.with_generator(self.generator.clone(), timeout);
            compliance = compliance.with_generator(self.generator.clone(), timeout);
        }
        vec![Arc::new(quality), Arc::new(compliance)]
    }

    pub fn build(self) -> Result<DebateEngine, ConfigError> {
        self.config.validate()?;
        let reviewers = match self.reviewers.clone() {
            Some(reviewers) => reviewers,
            None => self.default_reviewers(),
        };

        let bus = MessageBus::new().shared();
        let manager = DebateManager::new(
            self.config.manager_config(),
            self.store,
            self.transcripts,
            EventFeed::new(self.config.event_capacity),
        )
        .shared();

        let ctx = PersonaContext {
            generator: self.generator,
            manager: manager.clone(),
            bus: bus.clone(),
            orchestrator_id: ORCHESTRATOR_ID.to_string(),
            round_timeout: self.config.round_timeout(),
        };
        let personas: Vec<Arc<PersonaActor>> = self
            .config
            .teams
            .iter()
            .flat_map(|team| spawn_team(team, &ctx, self.config.governance.similarity_threshold))
            .collect();

        let mut roles: Vec<ReviewerRole> = Vec::new();
        for reviewer in reviewers {
            let actor = Arc::new(GovernanceActor::new(reviewer, bus.clone()));
            if roles.contains(&actor.role()) {
                warn!(reviewer = %actor.role(), "Duplicate reviewer role ignored");
                continue;
            }
            roles.push(actor.role());
            bus.subscribe_actor(actor.id(), actor.clone());
        }

        let orchestrator = Arc::new(ChiefOrchestrator::new(
            self.config.clone(),
            manager.clone(),
            bus.clone(),
            personas.clone(),
            roles.clone(),
        ));
        bus.subscribe_actor(ORCHESTRATOR_ID, orchestrator.clone());
        bus.subscribe_kind(MessageKind::DebateThesis, orchestrator.clone());
        bus.subscribe_kind(MessageKind::DebateAntithesis, orchestrator.clone());

        info!(
            teams = self.config.teams.len(),
            personas = personas.len(),
            reviewers = ?roles,
            capacity = self.config.max_concurrent_debates,
            "Debate engine built"
        );

        Ok(DebateEngine {
            config: self.config,
            bus,
            manager,
            orchestrator,
            personas,
            shutdown: CancellationToken::new(),
            coaching: Mutex::new(None),
        })
    }
}

/// A wired engine.
pub struct DebateEngine {
    config: EngineConfig,
    bus: SharedMessageBus,
    manager: SharedDebateManager,
    orchestrator: Arc<ChiefOrchestrator>,
    personas: Vec<Arc<PersonaActor>>,
    shutdown: CancellationToken,
    coaching: Mutex<Option<JoinHandle<()>>>,
}

impl DebateEngine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn bus(&self) -> &SharedMessageBus {
        &self.bus
    }

    pub fn manager(&self) -> &SharedDebateManager {
        &self.manager
    }

    pub fn orchestrator(&self) -> &Arc<ChiefOrchestrator> {
        &self.orchestrator
    }

    pub fn personas(&self) -> &[Arc<PersonaActor>] {
        &self.personas
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DebateEvent> {
        self.manager.subscribe()
    }

    /// Restore from the store, optionally resume restored debates, and start
    /// the coaching loop when enabled.
    pub async fn start(&self, resume: bool) -> PersistenceResult<RestoreReport> {
        let report = self.manager.restore_from_database().await?;

        let mut history = self
            .manager
            .history(&HistoryFilter::default())
            .await;
        history.reverse();
        self.orchestrator.load_insights(&history).await;

        if resume {
            let resumed = self.orchestrator.resume_active().await;
            debug!(resumed, "Restored debates resumed");
        }

        if self.config.coaching.enabled {
            let mut slot = self.coaching.lock().await;
            if slot.is_none() {
                *slot = Some(
                    self.orchestrator
                        .spawn_coaching_loop(self.config.coaching.interval(), self.shutdown.child_token()),
                );
            }
        }
        Ok(report)
    }

    /// Stop the coaching loop and close the bus.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.coaching.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Coaching loop ended abnormally");
            }
        }
        self.bus.close();
        info!("Debate engine stopped");
    }

    /// Wait until every listed debate is terminal or `timeout` passes.
    /// Returns the latest record of each debate that exists.
    pub async fn await_debates(&self, ids: &[DebateId], timeout: Duration) -> Vec<DebateRecord> {
        let mut events = self.manager.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let records = self.records(ids).await;
            let settled = records.len() == ids.len()
                && records.iter().all(|r| r.current_phase.is_terminal());
            if settled {
                return records;
            }
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => {
                    let pending: Vec<&str> = records
                        .iter()
                        .filter(|r| !r.current_phase.is_terminal())
                        .map(|r| r.id.as_str())
                        .collect();
                    if !pending.is_empty() {
                        warn!(pending = ?pending, "Stopped waiting for debates");
                    }
                    return self.records(ids).await;
                }
            }
        }
    }

    async fn records(&self, ids: &[DebateId]) -> Vec<DebateRecord> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.manager.debate(id).await {
                records.push(record);
            }
        }
        records
    }

    /// Phase of a debate, if known.
    pub async fn phase(&self, debate_id: &str) -> Option<DebatePhase> {
        self.manager.debate(debate_id).await.map(|r| r.current_phase)
    }
}
