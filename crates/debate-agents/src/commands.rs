//! Subcommands. Each one acts on a started engine and returns the JSON
//! document printed to stdout.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use coordination::debate::{DebateId, QueueTicket};
use coordination::{
    Admission, DebateEngine, DebateRecord, HistoryFilter, Priority, SharedTranscriptSink,
};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a debate for one team
    Start {
        team: String,
        topic: String,
        /// JSON object passed to every persona
        #[arg(long)]
        context: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        /// Return right after admission
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },
    /// Start the same topic for every team in the roster
    StartAll {
        topic: String,
        #[arg(long)]
        context: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long, default_value_t = false)]
        no_wait: bool,
    },
    /// Cancel an active debate
    Cancel {
        debate_id: String,
        #[arg(long, default_value = "cancelled by operator")]
        reason: String,
    },
    /// Print one debate record
    Show { debate_id: String },
    /// Completed and cancelled debates, newest first
    History {
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        team: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Aggregate counters
    Stats,
    /// Force governance review of a debate that has a synthesis
    Review { debate_id: String },
    /// Queue, persona and bus status
    Status,
    /// List transcripts, or print one
    Transcripts { debate_id: Option<String> },
    /// Cross-domain summary of recent completed debates
    Insights,
}

pub struct Runner<'a> {
    engine: &'a DebateEngine,
    transcripts: SharedTranscriptSink,
    wait: Duration,
}

impl<'a> Runner<'a> {
    pub fn new(engine: &'a DebateEngine, transcripts: SharedTranscriptSink, wait: Duration) -> Self {
        Self {
            engine,
            transcripts,
            wait,
        }
    }

    pub async fn run(&self, command: Command) -> Result<Value> {
        let orchestrator = self.engine.orchestrator();
        let manager = self.engine.manager();
        match command {
            Command::Start {
                team,
                topic,
                context,
                priority,
                no_wait,
            } => {
                let context = parse_context(context.as_deref())?;
                let admission = orchestrator
                    .orchestrate_debate(&team, &topic, context, priority)
                    .await
                    .with_context(|| format!("starting debate for {team}"))?;
                let debates = if no_wait {
                    Vec::new()
                } else {
                    self.settle(std::slice::from_ref(&admission)).await
                };
                Ok(json!({ "admission": admission, "debates": debates }))
            }
            Command::StartAll {
                topic,
                context,
                priority,
                no_wait,
            } => {
                let context = parse_context(context.as_deref())?;
                let admissions = orchestrator
                    .orchestrate_all_teams(&topic, context, priority)
                    .await
                    .context("starting debates for all teams")?;
                let debates = if no_wait {
                    Vec::new()
                } else {
                    let plain: Vec<Admission> =
                        admissions.iter().map(|a| a.admission.clone()).collect();
                    self.settle(&plain).await
                };
                Ok(json!({ "admissions": admissions, "debates": debates }))
            }
            Command::Cancel { debate_id, reason } => {
                let record = orchestrator
                    .cancel_debate(&debate_id, &reason)
                    .await
                    .with_context(|| format!("cancelling {debate_id}"))?;
                Ok(serde_json::to_value(record)?)
            }
            Command::Show { debate_id } => match manager.debate(&debate_id).await {
                Some(record) => Ok(serde_json::to_value(record)?),
                None => bail!("debate {debate_id} not found"),
            },
            Command::History {
                domain,
                team,
                limit,
            } => {
                let filter = HistoryFilter {
                    domain,
                    team,
                    limit,
                };
                Ok(serde_json::to_value(manager.history(&filter).await)?)
            }
            Command::Stats => Ok(json!({
                "debates": manager.statistics().await,
                "bus": self.engine.bus().stats(),
            })),
            Command::Review { debate_id } => {
                let roles = orchestrator
                    .escalate_governance(&debate_id)
                    .await
                    .with_context(|| format!("requesting review of {debate_id}"))?;
                info!(debate_id = %debate_id, reviewers = ?roles, "Governance review requested");
                let debates = self
                    .engine
                    .await_debates(std::slice::from_ref(&debate_id), self.wait)
                    .await;
                Ok(json!({ "reviewers": roles, "debates": debates }))
            }
            Command::Status => Ok(json!({
                "queue": manager.queue_status().await,
                "teams": orchestrator.team_status().await,
                "pending": orchestrator.pending_debates().await,
                "bus": self.engine.bus().stats(),
            })),
            Command::Transcripts { debate_id: Some(id) } => {
                let text = self
                    .transcripts
                    .read(&id)
                    .await
                    .with_context(|| format!("reading transcript for {id}"))?;
                match text {
                    Some(text) => Ok(json!({ "debate_id": id, "transcript": text })),
                    None => bail!("no transcript for {id}"),
                }
            }
            Command::Transcripts { debate_id: None } => {
                let list = self.transcripts.list().await.context("listing transcripts")?;
                Ok(serde_json::to_value(list)?)
            }
            Command::Insights => Ok(serde_json::to_value(
                orchestrator.cross_domain_insights().await,
            )?),
        }
    }

    /// Wait for the debates behind `admissions`, following queued tickets
    /// as they are admitted, until all are terminal or the wait expires.
    async fn settle(&self, admissions: &[Admission]) -> Vec<DebateRecord> {
        let deadline = Instant::now() + self.wait;
        let mut ids: Vec<DebateId> = Vec::new();
        let mut tickets: Vec<QueueTicket> = Vec::new();
        for admission in admissions {
            match admission {
                Admission::Started { debate_id } => ids.push(debate_id.clone()),
                Admission::Queued { ticket, .. } => tickets.push(*ticket),
            }
        }

        let manager = self.engine.manager();
        let mut events = self.engine.subscribe();
        loop {
            let mut queued = Vec::with_capacity(tickets.len());
            for ticket in tickets {
                match manager.resolve_ticket(ticket).await {
                    Some(id) => ids.push(id),
                    None => queued.push(ticket),
                }
            }
            tickets = queued;
            if tickets.is_empty() {
                break;
            }
            match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
                Ok(Err(RecvError::Closed)) | Err(_) => {
                    warn!(queued = ?tickets, "Queued debates were not admitted in time");
                    break;
                }
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        self.engine.await_debates(&ids, remaining).await
    }
}

fn parse_context(raw: Option<&str>) -> Result<Value> {
    match raw {
        None => Ok(json!({})),
        Some(raw) => serde_json::from_str(raw).context("--context must be valid JSON"),
    }
}
