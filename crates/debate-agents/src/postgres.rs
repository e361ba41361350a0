//! Postgres-backed debate snapshots.
//!
//! One row per debate. Writes are revision-guarded in SQL so an out-of-order
//! snapshot never overwrites a newer one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use coordination::debate::{
    DebateQuery, DebateSnapshot, DebateStore, PersistenceError, PersistenceResult,
};
use tokio_postgres::{Client, NoTls};
use tracing::{error, info};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS debates (
    id          TEXT PRIMARY KEY,
    team        TEXT NOT NULL,
    domain      TEXT NOT NULL,
    phase       TEXT NOT NULL,
    terminal    BOOLEAN NOT NULL,
    revision    BIGINT NOT NULL,
    saved_at    TIMESTAMPTZ NOT NULL,
    snapshot    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS debates_saved_at_idx ON debates (saved_at DESC);
";

const UPSERT: &str = "
INSERT INTO debates (id, team, domain, phase, terminal, revision, saved_at, snapshot)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (id) DO UPDATE SET
    phase = EXCLUDED.phase,
    terminal = EXCLUDED.terminal,
    revision = EXCLUDED.revision,
    saved_at = EXCLUDED.saved_at,
    snapshot = EXCLUDED.snapshot
WHERE debates.revision <= EXCLUDED.revision
";

const QUERY: &str = "
SELECT snapshot FROM debates
WHERE ($1 OR NOT terminal)
  AND ($2::timestamptz IS NULL OR saved_at >= $2)
ORDER BY saved_at DESC
LIMIT $3
";

fn backend(e: tokio_postgres::Error) -> PersistenceError {
    PersistenceError::Backend(e.to_string())
}

pub struct PostgresDebateStore {
    client: Client,
}

impl PostgresDebateStore {
    /// Connect and create the table if needed. The connection task runs in
    /// the background until the client is dropped.
    pub async fn connect(url: &str) -> PersistenceResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await.map_err(backend)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Postgres connection closed");
            }
        });
        client.batch_execute(SCHEMA).await.map_err(backend)?;
        info!("Postgres debate store ready");
        Ok(Self { client })
    }
}

#[async_trait]
impl DebateStore for PostgresDebateStore {
    async fn upsert_debate(&self, snapshot: &DebateSnapshot) -> PersistenceResult<()> {
        let record = &snapshot.record;
        let json = snapshot.to_json()?;
        let phase = record.current_phase.to_string();
        let terminal = record.current_phase.is_terminal();
        let revision = i64::try_from(snapshot.revision).unwrap_or(i64::MAX);
        self.client
            .execute(
                UPSERT,
                &[
                    &record.id,
                    &record.team,
                    &record.domain,
                    &phase,
                    &terminal,
                    &revision,
                    &snapshot.saved_at,
                    &json,
                ],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn query_active_or_recent(
        &self,
        query: &DebateQuery,
    ) -> PersistenceResult<Vec<DebateSnapshot>> {
        let limit: Option<i64> = query.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX));
        let since: Option<DateTime<Utc>> = query.since;
        let rows = self
            .client
            .query(QUERY, &[&query.include_terminal, &since, &limit])
            .await
            .map_err(backend)?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row.try_get(0).map_err(backend)?;
            match DebateSnapshot::from_json(&json) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => error!(error = %e, "Skipping unreadable debate row"),
            }
        }
        Ok(snapshots)
    }
}
