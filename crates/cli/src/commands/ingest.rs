//! Event ingest command.
//!
//! # Usage
//!
//! ```bash
//! ecomm ingest --file events.ndjson
//! cat events.ndjson | ecomm ingest
//! ecomm ingest retry --topic products --limit 500
//! ```
//!
//! Each line is `{"topic": "...", "data": {...}}`. Failed lines land in
//! `failed_events`; the command only fails if the input can't be read or the
//! database is unreachable.

use std::path::Path;

use ecomm_db::services::{EventIngestor, IngestError};
use sqlx::PgPool;
use tokio::io::BufReader;

/// Ingest a file, or stdin when `file` is `None`.
pub async fn run(pool: &PgPool, file: Option<&Path>) -> Result<(), IngestError> {
    let ingestor = EventIngestor::new(pool);

    let report = if let Some(path) = file {
        tracing::info!(path = %path.display(), "Ingesting events from file");
        let file = tokio::fs::File::open(path).await?;
        ingestor.run(BufReader::new(file)).await?
    } else {
        tracing::info!("Ingesting events from stdin");
        ingestor.run(BufReader::new(tokio::io::stdin())).await?
    };

    if report.failed > 0 {
        tracing::warn!(
            ingested = report.ingested,
            failed = report.failed,
            "Some events failed; see failed_events"
        );
    }
    Ok(())
}

/// Replay stored failures.
pub async fn retry(pool: &PgPool, topic: Option<&str>, limit: i64) -> Result<(), IngestError> {
    let report = EventIngestor::new(pool).retry_failed(topic, limit).await?;

    if report.still_failing > 0 {
        tracing::warn!(
            resolved = report.resolved,
            still_failing = report.still_failing,
            "Some events are still failing; see failed_events"
        );
    }
    Ok(())
}
