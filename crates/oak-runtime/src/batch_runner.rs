//! Polls for unprocessed, completed prompt batches and runs them through
//! the extraction pipeline on a fixed interval.
//!
//! Runs its own dedicated connection to the database rather than sharing
//! the hook surface's `Arc<Mutex<Connection>>`: `BatchProcessor` holds a
//! connection across an LLM call, and a lock held across an await point
//! would stall every hook request for the duration of an extraction. WAL
//! mode (set when the database is opened) is exactly what lets a second
//! connection read and write without blocking the first.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;

use oak_engine::{BatchProcessor, ContextBudget};
use oak_index::queries::{activities, prompt_batches};
use oak_providers::LlmChain;
use oak_types::BatchStatus;

use crate::AppState;

/// Drives the batch processor on a fixed interval until `stop` resolves.
/// Errors on one batch never stop the others from being attempted, and a
/// bad tick never stops the next one from firing.
pub async fn run_background_loop(
    state: Arc<AppState>,
    conn: Connection,
    llm: LlmChain,
    budget: ContextBudget,
    interval_seconds: u64,
    mut stop: tokio::sync::watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    let processor = BatchProcessor::new(&llm, budget);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(vector_store) = state.vector_store.as_ref() else { continue };
                if let Err(err) = run_once(&conn, vector_store, state.ingestor.machine_id(), &processor).await {
                    tracing::error!(error = %err, "batch processor tick failed");
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    tracing::info!("batch processor loop stopping");
                    return;
                }
            }
        }
    }
}

/// A batch still `active` hasn't finished accumulating activities yet;
/// only `completed` batches are ready for extraction.
async fn run_once(conn: &Connection, vector_store: &oak_vector::VectorStore, machine_id: &str, processor: &BatchProcessor<'_>) -> crate::Result<()> {
    let batches = prompt_batches::list_unprocessed_for_machine(conn, machine_id)?;
    for batch in batches.into_iter().filter(|b| b.status == BatchStatus::Completed) {
        let batch_activities = activities::list_for_batch(conn, &batch.id)?;
        match processor.process_batch(conn, vector_store, &batch, &batch_activities).await {
            Ok(outcome) => {
                tracing::debug!(batch_id = %batch.id, observations = outcome.observations_extracted, classification = outcome.classification, "batch processed");
            }
            Err(err) => tracing::error!(batch_id = %batch.id, error = %err, "batch processing failed"),
        }
    }
    Ok(())
}
