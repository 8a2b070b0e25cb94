//! Bounded fan-out of entry tasks.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{Semaphore, mpsc};
use tracing::{info, warn};

use super::task::{self, MigratedEntry, TaskContext};
use super::{MigrationReport, TransferError, TransferOptions, TransferOutcome};
use crate::resume::SourceEntry;

/// Migrates `entries` concurrently and collects one outcome per entry.
///
/// At most `options.concurrency` entries are processed at once. A panic
/// inside an entry's pipeline is reported as that entry's failure and never
/// affects its siblings.
pub async fn run_migration(options: TransferOptions, entries: Vec<SourceEntry>) -> MigrationReport {
    fan_out(options, entries, |context, entry| async move {
        task::migrate_entry(&context, &entry).await
    })
    .await
}

async fn fan_out<P, F>(
    options: TransferOptions,
    entries: Vec<SourceEntry>,
    pipeline: P,
) -> MigrationReport
where
    P: Fn(Arc<TaskContext>, SourceEntry) -> F + Send + Sync + 'static,
    F: Future<Output = Result<MigratedEntry, TransferError>> + Send + 'static,
{
    let concurrency = options.concurrency.max(1);
    let context = Arc::new(TaskContext::new(options));
    let pipeline = Arc::new(pipeline);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

    info!(entries = entries.len(), concurrency, "Starting migration");

    for entry in entries {
        let context = Arc::clone(&context);
        let pipeline = Arc::clone(&pipeline);
        let semaphore = Arc::clone(&semaphore);
        let outcome_tx = outcome_tx.clone();

        tokio::spawn(async move {
            // The semaphore is never closed; an error here just means no limit
            let _permit = semaphore.acquire_owned().await;
            let key = entry.key.clone();
            let outcome = run_isolated(key, pipeline(context, entry)).await;
            let _ = outcome_tx.send(outcome);
        });
    }

    // Draining ends once every task has dropped its sender
    drop(outcome_tx);

    let mut report = MigrationReport::default();
    while let Some(outcome) = outcome_rx.recv().await {
        match &outcome {
            TransferOutcome::Migrated {
                key,
                info_hash,
                skipped: false,
            } => info!(%key, hash = %info_hash, "Migrated"),
            TransferOutcome::Migrated { key, info_hash, .. } => {
                info!(%key, hash = %info_hash, "Already migrated")
            }
            TransferOutcome::Failed { key, error } => warn!(%key, %error, "Migration failed"),
        }
        report.record(outcome);
    }

    report
}

async fn run_isolated<F>(key: String, pipeline: F) -> TransferOutcome
where
    F: Future<Output = Result<MigratedEntry, TransferError>>,
{
    match AssertUnwindSafe(pipeline).catch_unwind().await {
        Ok(Ok(migrated)) => TransferOutcome::Migrated {
            key,
            info_hash: migrated.info_hash,
            skipped: migrated.skipped,
        },
        Ok(Err(error)) => TransferOutcome::Failed { key, error },
        Err(payload) => TransferOutcome::Failed {
            key,
            error: TransferError::Panicked {
                reason: panic_message(payload.as_ref()),
            },
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
