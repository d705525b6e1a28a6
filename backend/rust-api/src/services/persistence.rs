use std::sync::Arc;

use tokio::sync::mpsc;

use crate::metrics::PERSISTENCE_FAILURES_TOTAL;
use crate::models::{AttemptFinalization, AttemptRecord, TurnRecord};
use crate::services::attempt_store::AttemptStore;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

#[derive(Debug, Clone)]
pub enum StoreCommand {
    CreateAttempt(AttemptRecord),
    AppendTurn(TurnRecord),
    Finalize {
        attempt_id: String,
        finalization: AttemptFinalization,
    },
}

impl StoreCommand {
    fn label(&self) -> &'static str {
        match self {
            StoreCommand::CreateAttempt(_) => "create_attempt",
            StoreCommand::AppendTurn(_) => "append_turn",
            StoreCommand::Finalize { .. } => "finalize_attempt",
        }
    }
}

/// Write path into the [`AttemptStore`].
///
/// In async mode commands go through one queue drained by a single worker,
/// so writes land in submission order while callers never wait on storage.
/// Failures are logged and counted; they never reach the learner.
#[derive(Clone)]
pub struct PersistenceWriter {
    store: Arc<dyn AttemptStore>,
    queue: Option<mpsc::UnboundedSender<StoreCommand>>,
}

impl PersistenceWriter {
    /// Writes are awaited by the caller.
    pub fn inline(store: Arc<dyn AttemptStore>) -> Self {
        Self { store, queue: None }
    }

    /// Starts the background worker. Must be called inside a Tokio runtime.
    pub fn spawn(store: Arc<dyn AttemptStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StoreCommand>();
        let worker_store = store.clone();

        tokio::spawn(async move {
            tracing::info!("Persistence worker started");
            while let Some(command) = rx.recv().await {
                apply(worker_store.as_ref(), &command, RetryConfig::aggressive()).await;
            }
            tracing::info!("Persistence worker stopped");
        });

        Self {
            store,
            queue: Some(tx),
        }
    }

    pub fn store(&self) -> &Arc<dyn AttemptStore> {
        &self.store
    }

    pub async fn submit(&self, command: StoreCommand) {
        match &self.queue {
            Some(tx) => {
                if let Err(err) = tx.send(command) {
                    PERSISTENCE_FAILURES_TOTAL
                        .with_label_values(&[err.0.label()])
                        .inc();
                    tracing::error!(command = err.0.label(), "Persistence queue closed");
                }
            }
            None => apply(self.store.as_ref(), &command, RetryConfig::default()).await,
        }
    }
}

async fn apply(store: &dyn AttemptStore, command: &StoreCommand, retry: RetryConfig) {
    let result = retry_async_with_config(retry, || async {
        match command {
            StoreCommand::CreateAttempt(record) => store.create_attempt(record).await,
            StoreCommand::AppendTurn(turn) => store.append_turn(turn).await,
            StoreCommand::Finalize {
                attempt_id,
                finalization,
            } => store.finalize_attempt(attempt_id, finalization).await,
        }
    })
    .await;

    if let Err(err) = result {
        PERSISTENCE_FAILURES_TOTAL
            .with_label_values(&[command.label()])
            .inc();
        tracing::error!(
            command = command.label(),
            error = %err,
            "Persistence write failed after retries"
        );
    }
}
