use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};
use tokio::sync::RwLock;

use crate::metrics::track_store_operation;
use crate::models::{AttemptFinalization, AttemptRecord, TurnRecord};

/// Durable record of attempts and their conversations.
#[async_trait]
pub trait AttemptStore: Send + Sync {
    async fn create_attempt(&self, record: &AttemptRecord) -> Result<()>;

    async fn append_turn(&self, turn: &TurnRecord) -> Result<()>;

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        finalization: &AttemptFinalization,
    ) -> Result<()>;

    async fn attempts_for_session(&self, session_id: &str) -> Result<Vec<AttemptRecord>>;

    async fn turns_for_attempt(&self, attempt_id: &str) -> Result<Vec<TurnRecord>>;

    async fn ping(&self) -> Result<()>;
}

pub struct MongoAttemptStore {
    mongo: Database,
    attempts: Collection<AttemptRecord>,
    turns: Collection<TurnRecord>,
}

impl MongoAttemptStore {
    pub fn new(mongo: Database) -> Self {
        Self {
            attempts: mongo.collection("attempts"),
            turns: mongo.collection("conversation_turns"),
            mongo,
        }
    }
}

#[async_trait]
impl AttemptStore for MongoAttemptStore {
    async fn create_attempt(&self, record: &AttemptRecord) -> Result<()> {
        track_store_operation("insert", "attempts", async {
            self.attempts
                .insert_one(record)
                .await
                .map(|_| ())
                .context("Failed to insert attempt")
        })
        .await
    }

    async fn append_turn(&self, turn: &TurnRecord) -> Result<()> {
        track_store_operation("insert", "conversation_turns", async {
            self.turns
                .insert_one(turn)
                .await
                .map(|_| ())
                .context("Failed to insert conversation turn")
        })
        .await
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        finalization: &AttemptFinalization,
    ) -> Result<()> {
        let update = doc! {
            "$set": {
                "final_status": to_bson(&finalization.final_status)?,
                "hint_count": finalization.hint_count as i32,
                "mastery_outcome": to_bson(&finalization.mastery_outcome)?,
                "finalized_at": to_bson(&finalization.finalized_at)?,
            }
        };

        track_store_operation("update", "attempts", async {
            let result = self
                .attempts
                .update_one(doc! { "_id": attempt_id }, update)
                .await
                .context("Failed to finalize attempt")?;
            if result.matched_count == 0 {
                return Err(anyhow!("Attempt {} not found for finalization", attempt_id));
            }
            Ok(())
        })
        .await
    }

    async fn attempts_for_session(&self, session_id: &str) -> Result<Vec<AttemptRecord>> {
        let options = FindOptions::builder().sort(doc! { "created_at": 1 }).build();

        track_store_operation("find", "attempts", async {
            let cursor = self
                .attempts
                .find(doc! { "session_id": session_id })
                .with_options(options)
                .await
                .context("Failed to query attempts")?;
            cursor
                .try_collect::<Vec<AttemptRecord>>()
                .await
                .context("Failed to read attempts cursor")
        })
        .await
    }

    async fn turns_for_attempt(&self, attempt_id: &str) -> Result<Vec<TurnRecord>> {
        let options = FindOptions::builder().sort(doc! { "sequence": 1 }).build();

        track_store_operation("find", "conversation_turns", async {
            let cursor = self
                .turns
                .find(doc! { "attempt_id": attempt_id })
                .with_options(options)
                .await
                .context("Failed to query conversation turns")?;
            cursor
                .try_collect::<Vec<TurnRecord>>()
                .await
                .context("Failed to read conversation turns cursor")
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.mongo
            .run_command(doc! { "ping": 1 })
            .await
            .context("MongoDB ping failed")?;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: RwLock<Vec<AttemptRecord>>,
    turns: RwLock<HashMap<String, Vec<TurnRecord>>>,
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn create_attempt(&self, record: &AttemptRecord) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        if attempts.iter().any(|existing| existing.id == record.id) {
            return Err(anyhow!("Attempt {} already exists", record.id));
        }
        attempts.push(record.clone());
        Ok(())
    }

    async fn append_turn(&self, turn: &TurnRecord) -> Result<()> {
        self.turns
            .write()
            .await
            .entry(turn.attempt_id.clone())
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn finalize_attempt(
        &self,
        attempt_id: &str,
        finalization: &AttemptFinalization,
    ) -> Result<()> {
        let mut attempts = self.attempts.write().await;
        let record = attempts
            .iter_mut()
            .find(|record| record.id == attempt_id)
            .ok_or_else(|| anyhow!("Attempt {} not found for finalization", attempt_id))?;
        record.final_status = Some(finalization.final_status);
        record.hint_count = finalization.hint_count;
        record.mastery_outcome = finalization.mastery_outcome;
        record.finalized_at = Some(finalization.finalized_at);
        Ok(())
    }

    async fn attempts_for_session(&self, session_id: &str) -> Result<Vec<AttemptRecord>> {
        Ok(self
            .attempts
            .read()
            .await
            .iter()
            .filter(|record| record.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn turns_for_attempt(&self, attempt_id: &str) -> Result<Vec<TurnRecord>> {
        let mut turns = self
            .turns
            .read()
            .await
            .get(attempt_id)
            .cloned()
            .unwrap_or_default();
        turns.sort_by_key(|turn| turn.sequence);
        Ok(turns)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
