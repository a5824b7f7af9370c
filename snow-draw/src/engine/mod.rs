//! Draw Engine
//!
//! Selects winners for a batch within its quota and commits every effect of
//! one draw atomically: the participants' draw time and code, the batch
//! winners list and draw log, and the success records.
//!
//! # Draw semantics
//!
//! - Candidate pool: eligible and enrolled for the batch, not already a
//!   winner of it, and (under [`WinnerPolicy::ExcludePriorWinners`]) not a
//!   winner of any other batch
//! - Quota already filled: no-op returning the existing winners
//! - Pool smaller than the request: partial fulfillment, not an error
//! - Concurrent draws on one batch: the batch version check lets exactly one
//!   commit per snapshot; the loser re-reads and selects again
//! - A request key makes a retried draw return the committed result
//!
//! # Selection seed
//!
//! A batch is created unsealed. The first draw that selects anyone draws a
//! 32-byte seed from the OS RNG and commits it with its winners, so the
//! winner order cannot be computed while eligibility is still being granted.
//! From then on the seed is fixed, which keeps later draws composable, and
//! stays in storage so `selection_digest` can be re-derived for audit.
//! Batches returned by [`DrawEngine::get_batch`] and
//! [`DrawEngine::list_batches`] are redacted; only direct storage readers see
//! the seed. After the first draw the remaining order is determined, so
//! storage access must be restricted to operators.

pub mod selection;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::allocator::DrawCodeGenerator;
use crate::config::{EngineConfig, WinnerPolicy};
use crate::error::{DrawError, DrawResult};
use crate::retry::CommitRetry;
use crate::state;
use crate::storage::{Changeset, DrawStorage};
use crate::types::{
    BatchConfig, BatchId, BatchUpdate, DrawBatch, DrawRecord, Participant, ParticipantId, SuccessRecord,
    Winner,
};

/// Draw request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRequest {
    pub batch_id: BatchId,
    /// Winners requested by this call
    pub count: u32,
    /// Idempotency key for retried requests
    pub request_key: Option<String>,
}

impl DrawRequest {
    pub fn new(batch_id: BatchId, count: u32) -> Self {
        Self {
            batch_id,
            count,
            request_key: None,
        }
    }

    /// Single-winner draw
    pub fn single(batch_id: BatchId) -> Self {
        Self::new(batch_id, 1)
    }

    /// Attach an idempotency key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.request_key = Some(key.into());
        self
    }

    fn validate(&self) -> DrawResult<()> {
        if self.count == 0 {
            return Err(DrawError::validation("winner count must be at least 1"));
        }
        if matches!(&self.request_key, Some(key) if key.trim().is_empty()) {
            return Err(DrawError::validation("request key is empty"));
        }
        Ok(())
    }
}

/// How a draw call was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawStatus {
    /// Every requested winner was selected
    Completed,
    /// Fewer winners than requested: pool exhausted or quota reached
    Partial,
    /// Quota was already filled before this call
    QuotaFilled,
    /// Request key matched a committed draw
    Replayed,
}

/// Draw result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawOutcome {
    pub batch_id: BatchId,
    pub requested: u32,
    /// Winners selected by this call
    pub selected: Vec<Winner>,
    /// All winners of the batch after this call
    pub winners: Vec<Winner>,
    /// Whether `selected` covers the full request
    pub fulfilled: bool,
    pub remaining_quota: u32,
    /// Candidates available when the selection was made
    pub eligible_pool: usize,
    pub status: DrawStatus,
}

impl DrawOutcome {
    fn unchanged(batch: &DrawBatch, requested: u32, eligible_pool: usize, status: DrawStatus) -> Self {
        Self {
            batch_id: batch.batch_id,
            requested,
            selected: Vec::new(),
            winners: batch.winners.clone(),
            fulfilled: false,
            remaining_quota: batch.remaining_quota(),
            eligible_pool,
            status,
        }
    }

    fn replayed(batch: &DrawBatch, record: &DrawRecord) -> Self {
        let selected: Vec<Winner> = batch
            .winners
            .iter()
            .filter(|w| record.selected.contains(&w.participant_id))
            .cloned()
            .collect();

        Self {
            batch_id: batch.batch_id,
            requested: record.requested,
            fulfilled: selected.len() as u32 == record.requested,
            selected,
            winners: batch.winners.clone(),
            remaining_quota: batch.remaining_quota(),
            eligible_pool: record.pool_size,
            status: DrawStatus::Replayed,
        }
    }

    /// Participant ids selected by this call
    pub fn selected_ids(&self) -> Vec<ParticipantId> {
        self.selected.iter().map(|w| w.participant_id).collect()
    }

    /// Participant ids of every winner
    pub fn winner_ids(&self) -> Vec<ParticipantId> {
        self.winners.iter().map(|w| w.participant_id).collect()
    }
}

/// Draw engine
pub struct DrawEngine<S: DrawStorage> {
    storage: Arc<S>,
    codes: DrawCodeGenerator,
    retry: CommitRetry,
    policy: WinnerPolicy,
}

impl<S: DrawStorage> DrawEngine<S> {
    /// Create a draw engine
    pub fn new(storage: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            storage,
            codes: config.code_generator(),
            retry: config.commit_retry(),
            policy: config.winner_policy,
        }
    }

    /// Create an unsealed batch
    pub async fn create_batch(&self, config: BatchConfig) -> DrawResult<DrawBatch> {
        config.validate()?;

        let batch = DrawBatch::new(config, Utc::now());

        if !self.storage.insert_batch(&batch).await? {
            return Err(DrawError::already_exists("batch", batch.batch_id));
        }

        info!(
            batch = %batch.batch_id,
            name = %batch.name,
            quota = batch.quota,
            "Draw batch created"
        );
        Ok(batch)
    }

    /// Get a batch, without its selection seed
    pub async fn get_batch(&self, id: BatchId) -> DrawResult<DrawBatch> {
        Ok(self.load_batch(id).await?.redacted())
    }

    /// List all batches, without their selection seeds
    pub async fn list_batches(&self) -> DrawResult<Vec<DrawBatch>> {
        Ok(self
            .storage
            .list_batches()
            .await?
            .into_iter()
            .map(DrawBatch::redacted)
            .collect())
    }

    /// Change the operator configuration of a batch
    ///
    /// The quota cannot drop below the winners already drawn. Seed, pool,
    /// winners and draw log are kept.
    pub async fn update_batch(&self, id: BatchId, update: BatchUpdate) -> DrawResult<DrawBatch> {
        if update.is_empty() {
            return Err(DrawError::validation("batch update changes nothing"));
        }
        let update = &update;

        let batch = self
            .retry
            .run("update_batch", |_| async move {
                let mut batch = self.load_batch(id).await?;
                let config = update.apply(batch.config());
                config.validate()?;
                if (config.quota as usize) < batch.winners.len() {
                    return Err(DrawError::validation(format!(
                        "quota {} is below the {} winners already drawn in batch {}",
                        config.quota,
                        batch.winners.len(),
                        id
                    )));
                }

                batch.reconfigure(config);
                batch.updated_at = Utc::now();
                self.storage.commit(Changeset::new().with_batch(batch.clone())).await?;
                batch.version += 1;
                Ok(batch)
            })
            .await?;

        info!(batch = %id, quota = batch.quota, version = batch.version, "Draw batch updated");
        Ok(batch.redacted())
    }

    /// Draw up to `request.count` winners
    pub async fn draw(&self, request: DrawRequest) -> DrawResult<DrawOutcome> {
        request.validate()?;
        let request = &request;

        let outcome = self
            .retry
            .run("draw", |attempt| async move { self.try_draw(request, attempt).await })
            .await?;

        info!(
            batch = %outcome.batch_id,
            requested = outcome.requested,
            selected = outcome.selected.len(),
            winners = outcome.winners.len(),
            remaining_quota = outcome.remaining_quota,
            status = ?outcome.status,
            "Draw finished"
        );
        Ok(outcome)
    }

    /// Draw a single winner
    pub async fn draw_one(&self, batch_id: BatchId) -> DrawResult<DrawOutcome> {
        self.draw(DrawRequest::single(batch_id)).await
    }

    async fn try_draw(&self, request: &DrawRequest, attempt: u32) -> DrawResult<DrawOutcome> {
        let batch_id = request.batch_id;
        let mut batch = self.load_batch(batch_id).await?;

        if let Some(key) = &request.request_key {
            if let Some(record) = batch.find_request(key) {
                debug!(batch = %batch_id, key = %key, "Draw request already committed");
                return Ok(DrawOutcome::replayed(&batch, record));
            }
        }

        if batch.remaining_quota() == 0 {
            return Ok(DrawOutcome::unchanged(&batch, request.count, 0, DrawStatus::QuotaFilled));
        }

        let mut pool: HashMap<ParticipantId, Participant> = self
            .storage
            .list_participants()
            .await?
            .into_iter()
            .filter(|p| self.is_candidate(p, &batch))
            .map(|p| (p.id, p))
            .collect();
        let pool_ids: Vec<ParticipantId> = pool.keys().copied().collect();

        let take = request
            .count
            .min(batch.remaining_quota())
            .min(pool_ids.len() as u32) as usize;
        if take == 0 {
            return Ok(DrawOutcome::unchanged(&batch, request.count, 0, DrawStatus::Partial));
        }

        if !batch.is_sealed() {
            let mut seed = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut seed);
            batch.seal(seed);
            debug!(batch = %batch_id, "Selection seed sealed");
        }
        let seed = batch.seed_bytes()?;
        let selected_ids = selection::select(&seed, batch_id, &pool_ids, take);
        let codes = self.codes.generate_many(&batch.issued_codes(), selected_ids.len())?;
        let now = Utc::now();

        let mut participants = Vec::with_capacity(selected_ids.len());
        let mut selected = Vec::with_capacity(selected_ids.len());
        for (id, code) in selected_ids.iter().zip(codes) {
            let mut participant = pool
                .remove(id)
                .ok_or_else(|| DrawError::not_found("participant", id))?;
            participant.state.set(state::DRAW_TIME, batch_id, now)?;
            participant.state.set(state::SUCCESS_CODE, batch_id, code.clone())?;
            participant.prepare_for_commit(now);

            let winner = Winner {
                participant_id: *id,
                draw_code: code,
                prize: batch.prize_for_position(batch.winners.len()),
                drawn_at: now,
            };
            batch.winners.push(winner.clone());
            selected.push(winner);
            participants.push(participant);
        }

        let success_records: Vec<SuccessRecord> = participants
            .iter()
            .map(|p| SuccessRecord::snapshot(p, &batch, now))
            .collect();

        batch.draw_log.push(DrawRecord {
            request_key: request.request_key.clone(),
            requested: request.count,
            selected: selected_ids,
            pool_size: pool_ids.len(),
            selection_digest: selection::selection_digest(&seed, batch_id, &pool_ids),
            drawn_at: now,
        });
        batch.updated_at = now;

        self.storage
            .commit(Changeset {
                participants,
                batch: Some(batch.clone()),
                success_records,
            })
            .await?;
        batch.version += 1;

        if attempt > 1 {
            debug!(batch = %batch_id, attempt, "Draw committed after retry");
        }

        let fulfilled = selected.len() as u32 == request.count;
        Ok(DrawOutcome {
            batch_id,
            requested: request.count,
            selected,
            winners: batch.winners.clone(),
            fulfilled,
            remaining_quota: batch.remaining_quota(),
            eligible_pool: pool_ids.len(),
            status: if fulfilled {
                DrawStatus::Completed
            } else {
                DrawStatus::Partial
            },
        })
    }

    async fn load_batch(&self, id: BatchId) -> DrawResult<DrawBatch> {
        self.storage
            .get_batch(id)
            .await?
            .ok_or_else(|| DrawError::not_found("batch", id))
    }

    fn is_candidate(&self, participant: &Participant, batch: &DrawBatch) -> bool {
        let batch_id = batch.batch_id;
        participant.is_eligible(batch_id)
            && participant.has_participated(batch_id)
            && !batch.is_winner(participant.id)
            && !(self.policy.excludes_prior_winners() && participant.won_other_batch(batch_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EligibilityGrant, ParticipantRegistry};
    use crate::storage::{MemoryStorage, StorageStats};
    use crate::types::{PrizeTier, Profile};
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        storage: Arc<MemoryStorage>,
        registry: ParticipantRegistry<MemoryStorage>,
        engine: DrawEngine<MemoryStorage>,
    }

    fn fixture_with(config: EngineConfig) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        Fixture {
            registry: ParticipantRegistry::new(storage.clone(), &config),
            engine: DrawEngine::new(storage.clone(), &config),
            storage,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::test())
    }

    fn batch_config(id: u32, quota: u32) -> BatchConfig {
        let now = Utc::now();
        BatchConfig {
            batch_id: BatchId(id),
            name: format!("batch {}", id),
            prizes: Vec::new(),
            quota,
            order_begin: now - Duration::days(1),
            order_end: now + Duration::days(1),
            draw_at: now + Duration::days(2),
            remarks: String::new(),
        }
    }

    async fn enroll_pool(f: &Fixture, batch: u32, size: u32, mobile_prefix: &str) -> Vec<ParticipantId> {
        let mut ids = Vec::new();
        for i in 0..size {
            let p = f
                .registry
                .create(Profile::new(format!("user{}", i), format!("{}{:04}", mobile_prefix, i)))
                .await
                .unwrap();
            f.registry
                .grant_eligibility(p.id, BatchId(batch), EligibilityGrant::default())
                .await
                .unwrap();
            f.registry.enroll(p.id, BatchId(batch)).await.unwrap();
            ids.push(p.id);
        }
        ids
    }

    #[tokio::test]
    async fn test_create_batch_rejects_duplicates_and_bad_config() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 3)).await.unwrap();

        let err = f.engine.create_batch(batch_config(1, 3)).await.unwrap_err();
        assert!(matches!(err, DrawError::AlreadyExists { entity: "batch", .. }));

        let err = f.engine.create_batch(batch_config(2, 0)).await.unwrap_err();
        assert!(matches!(err, DrawError::Validation(_)));

        assert_eq!(f.engine.list_batches().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_draw_validates_request() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 3)).await.unwrap();

        let err = f.engine.draw(DrawRequest::new(BatchId(1), 0)).await.unwrap_err();
        assert!(matches!(err, DrawError::Validation(_)));

        let err = f.engine.draw(DrawRequest::new(BatchId(1), 1).with_key(" ")).await.unwrap_err();
        assert!(matches!(err, DrawError::Validation(_)));

        let err = f.engine.draw(DrawRequest::new(BatchId(9), 1)).await.unwrap_err();
        assert!(matches!(err, DrawError::NotFound { entity: "batch", .. }));
    }

    #[tokio::test]
    async fn test_draw_writes_all_effects() {
        let f = fixture();
        let mut config = batch_config(1, 3);
        config.prizes = vec![PrizeTier::new("Grand", 1), PrizeTier::new("Runner-up", 2)];
        f.engine.create_batch(config).await.unwrap();
        enroll_pool(&f, 1, 5, "1390000").await;

        let outcome = f.engine.draw(DrawRequest::new(BatchId(1), 2)).await.unwrap();
        assert_eq!(outcome.status, DrawStatus::Completed);
        assert!(outcome.fulfilled);
        assert_eq!(outcome.selected.len(), 2);
        assert_eq!(outcome.remaining_quota, 1);
        assert_eq!(outcome.eligible_pool, 5);
        assert_eq!(outcome.selected[0].prize.as_deref(), Some("Grand"));
        assert_eq!(outcome.selected[1].prize.as_deref(), Some("Runner-up"));

        let batch = f.engine.get_batch(BatchId(1)).await.unwrap();
        assert_eq!(batch.winners, outcome.winners);
        assert_eq!(batch.draw_log.len(), 1);
        assert_eq!(batch.draw_log[0].pool_size, 5);

        for winner in &outcome.selected {
            let p = f.registry.get(winner.participant_id).await.unwrap();
            assert_eq!(p.state.get(state::SUCCESS_CODE, BatchId(1)), Some(winner.draw_code.clone()));
            assert_eq!(p.state.get(state::DRAW_TIME, BatchId(1)), Some(winner.drawn_at));

            let record = f
                .storage
                .get_success_record(BatchId(1), winner.participant_id)
                .await
                .unwrap()
                .unwrap();
            assert!(record.won);
            assert_eq!(record.draw_code.as_deref(), Some(winner.draw_code.as_str()));
            assert_eq!(record.prize, winner.prize);
        }

        let codes: HashSet<_> = batch.winners.iter().map(|w| w.draw_code.clone()).collect();
        assert_eq!(codes.len(), batch.winners.len());
    }

    #[tokio::test]
    async fn test_pool_excludes_unenrolled_and_ineligible() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 10)).await.unwrap();
        let enrolled = enroll_pool(&f, 1, 3, "1390000").await;

        // eligible but never enrolled
        let idle = f.registry.create(Profile::new("idle", "13700000000")).await.unwrap();
        f.registry
            .grant_eligibility(idle.id, BatchId(1), EligibilityGrant::default())
            .await
            .unwrap();
        // enrolled then revoked
        f.registry.revoke_eligibility(enrolled[0], BatchId(1)).await.unwrap();

        let outcome = f.engine.draw(DrawRequest::new(BatchId(1), 10)).await.unwrap();
        assert_eq!(outcome.status, DrawStatus::Partial);
        assert_eq!(outcome.eligible_pool, 2);

        let winners: HashSet<_> = outcome.winner_ids().into_iter().collect();
        let expected: HashSet<_> = enrolled[1..].iter().copied().collect();
        assert_eq!(winners, expected);
    }

    #[tokio::test]
    async fn test_partial_fulfillment_scenario() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 3)).await.unwrap();
        enroll_pool(&f, 1, 10, "1390000").await;

        let outcome = f.engine.draw(DrawRequest::new(BatchId(1), 5)).await.unwrap();
        assert_eq!(outcome.selected.len(), 3);
        assert!(!outcome.fulfilled);
        assert_eq!(outcome.status, DrawStatus::Partial);
        assert_eq!(outcome.remaining_quota, 0);
    }

    #[tokio::test]
    async fn test_quota_filled_is_a_no_op() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 2)).await.unwrap();
        enroll_pool(&f, 1, 4, "1390000").await;

        let first = f.engine.draw(DrawRequest::new(BatchId(1), 2)).await.unwrap();
        let second = f.engine.draw(DrawRequest::new(BatchId(1), 2)).await.unwrap();

        assert_eq!(second.status, DrawStatus::QuotaFilled);
        assert!(second.selected.is_empty());
        assert_eq!(second.winners, first.winners);
        assert_eq!(f.engine.get_batch(BatchId(1)).await.unwrap().draw_log.len(), 1);
    }

    #[tokio::test]
    async fn test_request_key_replays_committed_draw() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 5)).await.unwrap();
        enroll_pool(&f, 1, 8, "1390000").await;

        let request = DrawRequest::new(BatchId(1), 2).with_key("req-1");
        let first = f.engine.draw(request.clone()).await.unwrap();
        let again = f.engine.draw(request).await.unwrap();

        assert_eq!(again.status, DrawStatus::Replayed);
        assert_eq!(again.selected, first.selected);
        assert_eq!(again.winners, first.winners);
        assert!(again.fulfilled);
        assert_eq!(f.engine.get_batch(BatchId(1)).await.unwrap().winners.len(), 2);

        let other = f.engine.draw(DrawRequest::new(BatchId(1), 2).with_key("req-2")).await.unwrap();
        assert_eq!(other.winners.len(), 4);
    }

    #[tokio::test]
    async fn test_prior_winners_are_excluded_by_default() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 1)).await.unwrap();
        f.engine.create_batch(batch_config(2, 5)).await.unwrap();

        let ids = enroll_pool(&f, 1, 3, "1390000").await;
        for id in &ids {
            f.registry
                .grant_eligibility(*id, BatchId(2), EligibilityGrant::default())
                .await
                .unwrap();
            f.registry.enroll(*id, BatchId(2)).await.unwrap();
        }

        let first = f.engine.draw_one(BatchId(1)).await.unwrap();
        let winner = first.selected[0].participant_id;

        let second = f.engine.draw(DrawRequest::new(BatchId(2), 5)).await.unwrap();
        assert_eq!(second.eligible_pool, 2);
        assert!(!second.winner_ids().contains(&winner));
    }

    #[tokio::test]
    async fn test_repeat_winners_allowed_by_policy() {
        let config = EngineConfig::test().with_winner_policy(WinnerPolicy::AllowRepeatWinners);
        let f = fixture_with(config);
        f.engine.create_batch(batch_config(1, 1)).await.unwrap();
        f.engine.create_batch(batch_config(2, 5)).await.unwrap();

        let ids = enroll_pool(&f, 1, 3, "1390000").await;
        for id in &ids {
            f.registry
                .grant_eligibility(*id, BatchId(2), EligibilityGrant::default())
                .await
                .unwrap();
            f.registry.enroll(*id, BatchId(2)).await.unwrap();
        }

        f.engine.draw_one(BatchId(1)).await.unwrap();
        let second = f.engine.draw(DrawRequest::new(BatchId(2), 5)).await.unwrap();
        assert_eq!(second.eligible_pool, 3);
        assert_eq!(second.selected.len(), 3);
    }

    #[tokio::test]
    async fn test_seed_is_sealed_by_first_draw() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 4)).await.unwrap();
        assert!(!f.storage.get_batch(BatchId(1)).await.unwrap().unwrap().is_sealed());

        // nothing to select: stays unsealed
        let empty = f.engine.draw_one(BatchId(1)).await.unwrap();
        assert_eq!(empty.status, DrawStatus::Partial);
        assert!(!f.storage.get_batch(BatchId(1)).await.unwrap().unwrap().is_sealed());

        enroll_pool(&f, 1, 6, "1390000").await;
        f.engine.draw_one(BatchId(1)).await.unwrap();
        let sealed = f.storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        let seed = sealed.seed_bytes().unwrap();

        f.engine.draw_one(BatchId(1)).await.unwrap();
        let stored = f.storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        assert_eq!(stored.seed_bytes().unwrap(), seed);
        let second_pool: Vec<ParticipantId> = stored
            .participants
            .iter()
            .copied()
            .filter(|id| *id != stored.winners[0].participant_id)
            .collect();
        assert_eq!(
            stored.draw_log[1].selection_digest,
            selection::selection_digest(&seed, BatchId(1), &second_pool)
        );

        // engine read paths never expose it
        assert!(!f.engine.get_batch(BatchId(1)).await.unwrap().is_sealed());
        assert!(f.engine.list_batches().await.unwrap().iter().all(|b| !b.is_sealed()));
    }

    #[tokio::test]
    async fn test_update_batch_changes_config_only() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 3)).await.unwrap();
        enroll_pool(&f, 1, 5, "1390000").await;
        let drawn = f.engine.draw(DrawRequest::new(BatchId(1), 2)).await.unwrap();

        let update = BatchUpdate {
            name: Some("Winter encore".to_string()),
            prizes: Some(vec![PrizeTier::new("Grand", 1)]),
            quota: Some(4),
            ..BatchUpdate::default()
        };
        let updated = f.engine.update_batch(BatchId(1), update).await.unwrap();
        assert_eq!(updated.name, "Winter encore");
        assert_eq!(updated.quota, 4);
        assert_eq!(updated.remaining_quota(), 2);
        assert_eq!(updated.winners, drawn.winners);
        assert_eq!(updated.participants.len(), 5);
        assert_eq!(updated.draw_log.len(), 1);

        let stored = f.storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        assert!(stored.is_sealed());
        assert_eq!(stored.version, updated.version);
    }

    #[tokio::test]
    async fn test_update_batch_rejects_invalid_changes() {
        let f = fixture();
        f.engine.create_batch(batch_config(1, 3)).await.unwrap();
        enroll_pool(&f, 1, 4, "1390000").await;
        f.engine.draw(DrawRequest::new(BatchId(1), 2)).await.unwrap();

        let below = BatchUpdate {
            quota: Some(1),
            ..BatchUpdate::default()
        };
        let err = f.engine.update_batch(BatchId(1), below).await.unwrap_err();
        assert!(matches!(err, DrawError::Validation(_)));

        let batch = f.engine.get_batch(BatchId(1)).await.unwrap();
        let inverted = BatchUpdate {
            order_end: Some(batch.order_begin),
            ..BatchUpdate::default()
        };
        assert!(f.engine.update_batch(BatchId(1), inverted).await.is_err());
        assert!(f.engine.update_batch(BatchId(1), BatchUpdate::default()).await.is_err());

        let err = f
            .engine
            .update_batch(BatchId(7), BatchUpdate { quota: Some(3), ..BatchUpdate::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, DrawError::NotFound { .. }));

        // quota equal to the winner count closes the batch
        let exact = BatchUpdate {
            quota: Some(2),
            ..BatchUpdate::default()
        };
        let closed = f.engine.update_batch(BatchId(1), exact).await.unwrap();
        assert_eq!(closed.status(), crate::types::BatchStatus::Closed);
    }

    /// Storage that lets another writer bump the batch before the next batch commit
    struct InterleavedStorage {
        inner: MemoryStorage,
        pending_write: AtomicBool,
    }

    #[async_trait]
    impl DrawStorage for InterleavedStorage {
        async fn insert_participant(&self, participant: &Participant) -> DrawResult<bool> {
            self.inner.insert_participant(participant).await
        }

        async fn get_participant(&self, id: ParticipantId) -> DrawResult<Option<Participant>> {
            self.inner.get_participant(id).await
        }

        async fn get_participant_by_mobile(&self, mobile: &str) -> DrawResult<Option<Participant>> {
            self.inner.get_participant_by_mobile(mobile).await
        }

        async fn list_participants(&self) -> DrawResult<Vec<Participant>> {
            self.inner.list_participants().await
        }

        async fn insert_batch(&self, batch: &DrawBatch) -> DrawResult<bool> {
            self.inner.insert_batch(batch).await
        }

        async fn get_batch(&self, id: BatchId) -> DrawResult<Option<DrawBatch>> {
            self.inner.get_batch(id).await
        }

        async fn list_batches(&self) -> DrawResult<Vec<DrawBatch>> {
            self.inner.list_batches().await
        }

        async fn get_success_record(
            &self,
            batch: BatchId,
            participant: ParticipantId,
        ) -> DrawResult<Option<SuccessRecord>> {
            self.inner.get_success_record(batch, participant).await
        }

        async fn list_success_records(&self, batch: BatchId) -> DrawResult<Vec<SuccessRecord>> {
            self.inner.list_success_records(batch).await
        }

        async fn commit(&self, changeset: Changeset) -> DrawResult<()> {
            if let Some(target) = &changeset.batch {
                if self.pending_write.swap(false, Ordering::SeqCst) {
                    let mut other = self.inner.get_batch(target.batch_id).await?.unwrap();
                    other.remarks = "edited elsewhere".to_string();
                    self.inner.commit(Changeset::new().with_batch(other)).await?;
                }
            }
            self.inner.commit(changeset).await
        }

        async fn get_stats(&self) -> DrawResult<StorageStats> {
            self.inner.get_stats().await
        }
    }

    #[tokio::test]
    async fn test_update_batch_retries_stale_version() {
        let storage = Arc::new(InterleavedStorage {
            inner: MemoryStorage::new(),
            pending_write: AtomicBool::new(false),
        });
        let engine = DrawEngine::new(storage.clone(), &EngineConfig::test());
        engine.create_batch(batch_config(1, 3)).await.unwrap();

        storage.pending_write.store(true, Ordering::SeqCst);
        let update = BatchUpdate {
            quota: Some(6),
            ..BatchUpdate::default()
        };
        let updated = engine.update_batch(BatchId(1), update).await.unwrap();

        assert!(!storage.pending_write.load(Ordering::SeqCst));
        assert_eq!(updated.quota, 6);
        assert_eq!(updated.remarks, "edited elsewhere");
        assert_eq!(updated.version, 2);

        let stored = storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        assert_eq!(stored.quota, 6);
        assert_eq!(stored.remarks, "edited elsewhere");
    }
}
