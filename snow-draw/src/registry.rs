//! Participant Registry
//!
//! Owns participant records: registration through the id allocator, profile
//! updates, eligibility grants and batch enrollment.
//!
//! Every mutation re-reads the participant, applies the change and commits
//! against the version it read. A lost race is retried from the re-read, so
//! two writers of the same row can never overwrite each other's state
//! documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::allocator::IdAllocator;
use crate::config::{EngineConfig, WinnerPolicy};
use crate::error::{DrawError, DrawResult};
use crate::retry::CommitRetry;
use crate::state;
use crate::storage::{Changeset, DrawStorage};
use crate::types::{BatchId, DrawBatch, Participant, ParticipantId, Profile, ProfileUpdate, SuccessRecord};

/// Eligibility grant details
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityGrant {
    /// Qualifying order number
    pub order_number: Option<String>,
    /// When the qualifying order was placed; must fall in the batch window
    pub ordered_at: Option<DateTime<Utc>>,
}

impl EligibilityGrant {
    pub fn order(order_number: impl Into<String>, ordered_at: DateTime<Utc>) -> Self {
        Self {
            order_number: Some(order_number.into()),
            ordered_at: Some(ordered_at),
        }
    }
}

/// Result of an enrollment request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrollmentOutcome {
    pub participant: Participant,
    /// False when the participant was already enrolled
    pub newly_enrolled: bool,
}

/// Participant registry
pub struct ParticipantRegistry<S: DrawStorage> {
    storage: Arc<S>,
    allocator: IdAllocator,
    retry: CommitRetry,
    policy: WinnerPolicy,
}

impl<S: DrawStorage> ParticipantRegistry<S> {
    /// Create a registry
    pub fn new(storage: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            storage,
            allocator: config.participant_allocator(),
            retry: config.commit_retry(),
            policy: config.winner_policy,
        }
    }

    /// Register a participant under a freshly allocated id
    pub async fn create(&self, profile: Profile) -> DrawResult<Participant> {
        let mut profile = profile;
        profile.mobile = profile.mobile.trim().to_string();
        profile.validate()?;

        let now = Utc::now();
        let storage = &self.storage;
        let profile = &profile;

        let participant = self
            .allocator
            .allocate(|candidate| async move {
                let mut participant = Participant::new(ParticipantId(candidate), profile.clone(), now);
                participant.prepare_for_commit(now);
                let inserted = storage.insert_participant(&participant).await?;
                Ok(inserted.then_some(participant))
            })
            .await?;

        info!(participant_id = %participant.id, "Participant registered");
        Ok(participant)
    }

    /// Find a participant by id
    pub async fn find_by_id(&self, id: ParticipantId) -> DrawResult<Option<Participant>> {
        self.storage.get_participant(id).await
    }

    /// Find a participant by mobile
    pub async fn find_by_mobile(&self, mobile: &str) -> DrawResult<Option<Participant>> {
        self.storage.get_participant_by_mobile(mobile.trim()).await
    }

    /// Get a participant by id, failing when absent
    pub async fn get(&self, id: ParticipantId) -> DrawResult<Participant> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| DrawError::not_found("participant", id))
    }

    /// Get a participant by mobile, failing when absent
    pub async fn get_by_mobile(&self, mobile: &str) -> DrawResult<Participant> {
        self.find_by_mobile(mobile)
            .await?
            .ok_or_else(|| DrawError::not_found("participant", mobile))
    }

    /// List every participant
    pub async fn list(&self) -> DrawResult<Vec<Participant>> {
        self.storage.list_participants().await
    }

    /// Update profile fields. Batch state is left untouched.
    pub async fn update_profile(&self, id: ParticipantId, update: ProfileUpdate) -> DrawResult<Participant> {
        let update = &update;

        let participant = self
            .retry
            .run("update_profile", |_| async move {
                let mut participant = self.get(id).await?;
                update.apply(&mut participant.profile);
                participant.profile.validate()?;

                let now = Utc::now();
                participant.prepare_for_commit(now);
                let records = self.refreshed_records(&participant, now).await?;

                let mut changeset = Changeset::new().with_participant(participant.clone());
                changeset.success_records = records;
                self.storage.commit(changeset).await?;

                participant.version += 1;
                Ok(participant)
            })
            .await?;

        debug!(participant_id = %id, "Participant profile updated");
        Ok(participant)
    }

    /// Grant eligibility for a batch
    pub async fn grant_eligibility(
        &self,
        id: ParticipantId,
        batch_id: BatchId,
        grant: EligibilityGrant,
    ) -> DrawResult<Participant> {
        let grant = &grant;

        let participant = self
            .retry
            .run("grant_eligibility", |_| async move {
                let batch = self.batch(batch_id).await?;
                if let Some(at) = grant.ordered_at {
                    if !batch.in_order_window(at) {
                        return Err(DrawError::validation(format!(
                            "order time {} is outside the window [{}, {}) of batch {}",
                            at, batch.order_begin, batch.order_end, batch_id
                        )));
                    }
                }

                let mut participant = self.get(id).await?;
                participant.state.set(state::ELIGIBILITY, batch_id, true)?;
                if let Some(order_number) = &grant.order_number {
                    participant.state.set(state::ORDER_NUMBER, batch_id, order_number.clone())?;
                }
                if let Some(at) = grant.ordered_at {
                    participant.state.set(state::ORDER_SIGN_TIME, batch_id, at)?;
                }

                self.commit_with_record(participant, &batch).await
            })
            .await?;

        info!(participant_id = %id, batch = %batch_id, "Eligibility granted");
        Ok(participant)
    }

    /// Revoke eligibility for a batch
    pub async fn revoke_eligibility(&self, id: ParticipantId, batch_id: BatchId) -> DrawResult<Participant> {
        let participant = self
            .retry
            .run("revoke_eligibility", |_| async move {
                let batch = self.batch(batch_id).await?;
                let mut participant = self.get(id).await?;
                participant.state.set(state::ELIGIBILITY, batch_id, false)?;
                self.commit_with_record(participant, &batch).await
            })
            .await?;

        info!(participant_id = %id, batch = %batch_id, "Eligibility revoked");
        Ok(participant)
    }

    /// Enroll an eligible participant into the batch pool
    pub async fn enroll(&self, id: ParticipantId, batch_id: BatchId) -> DrawResult<EnrollmentOutcome> {
        let outcome = self
            .retry
            .run("enroll", |_| async move {
                let mut batch = self.batch(batch_id).await?;
                let mut participant = self.get(id).await?;

                if !participant.is_eligible(batch_id) {
                    return Err(DrawError::ineligible(id.value(), batch_id.value(), "eligibility not granted"));
                }
                if participant.has_participated(batch_id) && batch.is_enrolled(id) {
                    return Ok(EnrollmentOutcome {
                        participant,
                        newly_enrolled: false,
                    });
                }
                if self.policy.excludes_prior_winners() {
                    if let Some(won) = participant.won_batches().into_iter().find(|b| *b != batch_id) {
                        return Err(DrawError::ineligible(
                            id.value(),
                            batch_id.value(),
                            format!("already won batch {}", won),
                        ));
                    }
                }

                let now = Utc::now();
                participant.state.set(state::PARTICIPATION, batch_id, true)?;
                participant.prepare_for_commit(now);
                batch.enroll(id, now);
                batch.updated_at = now;

                let record = SuccessRecord::snapshot(&participant, &batch, now);
                self.storage
                    .commit(
                        Changeset::new()
                            .with_participant(participant.clone())
                            .with_batch(batch)
                            .with_record(record),
                    )
                    .await?;

                participant.version += 1;
                Ok(EnrollmentOutcome {
                    participant,
                    newly_enrolled: true,
                })
            })
            .await?;

        if outcome.newly_enrolled {
            info!(participant_id = %id, batch = %batch_id, "Participant enrolled");
        }
        Ok(outcome)
    }

    async fn batch(&self, id: BatchId) -> DrawResult<DrawBatch> {
        self.storage
            .get_batch(id)
            .await?
            .ok_or_else(|| DrawError::not_found("batch", id))
    }

    async fn commit_with_record(&self, mut participant: Participant, batch: &DrawBatch) -> DrawResult<Participant> {
        let now = Utc::now();
        participant.prepare_for_commit(now);
        let record = SuccessRecord::snapshot(&participant, batch, now);
        self.storage
            .commit(Changeset::new().with_participant(participant.clone()).with_record(record))
            .await?;
        participant.version += 1;
        Ok(participant)
    }

    /// Rebuild records for every batch the participant has state in
    async fn refreshed_records(&self, participant: &Participant, now: DateTime<Utc>) -> DrawResult<Vec<SuccessRecord>> {
        let batches: BTreeSet<BatchId> = participant
            .state
            .batches(state::ELIGIBILITY)
            .into_iter()
            .chain(participant.state.batches(state::PARTICIPATION))
            .chain(participant.won_batches())
            .collect();

        let mut records = Vec::with_capacity(batches.len());
        for batch_id in batches {
            if let Some(batch) = self.storage.get_batch(batch_id).await? {
                records.push(SuccessRecord::snapshot(participant, &batch, now));
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::{Address, BatchConfig};
    use chrono::Duration;

    fn setup() -> (Arc<MemoryStorage>, ParticipantRegistry<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let registry = ParticipantRegistry::new(storage.clone(), &EngineConfig::test());
        (storage, registry)
    }

    async fn create_batch(storage: &MemoryStorage, id: u32) -> DrawBatch {
        let now = Utc::now();
        let batch = DrawBatch::new(
            BatchConfig {
                batch_id: BatchId(id),
                name: format!("batch {}", id),
                prizes: Vec::new(),
                quota: 3,
                order_begin: now - Duration::days(7),
                order_end: now + Duration::days(7),
                draw_at: now + Duration::days(8),
                remarks: String::new(),
            },
            now,
        );
        storage.insert_batch(&batch).await.unwrap();
        batch
    }

    #[tokio::test]
    async fn test_create_allocates_six_digit_id() {
        let (_, registry) = setup();
        let p = registry.create(Profile::new("Alice", " 13800000001 ")).await.unwrap();

        assert!((100_000..=999_999).contains(&p.id.value()));
        assert_eq!(p.profile.mobile, "13800000001");
        assert!(p.state.map(state::ELIGIBILITY).is_empty());

        let found = registry.find_by_mobile("13800000001").await.unwrap().unwrap();
        assert_eq!(found.id, p.id);
        assert!(registry.find_by_id(ParticipantId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_mobile_rejected() {
        let (_, registry) = setup();
        registry.create(Profile::new("Alice", "13800000001")).await.unwrap();

        let err = registry.create(Profile::new("Bob", "13800000001")).await.unwrap_err();
        assert!(matches!(err, DrawError::AlreadyExists { .. }));

        let err = registry.create(Profile::new("Nobody", "  ")).await.unwrap_err();
        assert!(matches!(err, DrawError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_profile_keeps_state() {
        let (storage, registry) = setup();
        create_batch(&storage, 1).await;
        let p = registry.create(Profile::new("Alice", "13800000001")).await.unwrap();
        registry.grant_eligibility(p.id, BatchId(1), EligibilityGrant::default()).await.unwrap();

        let address = Address {
            receiver_name: "Alice".into(),
            province: "Shaanxi".into(),
            city: "Xi'an".into(),
            ..Default::default()
        };
        let updated = registry
            .update_profile(
                p.id,
                ProfileUpdate {
                    nickname: Some("Alicia".into()),
                    address: Some(address.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.profile.nickname, "Alicia");
        assert!(updated.is_eligible(BatchId(1)));
        assert_eq!(updated.version, 2);

        let record = storage.get_success_record(BatchId(1), p.id).await.unwrap().unwrap();
        assert_eq!(record.nickname, "Alicia");
        assert_eq!(record.address, address);
    }

    #[tokio::test]
    async fn test_grant_checks_order_window() {
        let (storage, registry) = setup();
        let batch = create_batch(&storage, 1).await;
        let p = registry.create(Profile::new("Alice", "13800000001")).await.unwrap();

        let err = registry
            .grant_eligibility(p.id, BatchId(1), EligibilityGrant::order("SO-1", batch.order_end))
            .await
            .unwrap_err();
        assert!(matches!(err, DrawError::Validation(_)));

        let granted = registry
            .grant_eligibility(p.id, BatchId(1), EligibilityGrant::order("SO-1", batch.order_begin))
            .await
            .unwrap();
        assert!(granted.is_eligible(BatchId(1)));
        assert_eq!(granted.state.get(state::ORDER_NUMBER, BatchId(1)).as_deref(), Some("SO-1"));

        let record = storage.get_success_record(BatchId(1), p.id).await.unwrap().unwrap();
        assert!(record.eligible && !record.participated && !record.won);

        let err = registry
            .grant_eligibility(p.id, BatchId(2), EligibilityGrant::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DrawError::NotFound { entity: "batch", .. }));
    }

    #[tokio::test]
    async fn test_enroll_requires_eligibility_and_is_idempotent() {
        let (storage, registry) = setup();
        create_batch(&storage, 1).await;
        let p = registry.create(Profile::new("Alice", "13800000001")).await.unwrap();

        let err = registry.enroll(p.id, BatchId(1)).await.unwrap_err();
        assert!(matches!(err, DrawError::Ineligible { .. }));

        registry.grant_eligibility(p.id, BatchId(1), EligibilityGrant::default()).await.unwrap();
        let first = registry.enroll(p.id, BatchId(1)).await.unwrap();
        assert!(first.newly_enrolled);
        assert!(first.participant.has_participated(BatchId(1)));

        let second = registry.enroll(p.id, BatchId(1)).await.unwrap();
        assert!(!second.newly_enrolled);

        let batch = storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        assert_eq!(batch.participants, vec![p.id]);
        assert_eq!(batch.enrollments.len(), 1);
    }

    #[tokio::test]
    async fn test_prior_winner_policy() {
        let (storage, registry) = setup();
        create_batch(&storage, 1).await;
        create_batch(&storage, 2).await;
        let p = registry.create(Profile::new("Alice", "13800000001")).await.unwrap();
        registry.grant_eligibility(p.id, BatchId(2), EligibilityGrant::default()).await.unwrap();

        // mark as a batch 1 winner directly
        let mut won = registry.get(p.id).await.unwrap();
        won.state.set(state::SUCCESS_CODE, BatchId(1), "AbCd".to_string()).unwrap();
        storage.commit(Changeset::new().with_participant(won)).await.unwrap();

        let err = registry.enroll(p.id, BatchId(2)).await.unwrap_err();
        assert!(matches!(err, DrawError::Ineligible { batch: 2, .. }));

        let permissive = ParticipantRegistry::new(
            storage.clone(),
            &EngineConfig::test().with_winner_policy(WinnerPolicy::AllowRepeatWinners),
        );
        assert!(permissive.enroll(p.id, BatchId(2)).await.unwrap().newly_enrolled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enrollments_are_all_kept() {
        let (storage, registry) = setup();
        create_batch(&storage, 1).await;
        let registry = Arc::new(registry);

        let mut ids = Vec::new();
        for i in 0..16 {
            let p = registry
                .create(Profile::new(format!("user{}", i), format!("1380000{:04}", i)))
                .await
                .unwrap();
            registry.grant_eligibility(p.id, BatchId(1), EligibilityGrant::default()).await.unwrap();
            ids.push(p.id);
        }

        let mut handles = Vec::new();
        for id in ids.clone() {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.enroll(id, BatchId(1)).await }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().unwrap().newly_enrolled);
        }

        let batch = storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        ids.sort();
        assert_eq!(batch.participants, ids);
    }
}
