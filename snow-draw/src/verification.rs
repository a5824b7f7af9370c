//! Verification Workflow
//!
//! Matches a code submitted by a winner against the code issued by the draw
//! engine. The first match marks the batch verified on the participant and
//! refreshes the success record in one commit. Later matches return the
//! stored verification unchanged. A mismatch never mutates anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::{DrawError, DrawResult};
use crate::retry::CommitRetry;
use crate::state;
use crate::storage::{Changeset, DrawStorage};
use crate::types::{BatchId, ParticipantId, SuccessRecord};

/// Verification result kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    /// First successful match
    Verified,
    /// Matched a batch that was already verified
    AlreadyVerified,
    /// Participant is a winner but the code differs
    WrongCode,
    /// Participant did not win this batch
    NotWinner,
    /// Batch has no winners yet
    NotDrawn,
}

/// Verification result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub participant_id: ParticipantId,
    pub batch_id: BatchId,
    pub status: VerificationStatus,
    pub matched: bool,
    pub already_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

impl VerificationOutcome {
    fn rejected(participant_id: ParticipantId, batch_id: BatchId, status: VerificationStatus) -> Self {
        Self {
            participant_id,
            batch_id,
            status,
            matched: false,
            already_verified: false,
            verified_at: None,
        }
    }
}

/// Verification workflow
pub struct VerificationWorkflow<S: DrawStorage> {
    storage: Arc<S>,
    retry: CommitRetry,
}

impl<S: DrawStorage> VerificationWorkflow<S> {
    pub fn new(storage: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            storage,
            retry: config.commit_retry(),
        }
    }

    /// Verify a submitted winning code
    pub async fn verify(&self, mobile: &str, batch_id: BatchId, submitted_code: &str) -> DrawResult<VerificationOutcome> {
        let mobile = mobile.trim();
        let submitted = submitted_code.trim();

        let outcome = self
            .retry
            .run("verify", |_| async move { self.try_verify(mobile, batch_id, submitted).await })
            .await?;

        match outcome.status {
            VerificationStatus::Verified => {
                info!(participant_id = %outcome.participant_id, batch = %batch_id, "Winning code verified");
            }
            status => {
                debug!(participant_id = %outcome.participant_id, batch = %batch_id, ?status, "Verification not applied");
            }
        }
        Ok(outcome)
    }

    async fn try_verify(&self, mobile: &str, batch_id: BatchId, submitted: &str) -> DrawResult<VerificationOutcome> {
        let mut participant = self
            .storage
            .get_participant_by_mobile(mobile)
            .await?
            .ok_or_else(|| DrawError::not_found("participant", mobile))?;
        let batch = self
            .storage
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| DrawError::not_found("batch", batch_id))?;
        let id = participant.id;

        if batch.winners.is_empty() {
            return Ok(VerificationOutcome::rejected(id, batch_id, VerificationStatus::NotDrawn));
        }
        let Some(winner) = batch.winner(id) else {
            return Ok(VerificationOutcome::rejected(id, batch_id, VerificationStatus::NotWinner));
        };

        let issued = participant
            .state
            .get(state::SUCCESS_CODE, batch_id)
            .unwrap_or_else(|| winner.draw_code.clone());
        if issued != submitted {
            return Ok(VerificationOutcome::rejected(id, batch_id, VerificationStatus::WrongCode));
        }

        if participant.is_verified(batch_id) {
            return Ok(VerificationOutcome {
                participant_id: id,
                batch_id,
                status: VerificationStatus::AlreadyVerified,
                matched: true,
                already_verified: true,
                verified_at: participant.state.get(state::VERIFICATION_TIME, batch_id),
            });
        }

        let now = Utc::now();
        participant.state.set(state::VERIFICATION_STATUS, batch_id, true)?;
        participant.state.set(state::VERIFICATION_TIME, batch_id, now)?;
        participant.prepare_for_commit(now);
        let record = SuccessRecord::snapshot(&participant, &batch, now);

        self.storage
            .commit(Changeset::new().with_participant(participant).with_record(record))
            .await?;

        Ok(VerificationOutcome {
            participant_id: id,
            batch_id,
            status: VerificationStatus::Verified,
            matched: true,
            already_verified: false,
            verified_at: Some(now),
        })
    }
}
