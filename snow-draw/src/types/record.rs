//! Success record
//!
//! Denormalized (batch, participant) projection consumed by export and
//! notification collaborators. It is always rebuilt from the participant
//! and the batch, never patched field by field, so the two sources of truth
//! win on any disagreement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Address, BatchId, DrawBatch, Participant, ParticipantId};
use crate::state;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRecord {
    pub batch_id: BatchId,
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub mobile: String,
    pub address: Address,
    pub order_number: Option<String>,
    pub draw_code: Option<String>,
    pub prize: Option<String>,
    pub eligible: bool,
    pub participated: bool,
    pub won: bool,
    pub verified: bool,
    pub drawn_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SuccessRecord {
    /// Project the current participant and batch state
    pub fn snapshot(participant: &Participant, batch: &DrawBatch, now: DateTime<Utc>) -> Self {
        let batch_id = batch.batch_id;
        let winner = batch.winner(participant.id);
        let state = &participant.state;

        Self {
            batch_id,
            participant_id: participant.id,
            nickname: participant.profile.nickname.clone(),
            mobile: participant.profile.mobile.clone(),
            address: participant.profile.address.clone(),
            order_number: state.get(state::ORDER_NUMBER, batch_id),
            draw_code: state
                .get(state::SUCCESS_CODE, batch_id)
                .or_else(|| winner.map(|w| w.draw_code.clone())),
            prize: winner.and_then(|w| w.prize.clone()),
            eligible: participant.is_eligible(batch_id),
            participated: participant.has_participated(batch_id),
            won: winner.is_some(),
            verified: participant.is_verified(batch_id),
            drawn_at: state
                .get(state::DRAW_TIME, batch_id)
                .or_else(|| winner.map(|w| w.drawn_at)),
            verified_at: state.get(state::VERIFICATION_TIME, batch_id),
            updated_at: now,
        }
    }

    /// Storage key: batch id then participant id, both big-endian
    pub fn key(batch: BatchId, participant: ParticipantId) -> [u8; 8] {
        let mut key = [0u8; 8];
        key[..4].copy_from_slice(&batch.to_key());
        key[4..].copy_from_slice(&participant.to_key());
        key
    }
}
