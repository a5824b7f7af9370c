//! Outbound queries
//!
//! Read-only views consumed by export and notification collaborators. The
//! engine never sends notifications itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{DrawError, DrawResult};
use crate::state;
use crate::storage::DrawStorage;
use crate::types::{Address, BatchId, BatchStatus, DrawBatch, ParticipantId, SuccessRecord};

/// Full winner view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerView {
    pub participant_id: ParticipantId,
    pub nickname: String,
    pub mobile: String,
    pub order_number: Option<String>,
    pub draw_code: String,
    pub prize: Option<String>,
    pub drawn_at: DateTime<Utc>,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub address: Address,
}

/// Masked winner view for public announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicWinner {
    pub nickname: String,
    pub mobile: String,
    pub order_number: Option<String>,
    pub prize: Option<String>,
    pub drawn_at: DateTime<Utc>,
    /// Row belongs to the viewer and is shown unmasked
    #[serde(default)]
    pub is_viewer: bool,
}

impl PublicWinner {
    /// The viewer's own row, unmasked
    pub fn unmasked(view: &WinnerView) -> Self {
        Self {
            nickname: view.nickname.clone(),
            mobile: view.mobile.clone(),
            order_number: view.order_number.clone(),
            prize: view.prize.clone(),
            drawn_at: view.drawn_at,
            is_viewer: true,
        }
    }
}

impl From<&WinnerView> for PublicWinner {
    fn from(view: &WinnerView) -> Self {
        Self {
            nickname: mask_nickname(&view.nickname),
            mobile: mask_mobile(&view.mobile),
            order_number: view.order_number.as_deref().map(mask_order_number),
            prize: view.prize.clone(),
            drawn_at: view.drawn_at,
            is_viewer: false,
        }
    }
}

/// Verification state of one participant in one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationState {
    pub participant_id: ParticipantId,
    pub batch_id: BatchId,
    pub won: bool,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Batch overview
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub name: String,
    pub status: BatchStatus,
    pub quota: u32,
    pub winners: usize,
    pub enrolled: usize,
    pub remaining_quota: u32,
    pub draws: usize,
    pub order_begin: DateTime<Utc>,
    pub order_end: DateTime<Utc>,
    pub draw_at: DateTime<Utc>,
}

impl From<&DrawBatch> for BatchSummary {
    fn from(batch: &DrawBatch) -> Self {
        Self {
            batch_id: batch.batch_id,
            name: batch.name.clone(),
            status: batch.status(),
            quota: batch.quota,
            winners: batch.winners.len(),
            enrolled: batch.participants.len(),
            remaining_quota: batch.remaining_quota(),
            draws: batch.draw_log.len(),
            order_begin: batch.order_begin,
            order_end: batch.order_end,
            draw_at: batch.draw_at,
        }
    }
}

/// Read-only query service
pub struct DrawQueries<S: DrawStorage> {
    storage: Arc<S>,
}

impl<S: DrawStorage> DrawQueries<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Winners of a batch in commit order
    pub async fn winners(&self, batch_id: BatchId) -> DrawResult<Vec<WinnerView>> {
        let batch = self.batch(batch_id).await?;
        let mut views = Vec::with_capacity(batch.winners.len());

        for winner in &batch.winners {
            let Some(participant) = self.storage.get_participant(winner.participant_id).await? else {
                continue;
            };
            views.push(WinnerView {
                participant_id: participant.id,
                nickname: participant.profile.nickname.clone(),
                mobile: participant.profile.mobile.clone(),
                order_number: participant.state.get(state::ORDER_NUMBER, batch_id),
                draw_code: winner.draw_code.clone(),
                prize: winner.prize.clone(),
                drawn_at: winner.drawn_at,
                verified: participant.is_verified(batch_id),
                verified_at: participant.state.get(state::VERIFICATION_TIME, batch_id),
                address: participant.profile.address.clone(),
            });
        }

        Ok(views)
    }

    /// Masked winners of a batch
    pub async fn public_winners(&self, batch_id: BatchId) -> DrawResult<Vec<PublicWinner>> {
        self.public_winners_for(batch_id, None).await
    }

    /// Masked winners of a batch as seen by `viewer`
    ///
    /// Every row is masked except the viewer's own.
    pub async fn public_winners_for(
        &self,
        batch_id: BatchId,
        viewer: Option<ParticipantId>,
    ) -> DrawResult<Vec<PublicWinner>> {
        Ok(self
            .winners(batch_id)
            .await?
            .iter()
            .map(|view| {
                if Some(view.participant_id) == viewer {
                    PublicWinner::unmasked(view)
                } else {
                    PublicWinner::from(view)
                }
            })
            .collect())
    }

    /// Verification state for one participant
    pub async fn verification_state(&self, participant_id: ParticipantId, batch_id: BatchId) -> DrawResult<VerificationState> {
        let batch = self.batch(batch_id).await?;
        let participant = self
            .storage
            .get_participant(participant_id)
            .await?
            .ok_or_else(|| DrawError::not_found("participant", participant_id))?;

        Ok(VerificationState {
            participant_id,
            batch_id,
            won: batch.is_winner(participant_id),
            verified: participant.is_verified(batch_id),
            verified_at: participant.state.get(state::VERIFICATION_TIME, batch_id),
        })
    }

    /// Overview of one batch
    pub async fn batch_summary(&self, batch_id: BatchId) -> DrawResult<BatchSummary> {
        Ok(BatchSummary::from(&self.batch(batch_id).await?))
    }

    /// Overview of every batch
    pub async fn batch_summaries(&self) -> DrawResult<Vec<BatchSummary>> {
        Ok(self.storage.list_batches().await?.iter().map(BatchSummary::from).collect())
    }

    /// Success records of a batch
    pub async fn success_records(&self, batch_id: BatchId) -> DrawResult<Vec<SuccessRecord>> {
        self.batch(batch_id).await?;
        self.storage.list_success_records(batch_id).await
    }

    async fn batch(&self, batch_id: BatchId) -> DrawResult<DrawBatch> {
        self.storage
            .get_batch(batch_id)
            .await?
            .ok_or_else(|| DrawError::not_found("batch", batch_id))
    }
}

/// Keep the first 3 and last 4 digits: `181****0804`
pub fn mask_mobile(mobile: &str) -> String {
    let chars: Vec<char> = mobile.chars().collect();
    if chars.len() < 7 {
        return mobile.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

/// Keep the first and last character
pub fn mask_nickname(nickname: &str) -> String {
    let chars: Vec<char> = nickname.chars().collect();
    match chars.len() {
        0 | 1 => "*".to_string(),
        2 => format!("{}*", chars[0]),
        n => format!("{}{}{}", chars[0], "*".repeat(n - 2), chars[n - 1]),
    }
}

/// Keep the first 2 and last 2 characters
pub fn mask_order_number(order_number: &str) -> String {
    let chars: Vec<char> = order_number.chars().collect();
    let n = chars.len();
    if n <= 4 {
        return "*".repeat(n);
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[n - 2..].iter().collect();
    format!("{}{}{}", head, "*".repeat(n - 4), tail)
}
