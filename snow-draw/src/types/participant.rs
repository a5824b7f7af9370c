//! Participant record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BatchId, ParticipantId};
use crate::error::{DrawError, DrawResult};
use crate::state::{self, BatchStateStore};

/// Postal address used for prize delivery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub receiver_name: String,
    pub receiver_phone: String,
    pub province: String,
    pub city: String,
    pub county: String,
    pub detailed: String,
}

impl Address {
    /// Whether no field has been filled in
    pub fn is_empty(&self) -> bool {
        self.receiver_name.is_empty()
            && self.receiver_phone.is_empty()
            && self.province.is_empty()
            && self.city.is_empty()
            && self.county.is_empty()
            && self.detailed.is_empty()
    }
}

/// Participant profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub nickname: String,
    pub mobile: String,
    #[serde(default)]
    pub address: Address,
}

impl Profile {
    /// Create a profile without an address
    pub fn new(nickname: impl Into<String>, mobile: impl Into<String>) -> Self {
        Self {
            nickname: nickname.into(),
            mobile: mobile.into(),
            address: Address::default(),
        }
    }

    /// Reject profiles that cannot be indexed
    pub fn validate(&self) -> DrawResult<()> {
        if self.mobile.trim().is_empty() {
            return Err(DrawError::validation("mobile is required"));
        }
        Ok(())
    }
}

/// Partial profile update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<Address>,
}

impl ProfileUpdate {
    /// Apply onto a profile
    pub fn apply(&self, profile: &mut Profile) {
        if let Some(nickname) = &self.nickname {
            profile.nickname = nickname.clone();
        }
        if let Some(mobile) = &self.mobile {
            profile.mobile = mobile.trim().to_string();
        }
        if let Some(address) = &self.address {
            profile.address = address.clone();
        }
    }
}

/// Lottery participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub profile: Profile,
    #[serde(default)]
    pub state: BatchStateStore,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency version, bumped by every commit
    #[serde(default)]
    pub version: u64,
}

impl Participant {
    /// Create a participant with empty batch state
    pub fn new(id: ParticipantId, profile: Profile, now: DateTime<Utc>) -> Self {
        Self {
            id,
            profile,
            state: BatchStateStore::new(),
            registered_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Post-read transform
    pub fn hydrate(mut self) -> Self {
        self.state.normalize();
        self
    }

    /// Pre-commit transform
    pub fn prepare_for_commit(&mut self, now: DateTime<Utc>) {
        self.state.normalize();
        self.updated_at = now;
    }

    pub fn is_eligible(&self, batch: BatchId) -> bool {
        self.state.flag(state::ELIGIBILITY, batch)
    }

    pub fn has_participated(&self, batch: BatchId) -> bool {
        self.state.flag(state::PARTICIPATION, batch)
    }

    pub fn is_verified(&self, batch: BatchId) -> bool {
        self.state.flag(state::VERIFICATION_STATUS, batch)
    }

    /// Batches this participant holds a winning code for
    pub fn won_batches(&self) -> Vec<BatchId> {
        self.state.batches(state::SUCCESS_CODE)
    }

    /// Whether the participant won a batch other than `batch`
    pub fn won_other_batch(&self, batch: BatchId) -> bool {
        self.won_batches().into_iter().any(|b| b != batch)
    }
}
