//! Draw batch record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{BatchId, ParticipantId};
use crate::error::{DrawError, DrawResult};

/// One prize tier: `count` winners receive `name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrizeTier {
    pub name: String,
    pub count: u32,
}

impl PrizeTier {
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
        }
    }
}

/// Operator-supplied batch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_id: BatchId,
    pub name: String,
    #[serde(default)]
    pub prizes: Vec<PrizeTier>,
    /// Total winners the batch may ever have
    pub quota: u32,
    /// Eligibility window start (inclusive)
    pub order_begin: DateTime<Utc>,
    /// Eligibility window end (exclusive)
    pub order_end: DateTime<Utc>,
    /// Scheduled draw time
    pub draw_at: DateTime<Utc>,
    #[serde(default)]
    pub remarks: String,
}

impl BatchConfig {
    /// Validate the configuration
    pub fn validate(&self) -> DrawResult<()> {
        if self.batch_id.value() == 0 {
            return Err(DrawError::validation("batch id must be a positive integer"));
        }
        if self.quota == 0 {
            return Err(DrawError::validation("quota must be at least 1"));
        }
        if self.order_begin >= self.order_end {
            return Err(DrawError::validation(format!(
                "order window is empty: {} >= {}",
                self.order_begin, self.order_end
            )));
        }
        if let Some(tier) = self.prizes.iter().find(|t| t.name.trim().is_empty()) {
            return Err(DrawError::validation(format!(
                "prize tier with {} winners has no name",
                tier.count
            )));
        }
        let scheduled: u64 = self.prizes.iter().map(|t| u64::from(t.count)).sum();
        if scheduled > u64::from(self.quota) {
            return Err(DrawError::validation(format!(
                "prize schedule covers {} winners but quota is {}",
                scheduled, self.quota
            )));
        }
        Ok(())
    }
}

/// Partial batch configuration change
///
/// Unset fields keep their current value. The seed, pool, winners and draw
/// log are never touched by an update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub name: Option<String>,
    pub prizes: Option<Vec<PrizeTier>>,
    pub quota: Option<u32>,
    pub order_begin: Option<DateTime<Utc>>,
    pub order_end: Option<DateTime<Utc>>,
    pub draw_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
}

impl BatchUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.prizes.is_none()
            && self.quota.is_none()
            && self.order_begin.is_none()
            && self.order_end.is_none()
            && self.draw_at.is_none()
            && self.remarks.is_none()
    }

    /// Configuration after applying this update
    pub fn apply(&self, current: BatchConfig) -> BatchConfig {
        BatchConfig {
            batch_id: current.batch_id,
            name: self.name.clone().unwrap_or(current.name),
            prizes: self.prizes.clone().unwrap_or(current.prizes),
            quota: self.quota.unwrap_or(current.quota),
            order_begin: self.order_begin.unwrap_or(current.order_begin),
            order_end: self.order_end.unwrap_or(current.order_end),
            draw_at: self.draw_at.unwrap_or(current.draw_at),
            remarks: self.remarks.clone().unwrap_or(current.remarks),
        }
    }
}

/// Batch lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// No winners yet
    Open,
    /// At least one winner, quota not yet filled
    Drawn,
    /// Quota filled
    Closed,
}

/// Winner entry, in commit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub participant_id: ParticipantId,
    pub draw_code: String,
    pub prize: Option<String>,
    pub drawn_at: DateTime<Utc>,
}

/// Enrollment log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollment {
    pub participant_id: ParticipantId,
    pub enrolled_at: DateTime<Utc>,
}

/// Committed draw request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRecord {
    pub request_key: Option<String>,
    pub requested: u32,
    pub selected: Vec<ParticipantId>,
    pub pool_size: usize,
    /// SHA-256 over the seed, batch and ordered pool
    pub selection_digest: String,
    pub drawn_at: DateTime<Utc>,
}

/// Draw batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawBatch {
    pub batch_id: BatchId,
    pub name: String,
    pub prizes: Vec<PrizeTier>,
    pub quota: u32,
    pub order_begin: DateTime<Utc>,
    pub order_end: DateTime<Utc>,
    pub draw_at: DateTime<Utc>,
    pub remarks: String,
    /// Hex-encoded 32-byte selection seed, empty until the first draw seals it
    #[serde(default)]
    pub seed: String,
    /// Enrolled participant ids, ascending
    #[serde(default)]
    pub participants: Vec<ParticipantId>,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
    #[serde(default)]
    pub winners: Vec<Winner>,
    #[serde(default)]
    pub draw_log: Vec<DrawRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl DrawBatch {
    /// Create an unsealed batch from validated configuration
    pub fn new(config: BatchConfig, now: DateTime<Utc>) -> Self {
        Self {
            batch_id: config.batch_id,
            name: config.name,
            prizes: config.prizes,
            quota: config.quota,
            order_begin: config.order_begin,
            order_end: config.order_end,
            draw_at: config.draw_at,
            remarks: config.remarks,
            seed: String::new(),
            participants: Vec::new(),
            enrollments: Vec::new(),
            winners: Vec::new(),
            draw_log: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Set the selection seed
    pub fn with_seed(mut self, seed: [u8; 32]) -> Self {
        self.seal(seed);
        self
    }

    /// Fix the selection seed. Ignored once the batch is sealed.
    pub fn seal(&mut self, seed: [u8; 32]) {
        if !self.is_sealed() {
            self.seed = hex::encode(seed);
        }
    }

    pub fn is_sealed(&self) -> bool {
        !self.seed.is_empty()
    }

    /// Copy without the selection seed, for callers outside the engine
    pub fn redacted(mut self) -> Self {
        self.seed.clear();
        self
    }

    /// Current operator configuration
    pub fn config(&self) -> BatchConfig {
        BatchConfig {
            batch_id: self.batch_id,
            name: self.name.clone(),
            prizes: self.prizes.clone(),
            quota: self.quota,
            order_begin: self.order_begin,
            order_end: self.order_end,
            draw_at: self.draw_at,
            remarks: self.remarks.clone(),
        }
    }

    /// Replace the operator configuration, keeping seed, pool, winners and log
    pub fn reconfigure(&mut self, config: BatchConfig) {
        self.name = config.name;
        self.prizes = config.prizes;
        self.quota = config.quota;
        self.order_begin = config.order_begin;
        self.order_end = config.order_end;
        self.draw_at = config.draw_at;
        self.remarks = config.remarks;
    }

    /// Decoded selection seed
    pub fn seed_bytes(&self) -> DrawResult<[u8; 32]> {
        if !self.is_sealed() {
            return Err(DrawError::validation(format!("batch {} has no selection seed yet", self.batch_id)));
        }
        let bytes = hex::decode(&self.seed)?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            DrawError::Serialization(format!("batch {} seed has {} bytes, expected 32", self.batch_id, b.len()))
        })
    }

    pub fn status(&self) -> BatchStatus {
        if self.winners.is_empty() {
            BatchStatus::Open
        } else if self.remaining_quota() == 0 {
            BatchStatus::Closed
        } else {
            BatchStatus::Drawn
        }
    }

    pub fn remaining_quota(&self) -> u32 {
        self.quota.saturating_sub(self.winners.len() as u32)
    }

    pub fn is_winner(&self, id: ParticipantId) -> bool {
        self.winners.iter().any(|w| w.participant_id == id)
    }

    pub fn winner(&self, id: ParticipantId) -> Option<&Winner> {
        self.winners.iter().find(|w| w.participant_id == id)
    }

    pub fn is_enrolled(&self, id: ParticipantId) -> bool {
        self.participants.binary_search(&id).is_ok()
    }

    /// Draw codes already issued in this batch
    pub fn issued_codes(&self) -> HashSet<String> {
        self.winners.iter().map(|w| w.draw_code.clone()).collect()
    }

    /// Whether `at` falls inside `[order_begin, order_end)`
    pub fn in_order_window(&self, at: DateTime<Utc>) -> bool {
        at >= self.order_begin && at < self.order_end
    }

    /// Prize for the winner at zero-based `position` in commit order
    pub fn prize_for_position(&self, position: usize) -> Option<String> {
        let mut upper = 0usize;
        for tier in &self.prizes {
            upper += tier.count as usize;
            if position < upper {
                return Some(tier.name.clone());
            }
        }
        None
    }

    /// Committed draw with the given request key
    pub fn find_request(&self, key: &str) -> Option<&DrawRecord> {
        self.draw_log
            .iter()
            .find(|r| r.request_key.as_deref() == Some(key))
    }

    /// Add to the pool snapshot, keeping it sorted. Returns false when already present.
    pub fn enroll(&mut self, id: ParticipantId, at: DateTime<Utc>) -> bool {
        match self.participants.binary_search(&id) {
            Ok(_) => false,
            Err(pos) => {
                self.participants.insert(pos, id);
                self.enrollments.push(Enrollment {
                    participant_id: id,
                    enrolled_at: at,
                });
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn config() -> BatchConfig {
        let begin = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        BatchConfig {
            batch_id: BatchId(1),
            name: "Winter draw".to_string(),
            prizes: vec![PrizeTier::new("First", 1), PrizeTier::new("Second", 2)],
            quota: 5,
            order_begin: begin,
            order_end: begin + Duration::days(30),
            draw_at: begin + Duration::days(31),
            remarks: String::new(),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());

        let mut bad = config();
        bad.quota = 0;
        assert!(matches!(bad.validate(), Err(DrawError::Validation(_))));

        let mut bad = config();
        bad.order_end = bad.order_begin;
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.prizes.push(PrizeTier::new("Third", 3));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_prize_schedule_positions() {
        let batch = DrawBatch::new(config(), Utc::now());
        assert_eq!(batch.prize_for_position(0).as_deref(), Some("First"));
        assert_eq!(batch.prize_for_position(1).as_deref(), Some("Second"));
        assert_eq!(batch.prize_for_position(2).as_deref(), Some("Second"));
        assert_eq!(batch.prize_for_position(3), None);
    }

    #[test]
    fn test_order_window_is_half_open() {
        let batch = DrawBatch::new(config(), Utc::now());
        assert!(batch.in_order_window(batch.order_begin));
        assert!(batch.in_order_window(batch.order_end - Duration::seconds(1)));
        assert!(!batch.in_order_window(batch.order_end));
        assert!(!batch.in_order_window(batch.order_begin - Duration::seconds(1)));
    }

    #[test]
    fn test_enroll_keeps_pool_sorted() {
        let mut batch = DrawBatch::new(config(), Utc::now());
        let now = Utc::now();
        assert!(batch.enroll(ParticipantId(300000), now));
        assert!(batch.enroll(ParticipantId(100000), now));
        assert!(!batch.enroll(ParticipantId(300000), now));

        assert_eq!(batch.participants, vec![ParticipantId(100000), ParticipantId(300000)]);
        assert_eq!(batch.enrollments.len(), 2);
        assert!(batch.is_enrolled(ParticipantId(100000)));
    }

    #[test]
    fn test_seed_round_trip() {
        let unsealed = DrawBatch::new(config(), Utc::now());
        assert!(!unsealed.is_sealed());
        assert!(unsealed.seed_bytes().is_err());

        let mut batch = unsealed.with_seed([42u8; 32]);
        batch.seal([1u8; 32]);
        assert_eq!(batch.seed_bytes().unwrap(), [42u8; 32]);
        assert!(!batch.clone().redacted().is_sealed());
        assert_eq!(batch.status(), BatchStatus::Open);
        assert_eq!(batch.remaining_quota(), 5);
    }

    #[test]
    fn test_update_keeps_draw_state() {
        let mut batch = DrawBatch::new(config(), Utc::now()).with_seed([9u8; 32]);
        batch.enroll(ParticipantId(100000), Utc::now());

        let update = BatchUpdate {
            quota: Some(8),
            remarks: Some("extended".to_string()),
            ..BatchUpdate::default()
        };
        assert!(!update.is_empty());
        assert!(BatchUpdate::default().is_empty());

        let next = update.apply(batch.config());
        assert_eq!(next.name, "Winter draw");
        assert_eq!(next.quota, 8);
        batch.reconfigure(next);

        assert_eq!(batch.quota, 8);
        assert_eq!(batch.remarks, "extended");
        assert_eq!(batch.seed_bytes().unwrap(), [9u8; 32]);
        assert!(batch.is_enrolled(ParticipantId(100000)));
    }
}
