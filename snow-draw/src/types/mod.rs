//! Draw engine data model

mod batch;
mod common;
mod participant;
mod record;

pub use batch::{BatchConfig, BatchStatus, BatchUpdate, DrawBatch, DrawRecord, Enrollment, PrizeTier, Winner};
pub use common::{BatchId, ParticipantId};
pub use participant::{Address, Participant, Profile, ProfileUpdate};
pub use record::SuccessRecord;
