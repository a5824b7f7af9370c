//! Snow Draw - Lottery Draw & Eligibility Engine
//!
//! This crate provides the lottery subsystem of the snow storefront backend:
//! collision-free participant identifiers, batch-scoped participant state,
//! quota-bounded unbiased winner selection and idempotent code verification.
//!
//! # Architecture
//!
//! - **ID Allocator**: random six-digit ids, resampled on collision
//! - **Batch State Store**: typed JSON documents keyed by draw batch
//! - **Participant Registry**: registration, profile updates, eligibility
//!   grants and enrollment
//! - **Draw Engine**: winner selection with atomic multi-record commits
//! - **Verification Workflow**: matches submitted codes against issued ones
//! - **Queries**: read-only views for export and notification
//!
//! All durable state lives behind [`DrawStorage`]. Writes are compare-and-swap
//! commits on per-row versions, retried with backoff when a race is lost.
//!
//! # Usage
//!
//! ```rust,no_run
//! use snow_draw::{BatchId, DrawRequest, DrawService, EngineConfig, Profile};
//!
//! async fn example() -> snow_draw::DrawResult<()> {
//!     let service = DrawService::in_memory(EngineConfig::test())?;
//!
//!     let participant = service.registry().create(Profile::new("Alice", "18107290804")).await?;
//!     let outcome = service.draw(DrawRequest::new(BatchId(1), 3)).await?;
//!     println!("{} winners, {} left", outcome.winners.len(), outcome.remaining_quota);
//!
//!     let verified = service.verify("18107290804", BatchId(1), "Ab3x").await?;
//!     println!("participant {} matched: {}", participant.id, verified.matched);
//!     Ok(())
//! }
//! ```

pub mod allocator;
pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod registry;
pub mod retry;
pub mod state;
pub mod storage;
pub mod types;
pub mod verification;

pub use allocator::{DrawCodeGenerator, IdAllocator, IdRange};
pub use config::{CommitConfig, DrawCodeConfig, EngineConfig, StorageBackend, StorageConfig, WinnerPolicy};
pub use engine::{DrawEngine, DrawOutcome, DrawRequest, DrawStatus};
pub use error::{DrawError, DrawResult};
pub use query::{BatchSummary, DrawQueries, PublicWinner, VerificationState, WinnerView};
pub use registry::{EligibilityGrant, EnrollmentOutcome, ParticipantRegistry};
pub use retry::{CommitRetry, RetryStrategy};
pub use state::{BatchStateStore, Field};
pub use storage::{Changeset, DrawStorage, MemoryStorage, SledStorage, StorageStats};
pub use types::{
    Address, BatchConfig, BatchId, BatchStatus, BatchUpdate, DrawBatch, DrawRecord, Participant, ParticipantId,
    PrizeTier, Profile, ProfileUpdate, SuccessRecord, Winner,
};
pub use verification::{VerificationOutcome, VerificationStatus, VerificationWorkflow};

use std::sync::Arc;
use tracing::info;

/// Draw service
///
/// Wires one storage backend into every component.
pub struct DrawService<S: DrawStorage> {
    config: EngineConfig,
    storage: Arc<S>,
    registry: ParticipantRegistry<S>,
    engine: DrawEngine<S>,
    verification: VerificationWorkflow<S>,
    queries: DrawQueries<S>,
}

impl<S: DrawStorage> DrawService<S> {
    /// Create a service over an existing storage backend
    pub fn new(storage: Arc<S>, config: EngineConfig) -> DrawResult<Self> {
        config.validate()?;

        Ok(Self {
            registry: ParticipantRegistry::new(storage.clone(), &config),
            engine: DrawEngine::new(storage.clone(), &config),
            verification: VerificationWorkflow::new(storage.clone(), &config),
            queries: DrawQueries::new(storage.clone()),
            storage,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn registry(&self) -> &ParticipantRegistry<S> {
        &self.registry
    }

    pub fn engine(&self) -> &DrawEngine<S> {
        &self.engine
    }

    pub fn verification(&self) -> &VerificationWorkflow<S> {
        &self.verification
    }

    pub fn queries(&self) -> &DrawQueries<S> {
        &self.queries
    }

    /// Draw winners for a batch
    pub async fn draw(&self, request: DrawRequest) -> DrawResult<DrawOutcome> {
        self.engine.draw(request).await
    }

    /// Verify a submitted winning code
    pub async fn verify(&self, mobile: &str, batch_id: BatchId, code: &str) -> DrawResult<VerificationOutcome> {
        self.verification.verify(mobile, batch_id, code).await
    }
}

impl DrawService<MemoryStorage> {
    /// Create a service over a fresh in-memory store
    pub fn in_memory(config: EngineConfig) -> DrawResult<Self> {
        let storage = MemoryStorage::new().with_lock_timeout(config.lock_timeout());
        Self::new(Arc::new(storage), config)
    }
}

impl DrawService<SledStorage> {
    /// Open a service over the configured sled data directory
    pub fn open(config: EngineConfig) -> DrawResult<Self> {
        config.validate()?;
        info!(data_dir = %config.storage.data_dir, "Opening draw store");
        let storage = SledStorage::new(&config.storage)?;
        Self::new(Arc::new(storage), config)
    }
}
