//! Draw Engine Configuration
//!
//! Supports loading from environment variables with the SNOW_DRAW_ prefix.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::allocator::{DrawCodeGenerator, IdAllocator, IdRange};
use crate::error::{DrawError, DrawResult};
use crate::retry::{CommitRetry, RetryStrategy};

/// Default draw code alphabet, without look-alike characters
pub const DEFAULT_CODE_CHARSET: &str = "ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

/// Whether a winner of one batch may win another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerPolicy {
    /// Winners of any batch cannot enroll in or be drawn for another
    ExcludePriorWinners,
    /// Batches are independent
    AllowRepeatWinners,
}

impl Default for WinnerPolicy {
    fn default() -> Self {
        Self::ExcludePriorWinners
    }
}

impl WinnerPolicy {
    /// Parse from string (for environment variables)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exclude" | "exclude_prior_winners" => Some(Self::ExcludePriorWinners),
            "allow" | "allow_repeat_winners" => Some(Self::AllowRepeatWinners),
            _ => None,
        }
    }

    pub fn excludes_prior_winners(&self) -> bool {
        matches!(self, Self::ExcludePriorWinners)
    }
}

/// Draw code configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawCodeConfig {
    #[serde(default = "default_code_length")]
    pub length: usize,
    #[serde(default = "default_code_charset")]
    pub charset: String,
    #[serde(default = "default_code_attempts")]
    pub max_attempts: u32,
}

fn default_code_length() -> usize {
    4
}

fn default_code_charset() -> String {
    DEFAULT_CODE_CHARSET.to_string()
}

fn default_code_attempts() -> u32 {
    1000
}

impl Default for DrawCodeConfig {
    fn default() -> Self {
        Self {
            length: default_code_length(),
            charset: default_code_charset(),
            max_attempts: default_code_attempts(),
        }
    }
}

/// Commit and lock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitConfig {
    /// Attempts for a compare-and-swap commit, including the first
    #[serde(default = "default_commit_attempts")]
    pub max_attempts: u32,
    /// Backoff between attempts
    #[serde(default)]
    pub backoff: RetryStrategy,
    /// Upper bound on waiting for the store lock
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
}

fn default_commit_attempts() -> u32 {
    8
}

fn default_lock_timeout() -> u64 {
    5_000
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_commit_attempts(),
            backoff: RetryStrategy::default(),
            lock_timeout_ms: default_lock_timeout(),
        }
    }
}

/// Storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sled,
}

impl StorageBackend {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "sled" | "disk" => Some(Self::Sled),
            _ => None,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Data directory for the sled backend
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sled,
            data_dir: "./snow_draw_data".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Participant id range
    #[serde(default)]
    pub participant_ids: IdRange,
    /// Resample budget for participant ids
    #[serde(default = "default_id_attempts")]
    pub id_max_attempts: u32,
    #[serde(default)]
    pub draw_code: DrawCodeConfig,
    #[serde(default)]
    pub commit: CommitConfig,
    #[serde(default)]
    pub winner_policy: WinnerPolicy,
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_id_attempts() -> u32 {
    32
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            participant_ids: IdRange::default(),
            id_max_attempts: default_id_attempts(),
            draw_code: DrawCodeConfig::default(),
            commit: CommitConfig::default(),
            winner_policy: WinnerPolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Development configuration
    pub fn development() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Sled,
                data_dir: "./snow_draw_dev_data".to_string(),
            },
            ..Default::default()
        }
    }

    /// Test configuration (memory storage, fast retries)
    pub fn test() -> Self {
        Self {
            commit: CommitConfig {
                max_attempts: 64,
                backoff: RetryStrategy::Fixed { delay_ms: 1 },
                lock_timeout_ms: 1_000,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                data_dir: String::new(),
            },
            ..Default::default()
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - SNOW_DRAW_ID_MIN / SNOW_DRAW_ID_MAX: participant id range
    /// - SNOW_DRAW_ID_MAX_ATTEMPTS: participant id resample budget
    /// - SNOW_DRAW_CODE_LENGTH: draw code length
    /// - SNOW_DRAW_CODE_CHARSET: draw code alphabet
    /// - SNOW_DRAW_CODE_MAX_ATTEMPTS: draw code resample budget
    /// - SNOW_DRAW_COMMIT_MAX_ATTEMPTS: optimistic commit attempts
    /// - SNOW_DRAW_COMMIT_BACKOFF_MS: initial commit backoff
    /// - SNOW_DRAW_LOCK_TIMEOUT_MS: store lock wait bound
    /// - SNOW_DRAW_WINNER_POLICY: exclude / allow
    /// - SNOW_DRAW_STORAGE: memory / sled
    /// - SNOW_DRAW_DATA_DIR: sled data directory
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let participant_ids = IdRange {
            min: env_parse("SNOW_DRAW_ID_MIN").unwrap_or(defaults.participant_ids.min),
            max: env_parse("SNOW_DRAW_ID_MAX").unwrap_or(defaults.participant_ids.max),
        };

        let backoff = match env_parse::<u64>("SNOW_DRAW_COMMIT_BACKOFF_MS") {
            Some(0) => RetryStrategy::None,
            Some(initial_delay_ms) => RetryStrategy::Exponential {
                initial_delay_ms,
                max_delay_ms: initial_delay_ms.saturating_mul(40),
                multiplier: 2.0,
            },
            None => defaults.commit.backoff,
        };

        Self {
            participant_ids,
            id_max_attempts: env_parse("SNOW_DRAW_ID_MAX_ATTEMPTS").unwrap_or(defaults.id_max_attempts),
            draw_code: DrawCodeConfig {
                length: env_parse("SNOW_DRAW_CODE_LENGTH").unwrap_or(defaults.draw_code.length),
                charset: env::var("SNOW_DRAW_CODE_CHARSET").unwrap_or(defaults.draw_code.charset),
                max_attempts: env_parse("SNOW_DRAW_CODE_MAX_ATTEMPTS")
                    .unwrap_or(defaults.draw_code.max_attempts),
            },
            commit: CommitConfig {
                max_attempts: env_parse("SNOW_DRAW_COMMIT_MAX_ATTEMPTS")
                    .unwrap_or(defaults.commit.max_attempts),
                backoff,
                lock_timeout_ms: env_parse("SNOW_DRAW_LOCK_TIMEOUT_MS")
                    .unwrap_or(defaults.commit.lock_timeout_ms),
            },
            winner_policy: env::var("SNOW_DRAW_WINNER_POLICY")
                .ok()
                .and_then(|s| WinnerPolicy::from_str(&s))
                .unwrap_or(defaults.winner_policy),
            storage: StorageConfig {
                backend: env::var("SNOW_DRAW_STORAGE")
                    .ok()
                    .and_then(|s| StorageBackend::from_str(&s))
                    .unwrap_or(defaults.storage.backend),
                data_dir: env::var("SNOW_DRAW_DATA_DIR").unwrap_or(defaults.storage.data_dir),
            },
        }
    }

    /// Set winner policy
    pub fn with_winner_policy(mut self, policy: WinnerPolicy) -> Self {
        self.winner_policy = policy;
        self
    }

    /// Set participant id range
    pub fn with_participant_ids(mut self, min: u32, max: u32) -> Self {
        self.participant_ids = IdRange { min, max };
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> DrawResult<()> {
        if self.participant_ids.min > self.participant_ids.max {
            return Err(DrawError::Configuration(format!(
                "participant id range is empty: {}..={}",
                self.participant_ids.min, self.participant_ids.max
            )));
        }
        if self.participant_ids.min == 0 {
            return Err(DrawError::Configuration("participant ids must be positive".to_string()));
        }
        if self.id_max_attempts == 0 || self.draw_code.max_attempts == 0 || self.commit.max_attempts == 0 {
            return Err(DrawError::Configuration("attempt budgets must be positive".to_string()));
        }
        if self.draw_code.length == 0 {
            return Err(DrawError::Configuration("draw code length must be positive".to_string()));
        }
        if self.draw_code.charset.chars().count() < 2 {
            return Err(DrawError::Configuration(
                "draw code charset needs at least two characters".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Sled && self.storage.data_dir.is_empty() {
            return Err(DrawError::Configuration("sled storage needs a data directory".to_string()));
        }
        Ok(())
    }

    /// Participant id allocator
    pub fn participant_allocator(&self) -> IdAllocator {
        IdAllocator::new("participant", self.participant_ids, self.id_max_attempts)
    }

    /// Draw code generator
    pub fn code_generator(&self) -> DrawCodeGenerator {
        DrawCodeGenerator::new(
            &self.draw_code.charset,
            self.draw_code.length,
            self.draw_code.max_attempts,
        )
    }

    /// Optimistic commit retry loop
    pub fn commit_retry(&self) -> CommitRetry {
        CommitRetry::new(self.commit.backoff.clone(), self.commit.max_attempts)
    }

    /// Store lock wait bound
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.commit.lock_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}
