//! Random identifier allocation
//!
//! Both allocators follow the same discipline: sample uniformly, check the
//! candidate against the uniqueness domain, and resample on collision up to
//! a fixed budget. The budget running out is an error, never a silent reuse.
//!
//! [`IdAllocator`] delegates the check to an insert-if-absent claim supplied
//! by the caller, so two concurrent callers can never both win the same
//! value. Each instance serves exactly one uniqueness domain.
//!
//! [`DrawCodeGenerator`] checks against an in-memory set of codes already
//! issued for one batch; the batch version check at commit time serializes
//! concurrent writers of that set.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use tracing::debug;

use crate::error::{DrawError, DrawResult};

/// Inclusive numeric id range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
    pub min: u32,
    pub max: u32,
}

impl Default for IdRange {
    fn default() -> Self {
        Self {
            min: 100_000,
            max: 999_999,
        }
    }
}

impl IdRange {
    /// Number of values in the range
    pub fn len(&self) -> u64 {
        if self.max < self.min {
            0
        } else {
            u64::from(self.max - self.min) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, value: u32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Collision-retrying allocator for one uniqueness domain
#[derive(Debug, Clone)]
pub struct IdAllocator {
    domain: String,
    range: IdRange,
    max_attempts: u32,
}

impl IdAllocator {
    /// Create an allocator for `domain`
    pub fn new(domain: impl Into<String>, range: IdRange, max_attempts: u32) -> Self {
        Self {
            domain: domain.into(),
            range,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn range(&self) -> IdRange {
        self.range
    }

    /// Draw one candidate uniformly from the range
    pub fn sample(&self) -> u32 {
        rand::thread_rng().gen_range(self.range.min..=self.range.max)
    }

    /// Allocate a value by repeatedly offering candidates to `claim`.
    ///
    /// `claim` must atomically insert the candidate if it is free and return
    /// `Some(_)`, or return `None` when the candidate is already taken.
    pub async fn allocate<T, F, Fut>(&self, mut claim: F) -> DrawResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DrawResult<Option<T>>>,
    {
        if self.range.is_empty() {
            return Err(DrawError::Configuration(format!(
                "{} id range is empty",
                self.domain
            )));
        }

        for attempt in 1..=self.max_attempts {
            let candidate = self.sample();
            if let Some(claimed) = claim(candidate).await? {
                if attempt > 1 {
                    debug!(domain = %self.domain, candidate, attempt, "Allocated id after collisions");
                }
                return Ok(claimed);
            }
            debug!(domain = %self.domain, candidate, attempt, "Id collision, resampling");
        }

        Err(DrawError::AllocationExhausted {
            domain: self.domain.clone(),
            attempts: self.max_attempts,
        })
    }
}

/// Batch-scoped draw code generator
#[derive(Debug, Clone)]
pub struct DrawCodeGenerator {
    charset: Vec<char>,
    length: usize,
    max_attempts: u32,
}

impl DrawCodeGenerator {
    pub fn new(charset: &str, length: usize, max_attempts: u32) -> Self {
        Self {
            charset: charset.chars().collect(),
            length,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generate one code not present in `taken`
    pub fn generate(&self, taken: &HashSet<String>) -> DrawResult<String> {
        if self.charset.is_empty() || self.length == 0 {
            return Err(DrawError::Configuration("draw code alphabet is empty".to_string()));
        }

        let mut rng = rand::thread_rng();
        for attempt in 1..=self.max_attempts {
            let code: String = (0..self.length)
                .map(|_| self.charset[rng.gen_range(0..self.charset.len())])
                .collect();
            if !taken.contains(&code) {
                return Ok(code);
            }
            debug!(attempt, "Draw code collision, resampling");
        }

        Err(DrawError::AllocationExhausted {
            domain: "draw_code".to_string(),
            attempts: self.max_attempts,
        })
    }

    /// Generate `count` codes unique against `taken` and each other
    pub fn generate_many(&self, taken: &HashSet<String>, count: usize) -> DrawResult<Vec<String>> {
        let mut used = taken.clone();
        let mut codes = Vec::with_capacity(count);
        for _ in 0..count {
            let code = self.generate(&used)?;
            used.insert(code.clone());
            codes.push(code);
        }
        Ok(codes)
    }
}
