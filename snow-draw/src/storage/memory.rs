//! 内存存储实现
//!
//! 提供基于内存的存储实现，主要用于测试和开发。

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Changeset, DrawStorage, StorageStats};
use crate::error::{DrawError, DrawResult};
use crate::types::{BatchId, DrawBatch, Participant, ParticipantId, SuccessRecord};

/// 默认锁等待上限
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct Tables {
    participants: HashMap<ParticipantId, Participant>,
    mobile_index: HashMap<String, ParticipantId>,
    batches: BTreeMap<BatchId, DrawBatch>,
    success_records: BTreeMap<(BatchId, ParticipantId), SuccessRecord>,
}

/// 内存存储
///
/// 所有表由同一把 RwLock 保护，提交在一次写锁内完成校验与写入。
/// 获取锁的等待时间有上限，超时返回 `Timeout`。
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    tables: Arc<RwLock<Tables>>,
    lock_timeout: Duration,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// 创建新的内存存储
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// 设置锁等待上限
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// 清空所有数据
    pub async fn clear(&self) -> DrawResult<()> {
        let mut tables = self.write().await?;
        *tables = Tables::default();
        Ok(())
    }

    async fn read(&self) -> DrawResult<RwLockReadGuard<'_, Tables>> {
        tokio::time::timeout(self.lock_timeout, self.tables.read())
            .await
            .map_err(|_| DrawError::Timeout(format!("read lock not acquired within {:?}", self.lock_timeout)))
    }

    async fn write(&self) -> DrawResult<RwLockWriteGuard<'_, Tables>> {
        tokio::time::timeout(self.lock_timeout, self.tables.write())
            .await
            .map_err(|_| DrawError::Timeout(format!("write lock not acquired within {:?}", self.lock_timeout)))
    }
}

#[async_trait]
impl DrawStorage for MemoryStorage {
    // ==================== 参与者操作 ====================

    async fn insert_participant(&self, participant: &Participant) -> DrawResult<bool> {
        let mut tables = self.write().await?;

        if tables.participants.contains_key(&participant.id) {
            return Ok(false);
        }
        if tables.mobile_index.contains_key(&participant.profile.mobile) {
            return Err(DrawError::already_exists("mobile", &participant.profile.mobile));
        }

        tables
            .mobile_index
            .insert(participant.profile.mobile.clone(), participant.id);
        tables.participants.insert(participant.id, participant.clone());
        Ok(true)
    }

    async fn get_participant(&self, id: ParticipantId) -> DrawResult<Option<Participant>> {
        let tables = self.read().await?;
        Ok(tables.participants.get(&id).cloned().map(Participant::hydrate))
    }

    async fn get_participant_by_mobile(&self, mobile: &str) -> DrawResult<Option<Participant>> {
        let tables = self.read().await?;
        Ok(tables
            .mobile_index
            .get(mobile)
            .and_then(|id| tables.participants.get(id))
            .cloned()
            .map(Participant::hydrate))
    }

    async fn list_participants(&self) -> DrawResult<Vec<Participant>> {
        let tables = self.read().await?;
        let mut participants: Vec<Participant> = tables
            .participants
            .values()
            .cloned()
            .map(Participant::hydrate)
            .collect();
        participants.sort_by_key(|p| p.id);
        Ok(participants)
    }

    // ==================== 批次操作 ====================

    async fn insert_batch(&self, batch: &DrawBatch) -> DrawResult<bool> {
        let mut tables = self.write().await?;
        if tables.batches.contains_key(&batch.batch_id) {
            return Ok(false);
        }
        tables.batches.insert(batch.batch_id, batch.clone());
        Ok(true)
    }

    async fn get_batch(&self, id: BatchId) -> DrawResult<Option<DrawBatch>> {
        let tables = self.read().await?;
        Ok(tables.batches.get(&id).cloned())
    }

    async fn list_batches(&self) -> DrawResult<Vec<DrawBatch>> {
        let tables = self.read().await?;
        Ok(tables.batches.values().cloned().collect())
    }

    // ==================== 中奖记录操作 ====================

    async fn get_success_record(
        &self,
        batch: BatchId,
        participant: ParticipantId,
    ) -> DrawResult<Option<SuccessRecord>> {
        let tables = self.read().await?;
        Ok(tables.success_records.get(&(batch, participant)).cloned())
    }

    async fn list_success_records(&self, batch: BatchId) -> DrawResult<Vec<SuccessRecord>> {
        let tables = self.read().await?;
        Ok(tables
            .success_records
            .range((batch, ParticipantId(0))..=(batch, ParticipantId(u32::MAX)))
            .map(|(_, record)| record.clone())
            .collect())
    }

    // ==================== 原子提交 ====================

    async fn commit(&self, changeset: Changeset) -> DrawResult<()> {
        let mut tables = self.write().await?;

        // 先校验全部版本与手机号，任何失败都不产生写入
        for participant in &changeset.participants {
            let stored = tables
                .participants
                .get(&participant.id)
                .ok_or_else(|| DrawError::not_found("participant", participant.id))?;
            if stored.version != participant.version {
                return Err(DrawError::conflict("participant", participant.id));
            }
            if stored.profile.mobile != participant.profile.mobile {
                if let Some(owner) = tables.mobile_index.get(&participant.profile.mobile) {
                    if *owner != participant.id {
                        return Err(DrawError::already_exists("mobile", &participant.profile.mobile));
                    }
                }
            }
        }
        if let Some(batch) = &changeset.batch {
            let stored = tables
                .batches
                .get(&batch.batch_id)
                .ok_or_else(|| DrawError::not_found("batch", batch.batch_id))?;
            if stored.version != batch.version {
                return Err(DrawError::conflict("batch", batch.batch_id));
            }
        }

        for mut participant in changeset.participants {
            participant.version += 1;
            let previous_mobile = tables
                .participants
                .get(&participant.id)
                .map(|p| p.profile.mobile.clone());
            if let Some(previous) = previous_mobile {
                if previous != participant.profile.mobile {
                    tables.mobile_index.remove(&previous);
                    tables
                        .mobile_index
                        .insert(participant.profile.mobile.clone(), participant.id);
                }
            }
            tables.participants.insert(participant.id, participant);
        }
        if let Some(mut batch) = changeset.batch {
            batch.version += 1;
            tables.batches.insert(batch.batch_id, batch);
        }
        for record in changeset.success_records {
            tables
                .success_records
                .insert((record.batch_id, record.participant_id), record);
        }

        Ok(())
    }

    async fn get_stats(&self) -> DrawResult<StorageStats> {
        let tables = self.read().await?;
        Ok(StorageStats {
            total_participants: tables.participants.len() as u64,
            total_batches: tables.batches.len() as u64,
            total_winners: tables.batches.values().map(|b| b.winners.len() as u64).sum(),
            total_success_records: tables.success_records.len() as u64,
        })
    }
}
