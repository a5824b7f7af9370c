//! Sled 持久化存储实现
//!
//! 提供基于 Sled 嵌入式数据库的持久化存储实现。
//! 多行写入使用跨 Tree 事务，版本校验失败时中止整个事务。

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError};
use sled::Transactional;
use std::path::Path;

use super::{Changeset, DrawStorage, StorageStats};
use crate::config::StorageConfig;
use crate::error::{DrawError, DrawResult};
use crate::types::{BatchId, DrawBatch, Participant, ParticipantId, SuccessRecord};

/// Tree 名称常量
const PARTICIPANTS_TREE: &str = "participants";
const MOBILE_INDEX_TREE: &str = "mobile_index";
const BATCHES_TREE: &str = "batches";
const SUCCESS_RECORDS_TREE: &str = "success_records";

/// Sled 持久化存储
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
    participants: sled::Tree,
    mobile_index: sled::Tree,
    batches: sled::Tree,
    success_records: sled::Tree,
}

/// 预先序列化的参与者写入
struct PreparedParticipant {
    id: ParticipantId,
    key: [u8; 4],
    expected_version: u64,
    mobile: String,
    bytes: Vec<u8>,
}

/// 预先序列化的批次写入
struct PreparedBatch {
    id: BatchId,
    key: [u8; 4],
    expected_version: u64,
    bytes: Vec<u8>,
}

impl SledStorage {
    /// 使用配置创建新的 Sled 存储
    pub fn new(config: &StorageConfig) -> DrawResult<Self> {
        Self::open(&config.data_dir)
    }

    /// 打开或创建 Sled 数据库
    pub fn open<P: AsRef<Path>>(path: P) -> DrawResult<Self> {
        let db = sled::open(path).map_err(|e| DrawError::Storage(format!("Failed to open sled db: {}", e)))?;

        let participants = db.open_tree(PARTICIPANTS_TREE)
            .map_err(|e| DrawError::Storage(format!("Failed to open participants tree: {}", e)))?;
        let mobile_index = db.open_tree(MOBILE_INDEX_TREE)
            .map_err(|e| DrawError::Storage(format!("Failed to open mobile_index tree: {}", e)))?;
        let batches = db.open_tree(BATCHES_TREE)
            .map_err(|e| DrawError::Storage(format!("Failed to open batches tree: {}", e)))?;
        let success_records = db.open_tree(SUCCESS_RECORDS_TREE)
            .map_err(|e| DrawError::Storage(format!("Failed to open success_records tree: {}", e)))?;

        Ok(Self {
            db,
            participants,
            mobile_index,
            batches,
            success_records,
        })
    }

    /// 清空所有数据（慎用）
    pub fn clear(&self) -> DrawResult<()> {
        self.participants.clear().map_err(|e| DrawError::Storage(format!("Failed to clear participants: {}", e)))?;
        self.mobile_index.clear().map_err(|e| DrawError::Storage(format!("Failed to clear mobile_index: {}", e)))?;
        self.batches.clear().map_err(|e| DrawError::Storage(format!("Failed to clear batches: {}", e)))?;
        self.success_records.clear().map_err(|e| DrawError::Storage(format!("Failed to clear success_records: {}", e)))?;
        Ok(())
    }

    /// 刷新到磁盘
    pub fn flush(&self) -> DrawResult<()> {
        self.db.flush().map_err(|e| DrawError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    // ==================== 辅助方法 ====================

    fn serialize<T: Serialize>(value: &T) -> DrawResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| DrawError::Serialization(e.to_string()))
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> DrawResult<T> {
        serde_json::from_slice(bytes).map_err(|e| DrawError::Serialization(e.to_string()))
    }

    fn read_participant(&self, key: &[u8]) -> DrawResult<Option<Participant>> {
        match self.participants.get(key).map_err(|e| DrawError::Storage(format!("Failed to get participant: {}", e)))? {
            Some(bytes) => Ok(Some(Self::deserialize::<Participant>(&bytes)?.hydrate())),
            None => Ok(None),
        }
    }

    fn prepare(changeset: &Changeset) -> DrawResult<(Vec<PreparedParticipant>, Option<PreparedBatch>, Vec<([u8; 8], Vec<u8>)>)> {
        let participants = changeset
            .participants
            .iter()
            .map(|p| {
                let mut next = p.clone();
                next.version = p.version + 1;
                Ok(PreparedParticipant {
                    id: p.id,
                    key: p.id.to_key(),
                    expected_version: p.version,
                    mobile: p.profile.mobile.clone(),
                    bytes: Self::serialize(&next)?,
                })
            })
            .collect::<DrawResult<Vec<_>>>()?;

        let batch = match &changeset.batch {
            Some(b) => {
                let mut next = b.clone();
                next.version = b.version + 1;
                Some(PreparedBatch {
                    id: b.batch_id,
                    key: b.batch_id.to_key(),
                    expected_version: b.version,
                    bytes: Self::serialize(&next)?,
                })
            }
            None => None,
        };

        let records = changeset
            .success_records
            .iter()
            .map(|r| Ok((SuccessRecord::key(r.batch_id, r.participant_id), Self::serialize(r)?)))
            .collect::<DrawResult<Vec<_>>>()?;

        Ok((participants, batch, records))
    }
}

fn abort<T>(error: DrawError) -> ConflictableTransactionResult<T, DrawError> {
    Err(ConflictableTransactionError::Abort(error))
}

fn map_transaction_error(e: TransactionError<DrawError>) -> DrawError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => DrawError::Storage(format!("Failed to commit transaction: {}", e)),
    }
}

#[async_trait]
impl DrawStorage for SledStorage {
    // ==================== 参与者操作 ====================

    async fn insert_participant(&self, participant: &Participant) -> DrawResult<bool> {
        let key = participant.id.to_key();
        let mobile = participant.profile.mobile.clone();
        let value = Self::serialize(participant)?;

        (&self.participants, &self.mobile_index)
            .transaction(|(participants, mobiles)| {
                if participants.get(key)?.is_some() {
                    return Ok(false);
                }
                if mobiles.get(mobile.as_bytes())?.is_some() {
                    return abort(DrawError::already_exists("mobile", &mobile));
                }
                participants.insert(&key[..], value.as_slice())?;
                mobiles.insert(mobile.as_bytes(), &key[..])?;
                Ok(true)
            })
            .map_err(map_transaction_error)
    }

    async fn get_participant(&self, id: ParticipantId) -> DrawResult<Option<Participant>> {
        self.read_participant(&id.to_key())
    }

    async fn get_participant_by_mobile(&self, mobile: &str) -> DrawResult<Option<Participant>> {
        match self.mobile_index.get(mobile.as_bytes())
            .map_err(|e| DrawError::Storage(format!("Failed to get mobile index: {}", e)))?
        {
            Some(key) => self.read_participant(&key),
            None => Ok(None),
        }
    }

    async fn list_participants(&self) -> DrawResult<Vec<Participant>> {
        let mut participants = Vec::new();

        for item in self.participants.iter() {
            let (_, value) = item.map_err(|e| DrawError::Storage(format!("Failed to iterate participants: {}", e)))?;
            participants.push(Self::deserialize::<Participant>(&value)?.hydrate());
        }

        Ok(participants)
    }

    // ==================== 批次操作 ====================

    async fn insert_batch(&self, batch: &DrawBatch) -> DrawResult<bool> {
        let key = batch.batch_id.to_key();
        let value = Self::serialize(batch)?;

        let swapped = self.batches
            .compare_and_swap(key, None as Option<&[u8]>, Some(value))
            .map_err(|e| DrawError::Storage(format!("Failed to insert batch: {}", e)))?;
        Ok(swapped.is_ok())
    }

    async fn get_batch(&self, id: BatchId) -> DrawResult<Option<DrawBatch>> {
        match self.batches.get(id.to_key()).map_err(|e| DrawError::Storage(format!("Failed to get batch: {}", e)))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_batches(&self) -> DrawResult<Vec<DrawBatch>> {
        let mut batches = Vec::new();

        for item in self.batches.iter() {
            let (_, value) = item.map_err(|e| DrawError::Storage(format!("Failed to iterate batches: {}", e)))?;
            batches.push(Self::deserialize(&value)?);
        }

        Ok(batches)
    }

    // ==================== 中奖记录操作 ====================

    async fn get_success_record(
        &self,
        batch: BatchId,
        participant: ParticipantId,
    ) -> DrawResult<Option<SuccessRecord>> {
        let key = SuccessRecord::key(batch, participant);
        match self.success_records.get(key).map_err(|e| DrawError::Storage(format!("Failed to get success record: {}", e)))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_success_records(&self, batch: BatchId) -> DrawResult<Vec<SuccessRecord>> {
        let mut records = Vec::new();

        for item in self.success_records.scan_prefix(batch.to_key()) {
            let (_, value) = item.map_err(|e| DrawError::Storage(format!("Failed to iterate success records: {}", e)))?;
            records.push(Self::deserialize(&value)?);
        }

        Ok(records)
    }

    // ==================== 原子提交 ====================

    async fn commit(&self, changeset: Changeset) -> DrawResult<()> {
        let (participants, batch, records) = Self::prepare(&changeset)?;

        (&self.participants, &self.mobile_index, &self.batches, &self.success_records)
            .transaction(|(participants_tx, mobiles_tx, batches_tx, records_tx)| {
                for p in &participants {
                    let stored = match participants_tx.get(p.key)? {
                        Some(bytes) => bytes,
                        None => return abort(DrawError::not_found("participant", p.id)),
                    };
                    let stored: Participant = match serde_json::from_slice(&stored) {
                        Ok(stored) => stored,
                        Err(e) => return abort(e.into()),
                    };
                    if stored.version != p.expected_version {
                        return abort(DrawError::conflict("participant", p.id));
                    }
                    if stored.profile.mobile != p.mobile {
                        if let Some(owner) = mobiles_tx.get(p.mobile.as_bytes())? {
                            if owner[..] != p.key[..] {
                                return abort(DrawError::already_exists("mobile", &p.mobile));
                            }
                        }
                        mobiles_tx.remove(stored.profile.mobile.as_bytes())?;
                        mobiles_tx.insert(p.mobile.as_bytes(), &p.key[..])?;
                    }
                    participants_tx.insert(&p.key[..], p.bytes.as_slice())?;
                }

                if let Some(b) = &batch {
                    let stored = match batches_tx.get(b.key)? {
                        Some(bytes) => bytes,
                        None => return abort(DrawError::not_found("batch", b.id)),
                    };
                    let stored: DrawBatch = match serde_json::from_slice(&stored) {
                        Ok(stored) => stored,
                        Err(e) => return abort(e.into()),
                    };
                    if stored.version != b.expected_version {
                        return abort(DrawError::conflict("batch", b.id));
                    }
                    batches_tx.insert(&b.key[..], b.bytes.as_slice())?;
                }

                for (key, bytes) in &records {
                    records_tx.insert(&key[..], bytes.as_slice())?;
                }

                Ok(())
            })
            .map_err(map_transaction_error)
    }

    async fn get_stats(&self) -> DrawResult<StorageStats> {
        let mut total_winners = 0u64;
        for batch in self.list_batches().await? {
            total_winners += batch.winners.len() as u64;
        }

        Ok(StorageStats {
            total_participants: self.participants.len() as u64,
            total_batches: self.batches.len() as u64,
            total_winners,
            total_success_records: self.success_records.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state;
    use crate::types::{BatchConfig, Profile};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn create_test_participant(id: u32, mobile: &str) -> Participant {
        Participant::new(ParticipantId(id), Profile::new("tester", mobile), Utc::now())
    }

    fn create_test_batch(id: u32) -> DrawBatch {
        let now = Utc::now();
        DrawBatch::new(
            BatchConfig {
                batch_id: BatchId(id),
                name: format!("batch {}", id),
                prizes: Vec::new(),
                quota: 2,
                order_begin: now - Duration::days(1),
                order_end: now + Duration::days(1),
                draw_at: now + Duration::days(2),
                remarks: String::new(),
            },
            now,
        )
    }

    #[tokio::test]
    async fn test_sled_insert_participant_if_absent() {
        let dir = tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();

        assert!(storage.insert_participant(&create_test_participant(100001, "13800000001")).await.unwrap());
        assert!(!storage.insert_participant(&create_test_participant(100001, "13800000009")).await.unwrap());

        let err = storage
            .insert_participant(&create_test_participant(100002, "13800000001"))
            .await
            .unwrap_err();
        assert!(matches!(err, DrawError::AlreadyExists { .. }));

        // 被拒绝的插入不留下任何数据
        assert!(storage.get_participant(ParticipantId(100002)).await.unwrap().is_none());
        assert!(storage.get_participant_by_mobile("13800000009").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sled_commit_and_conflict() {
        let dir = tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        storage.insert_participant(&create_test_participant(100001, "13800000001")).await.unwrap();
        assert!(storage.insert_batch(&create_test_batch(1)).await.unwrap());
        assert!(!storage.insert_batch(&create_test_batch(1)).await.unwrap());

        let mut p = storage.get_participant(ParticipantId(100001)).await.unwrap().unwrap();
        let stale = p.clone();
        p.state.set(state::ELIGIBILITY, BatchId(1), true).unwrap();
        let record = SuccessRecord::snapshot(&p, &storage.get_batch(BatchId(1)).await.unwrap().unwrap(), Utc::now());

        storage
            .commit(Changeset::new().with_participant(p).with_record(record))
            .await
            .unwrap();

        let err = storage.commit(Changeset::new().with_participant(stale)).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = storage.get_participant(ParticipantId(100001)).await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert!(stored.is_eligible(BatchId(1)));

        let records = storage.list_success_records(BatchId(1)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].eligible);
        assert!(storage.list_success_records(BatchId(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sled_stale_batch_aborts_participant_writes() {
        let dir = tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        storage.insert_participant(&create_test_participant(100001, "13800000001")).await.unwrap();
        storage.insert_batch(&create_test_batch(1)).await.unwrap();

        let batch = storage.get_batch(BatchId(1)).await.unwrap().unwrap();
        storage.commit(Changeset::new().with_batch(batch.clone())).await.unwrap();

        let mut p = storage.get_participant(ParticipantId(100001)).await.unwrap().unwrap();
        p.state.set(state::PARTICIPATION, BatchId(1), true).unwrap();
        let err = storage
            .commit(Changeset::new().with_participant(p).with_batch(batch))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = storage.get_participant(ParticipantId(100001)).await.unwrap().unwrap();
        assert_eq!(stored.version, 0);
        assert!(!stored.has_participated(BatchId(1)));
    }

    #[tokio::test]
    async fn test_sled_persistence() {
        let dir = tempdir().unwrap();

        // 创建存储并写入数据
        {
            let storage = SledStorage::open(dir.path()).unwrap();
            storage.insert_participant(&create_test_participant(100001, "18107290804")).await.unwrap();
            storage.insert_batch(&create_test_batch(1)).await.unwrap();
            storage.flush().unwrap();
        }

        // 重新打开存储并验证数据仍然存在
        {
            let storage = SledStorage::open(dir.path()).unwrap();
            let p = storage.get_participant_by_mobile("18107290804").await.unwrap().unwrap();
            assert_eq!(p.id, ParticipantId(100001));
            assert_eq!(storage.list_batches().await.unwrap().len(), 1);

            let stats = storage.get_stats().await.unwrap();
            assert_eq!(stats.total_participants, 1);
            assert_eq!(stats.total_batches, 1);
        }
    }

    #[tokio::test]
    async fn test_sled_clear() {
        let dir = tempdir().unwrap();
        let storage = SledStorage::open(dir.path()).unwrap();
        storage.insert_participant(&create_test_participant(100001, "13800000001")).await.unwrap();

        storage.clear().unwrap();

        let stats = storage.get_stats().await.unwrap();
        assert_eq!(stats.total_participants, 0);
        assert!(storage.list_participants().await.unwrap().is_empty());
    }
}
