//! 抽奖存储层
//!
//! 提供参与者、抽奖批次与中奖记录的持久化接口和实现。
//!
//! # 设计原则
//!
//! - 参与者 ID 通过 insert-if-absent 占位，并发分配不会重复
//! - 手机号唯一，由索引保证
//! - 所有多行写入通过 [`Changeset`] 一次性原子提交
//! - 参与者与批次携带版本号，提交时比较并交换，版本不符即整体放弃

pub mod memory;
pub mod sled;

use async_trait::async_trait;

use crate::error::DrawResult;
use crate::types::{BatchId, DrawBatch, Participant, ParticipantId, SuccessRecord};

/// 原子提交单元
///
/// `participants` 与 `batch` 中记录的 `version` 必须是读取时的版本，
/// 提交成功后存储中的版本加一。
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    /// 更新的参与者
    pub participants: Vec<Participant>,
    /// 更新的批次
    pub batch: Option<DrawBatch>,
    /// 覆盖写入的中奖记录
    pub success_records: Vec<SuccessRecord>,
}

impl Changeset {
    /// 创建空提交
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入参与者
    pub fn with_participant(mut self, participant: Participant) -> Self {
        self.participants.push(participant);
        self
    }

    /// 设置批次
    pub fn with_batch(mut self, batch: DrawBatch) -> Self {
        self.batch = Some(batch);
        self
    }

    /// 加入中奖记录
    pub fn with_record(mut self, record: SuccessRecord) -> Self {
        self.success_records.push(record);
        self
    }

    /// 是否没有任何写入
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.batch.is_none() && self.success_records.is_empty()
    }
}

/// 抽奖存储接口
#[async_trait]
pub trait DrawStorage: Send + Sync {
    // ==================== 参与者操作 ====================

    /// 插入新参与者（ID 不存在时）
    ///
    /// ID 已被占用返回 `Ok(false)`；手机号已被占用返回 `AlreadyExists`。
    async fn insert_participant(&self, participant: &Participant) -> DrawResult<bool>;

    /// 获取参与者
    async fn get_participant(&self, id: ParticipantId) -> DrawResult<Option<Participant>>;

    /// 根据手机号获取参与者
    async fn get_participant_by_mobile(&self, mobile: &str) -> DrawResult<Option<Participant>>;

    /// 列出所有参与者
    async fn list_participants(&self) -> DrawResult<Vec<Participant>>;

    // ==================== 批次操作 ====================

    /// 插入新批次（批次 ID 不存在时），已存在返回 `Ok(false)`
    async fn insert_batch(&self, batch: &DrawBatch) -> DrawResult<bool>;

    /// 获取批次
    async fn get_batch(&self, id: BatchId) -> DrawResult<Option<DrawBatch>>;

    /// 列出所有批次
    async fn list_batches(&self) -> DrawResult<Vec<DrawBatch>>;

    // ==================== 中奖记录操作 ====================

    /// 获取中奖记录
    async fn get_success_record(
        &self,
        batch: BatchId,
        participant: ParticipantId,
    ) -> DrawResult<Option<SuccessRecord>>;

    /// 列出批次的所有记录
    async fn list_success_records(&self, batch: BatchId) -> DrawResult<Vec<SuccessRecord>>;

    // ==================== 原子提交 ====================

    /// 原子提交
    ///
    /// 任一参与者或批次版本不符时返回 `Conflict`，且不写入任何数据。
    async fn commit(&self, changeset: Changeset) -> DrawResult<()>;

    /// 获取统计信息
    async fn get_stats(&self) -> DrawResult<StorageStats>;
}

/// 存储统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// 参与者总数
    pub total_participants: u64,
    /// 批次总数
    pub total_batches: u64,
    /// 中奖者总数（各批次合计）
    pub total_winners: u64,
    /// 记录总数
    pub total_success_records: u64,
}

// 重新导出
pub use memory::MemoryStorage;
pub use self::sled::SledStorage;
