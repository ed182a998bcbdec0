// ==========================================
// 排班草案引擎 - 持久化协作者接口
// ==========================================
// 职责: 定义核心引擎访问存储的窄接口（不包含实现）
// 红线: 核心不拼 SQL，只通过该 trait 读写
// 实现者: SqliteScheduleStore
// ==========================================

use crate::domain::draft::{DateRange, ScheduleDraft, ScheduleSnapshot};
use crate::domain::shift::Shift;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    // ===== 快照读取 =====

    /// 读取商户在日期范围内的班次与员工快照
    async fn load_snapshot(
        &self,
        business_id: &str,
        date_range: DateRange,
    ) -> RepositoryResult<ScheduleSnapshot>;

    // ===== 草案写入 =====

    /// 推送草案中被修改的班次（自动同步）
    ///
    /// # 返回
    /// - Ok(()): 同步成功
    /// - Err: 同步失败，调用方保留本地编辑
    async fn save_modified_shifts(&self, draft_id: &str, shifts: &[Shift]) -> RepositoryResult<()>;

    /// 将草案提交为权威排班（写入线上班次/分配）
    async fn commit_published(&self, draft_id: &str) -> RepositoryResult<()>;

    // ===== 草案记录 =====

    /// 保存草案记录（插入或覆盖）
    async fn save_draft(&self, draft: &ScheduleDraft) -> RepositoryResult<()>;

    /// 按ID查找草案
    async fn find_draft(&self, draft_id: &str) -> RepositoryResult<Option<ScheduleDraft>>;

    /// 查找与日期范围重叠的已发布草案
    async fn find_published_overlapping(
        &self,
        business_id: &str,
        date_range: DateRange,
    ) -> RepositoryResult<Vec<ScheduleDraft>>;
}
