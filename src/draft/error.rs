// ==========================================
// 排班草案引擎 - 草案状态机错误类型
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DraftError {
    #[error("尚未加载草案")]
    NotLoaded,

    #[error("草案状态为 {status},不可编辑")]
    NotEditable { status: String },

    #[error("班次不存在: {0}")]
    UnknownShift(String),

    #[error("分配不存在: {0}")]
    UnknownAssignment(String),

    #[error("编辑记录不存在: {0}")]
    UnknownEdit(String),

    // ===== 不变量违反 =====
    #[error("已到达历史起点,无法撤销")]
    HistoryUnderflow,

    #[error("已到达历史终点,无法重做")]
    HistoryOverflow,

    #[error("编辑日志重放不一致 (index={index}): {detail}")]
    ReplayMismatch { index: usize, detail: String },

    // ===== 集成错误 =====
    #[error("草案同步失败: {0}")]
    SyncFailed(String),
}

pub type DraftResult<T> = Result<T, DraftError>;
