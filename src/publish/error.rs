// ==========================================
// 排班草案引擎 - 发布层错误类型
// ==========================================

use crate::domain::violation::ConstraintViolation;
use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("草案不存在: {0}")]
    DraftNotFound(String),

    #[error("草案状态为 {status},不可发布")]
    InvalidState { status: String },

    /// 存在 error 级违规,草案状态未改变
    #[error("草案存在 {} 个阻断发布的违规", .violations.len())]
    Blocked { violations: Vec<ConstraintViolation> },

    #[error("发布写入失败: {0}")]
    Repository(#[from] RepositoryError),
}

pub type PublishOutcome<T> = Result<T, PublishError>;
