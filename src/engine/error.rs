// ==========================================
// 排班草案引擎 - 引擎层错误类型
// ==========================================

use crate::repository::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("草案生成已取消")]
    Cancelled,

    #[error("读取排班快照失败: {0}")]
    SnapshotLoad(#[from] RepositoryError),

    #[error("无效的策略: {0}")]
    InvalidStrategy(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
