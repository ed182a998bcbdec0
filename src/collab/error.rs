// ==========================================
// 排班草案引擎 - 协同层错误类型
// ==========================================

use crate::draft::DraftError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CollabError {
    #[error("实时连接已关闭")]
    TransportClosed,

    #[error("尚未连接协同会话")]
    NotConnected,

    #[error("重连失败,已尝试 {attempts} 次: {last_error}")]
    ReconnectExhausted { attempts: u32, last_error: String },

    #[error("冲突不存在或已裁决: {0}")]
    UnknownConflict(String),

    #[error("连接失败: {0}")]
    ConnectFailed(String),

    #[error(transparent)]
    Draft(#[from] DraftError),
}

pub type CollabResult<T> = Result<T, CollabError>;
