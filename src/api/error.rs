// ==========================================
// 排班草案引擎 - API层错误类型
// ==========================================
// 职责: 汇总各层错误,转换为调用方可理解的错误消息
// 红线: 校验失败必须携带违规明细 (可解释性)
// ==========================================

use crate::collab::CollabError;
use crate::domain::violation::ConstraintViolation;
use crate::draft::DraftError;
use crate::engine::EngineError;
use crate::publish::PublishError;
use crate::repository::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    /// 操作前置条件不满足 (如无可撤销的编辑)
    #[error("操作前置条件不满足: {0}")]
    PreconditionFailed(String),

    /// 约束校验失败 (带违规明细)
    #[error("约束校验失败: {reason}")]
    ValidationFailed {
        reason: String,
        violations: Vec<ConstraintViolation>,
    },

    #[error("操作已取消")]
    Cancelled,

    // ==========================================
    // 数据访问与集成错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("配置读取失败: {0}")]
    ConfigError(String),

    #[error("外部集成失败: {0}")]
    IntegrationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 违规明细 (仅校验失败时非空)
    pub fn violations(&self) -> &[ConstraintViolation] {
        match self {
            ApiError::ValidationFailed { violations, .. } => violations,
            _ => &[],
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Timeout(msg) => ApiError::IntegrationError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
            other => ApiError::DatabaseError(other.to_string()),
        }
    }
}

// ==========================================
// 从 DraftError 转换
// ==========================================
impl From<DraftError> for ApiError {
    fn from(err: DraftError) -> Self {
        match err {
            DraftError::NotLoaded => ApiError::NotFound("编辑会话未加载草案".to_string()),
            DraftError::NotEditable { status } => ApiError::InvalidStateTransition {
                from: status,
                to: "edit".to_string(),
            },
            DraftError::UnknownShift(id) => ApiError::NotFound(format!("班次(id={})不存在", id)),
            DraftError::UnknownAssignment(id) => {
                ApiError::NotFound(format!("分配(id={})不存在", id))
            }
            DraftError::UnknownEdit(id) => ApiError::NotFound(format!("编辑(id={})不存在", id)),
            e @ (DraftError::HistoryUnderflow | DraftError::HistoryOverflow) => {
                ApiError::PreconditionFailed(e.to_string())
            }
            e @ DraftError::ReplayMismatch { .. } => ApiError::InternalError(e.to_string()),
            DraftError::SyncFailed(msg) => ApiError::IntegrationError(msg),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => ApiError::Cancelled,
            EngineError::SnapshotLoad(e) => e.into(),
            EngineError::InvalidStrategy(msg) => ApiError::InvalidInput(msg),
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::DraftNotFound(id) => {
                ApiError::NotFound(format!("ScheduleDraft(id={})不存在", id))
            }
            PublishError::InvalidState { status } => ApiError::InvalidStateTransition {
                from: status,
                to: "published".to_string(),
            },
            PublishError::Blocked { violations } => ApiError::ValidationFailed {
                reason: format!("草案存在 {} 个阻断发布的违规", violations.len()),
                violations,
            },
            PublishError::Repository(e) => e.into(),
        }
    }
}

impl From<CollabError> for ApiError {
    fn from(err: CollabError) -> Self {
        match err {
            CollabError::Draft(e) => e.into(),
            CollabError::UnknownConflict(id) => {
                ApiError::NotFound(format!("冲突(id={})不存在或已裁决", id))
            }
            other => ApiError::IntegrationError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
