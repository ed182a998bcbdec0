// ==========================================
// 排班草案引擎 - API 层
// ==========================================
// 职责: 提供面向调用方的业务接口
// ==========================================

pub mod error;
pub mod scheduling_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use scheduling_api::{EditOptions, EditOutcome, SchedulingApi};
