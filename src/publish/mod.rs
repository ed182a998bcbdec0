// ==========================================
// 排班草案引擎 - 发布层
// ==========================================

pub mod error;
pub mod orchestrator;


pub use error::{PublishError, PublishOutcome};
pub use orchestrator::{FailedNotification, PublishOptions, PublishOrchestrator, PublishResult};
