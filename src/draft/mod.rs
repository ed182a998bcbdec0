// ==========================================
// 排班草案引擎 - 草案编辑层
// ==========================================
// 职责: 草案状态机 (撤销/重做/重置)、变更摘要、自动同步
// 红线: 编辑只作用于内存草案,持久化仅经由自动同步或发布
// ==========================================

pub mod auto_sync;
pub mod error;
pub mod history;
mod ops;
pub mod state_machine;
pub mod summary;

#[cfg(test)]
mod tests;

pub use auto_sync::{AutoSync, SyncState};
pub use error::{DraftError, DraftResult};
pub use history::EditHistory;
pub use state_machine::{DraftAction, DraftStateMachine, Transition};
pub use summary::{AssignmentChange, ChangeSummary};
