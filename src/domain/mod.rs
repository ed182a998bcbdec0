// ==========================================
// 排班草案引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod collaboration;
pub mod draft;
pub mod edit_action;
pub mod shift;
pub mod staff;
pub mod types;
pub mod violation;

// 重导出核心类型
pub use collaboration::{ConflictResolution, EditConflict, EditLock, LockResource, PresenceInfo};
pub use draft::{DateRange, ScheduleDraft, ScheduleSnapshot, SpecialEvent, StaffNote};
pub use edit_action::{Actor, EditAction, EditKind, EditOperation};
pub use shift::{Assignment, Shift};
pub use staff::{AvailabilityWindow, StaffCandidate, UnavailablePeriod};
pub use types::{
    AssignmentStatus, ConstraintType, DraftOrigin, DraftStatus, EditorActivity, ResourceType,
    Severity, ShiftStatus,
};
pub use violation::{ConstraintViolation, DraftValidation, PenaltyVector, ValidationResult};
