// ==========================================
// 排班草案引擎 - 领域类型定义
// ==========================================
// 职责: 班次/分配/草案状态、约束类型、严重级别等枚举
// 序列化格式: snake_case (与存储、消息一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 班次状态 (Shift Status)
// ==========================================
// 红线: 草案内状态由 "有效分配数 vs 需求人数" 纯函数推导
// Scheduled 仅在发布时写入
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Open,         // 无人
    Understaffed, // 人手不足
    Filled,       // 已满员
    Scheduled,    // 已发布排定
}

impl ShiftStatus {
    /// 由有效分配数与需求人数推导状态
    pub fn derive(active_count: usize, required_staff_count: u32) -> Self {
        let required = required_staff_count as usize;
        if active_count >= required {
            ShiftStatus::Filled
        } else if active_count > 0 {
            ShiftStatus::Understaffed
        } else {
            ShiftStatus::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Open => "open",
            ShiftStatus::Understaffed => "understaffed",
            ShiftStatus::Filled => "filled",
            ShiftStatus::Scheduled => "scheduled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ShiftStatus::Open),
            "understaffed" => Some(ShiftStatus::Understaffed),
            "filled" => Some(ShiftStatus::Filled),
            "scheduled" => Some(ShiftStatus::Scheduled),
            _ => None,
        }
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 分配状态 (Assignment Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,     // 已分配
    Confirmed,    // 员工已确认
    CalledInSick, // 请病假
    NoShow,       // 缺勤
}

impl AssignmentStatus {
    /// 是否计入班次有效人数
    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentStatus::Assigned | AssignmentStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::Confirmed => "confirmed",
            AssignmentStatus::CalledInSick => "called_in_sick",
            AssignmentStatus::NoShow => "no_show",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "assigned" => Some(AssignmentStatus::Assigned),
            "confirmed" => Some(AssignmentStatus::Confirmed),
            "called_in_sick" => Some(AssignmentStatus::CalledInSick),
            "no_show" => Some(AssignmentStatus::NoShow),
            _ => None,
        }
    }
}

// ==========================================
// 草案生命周期 (Draft Status)
// ==========================================
// 红线: draft → published → archived 单向流转
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Published,
    Archived,
}

impl DraftStatus {
    /// 判断是否允许流转到目标状态
    pub fn can_transition_to(&self, target: DraftStatus) -> bool {
        matches!(
            (self, target),
            (DraftStatus::Draft, DraftStatus::Published)
                | (DraftStatus::Published, DraftStatus::Archived)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Published => "published",
            DraftStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DraftStatus::Draft),
            "published" => Some(DraftStatus::Published),
            "archived" => Some(DraftStatus::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for DraftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 草案来源 (Draft Origin)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOrigin {
    Generated, // 自动排班生成
    Manual,    // 人工新建
}

// ==========================================
// 违规严重级别 (Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

// ==========================================
// 约束类型 (Constraint Type)
// ==========================================
// 硬约束: 技能 / 可用性 / 重叠排班
// 软约束: 周工时 / 最小休息 / 连续天数 / 分配均衡 / 人工成本 / 覆盖不足
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintType {
    SkillMismatch,
    Unavailable,
    DoubleBooking,
    UnknownStaff,
    WeeklyHours,
    MinRest,
    ConsecutiveDays,
    Distribution,
    LaborCost,
    Understaffed,
}

impl ConstraintType {
    /// 是否为硬约束
    pub fn is_hard(&self) -> bool {
        matches!(
            self,
            ConstraintType::SkillMismatch
                | ConstraintType::Unavailable
                | ConstraintType::DoubleBooking
                | ConstraintType::UnknownStaff
        )
    }

    /// 默认严重级别
    pub fn default_severity(&self) -> Severity {
        if self.is_hard() {
            Severity::Error
        } else {
            Severity::Warning
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintType::SkillMismatch => "skill_mismatch",
            ConstraintType::Unavailable => "unavailable",
            ConstraintType::DoubleBooking => "double_booking",
            ConstraintType::UnknownStaff => "unknown_staff",
            ConstraintType::WeeklyHours => "weekly_hours",
            ConstraintType::MinRest => "min_rest",
            ConstraintType::ConsecutiveDays => "consecutive_days",
            ConstraintType::Distribution => "distribution",
            ConstraintType::LaborCost => "labor_cost",
            ConstraintType::Understaffed => "understaffed",
        }
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 编辑者活动 (Editor Activity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorActivity {
    Viewing,
    Editing,
    Idle,
}

// ==========================================
// 锁资源类型 (Resource Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Shift,
    Draft,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Shift => write!(f, "shift"),
            ResourceType::Draft => write!(f, "draft"),
        }
    }
}
