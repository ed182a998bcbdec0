// ==========================================
// 排班草案引擎 - 编辑操作领域模型
// ==========================================
// 职责: 记录一次用户可见的草案变更 (assign / unassign / move)
// 红线: 只记录反演所需的最小增量,不保存整份草案快照
// 用途: 撤销/重做日志、审计、协同转发
// ==========================================

use crate::domain::shift::Assignment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// Actor - 操作人
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub actor_id: String,
    pub actor_name: String,
}

impl Actor {
    pub fn new(actor_id: impl Into<String>, actor_name: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            actor_name: actor_name.into(),
        }
    }

    /// 系统操作人 (自动生成/冲突补偿)
    pub fn system() -> Self {
        Self::new("system", "系统")
    }
}

// ==========================================
// EditKind - 编辑类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditKind {
    Assign,
    Unassign,
    Move,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditKind::Assign => "assign",
            EditKind::Unassign => "unassign",
            EditKind::Move => "move",
        }
    }
}

// ==========================================
// EditOperation - 变更增量 (前后负载)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EditOperation {
    /// 追加分配到班次末尾
    Assign {
        shift_id: String,
        assignment: Assignment,
        shift_was_modified: bool,
    },
    /// 从班次移除分配 (position 用于原位恢复)
    Unassign {
        shift_id: String,
        assignment: Assignment,
        position: usize,
        shift_was_modified: bool,
    },
    /// 原子地从源班次移到目标班次末尾
    Move {
        from_shift_id: String,
        to_shift_id: String,
        before: Assignment,
        after: Assignment,
        from_position: usize,
        from_was_modified: bool,
        to_was_modified: bool,
    },
}

impl EditOperation {
    pub fn kind(&self) -> EditKind {
        match self {
            EditOperation::Assign { .. } => EditKind::Assign,
            EditOperation::Unassign { .. } => EditKind::Unassign,
            EditOperation::Move { .. } => EditKind::Move,
        }
    }

    /// 本次变更涉及的班次
    pub fn touched_shift_ids(&self) -> Vec<&str> {
        match self {
            EditOperation::Assign { shift_id, .. } | EditOperation::Unassign { shift_id, .. } => {
                vec![shift_id.as_str()]
            }
            EditOperation::Move {
                from_shift_id,
                to_shift_id,
                ..
            } => vec![from_shift_id.as_str(), to_shift_id.as_str()],
        }
    }

    /// 本次变更涉及的分配ID
    pub fn assignment_id(&self) -> &str {
        match self {
            EditOperation::Assign { assignment, .. } | EditOperation::Unassign { assignment, .. } => {
                &assignment.assignment_id
            }
            EditOperation::Move { after, .. } => &after.assignment_id,
        }
    }

    /// 本次变更涉及的员工
    pub fn staff_id(&self) -> &str {
        match self {
            EditOperation::Assign { assignment, .. } | EditOperation::Unassign { assignment, .. } => {
                &assignment.staff_id
            }
            EditOperation::Move { after, .. } => &after.staff_id,
        }
    }
}

// ==========================================
// EditAction - 编辑动作 (撤销/重做日志条目)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditAction {
    pub edit_id: String,
    pub operation: EditOperation,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

impl EditAction {
    pub fn new(operation: EditOperation, actor: Actor) -> Self {
        let description = describe(&operation, &actor);
        Self {
            edit_id: uuid::Uuid::new_v4().to_string(),
            operation,
            actor,
            timestamp: Utc::now(),
            description,
        }
    }

    pub fn kind(&self) -> EditKind {
        self.operation.kind()
    }

    pub fn touched_shift_ids(&self) -> Vec<&str> {
        self.operation.touched_shift_ids()
    }

    /// 是否与另一编辑触及同一班次
    pub fn touches_same_resource(&self, other: &EditAction) -> bool {
        let mine = self.touched_shift_ids();
        other.touched_shift_ids().iter().any(|id| mine.contains(id))
    }
}

/// 生成可读描述
fn describe(operation: &EditOperation, actor: &Actor) -> String {
    match operation {
        EditOperation::Assign {
            shift_id,
            assignment,
            ..
        } => format!(
            "{} 将 {} 分配到班次 {}",
            actor.actor_name, assignment.staff_name, shift_id
        ),
        EditOperation::Unassign {
            shift_id,
            assignment,
            ..
        } => format!(
            "{} 将 {} 移出班次 {}",
            actor.actor_name, assignment.staff_name, shift_id
        ),
        EditOperation::Move {
            from_shift_id,
            to_shift_id,
            after,
            ..
        } => format!(
            "{} 将 {} 从班次 {} 调到班次 {}",
            actor.actor_name, after.staff_name, from_shift_id, to_shift_id
        ),
    }
}
