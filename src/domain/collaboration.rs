// ==========================================
// 排班草案引擎 - 协同编辑领域模型
// ==========================================
// 职责: 在线状态、编辑锁、编辑冲突
// 红线: 全部为会话级临时状态,可仅凭在线客户端重建,不做持久化
// ==========================================

use crate::domain::edit_action::{Actor, EditAction};
use crate::domain::types::{EditorActivity, ResourceType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// LockResource - 锁资源键
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LockResource {
    pub resource_type: ResourceType,
    pub resource_id: String,
}

impl LockResource {
    pub fn shift(shift_id: impl Into<String>) -> Self {
        Self {
            resource_type: ResourceType::Shift,
            resource_id: shift_id.into(),
        }
    }
}

impl fmt::Display for LockResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource_type, self.resource_id)
    }
}

// ==========================================
// EditLock - 编辑锁
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditLock {
    pub resource: LockResource,
    pub holder: Actor,
    pub acquired_at: DateTime<Utc>,
}

// ==========================================
// PresenceInfo - 在线状态广播
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub editor: Actor,
    pub activity: EditorActivity,
    pub draft_id: Option<String>,
    pub shift_id: Option<String>,
}

// ==========================================
// ConflictResolution - 冲突裁决
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    AcceptEdit1, // 保留先到的编辑
    AcceptEdit2, // 保留后到的编辑
    Merge,       // 两者都保留
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::AcceptEdit1 => "accept_edit1",
            ConflictResolution::AcceptEdit2 => "accept_edit2",
            ConflictResolution::Merge => "merge",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "accept_edit1" => Some(ConflictResolution::AcceptEdit1),
            "accept_edit2" => Some(ConflictResolution::AcceptEdit2),
            "merge" => Some(ConflictResolution::Merge),
            _ => None,
        }
    }
}

// ==========================================
// EditConflict - 并发编辑冲突
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditConflict {
    pub conflict_id: String,
    pub resource: LockResource,
    pub edit1: EditAction, // 先到
    pub edit2: EditAction, // 后到
    pub detected_at: DateTime<Utc>,
}

impl EditConflict {
    /// 按裁决结果返回被拒绝的编辑
    pub fn rejected_edits(&self, resolution: ConflictResolution) -> Vec<&EditAction> {
        match resolution {
            ConflictResolution::AcceptEdit1 => vec![&self.edit2],
            ConflictResolution::AcceptEdit2 => vec![&self.edit1],
            ConflictResolution::Merge => Vec::new(),
        }
    }

    /// 冲突摘要 (两侧编辑描述)
    pub fn summary(&self) -> String {
        format!(
            "{} 上的并发编辑: [1] {} / [2] {}",
            self.resource, self.edit1.description, self.edit2.description
        )
    }
}
