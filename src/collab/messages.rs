// ==========================================
// 排班草案引擎 - 协同消息协议
// ==========================================
// 职责: 客户端/服务端消息的封闭枚举 (按 type 字段标记)
// 红线: 新增消息必须新增变体,由编译器保证穷举处理
// ==========================================

use crate::domain::collaboration::{
    ConflictResolution, EditConflict, EditLock, LockResource, PresenceInfo,
};
use crate::domain::edit_action::{Actor, EditAction};
use crate::domain::types::EditorActivity;
use serde::{Deserialize, Serialize};

/// 客户端 -> 会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        editor: Actor,
    },
    Presence {
        activity: EditorActivity,
        draft_id: Option<String>,
        shift_id: Option<String>,
    },
    AcquireLock {
        request_id: String,
        resource: LockResource,
    },
    ReleaseLock {
        resource: LockResource,
    },
    Edit {
        draft_id: String,
        edit: EditAction,
    },
    ResolveConflict {
        conflict_id: String,
        resolution: ConflictResolution,
    },
    Leave,
}

/// 会话 -> 客户端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 当前在线编辑者全集 (接收方做差分)
    PresenceSnapshot {
        editors: Vec<PresenceInfo>,
    },
    /// 当前锁全集
    LockSnapshot {
        locks: Vec<EditLock>,
    },
    LockResult {
        request_id: String,
        granted: bool,
        holder: Option<Actor>,
    },
    /// 仅发给加锁失败的请求方
    LockConflict {
        resource: LockResource,
        holder: Actor,
    },
    EditApplied {
        draft_id: String,
        edit: EditAction,
    },
    ConflictDetected {
        conflict: EditConflict,
    },
    ConflictResolved {
        conflict_id: String,
        resolution: ConflictResolution,
        rejected_edit_ids: Vec<String>,
        resolved_by: Actor,
    },
    Error {
        message: String,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Presence { .. } => "presence",
            ClientMessage::AcquireLock { .. } => "acquire_lock",
            ClientMessage::ReleaseLock { .. } => "release_lock",
            ClientMessage::Edit { .. } => "edit",
            ClientMessage::ResolveConflict { .. } => "resolve_conflict",
            ClientMessage::Leave => "leave",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_tagged() {
        let msg = ClientMessage::ReleaseLock {
            resource: LockResource::shift("S1"),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "release_lock");
        assert_eq!(json["resource"]["resource_type"], "shift");

        let parsed: ServerMessage =
            serde_json::from_str(r#"{"type":"error","message":"boom"}"#).unwrap();
        assert_eq!(
            parsed,
            ServerMessage::Error {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }
}
