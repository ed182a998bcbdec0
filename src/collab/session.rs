// ==========================================
// 排班草案引擎 - 协同会话 (单商户)
// ==========================================
// 职责: 在线状态、编辑锁、并发编辑冲突检测
// 红线: 纯状态机,不做 I/O; 每次处理返回待投递的消息
// 红线: 会话只检测并报告冲突,不合并数据
// 红线: 状态可仅凭在线客户端重建,不做持久化
// ==========================================

use crate::collab::messages::{ClientMessage, ServerMessage};
use crate::config::CollaborationConfig;
use crate::domain::collaboration::{EditConflict, EditLock, LockResource, PresenceInfo};
use crate::domain::edit_action::{Actor, EditAction};
use crate::domain::types::EditorActivity;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// 会话内连接标识
pub type ConnectionId = u64;

/// 投递范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Only(ConnectionId),
    /// 除发送方以外
    Others(ConnectionId),
}

impl Audience {
    pub fn includes(&self, conn: ConnectionId) -> bool {
        match self {
            Audience::All => true,
            Audience::Only(target) => *target == conn,
            Audience::Others(sender) => *sender != conn,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub message: ServerMessage,
}

impl Outbound {
    fn all(message: ServerMessage) -> Self {
        Self {
            audience: Audience::All,
            message,
        }
    }

    fn only(conn: ConnectionId, message: ServerMessage) -> Self {
        Self {
            audience: Audience::Only(conn),
            message,
        }
    }
}

#[derive(Debug, Clone)]
struct LockEntry {
    lock: EditLock,
    connection: ConnectionId,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct RecentEdit {
    draft_id: String,
    edit: EditAction,
    received_at: Instant,
}

// ==========================================
// CollaborationSession
// ==========================================
pub struct CollaborationSession {
    business_id: String,
    config: CollaborationConfig,
    editors: BTreeMap<ConnectionId, PresenceInfo>,
    locks: HashMap<LockResource, LockEntry>,
    recent_edits: Vec<RecentEdit>,
    conflicts: BTreeMap<String, EditConflict>,
}

impl CollaborationSession {
    pub fn new(business_id: impl Into<String>, config: CollaborationConfig) -> Self {
        Self {
            business_id: business_id.into(),
            config,
            editors: BTreeMap::new(),
            locks: HashMap::new(),
            recent_edits: Vec::new(),
            conflicts: BTreeMap::new(),
        }
    }

    pub fn business_id(&self) -> &str {
        &self.business_id
    }

    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }

    pub fn editor_count(&self) -> usize {
        self.editors.len()
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &EditConflict> {
        self.conflicts.values()
    }

    pub fn lock_holder(&self, resource: &LockResource) -> Option<&Actor> {
        self.locks.get(resource).map(|e| &e.lock.holder)
    }

    /// 处理一条客户端消息
    pub fn handle(
        &mut self,
        conn: ConnectionId,
        message: ClientMessage,
        now: Instant,
    ) -> Vec<Outbound> {
        if let ClientMessage::Join { editor } = message {
            return self.join(conn, editor);
        }
        let Some(editor) = self.editors.get(&conn).map(|p| p.editor.clone()) else {
            return vec![Outbound::only(
                conn,
                ServerMessage::Error {
                    message: format!("连接未加入会话,忽略 {}", message.kind()),
                },
            )];
        };

        match message {
            ClientMessage::Join { .. } => Vec::new(),
            ClientMessage::Presence {
                activity,
                draft_id,
                shift_id,
            } => self.update_presence(conn, activity, draft_id, shift_id),
            ClientMessage::AcquireLock {
                request_id,
                resource,
            } => self.acquire_lock(conn, editor, request_id, resource, now),
            ClientMessage::ReleaseLock { resource } => self.release_lock(conn, &editor, &resource),
            ClientMessage::Edit { draft_id, edit } => self.relay_edit(conn, draft_id, edit, now),
            ClientMessage::ResolveConflict {
                conflict_id,
                resolution,
            } => match self.conflicts.remove(&conflict_id) {
                Some(conflict) => {
                    info!(
                        business_id = %self.business_id,
                        conflict_id = %conflict_id,
                        resolution = resolution.as_str(),
                        editor_id = %editor.actor_id,
                        "编辑冲突已裁决"
                    );
                    let rejected_edit_ids = conflict
                        .rejected_edits(resolution)
                        .into_iter()
                        .map(|e| e.edit_id.clone())
                        .collect();
                    vec![Outbound::all(ServerMessage::ConflictResolved {
                        conflict_id,
                        resolution,
                        rejected_edit_ids,
                        resolved_by: editor,
                    })]
                }
                None => vec![Outbound::only(
                    conn,
                    ServerMessage::Error {
                        message: format!("冲突不存在或已裁决: {}", conflict_id),
                    },
                )],
            },
            ClientMessage::Leave => self.disconnect(conn),
        }
    }

    /// 连接断开: 移除在线状态并释放其持有的锁 (可重复调用)
    pub fn disconnect(&mut self, conn: ConnectionId) -> Vec<Outbound> {
        let Some(presence) = self.editors.remove(&conn) else {
            return Vec::new();
        };
        let before = self.locks.len();
        self.locks.retain(|_, entry| entry.connection != conn);
        info!(
            business_id = %self.business_id,
            editor_id = %presence.editor.actor_id,
            released_locks = before - self.locks.len(),
            "编辑者离开会话"
        );

        let mut out = vec![Outbound::all(self.presence_snapshot())];
        if self.locks.len() != before {
            out.push(Outbound::all(self.lock_snapshot()));
        }
        out
    }

    // ===== 在线状态 =====

    fn join(&mut self, conn: ConnectionId, editor: Actor) -> Vec<Outbound> {
        info!(business_id = %self.business_id, editor_id = %editor.actor_id, "编辑者加入会话");
        self.editors.insert(
            conn,
            PresenceInfo {
                editor,
                activity: EditorActivity::Viewing,
                draft_id: None,
                shift_id: None,
            },
        );
        let mut out = vec![
            Outbound::all(self.presence_snapshot()),
            Outbound::only(conn, self.lock_snapshot()),
        ];
        for conflict in self.conflicts.values() {
            out.push(Outbound::only(
                conn,
                ServerMessage::ConflictDetected {
                    conflict: conflict.clone(),
                },
            ));
        }
        out
    }

    fn update_presence(
        &mut self,
        conn: ConnectionId,
        activity: EditorActivity,
        draft_id: Option<String>,
        shift_id: Option<String>,
    ) -> Vec<Outbound> {
        let Some(presence) = self.editors.get_mut(&conn) else {
            return Vec::new();
        };
        let next = PresenceInfo {
            editor: presence.editor.clone(),
            activity,
            draft_id,
            shift_id,
        };
        if *presence == next {
            return Vec::new();
        }
        *presence = next;
        vec![Outbound::all(self.presence_snapshot())]
    }

    fn presence_snapshot(&self) -> ServerMessage {
        ServerMessage::PresenceSnapshot {
            editors: self.editors.values().cloned().collect(),
        }
    }

    // ===== 编辑锁 =====

    fn acquire_lock(
        &mut self,
        conn: ConnectionId,
        editor: Actor,
        request_id: String,
        resource: LockResource,
        now: Instant,
    ) -> Vec<Outbound> {
        self.expire_locks(now);

        if let Some(entry) = self.locks.get(&resource) {
            if entry.lock.holder.actor_id != editor.actor_id {
                let holder = entry.lock.holder.clone();
                debug!(
                    business_id = %self.business_id,
                    resource = %resource,
                    holder = %holder.actor_id,
                    requester = %editor.actor_id,
                    "加锁冲突"
                );
                return vec![
                    Outbound::only(
                        conn,
                        ServerMessage::LockResult {
                            request_id,
                            granted: false,
                            holder: Some(holder.clone()),
                        },
                    ),
                    Outbound::only(conn, ServerMessage::LockConflict { resource, holder }),
                ];
            }
        }

        let expires_at = now + self.config.lock_ttl();
        self.locks.insert(
            resource.clone(),
            LockEntry {
                lock: EditLock {
                    resource,
                    holder: editor,
                    acquired_at: Utc::now(),
                },
                connection: conn,
                expires_at,
            },
        );
        vec![
            Outbound::only(
                conn,
                ServerMessage::LockResult {
                    request_id,
                    granted: true,
                    holder: None,
                },
            ),
            Outbound::all(self.lock_snapshot()),
        ]
    }

    fn release_lock(
        &mut self,
        conn: ConnectionId,
        editor: &Actor,
        resource: &LockResource,
    ) -> Vec<Outbound> {
        match self.locks.get(resource) {
            Some(entry) if entry.lock.holder.actor_id == editor.actor_id => {
                self.locks.remove(resource);
                vec![Outbound::all(self.lock_snapshot())]
            }
            Some(_) => vec![Outbound::only(
                conn,
                ServerMessage::Error {
                    message: format!("锁 {} 不属于当前编辑者", resource),
                },
            )],
            None => Vec::new(),
        }
    }

    fn expire_locks(&mut self, now: Instant) {
        let before = self.locks.len();
        self.locks.retain(|_, entry| entry.expires_at > now);
        if self.locks.len() != before {
            debug!(business_id = %self.business_id, expired = before - self.locks.len(), "锁已过期");
        }
    }

    fn lock_snapshot(&self) -> ServerMessage {
        let mut locks: Vec<EditLock> = self.locks.values().map(|e| e.lock.clone()).collect();
        locks.sort_by(|a, b| a.resource.cmp(&b.resource));
        ServerMessage::LockSnapshot { locks }
    }

    // ===== 编辑转发与冲突检测 =====

    fn relay_edit(
        &mut self,
        conn: ConnectionId,
        draft_id: String,
        edit: EditAction,
        now: Instant,
    ) -> Vec<Outbound> {
        let window = self.config.conflict_window();
        self.recent_edits
            .retain(|r| now.saturating_duration_since(r.received_at) <= window);

        let mut out = Vec::new();
        if let Some(conflict) = self.detect_conflict(&draft_id, &edit) {
            info!(
                business_id = %self.business_id,
                conflict_id = %conflict.conflict_id,
                resource = %conflict.resource,
                "检测到并发编辑冲突"
            );
            self.conflicts
                .insert(conflict.conflict_id.clone(), conflict.clone());
            out.push(Outbound::all(ServerMessage::ConflictDetected { conflict }));
        }

        self.recent_edits.push(RecentEdit {
            draft_id: draft_id.clone(),
            edit: edit.clone(),
            received_at: now,
        });
        out.insert(
            0,
            Outbound {
                audience: Audience::Others(conn),
                message: ServerMessage::EditApplied { draft_id, edit },
            },
        );
        out
    }

    /// 窗口内另一编辑者对同一班次的编辑,且当前编辑者未持有该班次锁
    fn detect_conflict(&self, draft_id: &str, edit: &EditAction) -> Option<EditConflict> {
        let touched = edit.touched_shift_ids();
        self.recent_edits.iter().find_map(|recent| {
            if recent.draft_id != draft_id || recent.edit.actor.actor_id == edit.actor.actor_id {
                return None;
            }
            let shared = recent
                .edit
                .touched_shift_ids()
                .into_iter()
                .find(|id| touched.contains(id))?;
            let resource = LockResource::shift(shared);
            let guarded = self
                .locks
                .get(&resource)
                .is_some_and(|l| l.lock.holder.actor_id == edit.actor.actor_id);
            if guarded {
                return None;
            }
            Some(EditConflict {
                conflict_id: Uuid::new_v4().to_string(),
                resource,
                edit1: recent.edit.clone(),
                edit2: edit.clone(),
                detected_at: Utc::now(),
            })
        })
    }
}
