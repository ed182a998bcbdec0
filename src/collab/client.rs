// ==========================================
// 排班草案引擎 - 协同客户端
// ==========================================
// 职责: 连接协同会话,维护在线/锁/冲突视图,把服务端消息转成事件
// 红线: acquire_lock 必有结果 (超时视为 false),不无限等待
// 红线: 快照重复到达时幂等 (同一快照不产生新事件)
// 红线: 连接中断走显式重连状态机,耗尽后进入 connection_error
// ==========================================

use crate::collab::error::{CollabError, CollabResult};
use crate::collab::messages::{ClientMessage, ServerMessage};
use crate::collab::reconnect::{Backoff, ConnectionState};
use crate::collab::transport::{RealtimeTransport, TransportConnector};
use crate::config::CollaborationConfig;
use crate::domain::collaboration::{
    ConflictResolution, EditConflict, EditLock, LockResource, PresenceInfo,
};
use crate::domain::edit_action::{Actor, EditAction};
use crate::domain::types::EditorActivity;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// 面向调用方的协同事件
#[derive(Debug, Clone, PartialEq)]
pub enum CollabEvent {
    EditorJoined(Actor),
    EditorLeft(Actor),
    /// 本客户端加锁失败
    LockConflict {
        resource: LockResource,
        holder: Actor,
    },
    RemoteEdit {
        draft_id: String,
        edit: EditAction,
    },
    ConflictDetected(EditConflict),
    ConflictResolved {
        conflict_id: String,
        resolution: ConflictResolution,
        rejected_edit_ids: Vec<String>,
        resolved_by: Actor,
    },
    ConnectionChanged(ConnectionState),
    ServerError(String),
}

#[derive(Debug, Clone)]
struct Focus {
    activity: EditorActivity,
    draft_id: Option<String>,
    shift_id: Option<String>,
}

#[derive(Debug, Default)]
struct ClientView {
    /// 其他编辑者 (actor_id -> 在线信息)
    presence: BTreeMap<String, PresenceInfo>,
    locks: Vec<EditLock>,
    conflicts: BTreeMap<String, EditConflict>,
}

struct ClientShared {
    editor: Actor,
    config: CollaborationConfig,
    connector: Arc<dyn TransportConnector>,
    transport: Mutex<Option<Arc<dyn RealtimeTransport>>>,
    pending_locks: Mutex<HashMap<String, oneshot::Sender<bool>>>,
    view: Mutex<ClientView>,
    focus: Mutex<Focus>,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<CollabEvent>,
    closing: AtomicBool,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ClientShared {
    fn current_transport(&self) -> Option<Arc<dyn RealtimeTransport>> {
        guard(&self.transport).clone()
    }

    fn emit(&self, event: CollabEvent) {
        // 无订阅者时丢弃
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state.clone();
            true
        });
        if changed {
            self.emit(CollabEvent::ConnectionChanged(state));
        }
    }

    /// 连接断开: 丢弃通道,未决加锁请求以 false 结束
    fn link_lost(&self) {
        guard(&self.transport).take();
        guard(&self.pending_locks).clear();
    }

    fn handle(&self, message: ServerMessage) {
        match message {
            ServerMessage::PresenceSnapshot { editors } => {
                let next: BTreeMap<String, PresenceInfo> = editors
                    .into_iter()
                    .filter(|p| p.editor.actor_id != self.editor.actor_id)
                    .map(|p| (p.editor.actor_id.clone(), p))
                    .collect();
                let (joined, left) = {
                    let mut view = guard(&self.view);
                    let joined: Vec<Actor> = next
                        .iter()
                        .filter(|(id, _)| !view.presence.contains_key(*id))
                        .map(|(_, p)| p.editor.clone())
                        .collect();
                    let left: Vec<Actor> = view
                        .presence
                        .iter()
                        .filter(|(id, _)| !next.contains_key(*id))
                        .map(|(_, p)| p.editor.clone())
                        .collect();
                    view.presence = next;
                    (joined, left)
                };
                for actor in joined {
                    self.emit(CollabEvent::EditorJoined(actor));
                }
                for actor in left {
                    self.emit(CollabEvent::EditorLeft(actor));
                }
            }
            ServerMessage::LockSnapshot { locks } => {
                guard(&self.view).locks = locks;
            }
            ServerMessage::LockResult {
                request_id,
                granted,
                ..
            } => {
                let pending = guard(&self.pending_locks).remove(&request_id);
                if let Some(tx) = pending {
                    let _ = tx.send(granted);
                }
            }
            ServerMessage::LockConflict { resource, holder } => {
                self.emit(CollabEvent::LockConflict { resource, holder });
            }
            ServerMessage::EditApplied { draft_id, edit } => {
                self.emit(CollabEvent::RemoteEdit { draft_id, edit });
            }
            ServerMessage::ConflictDetected { conflict } => {
                let is_new = guard(&self.view)
                    .conflicts
                    .insert(conflict.conflict_id.clone(), conflict.clone())
                    .is_none();
                if is_new {
                    self.emit(CollabEvent::ConflictDetected(conflict));
                }
            }
            ServerMessage::ConflictResolved {
                conflict_id,
                resolution,
                rejected_edit_ids,
                resolved_by,
            } => {
                let known = guard(&self.view).conflicts.remove(&conflict_id).is_some();
                if known {
                    self.emit(CollabEvent::ConflictResolved {
                        conflict_id,
                        resolution,
                        rejected_edit_ids,
                        resolved_by,
                    });
                }
            }
            ServerMessage::Error { message } => {
                warn!(editor_id = %self.editor.actor_id, error = %message, "协同会话返回错误");
                self.emit(CollabEvent::ServerError(message));
            }
        }
    }
}

/// 建立连接 (含退避重试)
async fn establish(
    shared: &Arc<ClientShared>,
) -> CollabResult<mpsc::UnboundedReceiver<ServerMessage>> {
    let mut backoff = Backoff::new(shared.config.reconnect.clone());
    loop {
        let attempt = match shared.connector.connect(&shared.editor).await {
            Ok(link) => {
                let transport: Arc<dyn RealtimeTransport> = Arc::from(link.outbound);
                match announce(shared, transport.as_ref()).await {
                    Ok(activity) => {
                        *guard(&shared.transport) = Some(transport);
                        shared.set_state(ConnectionState::Connected { activity });
                        info!(editor_id = %shared.editor.actor_id, "已连接协同会话");
                        return Ok(link.inbound);
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        let Some(delay) = backoff.next_delay() else {
            let tries = backoff.attempts() + 1;
            warn!(editor_id = %shared.editor.actor_id, tries, error = %attempt, "重连次数耗尽");
            shared.set_state(ConnectionState::ConnectionError {
                message: attempt.to_string(),
            });
            return Err(CollabError::ReconnectExhausted {
                attempts: tries,
                last_error: attempt.to_string(),
            });
        };
        debug!(
            editor_id = %shared.editor.actor_id,
            attempt = backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %attempt,
            "连接失败,等待重试"
        );
        shared.set_state(ConnectionState::Reconnecting {
            attempt: backoff.attempts(),
        });
        sleep(delay).await;
        if shared.closing.load(Ordering::SeqCst) {
            return Err(CollabError::NotConnected);
        }
    }
}

/// 加入会话并重放当前在线状态 (会话可仅凭在线客户端重建)
async fn announce(
    shared: &ClientShared,
    transport: &dyn RealtimeTransport,
) -> CollabResult<EditorActivity> {
    transport
        .send(ClientMessage::Join {
            editor: shared.editor.clone(),
        })
        .await?;
    let focus = guard(&shared.focus).clone();
    if focus.activity != EditorActivity::Viewing || focus.draft_id.is_some() {
        transport
            .send(ClientMessage::Presence {
                activity: focus.activity,
                draft_id: focus.draft_id,
                shift_id: focus.shift_id,
            })
            .await?;
    }
    Ok(focus.activity)
}

/// 分发服务端消息 (onMessage),连接中断时重连
async fn supervise(shared: Arc<ClientShared>, mut inbound: mpsc::UnboundedReceiver<ServerMessage>) {
    loop {
        while let Some(message) = inbound.recv().await {
            shared.handle(message);
        }
        shared.link_lost();
        if shared.closing.load(Ordering::SeqCst) {
            shared.set_state(ConnectionState::Disconnected);
            return;
        }

        warn!(editor_id = %shared.editor.actor_id, "协同连接中断,开始重连");
        shared.set_state(ConnectionState::Disconnected);
        match establish(&shared).await {
            Ok(next) => inbound = next,
            Err(e) => {
                warn!(editor_id = %shared.editor.actor_id, error = %e, "放弃重连");
                return;
            }
        }
    }
}

// ==========================================
// CollaborationClient
// ==========================================
pub struct CollaborationClient {
    shared: Arc<ClientShared>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl CollaborationClient {
    pub fn new(
        editor: Actor,
        connector: Arc<dyn TransportConnector>,
        config: CollaborationConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(ClientShared {
                editor,
                config,
                connector,
                transport: Mutex::new(None),
                pending_locks: Mutex::new(HashMap::new()),
                view: Mutex::new(ClientView::default()),
                focus: Mutex::new(Focus {
                    activity: EditorActivity::Viewing,
                    draft_id: None,
                    shift_id: None,
                }),
                state,
                events,
                closing: AtomicBool::new(false),
            }),
            supervisor: Mutex::new(None),
        }
    }

    /// 连接协同会话
    ///
    /// # 返回
    /// - Ok(()): 已连接
    /// - Err(ReconnectExhausted): 重试耗尽,状态为 connection_error
    pub async fn connect(&self) -> CollabResult<()> {
        self.shared.closing.store(false, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connecting);
        let inbound = establish(&self.shared).await?;
        let handle = tokio::spawn(supervise(self.shared.clone(), inbound));
        if let Some(previous) = guard(&self.supervisor).replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// 主动断开 (释放本连接持有的锁)
    pub async fn disconnect(&self) {
        self.shared.closing.store(true, Ordering::SeqCst);
        if let Some(transport) = self.shared.current_transport() {
            let _ = transport.send(ClientMessage::Leave).await;
        }
        self.shared.link_lost();
        if let Some(handle) = guard(&self.supervisor).take() {
            handle.abort();
        }
        *guard(&self.shared.view) = ClientView::default();
        self.shared.set_state(ConnectionState::Disconnected);
        info!(editor_id = %self.shared.editor.actor_id, "已断开协同会话");
    }

    /// 更新在线状态 (viewing / editing / idle 及关注的草案/班次)
    pub async fn set_activity(
        &self,
        activity: EditorActivity,
        draft_id: Option<String>,
        shift_id: Option<String>,
    ) -> CollabResult<()> {
        *guard(&self.shared.focus) = Focus {
            activity,
            draft_id: draft_id.clone(),
            shift_id: shift_id.clone(),
        };
        let transport = self
            .shared
            .current_transport()
            .ok_or(CollabError::NotConnected)?;
        transport
            .send(ClientMessage::Presence {
                activity,
                draft_id,
                shift_id,
            })
            .await?;
        self.shared
            .set_state(ConnectionState::Connected { activity });
        Ok(())
    }

    /// 请求编辑锁
    ///
    /// # 返回
    /// - true: 获得锁
    /// - false: 已被他人持有、未连接或超时
    pub async fn acquire_lock(&self, resource: LockResource) -> bool {
        let Some(transport) = self.shared.current_transport() else {
            return false;
        };
        let request_id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        guard(&self.shared.pending_locks).insert(request_id.clone(), tx);

        let sent = transport
            .send(ClientMessage::AcquireLock {
                request_id: request_id.clone(),
                resource: resource.clone(),
            })
            .await;
        if sent.is_err() {
            guard(&self.shared.pending_locks).remove(&request_id);
            return false;
        }

        match timeout(self.shared.config.lock_timeout(), rx).await {
            Ok(Ok(granted)) => granted,
            Ok(Err(_)) => false,
            Err(_) => {
                guard(&self.shared.pending_locks).remove(&request_id);
                warn!(
                    editor_id = %self.shared.editor.actor_id,
                    resource = %resource,
                    "加锁请求超时"
                );
                false
            }
        }
    }

    pub async fn release_lock(&self, resource: LockResource) -> CollabResult<()> {
        self.send(ClientMessage::ReleaseLock { resource }).await
    }

    /// 广播一条已在本地应用的编辑
    pub async fn send_edit(&self, draft_id: &str, edit: EditAction) -> CollabResult<()> {
        self.send(ClientMessage::Edit {
            draft_id: draft_id.to_string(),
            edit,
        })
        .await
    }

    /// 裁决冲突 (裁决结果广播给全部参与者)
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> CollabResult<()> {
        if !guard(&self.shared.view).conflicts.contains_key(conflict_id) {
            return Err(CollabError::UnknownConflict(conflict_id.to_string()));
        }
        self.send(ClientMessage::ResolveConflict {
            conflict_id: conflict_id.to_string(),
            resolution,
        })
        .await
    }

    async fn send(&self, message: ClientMessage) -> CollabResult<()> {
        let transport = self
            .shared
            .current_transport()
            .ok_or(CollabError::NotConnected)?;
        transport.send(message).await
    }

    // ===== 视图 =====

    pub fn editor(&self) -> &Actor {
        &self.shared.editor
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CollabEvent> {
        self.shared.events.subscribe()
    }

    /// 其他在线编辑者
    pub fn editors(&self) -> Vec<PresenceInfo> {
        guard(&self.shared.view).presence.values().cloned().collect()
    }

    pub fn locks(&self) -> Vec<EditLock> {
        guard(&self.shared.view).locks.clone()
    }

    pub fn lock_holder(&self, resource: &LockResource) -> Option<Actor> {
        guard(&self.shared.view)
            .locks
            .iter()
            .find(|l| &l.resource == resource)
            .map(|l| l.holder.clone())
    }

    pub fn conflicts(&self) -> Vec<EditConflict> {
        guard(&self.shared.view).conflicts.values().cloned().collect()
    }
}

impl Drop for CollaborationClient {
    fn drop(&mut self) {
        if let Some(handle) = guard(&self.supervisor).take() {
            handle.abort();
        }
    }
}
