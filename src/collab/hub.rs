// ==========================================
// 排班草案引擎 - 进程内协同中枢
// ==========================================
// 职责: 按商户维护协同会话 actor,为客户端提供进程内实时通道
// 红线: 每个商户一个会话,最后一个连接关闭时销毁 (不使用全局单例)
// 红线: 会话状态只由 actor 任务持有,通过消息访问
// ==========================================

use crate::collab::error::{CollabError, CollabResult};
use crate::collab::messages::{ClientMessage, ServerMessage};
use crate::collab::session::{CollaborationSession, ConnectionId, Outbound};
use crate::collab::transport::{RealtimeTransport, TransportConnector, TransportLink};
use crate::config::CollaborationConfig;
use crate::domain::edit_action::Actor;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

enum SessionCommand {
    Open {
        conn: ConnectionId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    },
    Message {
        conn: ConnectionId,
        message: ClientMessage,
    },
    Close {
        conn: ConnectionId,
    },
    /// 切断全部连接 (模拟网络中断)
    Sever,
}

struct SessionEntry {
    commands: mpsc::UnboundedSender<SessionCommand>,
    connections: usize,
}

struct HubShared {
    config: CollaborationConfig,
    sessions: Mutex<HashMap<String, SessionEntry>>,
    next_conn: AtomicU64,
}

impl HubShared {
    fn release(&self, business_id: &str) {
        let Ok(mut sessions) = self.sessions.lock() else {
            return;
        };
        if let Some(entry) = sessions.get_mut(business_id) {
            entry.connections = entry.connections.saturating_sub(1);
            if entry.connections == 0 {
                sessions.remove(business_id);
                info!(business_id, "协同会话已销毁 (无在线连接)");
            }
        }
    }
}

// ==========================================
// LocalHub
// ==========================================
#[derive(Clone)]
pub struct LocalHub {
    shared: Arc<HubShared>,
}

impl LocalHub {
    pub fn new(config: CollaborationConfig) -> Self {
        Self {
            shared: Arc::new(HubShared {
                config,
                sessions: Mutex::new(HashMap::new()),
                next_conn: AtomicU64::new(1),
            }),
        }
    }

    /// 绑定到某商户会话的连接器
    pub fn connector(&self, business_id: impl Into<String>) -> Arc<dyn TransportConnector> {
        Arc::new(LocalConnector {
            hub: self.clone(),
            business_id: business_id.into(),
        })
    }

    /// 活跃会话数
    pub fn active_sessions(&self) -> usize {
        self.shared.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 切断某商户会话内全部连接,客户端将进入重连
    pub fn sever(&self, business_id: &str) {
        if let Ok(sessions) = self.shared.sessions.lock() {
            if let Some(entry) = sessions.get(business_id) {
                let _ = entry.commands.send(SessionCommand::Sever);
            }
        }
    }

    fn open(&self, business_id: &str) -> CollabResult<TransportLink> {
        let conn = self.shared.next_conn.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        let mut sessions = self
            .shared
            .sessions
            .lock()
            .map_err(|e| CollabError::ConnectFailed(e.to_string()))?;
        let entry = sessions.entry(business_id.to_string()).or_insert_with(|| {
            let (commands, inbox) = mpsc::unbounded_channel();
            let session = CollaborationSession::new(business_id, self.shared.config.clone());
            tokio::spawn(run_session(session, inbox));
            info!(business_id, "协同会话已创建");
            SessionEntry {
                commands,
                connections: 0,
            }
        });
        entry
            .commands
            .send(SessionCommand::Open { conn, outbound: tx })
            .map_err(|_| CollabError::ConnectFailed("会话已关闭".to_string()))?;
        entry.connections += 1;
        debug!(business_id, conn, "建立进程内连接");

        Ok(TransportLink {
            outbound: Box::new(LocalTransport {
                conn,
                business_id: business_id.to_string(),
                commands: entry.commands.clone(),
                hub: self.shared.clone(),
            }),
            inbound: rx,
        })
    }
}

struct LocalConnector {
    hub: LocalHub,
    business_id: String,
}

#[async_trait]
impl TransportConnector for LocalConnector {
    async fn connect(&self, editor: &Actor) -> CollabResult<TransportLink> {
        debug!(business_id = %self.business_id, editor_id = %editor.actor_id, "连接协同会话");
        self.hub.open(&self.business_id)
    }
}

struct LocalTransport {
    conn: ConnectionId,
    business_id: String,
    commands: mpsc::UnboundedSender<SessionCommand>,
    hub: Arc<HubShared>,
}

#[async_trait]
impl RealtimeTransport for LocalTransport {
    async fn send(&self, message: ClientMessage) -> CollabResult<()> {
        self.commands
            .send(SessionCommand::Message {
                conn: self.conn,
                message,
            })
            .map_err(|_| CollabError::TransportClosed)
    }
}

impl Drop for LocalTransport {
    fn drop(&mut self) {
        let _ = self.commands.send(SessionCommand::Close { conn: self.conn });
        self.hub.release(&self.business_id);
    }
}

// ==========================================
// 会话 actor
// ==========================================
async fn run_session(
    mut session: CollaborationSession,
    mut inbox: mpsc::UnboundedReceiver<SessionCommand>,
) {
    let mut outbound: HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>> =
        HashMap::new();

    while let Some(command) = inbox.recv().await {
        let messages = match command {
            SessionCommand::Open { conn, outbound: tx } => {
                outbound.insert(conn, tx);
                Vec::new()
            }
            SessionCommand::Message { conn, message } => {
                if !outbound.contains_key(&conn) {
                    continue;
                }
                session.handle(conn, message, Instant::now())
            }
            SessionCommand::Close { conn } => {
                outbound.remove(&conn);
                session.disconnect(conn)
            }
            SessionCommand::Sever => {
                warn!(business_id = session.business_id(), "切断全部协同连接");
                let conns: Vec<ConnectionId> = outbound.drain().map(|(conn, _)| conn).collect();
                conns
                    .into_iter()
                    .flat_map(|conn| session.disconnect(conn))
                    .collect()
            }
        };
        deliver(&outbound, messages);
    }
    debug!(business_id = session.business_id(), "协同会话 actor 退出");
}

fn deliver(
    outbound: &HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>,
    messages: Vec<Outbound>,
) {
    for out in messages {
        for (conn, tx) in outbound {
            if out.audience.includes(*conn) {
                // 接收端已关闭时由 Close 命令清理
                let _ = tx.send(out.message.clone());
            }
        }
    }
}
