// ==========================================
// 排班草案引擎 - 实时通道抽象
// ==========================================
// 职责: 定义协同客户端依赖的双向消息通道 (不绑定具体传输)
// 实现者: hub::LocalHub (进程内), 以及外部 WebSocket 等适配
// ==========================================

use crate::collab::error::CollabResult;
use crate::collab::messages::{ClientMessage, ServerMessage};
use crate::domain::edit_action::Actor;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// 出站半边: send(message)
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn send(&self, message: ClientMessage) -> CollabResult<()>;
}

/// 一条已建立的连接
///
/// inbound 关闭即视为连接断开 (onMessage 由客户端分发任务承担)
pub struct TransportLink {
    pub outbound: Box<dyn RealtimeTransport>,
    pub inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

/// 建立连接 (重连时重复调用)
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, editor: &Actor) -> CollabResult<TransportLink>;
}
