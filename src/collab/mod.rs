// ==========================================
// 排班草案引擎 - 协同编辑层
// ==========================================
// 职责: 多编辑者在线状态、编辑锁、冲突检测与裁决
// 红线: 跨客户端并发只经由消息传递处理,不共享内存锁
// ==========================================

pub mod client;
pub mod editor;
pub mod error;
pub mod hub;
pub mod messages;
pub mod reconnect;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{CollabEvent, CollaborationClient};
pub use editor::CollaborativeEditor;
pub use error::{CollabError, CollabResult};
pub use hub::LocalHub;
pub use messages::{ClientMessage, ServerMessage};
pub use reconnect::{Backoff, ConnectionState};
pub use session::{Audience, CollaborationSession, ConnectionId, Outbound};
pub use transport::{RealtimeTransport, TransportConnector, TransportLink};
