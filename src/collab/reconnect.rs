// ==========================================
// 排班草案引擎 - 重连退避状态机
// ==========================================
// 红线: 指数退避有上限,尝试次数有上限; 耗尽后进入 connection_error
// ==========================================

use crate::config::ReconnectPolicy;
use crate::domain::types::EditorActivity;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 客户端连接状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    /// 已连接,附带当前活动 (viewing / editing / idle)
    Connected { activity: EditorActivity },
    Reconnecting { attempt: u32 },
    Disconnected,
    ConnectionError { message: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// 退避计时
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// 已失败次数
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// 记录一次失败,返回下次重试前的等待; None 表示已耗尽
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.policy.max_attempts {
            return None;
        }
        let exp = self.attempts.min(16);
        let delay = self
            .policy
            .base_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.policy.max_delay_ms);
        self.attempts += 1;
        Some(Duration::from_millis(delay))
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
