// ==========================================
// 排班草案引擎 - 生成取消信号
// ==========================================
// 说明: 基于 watch 通道,取消后订阅者也能立即观察到
// ==========================================

use std::sync::Arc;
use tokio::sync::watch;

/// 取消信号 (克隆后共享同一状态)
#[derive(Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// 触发取消
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// 等待取消 (已取消则立即返回)
    pub async fn cancelled(&self) {
        let mut receiver = self.sender.subscribe();
        // 发送端随 self 存活,wait_for 不会因通道关闭返回错误
        let _ = receiver.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}
