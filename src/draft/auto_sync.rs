// ==========================================
// 排班草案引擎 - 草案自动同步
// ==========================================
// 职责: 编辑静默一段时间后,把与上次同步不同的班次推送到存储
// 红线: 同步失败不回滚本地编辑,错误保留在状态中直到下次成功
// 红线: 同一时刻只有一次保存在途 (后续编辑由下一周期接管)
// ==========================================

use crate::config::SyncConfig;
use crate::domain::draft::ScheduleDraft;
use crate::domain::shift::Shift;
use crate::draft::error::{DraftError, DraftResult};
use crate::repository::ScheduleStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 同步状态 (可观察)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub in_flight: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,
    /// 累计推送的班次数
    pub synced_shift_count: usize,
}

// ==========================================
// SyncCore - 单次同步逻辑
// ==========================================
struct SyncCore {
    store: Arc<dyn ScheduleStore>,
    draft_id: String,
    /// 最近一次成功同步的班次内容 (锁同时串行化保存)
    synced: Mutex<HashMap<String, Shift>>,
    status: watch::Sender<SyncState>,
    save_timeout: Duration,
}

impl SyncCore {
    /// 推送与上次同步不同的班次
    ///
    /// # 返回
    /// - Ok(n): 推送的班次数 (0 表示无需同步)
    /// - Err(SyncFailed): 保存失败或超时
    async fn sync_once(&self, draft: &ScheduleDraft) -> DraftResult<usize> {
        let mut synced = self.synced.lock().await;
        let changed: Vec<Shift> = draft
            .shifts
            .iter()
            .filter(|s| synced.get(&s.shift_id) != Some(*s))
            .cloned()
            .collect();
        if changed.is_empty() {
            return Ok(0);
        }

        self.status.send_modify(|s| s.in_flight = true);
        debug!(draft_id = %self.draft_id, shifts = changed.len(), "开始同步草案");

        let outcome = match timeout(
            self.save_timeout,
            self.store.save_modified_shifts(&self.draft_id, &changed),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("保存超时 ({}ms)", self.save_timeout.as_millis())),
        };

        match outcome {
            Ok(()) => {
                let count = changed.len();
                for shift in changed {
                    synced.insert(shift.shift_id.clone(), shift);
                }
                self.status.send_modify(|s| {
                    s.in_flight = false;
                    s.last_synced_at = Some(Utc::now());
                    s.sync_error = None;
                    s.synced_shift_count += count;
                });
                info!(draft_id = %self.draft_id, shifts = count, "草案同步完成");
                Ok(count)
            }
            Err(message) => {
                self.status.send_modify(|s| {
                    s.in_flight = false;
                    s.sync_error = Some(message.clone());
                });
                warn!(draft_id = %self.draft_id, error = %message, "草案同步失败,保留本地编辑");
                Err(DraftError::SyncFailed(message))
            }
        }
    }
}

// ==========================================
// AutoSync - 防抖同步任务
// ==========================================
pub struct AutoSync {
    core: Arc<SyncCore>,
    edits: watch::Sender<ScheduleDraft>,
    task: JoinHandle<()>,
}

impl AutoSync {
    /// 启动同步任务
    ///
    /// # 参数
    /// - initial: 加载时的草案,视为已同步基线
    pub fn spawn(
        store: Arc<dyn ScheduleStore>,
        initial: &ScheduleDraft,
        config: &SyncConfig,
    ) -> Self {
        let synced = initial
            .shifts
            .iter()
            .map(|s| (s.shift_id.clone(), s.clone()))
            .collect();
        let (status, _) = watch::channel(SyncState::default());
        let core = Arc::new(SyncCore {
            store,
            draft_id: initial.draft_id.clone(),
            synced: Mutex::new(synced),
            status,
            save_timeout: config.save_timeout(),
        });

        let (edits, rx) = watch::channel(initial.clone());
        let task = tokio::spawn(run(core.clone(), rx, config.quiet_window()));
        Self { core, edits, task }
    }

    /// 通知一次本地编辑 (重置静默窗口)
    pub fn notify(&self, draft: &ScheduleDraft) {
        self.edits.send_replace(draft.clone());
    }

    /// 立即同步最新草案
    pub async fn flush(&self) -> DraftResult<usize> {
        let draft = self.edits.borrow().clone();
        self.core.sync_once(&draft).await
    }

    pub fn status(&self) -> SyncState {
        self.core.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.core.status.subscribe()
    }

    pub fn draft_id(&self) -> &str {
        &self.core.draft_id
    }
}

impl Drop for AutoSync {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(core: Arc<SyncCore>, mut rx: watch::Receiver<ScheduleDraft>, quiet: Duration) {
    loop {
        if rx.changed().await.is_err() {
            return;
        }
        // 静默窗口内的新编辑重新计时
        let closed = loop {
            match timeout(quiet, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => break true,
                Err(_) => break false,
            }
        };

        let draft = rx.borrow_and_update().clone();
        // 失败已记录在状态中
        let _ = core.sync_once(&draft).await;
        if closed {
            return;
        }
    }
}
