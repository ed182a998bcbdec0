// ==========================================
// 排班草案引擎 - 草案生命周期事件发布
// ==========================================
// 职责: 定义草案事件发布 trait,实现依赖倒置
// 说明: 引擎层定义 trait,宿主应用实现适配器 (消息队列/刷新任务等)
// ==========================================

use crate::domain::draft::DateRange;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 草案事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftEventType {
    /// 草案生成 (自动或人工新建)
    DraftGenerated,
    /// 草案编辑 (分配/移除/调班/撤销/重做/重置)
    DraftEdited,
    /// 草案发布
    DraftPublished,
    /// 草案被新发布的草案取代
    DraftArchived,
}

impl DraftEventType {
    pub fn as_str(&self) -> &str {
        match self {
            DraftEventType::DraftGenerated => "DraftGenerated",
            DraftEventType::DraftEdited => "DraftEdited",
            DraftEventType::DraftPublished => "DraftPublished",
            DraftEventType::DraftArchived => "DraftArchived",
        }
    }
}

/// 草案事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftEvent {
    pub draft_id: String,
    pub business_id: String,
    pub event_type: DraftEventType,
    /// 事件来源描述 (操作人/组件)
    pub source: Option<String>,
    /// 受影响的班次 (None 表示整份草案)
    pub affected_shift_ids: Option<Vec<String>>,
    pub date_range: Option<DateRange>,
}

impl DraftEvent {
    /// 整份草案范围的事件
    pub fn whole_draft(
        draft_id: impl Into<String>,
        business_id: impl Into<String>,
        event_type: DraftEventType,
        date_range: DateRange,
        source: Option<String>,
    ) -> Self {
        Self {
            draft_id: draft_id.into(),
            business_id: business_id.into(),
            event_type,
            source,
            affected_shift_ids: None,
            date_range: Some(date_range),
        }
    }

    /// 编辑事件 (仅涉及部分班次)
    pub fn edited(
        draft_id: impl Into<String>,
        business_id: impl Into<String>,
        shift_ids: Vec<String>,
        source: Option<String>,
    ) -> Self {
        Self {
            draft_id: draft_id.into(),
            business_id: business_id.into(),
            event_type: DraftEventType::DraftEdited,
            source,
            affected_shift_ids: Some(shift_ids),
            date_range: None,
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 草案事件发布者 Trait
///
/// # 实现说明
/// - 发布失败只记录日志,不影响草案本身的状态流转
pub trait DraftEventPublisher: Send + Sync {
    /// 发布草案事件
    ///
    /// # 返回
    /// - `Ok(event_id)`: 事件 ID (如果支持) 或空字符串
    /// - `Err`: 发布失败
    fn publish(&self, event: DraftEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl DraftEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: DraftEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - draft_id={}, event_type={}",
            event.draft_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn DraftEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn DraftEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn DraftEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件 (如果有发布者)
    pub fn publish(&self, event: DraftEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者,跳过事件 - draft_id={}, event_type={}",
                    event.draft_id,
                    event.event_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    /// 发布事件,失败只记录警告
    pub fn publish_or_warn(&self, event: DraftEvent) {
        let draft_id = event.draft_id.clone();
        let event_type = event.event_type;
        if let Err(e) = self.publish(event) {
            tracing::warn!(
                draft_id = %draft_id,
                event_type = event_type.as_str(),
                error = %e,
                "草案事件发布失败"
            );
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}
