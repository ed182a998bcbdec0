// ==========================================
// 排班草案引擎 - 员工通知接口
// ==========================================
// 职责: 发布时按员工投递排班通知的窄接口
// 红线: 调用方以超时收集结果,不同步阻塞发布流程
// 实现者: 宿主应用 (短信/邮件/推送网关); LoggingNotifier 仅记录日志
// ==========================================

use crate::domain::draft::{DateRange, ScheduleDraft};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    InApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::Push => "push",
            NotificationChannel::InApp => "in_app",
        }
    }
}

/// 单个班次的通知条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftNotice {
    pub shift_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// 发给某员工的通知内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub draft_id: String,
    pub business_id: String,
    pub date_range: DateRange,
    pub staff_id: String,
    pub staff_name: String,
    pub shifts: Vec<ShiftNotice>,
    pub message: String,
}

impl NotificationPayload {
    /// 按草案中该员工的有效分配构建
    ///
    /// 草案中已无该员工分配时 (被移出排班),通知内容为空班次列表
    pub fn for_staff(draft: &ScheduleDraft, staff_id: &str, known_name: Option<&str>) -> Self {
        let mut staff_name = known_name.unwrap_or(staff_id).to_string();
        let mut shifts = Vec::new();
        for shift in &draft.shifts {
            if let Some(a) = shift.active_assignments().find(|a| a.staff_id == staff_id) {
                staff_name = a.staff_name.clone();
                shifts.push(ShiftNotice {
                    shift_id: shift.shift_id.clone(),
                    date: shift.date,
                    start_time: shift.start_time,
                    end_time: shift.end_time,
                });
            }
        }
        let message = if shifts.is_empty() {
            format!(
                "{} 您好,{} 至 {} 的排班已调整,您在该时段已无班次",
                staff_name, draft.date_range.start, draft.date_range.end
            )
        } else {
            format!(
                "{} 您好,{} 至 {} 的排班已发布,共 {} 个班次",
                staff_name,
                draft.date_range.start,
                draft.date_range.end,
                shifts.len()
            )
        };
        Self {
            draft_id: draft.draft_id.clone(),
            business_id: draft.business_id.clone(),
            date_range: draft.date_range,
            staff_id: staff_id.to_string(),
            staff_name,
            shifts,
            message,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("通知投递失败: {0}")]
    DeliveryFailed(String),

    #[error("通知投递超时 ({0}ms)")]
    Timeout(u64),
}

/// 通知网关
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// 向单个员工投递通知
    async fn notify(
        &self,
        staff_id: &str,
        channels: &[NotificationChannel],
        payload: &NotificationPayload,
    ) -> Result<(), NotificationError>;
}

/// 仅记录日志的通知网关
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl NotificationGateway for LoggingNotifier {
    async fn notify(
        &self,
        staff_id: &str,
        channels: &[NotificationChannel],
        payload: &NotificationPayload,
    ) -> Result<(), NotificationError> {
        let channels: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
        info!(
            draft_id = %payload.draft_id,
            staff_id,
            channels = ?channels,
            shifts = payload.shifts.len(),
            "排班通知 (仅日志)"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shift::{Assignment, Shift};

    #[test]
    fn test_payload_lists_only_staff_shifts() {
        let d = |day| NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        let t = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap();
        let mut s1 = Shift::new("S1", d(2), t(9), t(17), None, 1);
        s1.assignments.push(Assignment::new("a1", "S1", "st1", "Ann"));
        let mut s2 = Shift::new("S2", d(3), t(9), t(17), None, 1);
        s2.assignments.push(Assignment::new("a2", "S2", "st2", "Ben"));
        let draft = ScheduleDraft::new_manual("D1", "B1", DateRange::new(d(2), d(8)), vec![s1, s2]);

        let payload = NotificationPayload::for_staff(&draft, "st1", None);
        assert_eq!(payload.staff_name, "Ann");
        assert_eq!(payload.shifts.len(), 1);
        assert_eq!(payload.shifts[0].shift_id, "S1");
        assert!(payload.message.contains("共 1 个班次"));

        // 已被移出排班的员工
        let removed = NotificationPayload::for_staff(&draft, "st7", Some("Gus"));
        assert_eq!(removed.staff_name, "Gus");
        assert!(removed.shifts.is_empty());
        assert!(removed.message.contains("已无班次"));
    }
}
