// ==========================================
// 排班草案引擎 - 发布编排
// ==========================================
// 职责: 发布前校验、状态流转、归档旧排班、通知受影响员工
// 红线: 存在 error 级违规时拒绝发布,草案状态不变
// 红线: 写入线上排班之后的失败 (归档/通知) 不回滚发布,在结果中列出
// 红线: draft → published → archived 单向流转
// ==========================================

use crate::config::{ConstraintConfig, PublishConfig};
use crate::domain::draft::{ScheduleDraft, ScheduleSnapshot};
use crate::domain::edit_action::Actor;
use crate::domain::staff::StaffCandidate;
use crate::domain::types::DraftStatus;
use crate::domain::violation::{ConstraintViolation, DraftValidation};
use crate::engine::constraint::ConstraintEvaluator;
use crate::engine::events::{DraftEvent, DraftEventType, OptionalEventPublisher};
use crate::notify::{NotificationChannel, NotificationError, NotificationGateway, NotificationPayload};
use crate::publish::error::{PublishError, PublishOutcome};
use crate::repository::ScheduleStore;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// 发布选项
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub notify_staff: bool,
    pub channels: Vec<NotificationChannel>,
    pub actor: Actor,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            notify_staff: true,
            channels: vec![NotificationChannel::InApp],
            actor: Actor::system(),
        }
    }
}

/// 通知失败记录 (供调用方重试)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedNotification {
    pub staff_id: String,
    pub reason: String,
}

/// 发布结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResult {
    pub success: bool,
    pub draft_id: String,
    pub notifications_sent: usize,
    pub failed_notifications: Vec<FailedNotification>,
    /// 发布时仍存在的 warning 级违规
    pub warnings: Vec<ConstraintViolation>,
    /// 被本次发布取代的草案
    pub archived_draft_ids: Vec<String>,
    /// 归档旧排班时的失败 (发布本身已生效)
    pub archive_errors: Vec<String>,
}

/// 归档旧排班的结果
#[derive(Debug, Default)]
struct ArchiveReport {
    archived: Vec<String>,
    errors: Vec<String>,
    /// 被取代排班中的员工
    superseded_staff: Vec<String>,
}

// ==========================================
// PublishOrchestrator
// ==========================================
pub struct PublishOrchestrator {
    store: Arc<dyn ScheduleStore>,
    evaluator: ConstraintEvaluator,
    notifier: Option<Arc<dyn NotificationGateway>>,
    events: OptionalEventPublisher,
    config: PublishConfig,
}

impl PublishOrchestrator {
    pub fn new(
        store: Arc<dyn ScheduleStore>,
        constraints: ConstraintConfig,
        config: PublishConfig,
    ) -> Self {
        Self {
            store,
            evaluator: ConstraintEvaluator::new(constraints),
            notifier: None,
            events: OptionalEventPublisher::none(),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_event_publisher(mut self, events: OptionalEventPublisher) -> Self {
        self.events = events;
        self
    }

    /// 发布预检: 仅校验,不改变任何状态
    ///
    /// 审批人确认前可据此查看 warning
    pub async fn check(&self, draft_id: &str) -> PublishOutcome<DraftValidation> {
        let (_, _, validation) = self.preflight(draft_id).await?;
        Ok(validation)
    }

    /// 发布草案
    ///
    /// # 返回
    /// - Ok(PublishResult): 已发布 (归档/通知失败在结果中列出)
    /// - Err(Blocked): 存在 error 级违规,草案未改变
    #[instrument(skip(self, options), fields(actor = %options.actor.actor_id))]
    pub async fn publish(
        &self,
        draft_id: &str,
        options: &PublishOptions,
    ) -> PublishOutcome<PublishResult> {
        let (draft, baseline, validation) = self.preflight(draft_id).await?;
        if !validation.is_publishable() {
            warn!(
                draft_id,
                errors = validation.violations.len(),
                "草案存在阻断违规,拒绝发布"
            );
            return Err(PublishError::Blocked {
                violations: validation.violations,
            });
        }

        // 1. 状态流转并写入线上排班
        let mut published = draft.clone();
        published.status = DraftStatus::Published;
        published.updated_at = Utc::now();
        for shift in published.shifts.iter_mut() {
            shift.mark_scheduled();
        }
        self.store.save_draft(&published).await?;
        if let Err(e) = self.store.commit_published(draft_id).await {
            warn!(draft_id, error = %e, "写入线上排班失败,恢复草案状态");
            if let Err(restore) = self.store.save_draft(&draft).await {
                warn!(draft_id, error = %restore, "恢复草案状态失败");
            }
            return Err(e.into());
        }

        // 2. 归档重叠日期范围内此前发布的排班 (失败只记录)
        let archive = self.archive_superseded(&published).await;

        self.events.publish_or_warn(DraftEvent::whole_draft(
            &published.draft_id,
            &published.business_id,
            DraftEventType::DraftPublished,
            published.date_range,
            Some(options.actor.actor_id.clone()),
        ));

        // 3. 通知受影响员工 (收集结果,不回滚)
        let (notifications_sent, failed_notifications) = if options.notify_staff {
            let mut targets = published.affected_staff_ids();
            for staff_id in published
                .dropped_staff_ids(&baseline.shifts)
                .into_iter()
                .chain(archive.superseded_staff.iter().cloned())
            {
                if !targets.contains(&staff_id) {
                    targets.push(staff_id);
                }
            }
            self.notify_staff(&published, &baseline.staff, targets, &options.channels)
                .await
        } else {
            (0, Vec::new())
        };

        info!(
            draft_id,
            warnings = validation.warnings.len(),
            archived = archive.archived.len(),
            archive_errors = archive.errors.len(),
            notifications_sent,
            notifications_failed = failed_notifications.len(),
            "草案已发布"
        );

        Ok(PublishResult {
            success: true,
            draft_id: draft_id.to_string(),
            notifications_sent,
            failed_notifications,
            warnings: validation.warnings,
            archived_draft_ids: archive.archived,
            archive_errors: archive.errors,
        })
    }

    async fn preflight(
        &self,
        draft_id: &str,
    ) -> PublishOutcome<(ScheduleDraft, ScheduleSnapshot, DraftValidation)> {
        let draft = self
            .store
            .find_draft(draft_id)
            .await?
            .ok_or_else(|| PublishError::DraftNotFound(draft_id.to_string()))?;
        if !draft.status.can_transition_to(DraftStatus::Published) {
            return Err(PublishError::InvalidState {
                status: draft.status.to_string(),
            });
        }
        // 提交前的线上排班,用于找出被移出排班的员工
        let baseline = self
            .store
            .load_snapshot(&draft.business_id, draft.date_range)
            .await?;
        let validation = self.evaluator.validate_draft(&draft, &baseline.staff);
        Ok((draft, baseline, validation))
    }

    async fn archive_superseded(&self, published: &ScheduleDraft) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        let previous = match self
            .store
            .find_published_overlapping(&published.business_id, published.date_range)
            .await
        {
            Ok(previous) => previous,
            Err(e) => {
                warn!(draft_id = %published.draft_id, error = %e, "查询待归档排班失败");
                report.errors.push(e.to_string());
                return report;
            }
        };

        for mut prior in previous {
            if prior.draft_id == published.draft_id
                || !prior.status.can_transition_to(DraftStatus::Archived)
            {
                continue;
            }
            for staff_id in published.dropped_staff_ids(&prior.shifts) {
                if !report.superseded_staff.contains(&staff_id) {
                    report.superseded_staff.push(staff_id);
                }
            }

            prior.status = DraftStatus::Archived;
            prior.updated_at = Utc::now();
            if let Err(e) = self.store.save_draft(&prior).await {
                warn!(draft_id = %prior.draft_id, error = %e, "旧排班归档失败");
                report.errors.push(format!("{}: {}", prior.draft_id, e));
                continue;
            }
            info!(draft_id = %prior.draft_id, superseded_by = %published.draft_id, "旧排班已归档");
            self.events.publish_or_warn(DraftEvent::whole_draft(
                &prior.draft_id,
                &prior.business_id,
                DraftEventType::DraftArchived,
                prior.date_range,
                Some(published.draft_id.clone()),
            ));
            report.archived.push(prior.draft_id);
        }
        report
    }

    /// 每个受影响且接收通知的员工投递一次
    async fn notify_staff(
        &self,
        draft: &ScheduleDraft,
        pool: &[StaffCandidate],
        targets: Vec<String>,
        channels: &[NotificationChannel],
    ) -> (usize, Vec<FailedNotification>) {
        let Some(notifier) = &self.notifier else {
            warn!(draft_id = %draft.draft_id, "未配置通知网关,跳过员工通知");
            return (0, Vec::new());
        };

        let profiles: HashMap<&str, &StaffCandidate> =
            pool.iter().map(|s| (s.staff_id.as_str(), s)).collect();
        let targets: Vec<String> = targets
            .into_iter()
            .filter(|id| profiles.get(id.as_str()).map_or(true, |s| s.notifiable))
            .collect();

        let limit = self.config.notification_timeout();
        let deliveries = targets.iter().map(|staff_id| {
            let known_name = profiles.get(staff_id.as_str()).map(|s| s.name.as_str());
            let payload = NotificationPayload::for_staff(draft, staff_id, known_name);
            async move {
                let result = match timeout(limit, notifier.notify(staff_id, channels, &payload)).await {
                    Ok(result) => result,
                    Err(_) => Err(NotificationError::Timeout(limit.as_millis() as u64)),
                };
                (staff_id, result)
            }
        });

        let mut sent = 0;
        let mut failed = Vec::new();
        for (staff_id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(draft_id = %draft.draft_id, staff_id = %staff_id, error = %e, "员工通知失败");
                    failed.push(FailedNotification {
                        staff_id: staff_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        (sent, failed)
    }
}
