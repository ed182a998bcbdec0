// ==========================================
// 排班草案引擎 - 排班 API
// ==========================================
// 职责: 草案生成、编辑会话 (撤销/重做/重置/自动同步)、校验、发布
// 红线: 每份打开的草案仅持有一个编辑会话 (状态机 + 自动同步任务)
// 红线: 硬约束违规未附覆盖说明时拒绝编辑,附说明时降级为警告并打标
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, EngineConfig};
use crate::domain::draft::{DateRange, ScheduleDraft};
use crate::domain::edit_action::Actor;
use crate::domain::shift::Shift;
use crate::domain::types::ConstraintType;
use crate::domain::violation::{ConstraintViolation, DraftValidation};
use crate::draft::{
    AutoSync, ChangeSummary, DraftAction, DraftError, DraftStateMachine, SyncState, Transition,
};
use crate::engine::{
    AssignmentRanker, CancelSignal, ConstraintEvaluator, DraftEvent, DraftEventPublisher,
    DraftEventType, GenerationOutcome, GenerationRequest, OptionalEventPublisher, RankingOracle,
    StrategyWeights,
};
use crate::notify::NotificationGateway;
use crate::publish::{PublishOptions, PublishOrchestrator, PublishResult};
use crate::repository::ScheduleStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 编辑选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EditOptions {
    /// 应用前同步校验约束
    pub validate: bool,
}

/// 编辑结果
#[derive(Debug, Clone)]
pub struct EditOutcome {
    pub transition: Transition,
    /// 校验产生的警告 (含人工覆盖降级的硬约束)
    pub warnings: Vec<ConstraintViolation>,
    pub draft: ScheduleDraft,
}

/// 单份草案的编辑会话
struct EditSession {
    machine: DraftStateMachine,
    sync: AutoSync,
}

impl EditSession {
    fn open(store: Arc<dyn ScheduleStore>, draft: ScheduleDraft, config: &EngineConfig) -> Self {
        let sync = AutoSync::spawn(store, &draft, &config.sync);
        Self {
            machine: DraftStateMachine::with_draft(draft),
            sync,
        }
    }

    fn current(&self) -> ApiResult<&ScheduleDraft> {
        Ok(self.machine.draft().ok_or(DraftError::NotLoaded)?)
    }
}

// ==========================================
// SchedulingApi - 排班 API
// ==========================================

/// 排班API
///
/// 职责：
/// 1. 草案生成 (预设策略 / 自定义策略 / 人工新建)
/// 2. 编辑会话 (分配/移除/调班、撤销/重做/重置、变更摘要、同步状态)
/// 3. 整份草案校验与发布
pub struct SchedulingApi {
    store: Arc<dyn ScheduleStore>,
    config: EngineConfig,
    config_manager: Option<Arc<ConfigManager>>,
    ranker: AssignmentRanker,
    evaluator: ConstraintEvaluator,
    publisher: PublishOrchestrator,
    events: OptionalEventPublisher,
    sessions: Mutex<HashMap<String, EditSession>>,
}

impl SchedulingApi {
    pub fn new(store: Arc<dyn ScheduleStore>, config: EngineConfig) -> Self {
        Self {
            ranker: AssignmentRanker::new(
                store.clone(),
                config.ranker.clone(),
                config.constraints.clone(),
            ),
            evaluator: ConstraintEvaluator::new(config.constraints.clone()),
            publisher: PublishOrchestrator::new(
                store.clone(),
                config.constraints.clone(),
                config.publish.clone(),
            ),
            store,
            config,
            config_manager: None,
            events: OptionalEventPublisher::none(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 以持久化配置创建 (默认值 + global 覆写)
    pub fn from_config_manager(
        store: Arc<dyn ScheduleStore>,
        config_manager: Arc<ConfigManager>,
    ) -> ApiResult<Self> {
        let config = config_manager
            .load_engine_config()
            .map_err(|e| ApiError::ConfigError(e.to_string()))?;
        Ok(Self::new(store, config).with_config_manager(config_manager))
    }

    pub fn with_config_manager(mut self, config_manager: Arc<ConfigManager>) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn RankingOracle>) -> Self {
        self.ranker = self.ranker.with_oracle(oracle);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.publisher = self.publisher.with_notifier(notifier);
        self
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn DraftEventPublisher>) -> Self {
        self.events = OptionalEventPublisher::with_publisher(publisher);
        self.publisher = self.publisher.with_event_publisher(self.events.clone());
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ==========================================
    // 草案生成
    // ==========================================

    /// 自动生成排班草案并打开编辑会话
    ///
    /// # 参数
    /// - request: 商户/日期范围/特殊事件/员工备注/约束/策略
    /// - custom_strategy_id: 自定义策略 (覆盖 request 中的预设权重)
    /// - cancel: 取消信号
    ///
    /// # 返回
    /// - Ok(GenerationOutcome): 已保存的草案 + 覆盖诊断 + 预言机状态
    /// - Err(Cancelled): 已取消,不保存任何部分草案
    #[instrument(skip(self, request, cancel), fields(business_id = %request.business_id))]
    pub async fn generate_draft(
        &self,
        mut request: GenerationRequest,
        custom_strategy_id: Option<&str>,
        cancel: &CancelSignal,
    ) -> ApiResult<GenerationOutcome> {
        if request.business_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("商户ID不能为空".to_string()));
        }
        if let Some(strategy_id) = custom_strategy_id {
            request.custom_weights = Some(self.resolve_custom_strategy(strategy_id)?);
        }

        let outcome = self.ranker.generate_draft(&request, cancel).await?;
        self.store.save_draft(&outcome.draft).await?;

        let draft = &outcome.draft;
        self.events.publish_or_warn(DraftEvent::whole_draft(
            &draft.draft_id,
            &draft.business_id,
            DraftEventType::DraftGenerated,
            draft.date_range,
            Some(custom_strategy_id.unwrap_or(request.strategy.as_str()).to_string()),
        ));
        self.open_session(draft.clone()).await;

        info!(
            draft_id = %draft.draft_id,
            shifts = draft.shifts.len(),
            diagnostics = outcome.diagnostics.len(),
            confidence = draft.overall_confidence,
            "排班草案已生成"
        );
        Ok(outcome)
    }

    /// 以线上排班为基线人工新建草案
    #[instrument(skip(self, actor), fields(actor = %actor.actor_id))]
    pub async fn create_manual_draft(
        &self,
        business_id: &str,
        date_range: DateRange,
        actor: &Actor,
    ) -> ApiResult<ScheduleDraft> {
        if business_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("商户ID不能为空".to_string()));
        }

        let snapshot = self.store.load_snapshot(business_id, date_range).await?;
        let shifts: Vec<Shift> = snapshot
            .shifts
            .into_iter()
            .filter(|s| date_range.contains(s.date))
            .map(|mut shift| {
                shift.is_modified = false;
                for a in shift.assignments.iter_mut() {
                    a.is_modified = false;
                }
                shift
            })
            .collect();

        let draft =
            ScheduleDraft::new_manual(Uuid::new_v4().to_string(), business_id, date_range, shifts);
        self.store.save_draft(&draft).await?;
        self.events.publish_or_warn(DraftEvent::whole_draft(
            &draft.draft_id,
            &draft.business_id,
            DraftEventType::DraftGenerated,
            date_range,
            Some(actor.actor_id.clone()),
        ));
        self.open_session(draft.clone()).await;

        info!(draft_id = %draft.draft_id, shifts = draft.shifts.len(), "人工草案已创建");
        Ok(draft)
    }

    /// 查询草案 (编辑中的草案返回内存中的最新状态)
    pub async fn get_draft(&self, draft_id: &str) -> ApiResult<ScheduleDraft> {
        {
            let sessions = self.sessions.lock().await;
            if let Some(session) = sessions.get(draft_id) {
                return Ok(session.current()?.clone());
            }
        }
        self.find_stored(draft_id).await
    }

    // ==========================================
    // 编辑会话
    // ==========================================

    /// 应用一次编辑 (assign / unassign / move)
    ///
    /// # 参数
    /// - action: 编辑动作,覆盖说明经由 override_note 传入
    /// - options.validate: 应用前同步校验约束
    ///
    /// # 返回
    /// - Err(ValidationFailed): 存在硬约束违规且未附覆盖说明,草案不变
    #[instrument(skip(self, action, options))]
    pub async fn apply_edit(
        &self,
        draft_id: &str,
        action: DraftAction,
        options: EditOptions,
    ) -> ApiResult<EditOutcome> {
        let actor_id = match &action {
            DraftAction::Assign { actor, .. }
            | DraftAction::Unassign { actor, .. }
            | DraftAction::Move { actor, .. } => actor.actor_id.clone(),
            _ => {
                return Err(ApiError::InvalidInput(
                    "apply_edit 仅接受 assign/unassign/move".to_string(),
                ))
            }
        };

        let mut sessions = self.sessions.lock().await;
        let session = self.session(&mut sessions, draft_id).await?;

        let warnings = if options.validate {
            let current = session.current()?.clone();
            self.pre_validate(&current, &action).await?
        } else {
            Vec::new()
        };

        let transition = session.machine.apply(action)?;
        let draft = session.current()?.clone();
        if transition.is_changed() {
            session.sync.notify(&draft);
            self.events.publish_or_warn(DraftEvent::edited(
                &draft.draft_id,
                &draft.business_id,
                transition.touched_shift_ids(),
                Some(actor_id),
            ));
        }

        Ok(EditOutcome {
            transition,
            warnings,
            draft,
        })
    }

    pub async fn undo(&self, draft_id: &str) -> ApiResult<Transition> {
        self.step(draft_id, DraftAction::Undo).await
    }

    pub async fn redo(&self, draft_id: &str) -> ApiResult<Transition> {
        self.step(draft_id, DraftAction::Redo).await
    }

    /// 丢弃全部编辑,恢复加载时的草案
    pub async fn reset(&self, draft_id: &str) -> ApiResult<Transition> {
        self.step(draft_id, DraftAction::Reset).await
    }

    pub async fn change_summary(&self, draft_id: &str) -> ApiResult<ChangeSummary> {
        let mut sessions = self.sessions.lock().await;
        let session = self.session(&mut sessions, draft_id).await?;
        Ok(session.machine.change_summary())
    }

    /// 自动同步状态
    pub async fn sync_status(&self, draft_id: &str) -> ApiResult<SyncState> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(draft_id)
            .map(|s| s.sync.status())
            .ok_or_else(|| ApiError::NotFound(format!("草案(id={})没有打开的编辑会话", draft_id)))
    }

    /// 立即同步并关闭编辑会话
    pub async fn close_draft(&self, draft_id: &str) -> ApiResult<SyncState> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.remove(draft_id) else {
            return Err(ApiError::NotFound(format!(
                "草案(id={})没有打开的编辑会话",
                draft_id
            )));
        };
        session.sync.flush().await?;
        debug!(draft_id, "编辑会话已关闭");
        Ok(session.sync.status())
    }

    // ==========================================
    // 校验与发布
    // ==========================================

    /// 整份草案批量校验
    pub async fn validate_draft(&self, draft_id: &str) -> ApiResult<DraftValidation> {
        let draft = self.get_draft(draft_id).await?;
        let pool = self
            .store
            .load_snapshot(&draft.business_id, draft.date_range)
            .await?
            .staff;
        Ok(self.evaluator.validate_draft(&draft, &pool))
    }

    /// 发布草案
    ///
    /// 先同步未保存的编辑,发布成功后关闭编辑会话
    #[instrument(skip(self, options))]
    pub async fn publish(
        &self,
        draft_id: &str,
        options: &PublishOptions,
    ) -> ApiResult<PublishResult> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(draft_id) {
            session.sync.flush().await?;
        }

        let result = self.publisher.publish(draft_id, options).await?;
        sessions.remove(draft_id);
        if !result.failed_notifications.is_empty() {
            warn!(
                draft_id,
                failed = result.failed_notifications.len(),
                "部分员工通知失败,可重试"
            );
        }
        Ok(result)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    async fn open_session(&self, draft: ScheduleDraft) {
        let draft_id = draft.draft_id.clone();
        let session = EditSession::open(self.store.clone(), draft, &self.config);
        self.sessions.lock().await.insert(draft_id, session);
    }

    /// 取已打开的会话,未打开时从存储加载 (仅 draft 状态可编辑)
    async fn session<'a>(
        &self,
        sessions: &'a mut HashMap<String, EditSession>,
        draft_id: &str,
    ) -> ApiResult<&'a mut EditSession> {
        if !sessions.contains_key(draft_id) {
            let draft = self.find_stored(draft_id).await?;
            if !draft.is_editable() {
                return Err(ApiError::InvalidStateTransition {
                    from: draft.status.to_string(),
                    to: "edit".to_string(),
                });
            }
            debug!(draft_id, "打开编辑会话");
            sessions.insert(
                draft_id.to_string(),
                EditSession::open(self.store.clone(), draft, &self.config),
            );
        }
        sessions
            .get_mut(draft_id)
            .ok_or_else(|| ApiError::InternalError(format!("编辑会话丢失: {}", draft_id)))
    }

    async fn find_stored(&self, draft_id: &str) -> ApiResult<ScheduleDraft> {
        self.store
            .find_draft(draft_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("ScheduleDraft(id={})不存在", draft_id)))
    }

    async fn step(&self, draft_id: &str, action: DraftAction) -> ApiResult<Transition> {
        let mut sessions = self.sessions.lock().await;
        let session = self.session(&mut sessions, draft_id).await?;
        let transition = session.machine.apply(action)?;

        if transition.is_changed() {
            let draft = session.current()?;
            session.sync.notify(draft);
            let shift_ids = match &transition {
                Transition::Reset => draft.shifts.iter().map(|s| s.shift_id.clone()).collect(),
                other => other.touched_shift_ids(),
            };
            self.events.publish_or_warn(DraftEvent::edited(
                &draft.draft_id,
                &draft.business_id,
                shift_ids,
                None,
            ));
        }
        Ok(transition)
    }

    /// 编辑前同步校验
    ///
    /// # 返回
    /// - Ok(warnings): 软约束警告,或附覆盖说明时降级的硬约束
    /// - Err(ValidationFailed): 硬约束违规且未附覆盖说明
    async fn pre_validate(
        &self,
        draft: &ScheduleDraft,
        action: &DraftAction,
    ) -> ApiResult<Vec<ConstraintViolation>> {
        let (shift_id, staff_id, override_note, existing) = match action {
            DraftAction::Assign {
                shift_id,
                staff_id,
                override_note,
                ..
            } => (
                shift_id.as_str(),
                staff_id.as_str(),
                override_note.as_deref(),
                draft.shifts.clone(),
            ),
            DraftAction::Move {
                assignment_id,
                from_shift_id,
                to_shift_id,
                override_note,
                ..
            } => {
                let staff_id = draft
                    .find_shift(from_shift_id)
                    .and_then(|s| s.assignments.iter().find(|a| a.assignment_id == *assignment_id))
                    .map(|a| a.staff_id.as_str())
                    .ok_or_else(|| DraftError::UnknownAssignment(assignment_id.clone()))?;
                // 调班后的负载: 源班次中移除该分配
                let mut existing = draft.shifts.clone();
                if let Some(source) = existing.iter_mut().find(|s| s.shift_id == *from_shift_id) {
                    source.assignments.retain(|a| a.assignment_id != *assignment_id);
                }
                (
                    to_shift_id.as_str(),
                    staff_id,
                    override_note.as_deref(),
                    existing,
                )
            }
            _ => return Ok(Vec::new()),
        };

        let shift = draft
            .find_shift(shift_id)
            .ok_or_else(|| DraftError::UnknownShift(shift_id.to_string()))?;
        // 重复分配为无操作,不做校验
        if shift.has_staff(staff_id) {
            return Ok(Vec::new());
        }

        let pool = self
            .store
            .load_snapshot(&draft.business_id, draft.date_range)
            .await?
            .staff;
        let violations = match pool.iter().find(|s| s.staff_id == staff_id) {
            Some(staff) => {
                self.evaluator
                    .validate_assignment(shift, staff, &existing, &pool)
                    .violations
            }
            None => vec![ConstraintViolation::new(
                ConstraintType::UnknownStaff,
                format!("员工 {} 不在员工池中", staff_id),
            )
            .for_staff(staff_id)
            .for_shift(shift_id)],
        };

        if let Some(note) = override_note {
            return Ok(violations
                .into_iter()
                .map(|v| v.downgrade_as_override(note))
                .collect());
        }
        let errors = violations.iter().filter(|v| v.is_error()).count();
        if errors > 0 {
            return Err(ApiError::ValidationFailed {
                reason: format!("分配违反 {} 条硬约束,需附覆盖说明", errors),
                violations,
            });
        }
        Ok(violations)
    }

    fn resolve_custom_strategy(&self, strategy_id: &str) -> ApiResult<StrategyWeights> {
        let manager = self.config_manager.as_ref().ok_or_else(|| {
            ApiError::InvalidInput("未配置 ConfigManager,无法解析自定义策略".to_string())
        })?;
        let profile = manager
            .get_custom_strategy_profile(strategy_id)
            .map_err(|e| ApiError::ConfigError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound(format!("自定义策略(id={})不存在", strategy_id)))?;
        StrategyWeights::from_profile(&profile).map_err(ApiError::InvalidInput)
    }
}
