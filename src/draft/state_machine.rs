// ==========================================
// 排班草案引擎 - 草案状态机
// ==========================================
// 职责: 持有编辑会话内的草案,按动作归约 (reducer),维护撤销/重做日志
// 红线: 单编辑会话内顺序执行,不依赖锁
// 红线: 从基线按序重放已应用的编辑必须精确复现当前草案
// 红线: 失败的动作不改变可见草案
// ==========================================

use crate::domain::draft::ScheduleDraft;
use crate::domain::edit_action::{Actor, EditAction, EditOperation};
use crate::domain::shift::Assignment;
use crate::draft::error::{DraftError, DraftResult};
use crate::draft::history::EditHistory;
use crate::draft::ops::{apply_forward, apply_inverse};
use crate::draft::summary::ChangeSummary;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

// ==========================================
// DraftAction - 归约动作
// ==========================================
#[derive(Debug, Clone)]
pub enum DraftAction {
    /// 加载草案 (成为新的基线,清空历史)
    Load(ScheduleDraft),
    Assign {
        shift_id: String,
        staff_id: String,
        staff_name: String,
        actor: Actor,
        /// 人工覆盖硬约束的说明
        override_note: Option<String>,
    },
    Unassign {
        assignment_id: String,
        actor: Actor,
    },
    Move {
        assignment_id: String,
        from_shift_id: String,
        to_shift_id: String,
        actor: Actor,
        override_note: Option<String>,
    },
    Undo,
    Redo,
    /// 丢弃全部编辑,恢复基线
    Reset,
    /// 应用其他编辑者的编辑 (保留原编辑ID)
    ApplyRemote(EditAction),
    /// 以补偿编辑回退某条已应用编辑 (冲突裁决)
    Revert { edit_id: String, actor: Actor },
}

/// 归约结果
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// 无变化 (如重复分配)
    Unchanged,
    Loaded,
    Edited(EditAction),
    Undone(EditAction),
    Redone(EditAction),
    Reset,
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Transition::Unchanged)
    }

    /// 触及的班次
    pub fn touched_shift_ids(&self) -> Vec<String> {
        match self {
            Transition::Edited(e) | Transition::Undone(e) | Transition::Redone(e) => e
                .touched_shift_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

// ==========================================
// DraftStateMachine
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct DraftStateMachine {
    original: Option<ScheduleDraft>,
    current: Option<ScheduleDraft>,
    history: EditHistory,
}

impl DraftStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以草案初始化
    pub fn with_draft(draft: ScheduleDraft) -> Self {
        let mut machine = Self::new();
        machine.load(draft);
        machine
    }

    /// 归约一个动作
    ///
    /// # 返回
    /// - Ok(Transition): 状态变化
    /// - Err: 动作非法,草案保持不变
    pub fn apply(&mut self, action: DraftAction) -> DraftResult<Transition> {
        match action {
            DraftAction::Load(draft) => {
                self.load(draft);
                Ok(Transition::Loaded)
            }
            DraftAction::Assign {
                shift_id,
                staff_id,
                staff_name,
                actor,
                override_note,
            } => self.assign(&shift_id, &staff_id, &staff_name, actor, override_note),
            DraftAction::Unassign {
                assignment_id,
                actor,
            } => self.unassign(&assignment_id, actor),
            DraftAction::Move {
                assignment_id,
                from_shift_id,
                to_shift_id,
                actor,
                override_note,
            } => self.move_assignment(
                &assignment_id,
                &from_shift_id,
                &to_shift_id,
                actor,
                override_note,
            ),
            DraftAction::Undo => self.undo(),
            DraftAction::Redo => self.redo(),
            DraftAction::Reset => self.reset(),
            DraftAction::ApplyRemote(edit) => self.apply_remote(edit),
            DraftAction::Revert { edit_id, actor } => self.revert(&edit_id, actor),
        }
    }

    // ===== 选择器 =====

    pub fn draft(&self) -> Option<&ScheduleDraft> {
        self.current.as_ref()
    }

    pub fn original(&self) -> Option<&ScheduleDraft> {
        self.original.as_ref()
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// 当前草案与基线是否不同
    pub fn is_modified(&self) -> bool {
        match (&self.original, &self.current) {
            (Some(original), Some(current)) => original.shifts != current.shifts,
            _ => false,
        }
    }

    pub fn change_summary(&self) -> ChangeSummary {
        match (&self.original, &self.current) {
            (Some(original), Some(current)) => {
                ChangeSummary::between(original, current, self.history.index())
            }
            _ => ChangeSummary::default(),
        }
    }

    /// 从基线重放已应用的编辑
    pub fn replay(&self) -> DraftResult<ScheduleDraft> {
        let mut draft = self.original.clone().ok_or(DraftError::NotLoaded)?;
        for (index, edit) in self.history.applied().iter().enumerate() {
            apply_forward(&mut draft, &edit.operation).map_err(|e| with_index(e, index))?;
        }
        Ok(draft)
    }

    /// 校验重放不变量
    pub fn verify_replay(&self) -> DraftResult<()> {
        let replayed = self.replay()?;
        let current = self.current.as_ref().ok_or(DraftError::NotLoaded)?;
        if replayed.shifts != current.shifts {
            return Err(DraftError::ReplayMismatch {
                index: self.history.index(),
                detail: "重放结果与当前草案不一致".to_string(),
            });
        }
        Ok(())
    }

    // ===== 动作实现 =====

    fn load(&mut self, draft: ScheduleDraft) {
        debug!(draft_id = %draft.draft_id, shifts = draft.shifts.len(), "加载草案");
        self.original = Some(draft.clone());
        self.current = Some(draft);
        self.history.clear();
    }

    fn editable(&self) -> DraftResult<&ScheduleDraft> {
        let draft = self.current.as_ref().ok_or(DraftError::NotLoaded)?;
        if !draft.is_editable() {
            return Err(DraftError::NotEditable {
                status: draft.status.to_string(),
            });
        }
        Ok(draft)
    }

    fn assign(
        &mut self,
        shift_id: &str,
        staff_id: &str,
        staff_name: &str,
        actor: Actor,
        override_note: Option<String>,
    ) -> DraftResult<Transition> {
        let draft = self.editable()?;
        let shift = draft
            .find_shift(shift_id)
            .ok_or_else(|| DraftError::UnknownShift(shift_id.to_string()))?;
        if shift.has_staff(staff_id) {
            return Ok(Transition::Unchanged);
        }

        let mut assignment =
            Assignment::new(Uuid::new_v4().to_string(), shift_id, staff_id, staff_name);
        assignment.override_note = override_note;
        let op = EditOperation::Assign {
            shift_id: shift_id.to_string(),
            assignment,
            shift_was_modified: shift.is_modified,
        };
        self.commit(EditAction::new(op, actor))
    }

    fn unassign(&mut self, assignment_id: &str, actor: Actor) -> DraftResult<Transition> {
        let draft = self.editable()?;
        let (shift_id, position) = draft
            .locate_assignment(assignment_id)
            .ok_or_else(|| DraftError::UnknownAssignment(assignment_id.to_string()))?;
        let shift = draft
            .find_shift(&shift_id)
            .ok_or_else(|| DraftError::UnknownShift(shift_id.clone()))?;

        let op = EditOperation::Unassign {
            assignment: shift.assignments[position].clone(),
            position,
            shift_was_modified: shift.is_modified,
            shift_id,
        };
        self.commit(EditAction::new(op, actor))
    }

    fn move_assignment(
        &mut self,
        assignment_id: &str,
        from_shift_id: &str,
        to_shift_id: &str,
        actor: Actor,
        override_note: Option<String>,
    ) -> DraftResult<Transition> {
        let draft = self.editable()?;
        let from = draft
            .find_shift(from_shift_id)
            .ok_or_else(|| DraftError::UnknownShift(from_shift_id.to_string()))?;
        let to = draft
            .find_shift(to_shift_id)
            .ok_or_else(|| DraftError::UnknownShift(to_shift_id.to_string()))?;
        let from_position = from
            .position_of(assignment_id)
            .ok_or_else(|| DraftError::UnknownAssignment(assignment_id.to_string()))?;

        let before = from.assignments[from_position].clone();
        if to.has_staff(&before.staff_id) {
            return Ok(Transition::Unchanged);
        }

        let mut after = before.clone();
        after.shift_id = to_shift_id.to_string();
        after.is_modified = true;
        if override_note.is_some() {
            after.override_note = override_note;
        }
        let op = EditOperation::Move {
            from_shift_id: from_shift_id.to_string(),
            to_shift_id: to_shift_id.to_string(),
            before,
            after,
            from_position,
            from_was_modified: from.is_modified,
            to_was_modified: to.is_modified,
        };
        self.commit(EditAction::new(op, actor))
    }

    fn undo(&mut self) -> DraftResult<Transition> {
        let edit = self
            .history
            .undo_target()
            .cloned()
            .ok_or(DraftError::HistoryUnderflow)?;
        let index = self.history.index() - 1;
        self.mutate(|draft| apply_inverse(draft, &edit.operation))
            .map_err(|e| with_index(e, index))?;
        self.history.step_back();
        Ok(Transition::Undone(edit))
    }

    fn redo(&mut self) -> DraftResult<Transition> {
        let edit = self
            .history
            .redo_target()
            .cloned()
            .ok_or(DraftError::HistoryOverflow)?;
        let index = self.history.index();
        self.mutate(|draft| apply_forward(draft, &edit.operation))
            .map_err(|e| with_index(e, index))?;
        self.history.step_forward();
        Ok(Transition::Redone(edit))
    }

    fn reset(&mut self) -> DraftResult<Transition> {
        let original = self.original.clone().ok_or(DraftError::NotLoaded)?;
        self.current = Some(original);
        self.history.clear();
        Ok(Transition::Reset)
    }

    /// 远端编辑: 按本地状态重新捕获位置与修改标记后应用
    ///
    /// 重复投递或已被本地状态吸收的编辑视为无变化
    fn apply_remote(&mut self, edit: EditAction) -> DraftResult<Transition> {
        if self.history.contains(&edit.edit_id) {
            return Ok(Transition::Unchanged);
        }
        let draft = self.editable()?;

        let op = match &edit.operation {
            EditOperation::Assign {
                shift_id,
                assignment,
                ..
            } => {
                let shift = draft
                    .find_shift(shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(shift_id.clone()))?;
                if shift.has_staff(&assignment.staff_id)
                    || draft.locate_assignment(&assignment.assignment_id).is_some()
                {
                    return Ok(Transition::Unchanged);
                }
                EditOperation::Assign {
                    shift_id: shift_id.clone(),
                    assignment: assignment.clone(),
                    shift_was_modified: shift.is_modified,
                }
            }
            EditOperation::Unassign { assignment, .. } => {
                let Some((shift_id, position)) = draft.locate_assignment(&assignment.assignment_id)
                else {
                    return Ok(Transition::Unchanged);
                };
                let shift = draft
                    .find_shift(&shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(shift_id.clone()))?;
                EditOperation::Unassign {
                    assignment: shift.assignments[position].clone(),
                    position,
                    shift_was_modified: shift.is_modified,
                    shift_id,
                }
            }
            EditOperation::Move {
                from_shift_id,
                to_shift_id,
                after,
                ..
            } => {
                let from = draft
                    .find_shift(from_shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(from_shift_id.clone()))?;
                let to = draft
                    .find_shift(to_shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(to_shift_id.clone()))?;
                let Some(from_position) = from.position_of(&after.assignment_id) else {
                    return Ok(Transition::Unchanged);
                };
                if to.has_staff(&after.staff_id) {
                    return Ok(Transition::Unchanged);
                }
                EditOperation::Move {
                    from_shift_id: from_shift_id.clone(),
                    to_shift_id: to_shift_id.clone(),
                    before: from.assignments[from_position].clone(),
                    after: after.clone(),
                    from_position,
                    from_was_modified: from.is_modified,
                    to_was_modified: to.is_modified,
                }
            }
        };

        debug!(edit_id = %edit.edit_id, actor = %edit.actor.actor_id, "应用远端编辑");
        self.commit(EditAction {
            operation: op,
            ..edit
        })
    }

    /// 生成补偿编辑,回退一条已应用的编辑
    fn revert(&mut self, edit_id: &str, actor: Actor) -> DraftResult<Transition> {
        let target = self
            .history
            .find_applied(edit_id)
            .cloned()
            .ok_or_else(|| DraftError::UnknownEdit(edit_id.to_string()))?;
        let draft = self.editable()?;

        let op = match &target.operation {
            EditOperation::Assign { assignment, .. } => {
                let Some((shift_id, position)) = draft.locate_assignment(&assignment.assignment_id)
                else {
                    return Ok(Transition::Unchanged);
                };
                let shift = draft
                    .find_shift(&shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(shift_id.clone()))?;
                EditOperation::Unassign {
                    assignment: shift.assignments[position].clone(),
                    position,
                    shift_was_modified: shift.is_modified,
                    shift_id,
                }
            }
            EditOperation::Unassign {
                shift_id,
                assignment,
                ..
            } => {
                let shift = draft
                    .find_shift(shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(shift_id.clone()))?;
                if shift.has_staff(&assignment.staff_id)
                    || draft.locate_assignment(&assignment.assignment_id).is_some()
                {
                    return Ok(Transition::Unchanged);
                }
                EditOperation::Assign {
                    shift_id: shift_id.clone(),
                    assignment: assignment.clone(),
                    shift_was_modified: shift.is_modified,
                }
            }
            EditOperation::Move {
                from_shift_id,
                to_shift_id,
                before,
                ..
            } => {
                let moved_to = draft
                    .find_shift(to_shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(to_shift_id.clone()))?;
                let back_to = draft
                    .find_shift(from_shift_id)
                    .ok_or_else(|| DraftError::UnknownShift(from_shift_id.clone()))?;
                let Some(position) = moved_to.position_of(&before.assignment_id) else {
                    return Ok(Transition::Unchanged);
                };
                if back_to.has_staff(&before.staff_id) {
                    return Ok(Transition::Unchanged);
                }
                EditOperation::Move {
                    from_shift_id: to_shift_id.clone(),
                    to_shift_id: from_shift_id.clone(),
                    before: moved_to.assignments[position].clone(),
                    after: before.clone(),
                    from_position: position,
                    from_was_modified: moved_to.is_modified,
                    to_was_modified: back_to.is_modified,
                }
            }
        };

        let mut compensation = EditAction::new(op, actor);
        compensation.description = format!("冲突裁决回退: {}", target.description);
        self.commit(compensation)
    }

    // ===== 内部 =====

    /// 应用并记入历史
    fn commit(&mut self, edit: EditAction) -> DraftResult<Transition> {
        self.mutate(|draft| apply_forward(draft, &edit.operation))?;
        self.history.push(edit.clone());
        Ok(Transition::Edited(edit))
    }

    /// 原地变更当前草案
    ///
    /// ops 先校验后变更,失败时草案保持原状
    fn mutate(
        &mut self,
        f: impl FnOnce(&mut ScheduleDraft) -> DraftResult<()>,
    ) -> DraftResult<()> {
        let current = self.current.as_mut().ok_or(DraftError::NotLoaded)?;
        if let Err(e) = f(current) {
            warn!(error = %e, "草案变更失败,保持原状态");
            return Err(e);
        }
        current.updated_at = Utc::now();
        Ok(())
    }
}

fn with_index(err: DraftError, index: usize) -> DraftError {
    match err {
        DraftError::ReplayMismatch { detail, .. } => DraftError::ReplayMismatch { index, detail },
        other => other,
    }
}
