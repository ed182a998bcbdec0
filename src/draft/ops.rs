// ==========================================
// 排班草案引擎 - 编辑增量的正向应用与反演
// ==========================================
// 红线: 只依据 EditOperation 中的最小增量,不读取整份快照
// 红线: 校验失败时不修改草案 (先校验,后变更)
// ==========================================

use crate::domain::draft::ScheduleDraft;
use crate::domain::edit_action::EditOperation;
use crate::domain::shift::{Assignment, Shift};
use crate::draft::error::{DraftError, DraftResult};

/// 正向应用一次编辑
pub(crate) fn apply_forward(draft: &mut ScheduleDraft, op: &EditOperation) -> DraftResult<()> {
    match op {
        EditOperation::Assign {
            shift_id,
            assignment,
            ..
        } => {
            let shift = shift_mut(draft, shift_id)?;
            shift.assignments.push(assignment.clone());
            touch(shift, true);
        }
        EditOperation::Unassign {
            shift_id,
            assignment,
            position,
            ..
        } => {
            let shift = shift_mut(draft, shift_id)?;
            expect_at(shift, *position, &assignment.assignment_id)?;
            shift.assignments.remove(*position);
            touch(shift, true);
        }
        EditOperation::Move {
            from_shift_id,
            to_shift_id,
            before,
            after,
            from_position,
            ..
        } => {
            shift_mut(draft, to_shift_id)?;
            let from = shift_mut(draft, from_shift_id)?;
            expect_at(from, *from_position, &before.assignment_id)?;
            from.assignments.remove(*from_position);
            touch(from, true);
            let to = shift_mut(draft, to_shift_id)?;
            to.assignments.push(after.clone());
            touch(to, true);
        }
    }
    draft.recompute_overall_confidence();
    Ok(())
}

/// 反演一次编辑 (撤销)
pub(crate) fn apply_inverse(draft: &mut ScheduleDraft, op: &EditOperation) -> DraftResult<()> {
    match op {
        EditOperation::Assign {
            shift_id,
            assignment,
            shift_was_modified,
        } => {
            let shift = shift_mut(draft, shift_id)?;
            expect_last(shift, &assignment.assignment_id)?;
            shift.assignments.pop();
            touch(shift, *shift_was_modified);
        }
        EditOperation::Unassign {
            shift_id,
            assignment,
            position,
            shift_was_modified,
        } => {
            let shift = shift_mut(draft, shift_id)?;
            if *position > shift.assignments.len() {
                return Err(mismatch(format!(
                    "班次 {} 无法在位置 {} 恢复分配",
                    shift_id, position
                )));
            }
            shift.assignments.insert(*position, assignment.clone());
            touch(shift, *shift_was_modified);
        }
        EditOperation::Move {
            from_shift_id,
            to_shift_id,
            before,
            after,
            from_position,
            from_was_modified,
            to_was_modified,
        } => {
            let to = shift_mut(draft, to_shift_id)?;
            expect_last(to, &after.assignment_id)?;
            let from_len = shift_mut(draft, from_shift_id)?.assignments.len();
            if *from_position > from_len {
                return Err(mismatch(format!(
                    "班次 {} 无法在位置 {} 恢复分配",
                    from_shift_id, from_position
                )));
            }
            let to = shift_mut(draft, to_shift_id)?;
            to.assignments.pop();
            touch(to, *to_was_modified);
            let from = shift_mut(draft, from_shift_id)?;
            from.assignments.insert(*from_position, before.clone());
            touch(from, *from_was_modified);
        }
    }
    draft.recompute_overall_confidence();
    Ok(())
}

fn shift_mut<'a>(draft: &'a mut ScheduleDraft, shift_id: &str) -> DraftResult<&'a mut Shift> {
    draft
        .find_shift_mut(shift_id)
        .ok_or_else(|| DraftError::UnknownShift(shift_id.to_string()))
}

fn touch(shift: &mut Shift, modified: bool) {
    shift.is_modified = modified;
    shift.recompute_status();
}

fn expect_at(shift: &Shift, position: usize, assignment_id: &str) -> DraftResult<()> {
    match shift.assignments.get(position) {
        Some(a) if a.assignment_id == assignment_id => Ok(()),
        _ => Err(mismatch(format!(
            "班次 {} 位置 {} 不是分配 {}",
            shift.shift_id, position, assignment_id
        ))),
    }
}

fn expect_last(shift: &Shift, assignment_id: &str) -> DraftResult<()> {
    match shift.assignments.last() {
        Some(Assignment {
            assignment_id: last,
            ..
        }) if last == assignment_id => Ok(()),
        _ => Err(mismatch(format!(
            "班次 {} 末尾不是分配 {}",
            shift.shift_id, assignment_id
        ))),
    }
}

fn mismatch(detail: String) -> DraftError {
    DraftError::ReplayMismatch { index: 0, detail }
}
