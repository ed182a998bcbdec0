// ==========================================
// 排班草案引擎 - 草案变更摘要
// ==========================================
// 职责: 对比当前草案与加载时基线,按分配ID归类增/删/调班
// ==========================================

use crate::domain::draft::ScheduleDraft;
use crate::domain::shift::Assignment;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 单条分配变更
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentChange {
    pub assignment_id: String,
    pub staff_id: String,
    pub staff_name: String,
    pub from_shift_id: Option<String>,
    pub to_shift_id: Option<String>,
}

/// 变更摘要
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub added: Vec<AssignmentChange>,
    pub removed: Vec<AssignmentChange>,
    pub moved: Vec<AssignmentChange>,
    /// 内容与基线不同的班次
    pub modified_shift_ids: Vec<String>,
    /// 已应用的编辑条数
    pub edit_count: usize,
}

impl ChangeSummary {
    /// 对比基线与当前草案
    pub fn between(original: &ScheduleDraft, current: &ScheduleDraft, edit_count: usize) -> Self {
        let before = index_assignments(original);
        let after = index_assignments(current);

        let mut summary = ChangeSummary {
            edit_count,
            ..Default::default()
        };

        for (id, (shift_id, a)) in &after {
            match before.get(id) {
                None => summary.added.push(change(a, None, Some(shift_id))),
                Some((old_shift, _)) if old_shift != shift_id => {
                    summary.moved.push(change(a, Some(old_shift), Some(shift_id)))
                }
                Some(_) => {}
            }
        }
        for (id, (shift_id, a)) in &before {
            if !after.contains_key(id) {
                summary.removed.push(change(a, Some(shift_id), None));
            }
        }

        let mut modified = BTreeSet::new();
        for shift in &current.shifts {
            if original.find_shift(&shift.shift_id) != Some(shift) {
                modified.insert(shift.shift_id.clone());
            }
        }
        for shift in &original.shifts {
            if current.find_shift(&shift.shift_id).is_none() {
                modified.insert(shift.shift_id.clone());
            }
        }
        summary.modified_shift_ids = modified.into_iter().collect();
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.moved.is_empty()
            && self.modified_shift_ids.is_empty()
    }

    /// 可读描述
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return "无变更".to_string();
        }
        format!(
            "新增 {} 个分配, 移除 {} 个, 调班 {} 个, 涉及 {} 个班次",
            self.added.len(),
            self.removed.len(),
            self.moved.len(),
            self.modified_shift_ids.len()
        )
    }
}

fn index_assignments(draft: &ScheduleDraft) -> BTreeMap<&str, (&str, &Assignment)> {
    draft
        .shifts
        .iter()
        .flat_map(|s| {
            s.assignments
                .iter()
                .map(move |a| (a.assignment_id.as_str(), (s.shift_id.as_str(), a)))
        })
        .collect()
}

fn change(a: &Assignment, from: Option<&&str>, to: Option<&&str>) -> AssignmentChange {
    AssignmentChange {
        assignment_id: a.assignment_id.clone(),
        staff_id: a.staff_id.clone(),
        staff_name: a.staff_name.clone(),
        from_shift_id: from.map(|s| s.to_string()),
        to_shift_id: to.map(|s| s.to_string()),
    }
}
