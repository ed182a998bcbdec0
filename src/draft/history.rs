// ==========================================
// 排班草案引擎 - 线性编辑历史
// ==========================================
// 红线: 撤销后出现新编辑时丢弃 "未来" 的重做条目 (不分叉)
// ==========================================

use crate::domain::edit_action::EditAction;

#[derive(Debug, Clone, Default)]
pub struct EditHistory {
    actions: Vec<EditAction>,
    /// 已应用条目数 (historyIndex)
    index: usize,
}

impl EditHistory {
    /// 追加新编辑,截断重做分支
    pub fn push(&mut self, edit: EditAction) {
        self.actions.truncate(self.index);
        self.actions.push(edit);
        self.index = self.actions.len();
    }

    pub fn clear(&mut self) {
        self.actions.clear();
        self.index = 0;
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.index > 0
    }

    pub fn can_redo(&self) -> bool {
        self.index < self.actions.len()
    }

    /// 下一次撤销的目标
    pub fn undo_target(&self) -> Option<&EditAction> {
        self.index.checked_sub(1).and_then(|i| self.actions.get(i))
    }

    /// 下一次重做的目标
    pub fn redo_target(&self) -> Option<&EditAction> {
        self.actions.get(self.index)
    }

    pub(crate) fn step_back(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    pub(crate) fn step_forward(&mut self) {
        self.index = (self.index + 1).min(self.actions.len());
    }

    /// 已应用的编辑 (0..index)
    pub fn applied(&self) -> &[EditAction] {
        &self.actions[..self.index]
    }

    /// 全部编辑 (含可重做部分)
    pub fn entries(&self) -> &[EditAction] {
        &self.actions
    }

    /// 在已应用部分中查找
    pub fn find_applied(&self, edit_id: &str) -> Option<&EditAction> {
        self.applied().iter().find(|e| e.edit_id == edit_id)
    }

    pub fn contains(&self, edit_id: &str) -> bool {
        self.actions.iter().any(|e| e.edit_id == edit_id)
    }
}
