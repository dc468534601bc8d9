/// 字段修改记录
///
/// 记录对文档做过的每一次字段修改，支持撤销/重做。

use std::fmt;
use std::time::Instant;

use crate::model::EntityKind;

/// 修改日志
///
/// # 实现细节
/// - 所有修改按时间顺序存放在 changes 中
/// - undo_stack 和 redo_stack 只存 changes 的下标
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    changes: Vec<FieldEdit>,
    undo_stack: Vec<usize>,
    redo_stack: Vec<usize>,
}

/// 一次字段修改
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEdit {
    pub entity: EntityKind,
    /// 修改前记录的键
    pub key: String,
    /// 修改后记录的键（改的是键字段时与 `key` 不同）
    pub key_after: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub applied_at: Instant,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次修改；新修改使重做栈失效
    pub fn add_change(&mut self, change: FieldEdit) {
        let index = self.changes.len();
        self.changes.push(change);
        self.undo_stack.push(index);
        self.redo_stack.clear();
    }

    /// 弹出最后一次有效修改
    pub fn undo(&mut self) -> Option<&FieldEdit> {
        let index = self.undo_stack.pop()?;
        self.redo_stack.push(index);
        Some(&self.changes[index])
    }

    /// 恢复最后一次撤销的修改
    pub fn redo(&mut self) -> Option<&FieldEdit> {
        let index = self.redo_stack.pop()?;
        self.undo_stack.push(index);
        Some(&self.changes[index])
    }

    /// 当前有效的修改数（撤销栈大小）
    pub fn len(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.undo_stack.is_empty()
    }

    /// 按应用顺序遍历有效修改
    pub fn iter(&self) -> impl Iterator<Item = &FieldEdit> {
        self.undo_stack.iter().map(|&idx| &self.changes[idx])
    }

    /// 全部修改，包括已撤销的
    pub fn all_changes(&self) -> &[FieldEdit] {
        &self.changes
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// 某条记录的有效修改
    pub fn changes_for(&self, entity: EntityKind, key: &str) -> Vec<&FieldEdit> {
        self.iter()
            .filter(|change| change.entity == entity && (change.key == key || change.key_after == key))
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "变更总数: {}, 有效变更: {}, 可撤销: {}, 可重做: {}",
            self.changes.len(),
            self.undo_stack.len(),
            self.can_undo(),
            self.can_redo()
        )
    }
}

fn shorten(value: Option<&str>) -> String {
    match value {
        None => "(null)".to_string(),
        Some(text) if text.chars().count() > 30 => {
            format!("{}...", text.chars().take(30).collect::<String>())
        }
        Some(text) => text.to_string(),
    }
}

impl fmt::Display for FieldEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} {}] {}: \"{}\" -> \"{}\"",
            self.entity,
            self.key,
            self.field,
            shorten(self.old_value.as_deref()),
            shorten(self.new_value.as_deref())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(key: &str, old: &str, new: &str) -> FieldEdit {
        FieldEdit {
            entity: EntityKind::Translation,
            key: key.to_string(),
            key_after: key.to_string(),
            field: "value".to_string(),
            old_value: Some(old.to_string()),
            new_value: Some(new.to_string()),
            applied_at: Instant::now(),
        }
    }

    #[test]
    fn test_undo_redo() {
        let mut log = ChangeLog::new();
        log.add_change(change("A", "a", "b"));
        log.add_change(change("B", "c", "d"));
        log.add_change(change("C", "e", "f"));
        assert_eq!(log.len(), 3);

        assert_eq!(log.undo().unwrap().key, "C");
        log.undo().unwrap();
        assert_eq!(log.len(), 1);

        assert_eq!(log.redo().unwrap().key, "B");
        assert_eq!(log.len(), 2);
        assert_eq!(log.all_changes().len(), 3);
    }

    #[test]
    fn test_new_change_clears_redo() {
        let mut log = ChangeLog::new();
        log.add_change(change("A", "a", "b"));
        log.undo().unwrap();
        assert!(log.can_redo());

        log.add_change(change("B", "c", "d"));
        assert!(!log.can_redo());
    }

    #[test]
    fn test_empty_stacks() {
        let mut log = ChangeLog::new();
        assert!(log.undo().is_none());
        assert!(log.redo().is_none());
        assert!(log.is_empty());
    }

    #[test]
    fn test_changes_for_record() {
        let mut log = ChangeLog::new();
        log.add_change(change("DQ_1", "a", "b"));
        log.add_change(change("DQ_2", "x", "y"));
        log.add_change(change("DQ_1", "b", "c"));
        assert_eq!(log.changes_for(EntityKind::Translation, "DQ_1").len(), 2);
        assert!(log.changes_for(EntityKind::Quest, "DQ_1").is_empty());

        log.clear();
        assert!(!log.can_undo());
    }

    #[test]
    fn test_display_shortens_long_values() {
        let long = "x".repeat(40);
        let text = change("DQ_1", "a", &long).to_string();
        assert!(text.contains(&format!("{}...", "x".repeat(30))));
        assert!(text.starts_with("[translation DQ_1] value"));
    }

    #[test]
    fn test_summary() {
        let mut log = ChangeLog::new();
        log.add_change(change("A", "a", "b"));
        log.add_change(change("B", "c", "d"));
        let summary = log.summary();
        assert!(summary.contains("变更总数: 2"));
        assert!(summary.contains("有效变更: 2"));
    }
}
