//! 链接解析：别名目标、对话后续节点、文本键
//!
//! 所有链接都在查询时按 ID 查找，断开的链接只会被报告，不会报错。

use std::collections::HashSet;

use super::{Alias, DialogEntry, Document, Translation};
use crate::utils::Warning;

/// 对话链接的解析结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DialogLink<'a> {
    Resolved(&'a DialogEntry),
    Dangling(i32),
}

impl Document {
    /// 解析键：直接命中翻译，或沿别名链找到翻译
    ///
    /// 别名成环或目标缺失时返回 `None`。
    pub fn resolve_key(&self, key: &str) -> Option<&Translation> {
        let mut visited = HashSet::new();
        let mut current = key;
        loop {
            if let Some(translation) = self.translation(current) {
                return Some(translation.get());
            }
            if !visited.insert(current) {
                return None;
            }
            current = self.alias(current)?.target.as_str();
        }
    }

    /// 别名最终指向的翻译
    pub fn resolve_alias(&self, alias: &Alias) -> Option<&Translation> {
        self.resolve_key(&alias.target)
    }

    /// 对话显示的文本：内联文本优先，否则解析文本键
    pub fn dialog_text<'a>(&'a self, entry: &'a DialogEntry) -> Option<&'a str> {
        if let Some(text) = entry.text.as_deref() {
            return Some(text);
        }
        let key = entry.text_key.as_deref()?;
        self.resolve_key(key).map(|t| t.value.as_str())
    }

    /// 同一棵对话树中指定下标的节点
    pub fn dialog_at(&self, tree: &str, index: usize) -> Option<&DialogEntry> {
        self.dialogs
            .iter()
            .map(|d| d.get())
            .find(|d| d.tree.as_deref() == Some(tree) && d.index == Some(index))
    }

    /// 按 `树#下标` 形式的 ID 找同一棵树里的节点，重名的树各自解析
    fn sibling_at(&self, entry: &DialogEntry, index: usize) -> Option<&DialogEntry> {
        let (scope, _) = entry.id.rsplit_once('#')?;
        self.dialog(&format!("{}#{}", scope, index))
            .map(|d| d.get())
            .filter(|d| d.tree == entry.tree)
    }

    /// 解析对话的全部后续链接
    pub fn next_dialogs<'a>(&'a self, entry: &DialogEntry) -> Vec<DialogLink<'a>> {
        entry
            .next
            .iter()
            .map(|&link| {
                let target = entry.tree.as_deref().and_then(|tree| {
                    let index = usize::try_from(link).ok()?;
                    self.sibling_at(entry, index)
                        .or_else(|| self.dialog_at(tree, index))
                });
                match target {
                    Some(dialog) => DialogLink::Resolved(dialog),
                    None => DialogLink::Dangling(link),
                }
            })
            .collect()
    }

    /// 线性对话视图：沿第一个后续链接前进，遇到重复节点或终点停止
    pub fn walk_conversation<'a>(&'a self, start: &str) -> Vec<&'a DialogEntry> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.dialog(start).map(|d| d.get());

        while let Some(entry) = current {
            if !visited.insert(entry.id.as_str()) {
                break;
            }
            path.push(entry);
            current = self
                .next_dialogs(entry)
                .into_iter()
                .find_map(|link| match link {
                    DialogLink::Resolved(next) => Some(next),
                    DialogLink::Dangling(_) => None,
                });
        }
        path
    }

    /// 从某个节点出发能到达的全部节点（广度优先，每个节点只访问一次）
    pub fn reachable_dialogs<'a>(&'a self, start: &str) -> Vec<&'a DialogEntry> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = std::collections::VecDeque::new();

        if let Some(entry) = self.dialog(start) {
            queue.push_back(entry.get());
        }
        while let Some(entry) = queue.pop_front() {
            if !visited.insert(entry.id.as_str()) {
                continue;
            }
            order.push(entry);
            for link in self.next_dialogs(entry) {
                if let DialogLink::Resolved(next) = link {
                    if !visited.contains(next.id.as_str()) {
                        queue.push_back(next);
                    }
                }
            }
        }
        order
    }

    /// 文档内全部断开的引用
    pub fn dangling_references(&self) -> Vec<Warning> {
        let mut found = Vec::new();

        for alias in &self.aliases {
            if self.resolve_alias(alias).is_none() {
                found.push(Warning::DanglingReference {
                    from: alias.source.clone(),
                    target: alias.target.clone(),
                });
            }
        }

        let check_text_keys = self.capabilities().translations.holds();
        for dialog in &self.dialogs {
            for link in self.next_dialogs(dialog) {
                if let DialogLink::Dangling(index) = link {
                    found.push(Warning::DanglingReference {
                        from: dialog.id.clone(),
                        target: format!("{}#{}", dialog.tree.as_deref().unwrap_or_default(), index),
                    });
                }
            }
            if check_text_keys && dialog.text.is_none() {
                if let Some(key) = dialog.text_key.as_deref() {
                    if self.resolve_key(key).is_none() {
                        found.push(Warning::DanglingReference {
                            from: dialog.id.clone(),
                            target: key.to_string(),
                        });
                    }
                }
            }
        }

        found
    }
}
