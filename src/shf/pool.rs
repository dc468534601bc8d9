use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// 字符串池中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PooledString {
    pub object_id: i32,
    /// 记录在文件中的偏移
    pub offset: usize,
    pub text: String,
}

/// 按出现顺序保存的全部字符串对象
#[derive(Debug, Clone, Default)]
pub struct StringPool {
    entries: Vec<PooledString>,
    by_id: HashMap<i32, usize>,
}

impl StringPool {
    pub(crate) fn push(&mut self, object_id: i32, offset: usize, text: String) {
        self.by_id.insert(object_id, self.entries.len());
        self.entries.push(PooledString {
            object_id,
            offset,
            text,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PooledString> {
        self.entries.iter()
    }

    pub fn get(&self, object_id: i32) -> Option<&str> {
        self.by_id
            .get(&object_id)
            .map(|&index| self.entries[index].text.as_str())
    }

    /// 按命名约定分组
    pub fn summary(&self) -> PoolSummary {
        let mut quest_ids = BTreeSet::new();
        let mut npc_refs = BTreeSet::new();
        let mut quest_items = BTreeSet::new();
        let mut enemies = BTreeSet::new();
        let mut locations = BTreeSet::new();
        let mut groups = BTreeSet::new();
        let mut dialog_texts = Vec::new();

        for entry in &self.entries {
            let text = entry.text.as_str();
            if let Some(n) = numbered(text, "Q_") {
                quest_ids.insert((n, text.to_string()));
            } else if let Some(n) = numbered(text, "NPC_") {
                npc_refs.insert((n, text.to_string()));
            } else if text.starts_with("QITEM_") {
                quest_items.insert(text.to_string());
            } else if text.starts_with("ENEMY_") {
                enemies.insert(text.to_string());
            } else if text.starts_with("LOC_") {
                locations.insert(text.to_string());
            }

            if is_group_keyword(text) {
                groups.insert(text.to_string());
            }
            if is_dialog_text(text) {
                dialog_texts.push((entry.object_id, text.to_string()));
            }
        }
        dialog_texts.sort_by_key(|(id, _)| *id);

        PoolSummary {
            total: self.entries.len(),
            quest_ids: quest_ids.into_iter().map(|(_, id)| id).collect(),
            npc_refs: npc_refs.into_iter().map(|(_, id)| id).collect(),
            quest_items: quest_items.into_iter().collect(),
            enemies: enemies.into_iter().collect(),
            locations: locations.into_iter().collect(),
            groups: groups.into_iter().collect(),
            dialog_texts,
        }
    }
}

/// 字符串池按命名约定分组的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub total: usize,
    /// `Q_<n>`，按编号排序
    pub quest_ids: Vec<String>,
    /// `NPC_<n>`，按编号排序
    pub npc_refs: Vec<String>,
    pub quest_items: Vec<String>,
    pub enemies: Vec<String>,
    pub locations: Vec<String>,
    /// 区域、公会等全大写关键字
    pub groups: Vec<String>,
    /// (对象 ID, 文本)
    pub dialog_texts: Vec<(i32, String)>,
}

/// `prefix` 后全是数字时返回编号
fn numbered(text: &str, prefix: &str) -> Option<u64> {
    let digits = text.strip_prefix(prefix)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

const NON_GROUP_PREFIXES: &[&str] = &["NPC_", "Q_", "LOC_", "QITEM_"];

/// 3 到 31 个字符，大写字母开头，其余为大写字母或下划线
fn is_group_keyword(text: &str) -> bool {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (3..=31).contains(&text.len())
        && first.is_ascii_uppercase()
        && chars.all(|c| c.is_ascii_uppercase() || c == '_')
        && !NON_GROUP_PREFIXES.iter().any(|p| text.starts_with(p))
}

const SENTENCE_PUNCTUATION: &[char] = &['.', '!', '?', ',', ';', ':'];

/// 像台词的长文本；编辑器自己写入的说明除外
fn is_dialog_text(text: &str) -> bool {
    text.chars().count() > 20
        && text.contains(SENTENCE_PUNCTUATION)
        && !text.starts_with("WhizzEdit")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(texts: &[&str]) -> StringPool {
        let mut pool = StringPool::default();
        for (i, text) in texts.iter().enumerate() {
            pool.push(i as i32 + 1, i * 10, text.to_string());
        }
        pool
    }

    #[test]
    fn test_lookup_by_object_id() {
        let pool = pool(&["a", "b"]);
        assert_eq!(pool.get(2), Some("b"));
        assert_eq!(pool.get(9), None);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_summary_groups_by_convention() {
        let pool = pool(&[
            "Q_12",
            "Q_2",
            "Q_2",
            "Q_X",
            "NPC_100",
            "NPC_7",
            "QITEM_KEY",
            "ENEMY_WOLF",
            "LOC_TOWER",
            "ASHOS",
            "CATHALON",
            "WhizzEdit generated file, do not edit.",
            "Have you seen my brother, stranger?",
            "short.",
        ]);
        let summary = pool.summary();
        assert_eq!(summary.total, 14);
        assert_eq!(summary.quest_ids, vec!["Q_2", "Q_12"], "按编号排序并去重");
        assert_eq!(summary.npc_refs, vec!["NPC_7", "NPC_100"]);
        assert_eq!(summary.quest_items, vec!["QITEM_KEY"]);
        assert_eq!(summary.enemies, vec!["ENEMY_WOLF"]);
        assert_eq!(summary.locations, vec!["LOC_TOWER"]);
        assert_eq!(summary.groups, vec!["ASHOS", "CATHALON", "ENEMY_WOLF"]);
        assert_eq!(summary.dialog_texts.len(), 1);
        assert_eq!(summary.dialog_texts[0].1, "Have you seen my brother, stranger?");
    }
}
