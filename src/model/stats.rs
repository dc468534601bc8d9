use indexmap::IndexMap;
use serde::Serialize;
use std::collections::HashSet;

use super::{Category, Document, FormatKind, Speaker};

/// 单棵对话树的统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeStats {
    pub nodes: usize,
    pub speakers: usize,
    pub sound_cues: usize,
    pub hero_lines: usize,
    pub npc_lines: usize,
}

/// 文档统计信息
#[derive(Debug, Clone, Serialize)]
pub struct Statistics {
    pub kind: FormatKind,
    pub translations: usize,
    pub aliases: usize,
    pub dialogs: usize,
    pub quests: usize,
    pub npcs: usize,
    pub locations: usize,
    pub drop_items: usize,
    pub warnings: usize,
    /// 各分类的翻译数量（只含非空分类，按分类表顺序）
    pub categories: IndexMap<Category, usize>,
    /// 各对话树的统计（按首次出现顺序）
    pub trees: IndexMap<String, TreeStats>,
}

impl Statistics {
    pub fn hero_lines(&self) -> usize {
        self.trees.values().map(|t| t.hero_lines).sum()
    }

    pub fn npc_lines(&self) -> usize {
        self.trees.values().map(|t| t.npc_lines).sum()
    }
}

impl Document {
    /// 计算统计信息
    pub fn statistics(&self) -> Statistics {
        let mut counts: IndexMap<Category, usize> = Category::all().map(|c| (c, 0)).collect();
        for translation in &self.translations {
            *counts.entry(Category::classify(&translation.key)).or_default() += 1;
        }
        counts.retain(|_, count| *count > 0);

        let mut trees: IndexMap<String, TreeStats> = IndexMap::new();
        let mut speakers: IndexMap<String, HashSet<String>> = IndexMap::new();
        for dialog in &self.dialogs {
            let tree = dialog.tree.clone().unwrap_or_default();
            let stats = trees.entry(tree.clone()).or_default();
            stats.nodes += 1;
            if dialog.sound_cue.as_deref().is_some_and(|cue| !cue.is_empty()) {
                stats.sound_cues += 1;
            }
            match dialog.speaker() {
                Speaker::Hero => stats.hero_lines += 1,
                Speaker::Npc => stats.npc_lines += 1,
            }
            if let Some(lector) = &dialog.lector {
                speakers.entry(tree).or_default().insert(lector.to_string());
            }
        }
        for (tree, set) in speakers {
            if let Some(stats) = trees.get_mut(&tree) {
                stats.speakers = set.len();
            }
        }

        Statistics {
            kind: self.kind(),
            translations: self.translations.len(),
            aliases: self.aliases.len(),
            dialogs: self.dialogs.len(),
            quests: self.quests.len(),
            npcs: self.npcs.len(),
            locations: self.locations.len(),
            drop_items: self.npcs.iter().map(|n| n.drops.len()).sum(),
            warnings: self.warnings.len(),
            categories: counts,
            trees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DialogEntry, Lector, Translation};

    #[test]
    fn test_statistics() {
        let mut doc = Document::new(FormatKind::Lan);
        doc.push_translation(Translation::new("DQ_1", "a")).unwrap();
        doc.push_translation(Translation::new("DQ_2", "b")).unwrap();
        doc.push_translation(Translation::new("foo", "c")).unwrap();

        for (index, lector) in [(0, 1), (1, 5), (2, 5)] {
            let mut entry = DialogEntry::new(format!("DQ_1#{}", index));
            entry.tree = Some("DQ_1".to_string());
            entry.index = Some(index);
            entry.lector = Some(Lector::Id(lector));
            entry.sound_cue = Some(if index == 0 { String::new() } else { format!("cue{}", index) });
            doc.push_dialog(entry).unwrap();
        }

        let stats = doc.statistics();
        assert_eq!(stats.translations, 3);
        assert_eq!(stats.categories[&Category::Dialogs], 2);
        assert_eq!(stats.categories[&Category::Other], 1);
        assert!(!stats.categories.contains_key(&Category::Weapons));

        let tree = &stats.trees["DQ_1"];
        assert_eq!(tree.nodes, 3);
        assert_eq!(tree.speakers, 2);
        assert_eq!(tree.sound_cues, 2);
        assert_eq!(stats.hero_lines(), 1);
        assert_eq!(stats.npc_lines(), 2);
    }
}
