use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

/// 翻译键分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Category {
    Dialogs,
    Quests,
    NpcNames,
    NpcRefs,
    Rumors,
    CasualTalks,
    Events,
    Cutscenes,
    Citizens,
    Guards,
    QuestItems,
    Ingredients,
    Weapons,
    Armor,
    Tips,
    Network,
    Skills,
    Other,
}

/// 前缀到分类的有序表，按顺序首个匹配生效
///
/// 与较短前缀共享开头的较长前缀必须排在前面。
pub static CATEGORY_PREFIXES: &[(&str, Category)] = &[
    ("DQ_", Category::Dialogs),
    ("Q_", Category::Quests),
    ("NPCName", Category::NpcNames),
    ("NPC_", Category::NpcRefs),
    ("RUMORS_", Category::Rumors),
    ("TALK_", Category::CasualTalks),
    ("EVENT_", Category::Events),
    ("CUTSCENE_", Category::Cutscenes),
    ("Citizen_", Category::Citizens),
    ("Guard_", Category::Guards),
    ("QITEM_", Category::QuestItems),
    ("ING_", Category::Ingredients),
    ("WP_", Category::Weapons),
    ("AR_", Category::Armor),
    ("Tip_", Category::Tips),
    ("Net_", Category::Network),
    ("Skill", Category::Skills),
];

impl Category {
    /// 按表顺序排列的全部分类（`Other` 在最后）
    pub fn all() -> impl Iterator<Item = Category> {
        CATEGORY_PREFIXES
            .iter()
            .map(|(_, category)| *category)
            .chain(std::iter::once(Category::Other))
    }

    /// 对键分类，总能得到一个结果
    pub fn classify(key: &str) -> Category {
        CATEGORY_PREFIXES
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix))
            .map(|(_, category)| *category)
            .unwrap_or(Category::Other)
    }

    /// 显示名称
    pub fn label(self) -> &'static str {
        match self {
            Category::Dialogs => "Dialogs",
            Category::Quests => "Quests",
            Category::NpcNames => "NPC Names",
            Category::NpcRefs => "NPC Refs",
            Category::Rumors => "Rumors",
            Category::CasualTalks => "Casual Talks",
            Category::Events => "Events",
            Category::Cutscenes => "Cutscenes",
            Category::Citizens => "Citizens",
            Category::Guards => "Guards",
            Category::QuestItems => "Quest Items",
            Category::Ingredients => "Ingredients",
            Category::Weapons => "Weapons",
            Category::Armor => "Armor",
            Category::Tips => "Tips",
            Category::Network => "Network",
            Category::Skills => "Skills",
            Category::Other => "Other",
        }
    }

    /// 按显示名称或变体名查找（不区分大小写）
    pub fn from_label(label: &str) -> Option<Category> {
        Category::all().find(|c| {
            c.label().eq_ignore_ascii_case(label)
                || format!("{:?}", c).eq_ignore_ascii_case(label)
        })
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 从键中提取任务编号分组：`DQ_12_…` 和 `Q_12_…` 都归到 `Q_12`
pub fn quest_group(key: &str) -> Option<String> {
    let rest = key
        .strip_prefix("DQ_")
        .or_else(|| key.strip_prefix("Q_"))?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("Q_{}", digits))
    }
}

/// 按任务编号对对话键分组，无编号的归入 `Unknown`
pub fn group_dialog_keys<'a, I>(keys: I) -> IndexMap<String, Vec<&'a str>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: IndexMap<String, Vec<&'a str>> = IndexMap::new();
    for key in keys {
        let group = if key.starts_with("DQ_") {
            quest_group(key)
        } else {
            None
        };
        groups
            .entry(group.unwrap_or_else(|| "Unknown".to_string()))
            .or_default()
            .push(key);
    }
    groups
}

/// 按任务编号对任务键分组，无编号的单独成组
pub fn group_quest_keys<'a, I>(keys: I) -> IndexMap<String, Vec<&'a str>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut groups: IndexMap<String, Vec<&'a str>> = IndexMap::new();
    for key in keys {
        let group = if key.starts_with("Q_") {
            quest_group(key)
        } else {
            None
        };
        groups
            .entry(group.unwrap_or_else(|| key.to_string()))
            .or_default()
            .push(key);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seventeen_prefixed_categories() {
        assert_eq!(CATEGORY_PREFIXES.len(), 17);
        assert_eq!(Category::all().count(), 18);
    }

    #[test]
    fn test_classify() {
        assert_eq!(Category::classify("DQ_001"), Category::Dialogs);
        assert_eq!(Category::classify("Q_12_NAME"), Category::Quests);
        assert_eq!(Category::classify("QITEM_KEY"), Category::QuestItems);
        assert_eq!(Category::classify("NPCName_Gandohar"), Category::NpcNames);
        assert_eq!(Category::classify("NPC_17"), Category::NpcRefs);
        assert_eq!(Category::classify("SkillArchery"), Category::Skills);
        assert_eq!(Category::classify("random"), Category::Other);
        assert_eq!(Category::classify(""), Category::Other);
    }

    #[test]
    fn test_no_prefix_is_shadowed() {
        // 任何前缀都不能被排在它前面的更短前缀吞掉
        for (i, (later, _)) in CATEGORY_PREFIXES.iter().enumerate() {
            for (earlier, _) in &CATEGORY_PREFIXES[..i] {
                assert!(
                    !later.starts_with(earlier),
                    "前缀 {} 被更早的 {} 遮蔽",
                    later,
                    earlier
                );
            }
        }
    }

    #[test]
    fn test_label_lookup() {
        assert_eq!(Category::from_label("npc names"), Some(Category::NpcNames));
        assert_eq!(Category::from_label("QuestItems"), Some(Category::QuestItems));
        assert_eq!(Category::from_label("nope"), None);
    }

    #[test]
    fn test_grouping() {
        let dialogs = group_dialog_keys(["DQ_12_A", "DQ_12_B", "DQ_7", "DQ_X"]);
        assert_eq!(dialogs["Q_12"], vec!["DQ_12_A", "DQ_12_B"]);
        assert_eq!(dialogs["Q_7"], vec!["DQ_7"]);
        assert_eq!(dialogs["Unknown"], vec!["DQ_X"]);

        let quests = group_quest_keys(["Q_3_NAME", "Q_3_TAKE", "Q_MAIN"]);
        assert_eq!(quests["Q_3"].len(), 2);
        assert_eq!(quests["Q_MAIN"], vec!["Q_MAIN"]);
    }
}
