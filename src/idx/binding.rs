//! 元素名到模型字段的绑定表
//!
//! 字段只按元素名绑定，与子元素的顺序无关。没有出现在表里的子元素
//! 进入实体的 `extra`，保存时同样可以改写。

use indexmap::IndexMap;

use crate::model::{DialogEntry, Entity, EntityKind, Location, Npc, Quest};

/// 记录元素的本地名及其实体类型
pub(crate) const RECORD_ELEMENTS: &[(&str, EntityKind)] = &[
    ("NodeQuest", EntityKind::Quest),
    ("NodeQuestDialogText", EntityKind::Dialog),
    ("NodeDialogText", EntityKind::Dialog),
    ("NodeRumorsDialogText", EntityKind::Dialog),
    ("NodeCharacter", EntityKind::Npc),
    ("NodeLocation", EntityKind::Location),
];

/// 指向子节点数组的字段，不作为普通字段处理
pub(crate) const NODES_FIELD: &str = "nodes";

/// 根元素，它的名字不算区域分组
pub(crate) const ROOT_ELEMENT: &str = "RootNode";

/// (元素名, 字段名)；同一字段的多个元素名中，第一个用于新插入的子元素
pub(crate) const QUEST_FIELDS: &[(&str, &str)] = &[
    ("iid", "iid"),
    ("n", "name_key"),
    ("name", "name_key"),
    ("take_text", "take_key"),
    ("solve_text", "solve_key"),
    ("close_text", "close_key"),
    ("text", "text"),
    ("activation", "activation"),
    ("group", "group"),
    ("guild", "guild"),
    ("min_reputation", "reputation"),
    ("quest_state", "state"),
    ("notes", "notes"),
    ("add_to_quest_log", "add_to_log"),
    ("can_be_failed", "can_be_failed"),
];

pub(crate) const DIALOG_FIELDS: &[(&str, &str)] = &[
    ("type", "state"),
    ("lector_type", "lector"),
    ("lector", "lector"),
    ("text", "text"),
    ("sound", "sound_cue"),
    ("camera", "camera"),
    ("animation", "animation"),
];

pub(crate) const NPC_FIELDS: &[(&str, &str)] = &[
    ("iid", "iid"),
    ("marker", "marker"),
    ("sector", "sector"),
    ("angle", "angle"),
    ("quest", "quest_ref"),
    ("exp_level", "level"),
    ("level", "level"),
    ("party", "party_ref"),
    ("size", "size"),
    ("active", "active"),
    ("create_string", "create_string"),
    ("exp", "exp"),
    ("objects", "drops"),
    ("object_items", "drops"),
];

pub(crate) const LOCATION_FIELDS: &[(&str, &str)] = &[
    ("iid", "iid"),
    ("marker", "marker"),
    ("sector", "sector"),
    ("x", "x"),
    ("y", "y"),
];

pub(crate) fn record_kind(element: &str) -> Option<EntityKind> {
    RECORD_ELEMENTS
        .iter()
        .find(|(name, _)| *name == element)
        .map(|(_, kind)| *kind)
}

pub(crate) fn table_for(kind: EntityKind) -> &'static [(&'static str, &'static str)] {
    match kind {
        EntityKind::Quest => QUEST_FIELDS,
        EntityKind::Dialog => DIALOG_FIELDS,
        EntityKind::Npc => NPC_FIELDS,
        EntityKind::Location => LOCATION_FIELDS,
        EntityKind::Translation | EntityKind::Alias => &[],
    }
}

pub(crate) fn field_for(table: &[(&str, &'static str)], element: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == element)
        .map(|(_, field)| *field)
}

/// 每个字段的首选元素名，按表中顺序
pub(crate) fn preferred_elements(
    table: &'static [(&'static str, &'static str)],
) -> impl Iterator<Item = (&'static str, &'static str)> {
    table
        .iter()
        .enumerate()
        .filter(move |(i, (_, field))| !table[..*i].iter().any(|(_, f)| f == field))
        .map(|(_, pair)| *pair)
}

/// 把一个命名值写进实体：绑定字段按类型解析，其余的放进 `extra`
///
/// 返回实际写入的字段名。
pub(crate) fn apply<E: Entity + ExtraFields>(
    entity: &mut E,
    table: &[(&str, &'static str)],
    name: &str,
    value: Option<&str>,
) -> String {
    match field_for(table, name) {
        Some(field) if entity.set_field(field, value).is_ok() => field.to_string(),
        // 无法按类型解析的值也原样保留
        _ => {
            entity
                .extra_mut()
                .insert(name.to_string(), value.map(str::to_string));
            name.to_string()
        }
    }
}

/// 未绑定子元素的存放处
pub(crate) trait ExtraFields {
    fn extra_mut(&mut self) -> &mut IndexMap<String, Option<String>>;
}

macro_rules! impl_extra {
    ($($ty:ty),*) => {
        $(impl ExtraFields for $ty {
            fn extra_mut(&mut self) -> &mut IndexMap<String, Option<String>> {
                &mut self.extra
            }
        })*
    };
}

impl_extra!(Quest, DialogEntry, Npc, Location);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_kinds() {
        assert_eq!(record_kind("NodeRumorsDialogText"), Some(EntityKind::Dialog));
        assert_eq!(record_kind("NodeQuestDialog"), None);
        assert_eq!(record_kind("NodeCharacter"), Some(EntityKind::Npc));
    }

    #[test]
    fn test_apply_falls_back_to_extra() {
        let mut quest = Quest::new("Q_1");
        assert_eq!(apply(&mut quest, QUEST_FIELDS, "min_reputation", Some("12")), "reputation");
        assert_eq!(quest.reputation, Some(12));

        // 数值字段解析失败时保留原文
        assert_eq!(apply(&mut quest, QUEST_FIELDS, "min_reputation", Some("high")), "min_reputation");
        assert_eq!(quest.extra.get("min_reputation"), Some(&Some("high".to_string())));

        assert_eq!(apply(&mut quest, QUEST_FIELDS, "editor_color", None), "editor_color");
        assert_eq!(quest.extra.get("editor_color"), Some(&None));
    }

    #[test]
    fn test_preferred_elements_skip_aliases() {
        let preferred: Vec<_> = preferred_elements(QUEST_FIELDS).collect();
        assert!(preferred.contains(&("n", "name_key")));
        assert!(!preferred.contains(&("name", "name_key")));
        assert_eq!(preferred.len(), QUEST_FIELDS.len() - 1);
    }
}
