//! 从对象图中提取任务、对话、NPC 和地点

use log::debug;
use std::collections::HashSet;

use super::decoder::Graph;
use super::records::{GraphObject, ObjectBody, Value};
use crate::idx::binding::{self, ExtraFields, NODES_FIELD};
use crate::model::{DialogEntry, Entity, EntityKind, Location, Npc, Quest};

/// 类名后缀到实体类型，按顺序取第一个匹配
const CLASS_SUFFIXES: &[(&str, EntityKind)] = &[
    ("NodeQuestDialogText", EntityKind::Dialog),
    ("NodeRumorsDialogText", EntityKind::Dialog),
    ("NodeDialogText", EntityKind::Dialog),
    ("NodeQuest", EntityKind::Quest),
    ("NodeCharacter", EntityKind::Npc),
    ("NodeLocation", EntityKind::Location),
    ("DialogText", EntityKind::Dialog),
];

/// 按类名分类；程序集限定名只看逗号前的部分
pub(crate) fn classify(type_name: &str) -> Option<EntityKind> {
    let name = type_name.split(',').next().unwrap_or(type_name).trim();
    CLASS_SUFFIXES
        .iter()
        .find(|(suffix, _)| name.ends_with(suffix))
        .map(|(_, kind)| *kind)
}

/// 提取结果；每条记录带上它在对象表中的对象 ID
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    pub quests: Vec<(Quest, i32)>,
    pub dialogs: Vec<(DialogEntry, i32)>,
    pub npcs: Vec<(Npc, i32)>,
    pub locations: Vec<(Location, i32)>,
}

struct Frame {
    id: i32,
    folder: Option<String>,
    quest: Option<usize>,
}

/// 从根对象沿 `nodes` 深度优先遍历，之后补上不在树中的记录
pub(crate) fn extract(graph: &Graph) -> Extracted {
    let mut walker = Walker {
        graph,
        out: Extracted::default(),
        visited: HashSet::new(),
    };
    walker.walk(vec![graph.header.root_id]);

    let orphans: Vec<i32> = graph
        .objects
        .values()
        .filter(|object| !walker.visited.contains(&object.id))
        .filter(|object| kind_of(graph, object).is_some())
        .map(|object| object.id)
        .collect();
    if !orphans.is_empty() {
        debug!("SHF: {} 条记录不在节点树中", orphans.len());
    }
    walker.walk(orphans);
    walker.out
}

fn kind_of(graph: &Graph, object: &GraphObject) -> Option<EntityKind> {
    graph
        .descriptor_of(object)
        .and_then(|descriptor| classify(&descriptor.name))
}

struct Walker<'g> {
    graph: &'g Graph,
    out: Extracted,
    visited: HashSet<i32>,
}

impl<'g> Walker<'g> {
    fn walk(&mut self, roots: Vec<i32>) {
        let graph = self.graph;
        let mut stack: Vec<Frame> = roots
            .into_iter()
            .rev()
            .map(|id| Frame {
                id,
                folder: None,
                quest: None,
            })
            .collect();

        while let Some(frame) = stack.pop() {
            if !self.visited.insert(frame.id) {
                continue;
            }
            let Some(object) = graph.objects.get(&frame.id) else {
                continue;
            };
            let mut folder = frame.folder;
            let mut quest = frame.quest;

            match kind_of(graph, object) {
                Some(kind) => {
                    if let Some(owner) = self.record(object, kind, folder.clone(), quest) {
                        quest = Some(owner);
                    }
                }
                None if object.id != graph.header.root_id => {
                    if let Some(name) = self.text_member(object, "n").or_else(|| self.text_member(object, "name")) {
                        folder = Some(name);
                    }
                }
                None => {}
            }

            for id in self.node_children(object).into_iter().rev() {
                stack.push(Frame {
                    id,
                    folder: folder.clone(),
                    quest,
                });
            }
        }
    }

    fn record(
        &mut self,
        object: &GraphObject,
        kind: EntityKind,
        folder: Option<String>,
        quest: Option<usize>,
    ) -> Option<usize> {
        let id = self
            .text_member(object, "iid")
            .filter(|iid| !iid.trim().is_empty())
            .unwrap_or_else(|| format!("{}#{}", kind, object.id));
        // 二进制格式没有掉落物品，`objects` 成员留在 extra 里
        let table: Vec<(&str, &'static str)> = binding::table_for(kind)
            .iter()
            .copied()
            .filter(|(_, field)| *field != "drops")
            .collect();
        let table = table.as_slice();
        let out = &mut self.out;

        match kind {
            EntityKind::Quest => {
                let mut record = Quest::new(id);
                fill(&mut record, table, object, self.graph);
                record.region_group = folder;
                out.quests.push((record, object.id));
                return Some(out.quests.len() - 1);
            }
            EntityKind::Dialog => {
                let mut record = DialogEntry::new(id);
                fill(&mut record, table, object, self.graph);
                if let Some((owner, _)) = quest.and_then(|q| out.quests.get_mut(q)) {
                    record.tree = Some(owner.id.clone());
                    record.index = Some(owner.dialogs.len());
                    owner.dialogs.push(record.id.clone());
                }
                out.dialogs.push((record, object.id));
            }
            EntityKind::Npc => {
                let mut record = Npc::new(id);
                fill(&mut record, table, object, self.graph);
                if let Some((owner, _)) = quest.and_then(|q| out.quests.get_mut(q)) {
                    if !owner.npcs.contains(&record.id) {
                        owner.npcs.push(record.id.clone());
                    }
                }
                out.npcs.push((record, object.id));
            }
            EntityKind::Location => {
                let mut record = Location::new(id);
                fill(&mut record, table, object, self.graph);
                out.locations.push((record, object.id));
            }
            EntityKind::Translation | EntityKind::Alias => {}
        }
        None
    }

    fn text_member(&self, object: &GraphObject, name: &str) -> Option<String> {
        member_text(self.graph, object.member(name)?)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
    }

    /// `nodes` 数组中的子对象
    fn node_children(&self, object: &GraphObject) -> Vec<i32> {
        let Some(Value::Ref(array)) = object.member(NODES_FIELD) else {
            return Vec::new();
        };
        match self.graph.objects.get(array).map(|a| &a.body) {
            Some(ObjectBody::Array(items)) => items
                .iter()
                .filter_map(|item| match item {
                    Value::Ref(id) => Some(*id),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// 成员值的文本：字符串引用取被引用的文本，字符串数组用空格连接
fn member_text(graph: &Graph, value: &Value) -> Option<String> {
    match value {
        Value::Ref(id) => match &graph.objects.get(id)?.body {
            ObjectBody::String(text) => Some(text.clone()),
            ObjectBody::Array(items) => {
                let parts: Vec<String> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Ref(id) => graph.string(*id).map(str::to_string),
                        other => other.scalar_text(),
                    })
                    .collect();
                Some(parts.join(" "))
            }
            ObjectBody::Class { .. } => None,
        },
        other => other.scalar_text(),
    }
}

/// 把类对象的成员写进实体；嵌套对象成员不参与
fn fill<E: Entity + ExtraFields>(
    entity: &mut E,
    table: &[(&str, &'static str)],
    object: &GraphObject,
    graph: &Graph,
) {
    let ObjectBody::Class { members, .. } = &object.body else {
        return;
    };
    for (name, value) in members {
        if name == NODES_FIELD {
            continue;
        }
        let text = match value {
            Value::Null => None,
            Value::Ref(id) if matches!(graph.objects.get(id).map(|o| &o.body), Some(ObjectBody::Class { .. })) => {
                continue
            }
            Value::Ref(id) if !graph.objects.contains_key(id) => continue,
            other => member_text(graph, other),
        };
        binding::apply(entity, table, name, text.as_deref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_suffix() {
        assert_eq!(classify("QuestEditor.NodeQuest"), Some(EntityKind::Quest));
        assert_eq!(classify("QuestEditor.NodeQuestDialogText"), Some(EntityKind::Dialog));
        assert_eq!(classify("QuestEditor.NodeRumorsDialogText, QuestEditor, Version=1.0.0.0"), Some(EntityKind::Dialog));
        assert_eq!(classify("QuestEditor.SpecialDialogText"), Some(EntityKind::Dialog));
        assert_eq!(classify("QuestEditor.NodeCharacter"), Some(EntityKind::Npc));
        assert_eq!(classify("QuestEditor.NodeFolder"), None);
        assert_eq!(classify("System.Collections.ArrayList"), None);
    }
}
