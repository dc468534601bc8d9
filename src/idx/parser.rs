use log::debug;
use std::collections::{HashMap, HashSet};
use std::ops::Range;

use super::binding::{self, ExtraFields, NODES_FIELD, ROOT_ELEMENT};
use super::xml::{parse_tree, XmlElement};
use super::{FieldSlot, IdxLayout, RecordSlot};
use crate::datatypes::RawText;
use crate::model::{
    DialogEntry, Document, Entity, EntityKind, FormatKind, Layout, Location, Npc, Quest, Tracked,
};
use crate::utils::{CodecError, SourceLocation, Warning};

/// 解析 SOAP XML 任务导出
pub fn parse(data: &[u8]) -> Result<Document, CodecError> {
    let raw = RawText::decode(data);
    let root = parse_tree(&raw.content)?;
    let body = if root.name == "Body" {
        &root
    } else {
        root.child("Body").ok_or_else(|| CodecError::MalformedRecord {
            location: SourceLocation::Offset(root.span.start),
            reason: "missing SOAP Body".to_string(),
        })?
    };

    let mut builder = Builder::new(&body.children);
    builder.walk();

    let mut doc = Document::new(FormatKind::Idx);
    let source = &raw.content;
    let raw_of = |slot: usize| source[builder.spans[slot].clone()].as_bytes().to_vec();
    for (quest, slot) in builder.quests.drain(..) {
        doc.quests.push(Tracked::parsed(quest, raw_of(slot), slot));
    }
    for (dialog, slot) in builder.dialogs.drain(..) {
        doc.dialogs.push(Tracked::parsed(dialog, raw_of(slot), slot));
    }
    for (npc, slot) in builder.npcs.drain(..) {
        doc.npcs.push(Tracked::parsed(npc, raw_of(slot), slot));
    }
    for (location, slot) in builder.locations.drain(..) {
        doc.locations.push(Tracked::parsed(location, raw_of(slot), slot));
    }
    for warning in builder.warnings.drain(..) {
        doc.warn(warning);
    }

    debug!(
        "IDX: {} 个对象, {} 个任务, {} 条对话, {} 个 NPC, {} 个地点",
        body.children.len(),
        doc.quests.len(),
        doc.dialogs.len(),
        doc.npcs.len(),
        doc.locations.len()
    );

    doc.layout = Layout::Idx(IdxLayout {
        source: raw.content,
        encoding: raw.encoding,
        has_bom: raw.has_bom,
        records: builder.slots,
    });
    Ok(doc)
}

/// 记录的一个叶子字段
struct Leaf<'x> {
    element: &'x XmlElement,
    value: Option<String>,
    inner: Option<Range<usize>>,
}

struct Frame {
    index: usize,
    folder: Option<String>,
    quest: Option<usize>,
}

struct Builder<'x> {
    elements: &'x [XmlElement],
    by_ref: HashMap<&'x str, usize>,
    quests: Vec<(Quest, usize)>,
    dialogs: Vec<(DialogEntry, usize)>,
    npcs: Vec<(Npc, usize)>,
    locations: Vec<(Location, usize)>,
    slots: Vec<RecordSlot>,
    spans: Vec<Range<usize>>,
    warnings: Vec<Warning>,
    visited: HashSet<usize>,
}

impl<'x> Builder<'x> {
    fn new(elements: &'x [XmlElement]) -> Self {
        let by_ref = elements
            .iter()
            .enumerate()
            .filter_map(|(i, element)| element.attr("id").map(|id| (id, i)))
            .collect();
        Self {
            elements,
            by_ref,
            quests: Vec::new(),
            dialogs: Vec::new(),
            npcs: Vec::new(),
            locations: Vec::new(),
            slots: Vec::new(),
            spans: Vec::new(),
            warnings: Vec::new(),
            visited: HashSet::new(),
        }
    }

    /// 从根节点沿 `nodes` 数组深度优先遍历，之后补上没有被引用到的记录
    fn walk(&mut self) {
        let roots: Vec<usize> = match self.elements.iter().position(|e| e.name == ROOT_ELEMENT) {
            Some(root) => vec![root],
            None => (0..self.elements.len()).collect(),
        };
        self.walk_from(roots);

        let orphans: Vec<usize> = (0..self.elements.len())
            .filter(|i| !self.visited.contains(i))
            .filter(|&i| binding::record_kind(&self.elements[i].name).is_some())
            .collect();
        if !orphans.is_empty() {
            debug!("IDX: {} 条记录不在节点树中", orphans.len());
        }
        self.walk_from(orphans);
    }

    fn walk_from(&mut self, roots: Vec<usize>) {
        let elements = self.elements;
        let mut stack: Vec<Frame> = roots
            .into_iter()
            .rev()
            .map(|index| Frame {
                index,
                folder: None,
                quest: None,
            })
            .collect();

        while let Some(frame) = stack.pop() {
            // 已访问的节点不再展开，环形引用因此会终止
            if !self.visited.insert(frame.index) {
                continue;
            }
            let element = &elements[frame.index];
            let mut folder = frame.folder;
            let mut quest = frame.quest;

            match binding::record_kind(&element.name) {
                Some(kind) => {
                    if let Some(owner) = self.record(element, kind, folder.clone(), quest) {
                        quest = Some(owner);
                    }
                }
                None if element.name != ROOT_ELEMENT => {
                    if let Some(name) = leaf_text(element, "n").or_else(|| leaf_text(element, "name")) {
                        folder = Some(name);
                    }
                }
                None => {}
            }

            for index in self.node_children(element).into_iter().rev() {
                stack.push(Frame {
                    index,
                    folder: folder.clone(),
                    quest,
                });
            }
        }
    }

    /// 建立一条记录；返回新任务在任务列表中的下标
    fn record(
        &mut self,
        element: &'x XmlElement,
        kind: EntityKind,
        folder: Option<String>,
        quest: Option<usize>,
    ) -> Option<usize> {
        let leaves = self.leaves(element);
        let id = leaves
            .iter()
            .find(|leaf| leaf.element.name == "iid")
            .and_then(|leaf| leaf.value.clone())
            .filter(|iid| !iid.trim().is_empty())
            .or_else(|| element.attr("id").map(str::to_string))
            .unwrap_or_else(|| format!("{}@{}", element.name, element.span.start));
        let table = binding::table_for(kind);
        let slot = self.slots.len();
        let mut new_quest = None;

        let fields = match kind {
            EntityKind::Quest => {
                let mut record = Quest::new(id);
                let fields = bind(&mut record, table, &leaves);
                record.region_group = folder;
                new_quest = Some(self.quests.len());
                self.quests.push((record, slot));
                fields
            }
            EntityKind::Dialog => {
                let mut record = DialogEntry::new(id);
                let fields = bind(&mut record, table, &leaves);
                if let Some((owner, _)) = quest.and_then(|q| self.quests.get_mut(q)) {
                    record.tree = Some(owner.id.clone());
                    record.index = Some(owner.dialogs.len());
                    owner.dialogs.push(record.id.clone());
                }
                self.dialogs.push((record, slot));
                fields
            }
            EntityKind::Npc => {
                let mut record = Npc::new(id);
                let fields = bind(&mut record, table, &leaves);
                record.has_drops = !record.drops.is_empty();
                if let Some((owner, _)) = quest.and_then(|q| self.quests.get_mut(q)) {
                    if !owner.npcs.contains(&record.id) {
                        owner.npcs.push(record.id.clone());
                    }
                }
                self.npcs.push((record, slot));
                fields
            }
            EntityKind::Location => {
                let mut record = Location::new(id);
                let fields = bind(&mut record, table, &leaves);
                self.locations.push((record, slot));
                fields
            }
            EntityKind::Translation | EntityKind::Alias => return None,
        };

        let insert_at = element
            .inner
            .as_ref()
            .map(|inner| element.children.last().map_or(inner.start, |last| last.span.end));
        self.slots.push(RecordSlot {
            kind,
            fields,
            insert_at,
            lead: element.lead.clone(),
        });
        self.spans.push(element.span.clone());
        new_quest
    }

    /// 记录的叶子字段；`href` 指向共享字符串时取被引用对象的文本
    fn leaves(&mut self, element: &'x XmlElement) -> Vec<Leaf<'x>> {
        let elements = self.elements;
        let mut leaves = Vec::new();
        for child in &element.children {
            if child.name == NODES_FIELD {
                continue;
            }
            match child.href() {
                Some(target) => match self.lookup(element, target) {
                    Some(index) => {
                        let shared = &elements[index];
                        if shared.is_leaf() && shared.name != "Array" {
                            leaves.push(Leaf {
                                element: child,
                                value: (!shared.is_null()).then(|| shared.text.clone()),
                                inner: shared.inner.clone().filter(|_| !shared.is_null()),
                            });
                        }
                    }
                    None => continue,
                },
                None if child.is_leaf() => {
                    let null = child.is_null();
                    leaves.push(Leaf {
                        element: child,
                        value: (!null).then(|| child.text.clone()),
                        inner: child.inner.clone().filter(|_| !null),
                    });
                }
                None => {}
            }
        }
        leaves
    }

    /// `nodes` 数组引用的子节点
    fn node_children(&mut self, element: &'x XmlElement) -> Vec<usize> {
        let elements = self.elements;
        let Some(nodes) = element.child(NODES_FIELD).filter(|nodes| !nodes.is_null()) else {
            return Vec::new();
        };
        let array = match nodes.href() {
            Some(target) => match self.lookup(element, target) {
                Some(index) => &elements[index],
                None => return Vec::new(),
            },
            None => nodes,
        };
        array
            .children
            .iter()
            .filter_map(|item| item.href())
            .filter_map(|target| self.lookup(element, target))
            .collect()
    }

    fn lookup(&mut self, from: &XmlElement, target: &str) -> Option<usize> {
        let found = self.by_ref.get(target).copied();
        if found.is_none() {
            self.warnings.push(Warning::DanglingReference {
                from: from
                    .attr("id")
                    .map(str::to_string)
                    .unwrap_or_else(|| from.name.clone()),
                target: format!("#{}", target),
            });
        }
        found
    }
}

/// 按绑定表填充实体字段，返回各字段的拼接位置
fn bind<E: Entity + ExtraFields>(
    entity: &mut E,
    table: &[(&str, &'static str)],
    leaves: &[Leaf<'_>],
) -> Vec<FieldSlot> {
    let mut slots = Vec::with_capacity(leaves.len());
    for leaf in leaves {
        let field = binding::apply(entity, table, &leaf.element.name, leaf.value.as_deref());
        slots.push(FieldSlot {
            field,
            tag: leaf.element.qname.clone(),
            span: leaf.element.span.clone(),
            inner: leaf.inner.clone(),
            snapshot: None,
        });
    }
    for slot in &mut slots {
        slot.snapshot = entity.field(&slot.field).flatten();
    }
    slots
}

fn leaf_text(element: &XmlElement, name: &str) -> Option<String> {
    element
        .child(name)
        .filter(|child| child.is_leaf() && !child.is_null())
        .map(|child| child.text.trim().to_string())
        .filter(|text| !text.is_empty())
}
