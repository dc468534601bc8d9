use super::*;
use crate::model::Speaker;
use crate::utils::Warning;

const LIBRARY: i32 = 100;

/// 测试用的 NRBF 流构造器
struct Stream {
    data: Vec<u8>,
}

impl Stream {
    fn new(root: i32) -> Self {
        let mut data = vec![0u8];
        for value in [root, -1, 1, 0] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        let mut stream = Self { data };
        stream.u8(12).i32(LIBRARY).text("QuestEditor");
        stream
    }

    fn u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    fn i32(&mut self, value: i32) -> &mut Self {
        self.data.extend_from_slice(&value.to_le_bytes());
        self
    }

    fn text(&mut self, value: &str) -> &mut Self {
        self.data.push(value.len() as u8);
        self.data.extend_from_slice(value.as_bytes());
        self
    }

    /// ClassWithMembersAndTypes
    fn class(&mut self, id: i32, name: &str, members: &[(&str, Member)]) -> &mut Self {
        self.u8(5).i32(id).text(name).i32(members.len() as i32);
        for (member, _) in members {
            self.text(member);
        }
        for (_, kind) in members {
            self.u8(match kind {
                Member::Int32 => 0,
                Member::String => 1,
                Member::Object => 2,
            });
        }
        for (_, kind) in members {
            if *kind == Member::Int32 {
                self.u8(8);
            }
        }
        self.i32(LIBRARY)
    }

    fn string(&mut self, id: i32, value: &str) -> &mut Self {
        self.u8(6).i32(id).text(value)
    }

    fn object_array(&mut self, id: i32, len: i32) -> &mut Self {
        self.u8(16).i32(id).i32(len)
    }

    fn end(&mut self) -> Vec<u8> {
        self.u8(11);
        self.data.clone()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Member {
    Int32,
    String,
    Object,
}

#[test]
fn test_unknown_descriptor_is_skipped() {
    let mut stream = Stream::new(1);
    stream
        .class(1, "QuestEditor.NodeLocation", &[("<iid>k__BackingField", Member::String), ("x", Member::Int32)])
        .string(2, "LOC_1")
        .i32(5);
    let bad_offset = stream.data.len();
    stream.u8(1).i32(3).i32(99).string(4, "junk");
    stream.u8(1).i32(5).i32(1).string(6, "LOC_2").i32(7);
    let data = stream.end();

    let doc = parse(&data).unwrap();
    let ids: Vec<&str> = doc.locations().iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["LOC_1", "LOC_2"], "坏记录之后的内容应继续解码");
    assert_eq!(doc.location("LOC_1").unwrap().x.as_deref(), Some("5"));
    assert_eq!(doc.location("LOC_2").unwrap().x.as_deref(), Some("7"));

    assert_eq!(
        doc.warnings(),
        &[Warning::UnknownTypeDescriptor {
            id: 99,
            offset: bad_offset
        }]
    );

    let pool: Vec<&str> = doc
        .string_pool()
        .unwrap()
        .iter()
        .map(|s| s.text.as_str())
        .collect();
    assert_eq!(pool, vec!["LOC_1", "junk", "LOC_2"]);
}

fn quest_tree() -> Vec<u8> {
    let mut stream = Stream::new(1);
    stream
        .class(1, "QuestEditor.RootNode", &[("n", Member::String), ("nodes", Member::Object)])
        .string(2, "ROOT")
        .object_array(3, 1)
        .class(4, "QuestEditor.NodeFolder", &[("n", Member::String), ("nodes", Member::Object)])
        .string(5, "Ashos")
        .object_array(6, 1)
        .class(
            7,
            "QuestEditor.NodeQuest",
            &[("<iid>k__BackingField", Member::String), ("min_reputation", Member::Int32), ("nodes", Member::Object)],
        )
        .string(8, "Q_5")
        .i32(10)
        .object_array(9, 3);
    // 子节点数组又引用了任务自己
    stream.u8(9).i32(7);
    stream
        .class(
            10,
            "QuestEditor.NodeQuestDialogText",
            &[("iid", Member::String), ("type", Member::String), ("text", Member::String), ("nodes", Member::Object)],
        )
        .string(11, "DLG_A")
        .string(12, "QS_ANSWER")
        .string(13, "I will help you, stranger.")
        .u8(10);
    stream
        .class(14, "QuestEditor.NodeCharacter", &[("iid", Member::String), ("objects", Member::String)])
        .string(15, "NPC_4")
        .string(16, "QITEM_X");
    stream.end()
}

#[test]
fn test_cyclic_graph_terminates() {
    let doc = parse(&quest_tree()).unwrap();
    assert!(doc.warnings().is_empty(), "{:?}", doc.warnings());
    assert_eq!(doc.quests().len(), 1);

    let quest = doc.quest("Q_5").unwrap();
    assert_eq!(quest.region_group.as_deref(), Some("Ashos"));
    assert_eq!(quest.reputation, Some(10));
    assert_eq!(quest.dialogs, vec!["DLG_A"]);
    assert_eq!(quest.npcs, vec!["NPC_4"]);

    let dialog = doc.dialog("DLG_A").unwrap();
    assert_eq!(dialog.speaker(), Speaker::Hero);
    assert_eq!(dialog.tree.as_deref(), Some("Q_5"));
    assert_eq!(dialog.text.as_deref(), Some("I will help you, stranger."));
}

#[test]
fn test_npc_items_are_not_drops() {
    let doc = parse(&quest_tree()).unwrap();
    let npc = doc.npc("NPC_4").unwrap();
    assert!(npc.drops.is_empty());
    assert!(!npc.has_drops);
    assert_eq!(npc.extra.get("objects"), Some(&Some("QITEM_X".to_string())));
}

#[test]
fn test_records_keep_raw_bytes() {
    let data = quest_tree();
    let doc = parse(&data).unwrap();
    let npc = doc.npc("NPC_4").unwrap();
    let raw = npc.raw().unwrap();
    assert_eq!(raw[0], 5, "原始片段应从记录类型开始");
    assert!(data.windows(raw.len()).any(|w| w == raw));
    assert!(!doc.is_modified());
}

#[test]
fn test_pool_summary() {
    let doc = parse(&quest_tree()).unwrap();
    let summary = doc.string_pool().unwrap().summary();
    assert_eq!(summary.quest_ids, vec!["Q_5"]);
    assert_eq!(summary.npc_refs, vec!["NPC_4"]);
    assert_eq!(summary.quest_items, vec!["QITEM_X"]);
    assert_eq!(summary.groups, vec!["DLG_A", "QS_ANSWER", "ROOT"]);
    assert_eq!(summary.dialog_texts, vec![(13, "I will help you, stranger.".to_string())]);
}

#[test]
fn test_stream_header() {
    let doc = parse(&quest_tree()).unwrap();
    let header = doc.stream_header().unwrap();
    assert_eq!(header.root_id, 1);
    assert_eq!(header.major_version, 1);
}

#[test]
fn test_not_a_stream() {
    assert!(parse(b"QUEST Q_1\r\nEND\r\n").is_err());
}
