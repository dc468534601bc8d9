//! 文档模型、差异比较和编辑器的集成测试
//!
//! 测试场景：
//! - 翻译分类、对话环遍历、格式能力表
//! - 只读格式和未知类型描述符
//! - XML 空值、OBJECTS False 带物品列表
//! - 差异比较的对称性、编辑后写文件并备份

use tw_quest_kit::io::{DefaultDocumentReader, DefaultDocumentWriter, DocumentReader, DocumentWriter};
use tw_quest_kit::{
    diff, load, save, Category, ChangeKind, CodecError, Document, DocumentEditor, EntityKind,
    Filter, FormatKind, Npc, Quest, Translation, Warning,
};

fn lan_with_cycle() -> Vec<u8> {
    let mut buf = b"LAN\0".to_vec();
    let put = |buf: &mut Vec<u8>, v: u32| buf.extend_from_slice(&v.to_le_bytes());
    let key = |buf: &mut Vec<u8>, k: &str| {
        buf.extend_from_slice(&(k.len() as u32).to_le_bytes());
        buf.extend_from_slice(k.as_bytes());
    };

    put(&mut buf, 3);
    put(&mut buf, 1);
    key(&mut buf, "translateDQ_001");
    put(&mut buf, 5);
    for unit in "Hallo".encode_utf16() {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    put(&mut buf, 0);

    put(&mut buf, 1);
    key(&mut buf, "translateDQ_9");
    put(&mut buf, 3);
    put(&mut buf, 0);
    for (lector, next) in [(5, 1), (1, 2), (5, 0)] {
        buf.extend_from_slice(&(lector as i32).to_le_bytes());
        key(&mut buf, "translateDQ_001");
        key(&mut buf, "");
        put(&mut buf, 1);
        put(&mut buf, 0);
        put(&mut buf, next);
        for _ in 0..5 {
            put(&mut buf, 0);
        }
    }
    buf
}

#[test]
fn test_translation_category() {
    let doc = load(&lan_with_cycle(), FormatKind::Lan).unwrap();
    let filter = Filter::new()
        .entity(EntityKind::Translation)
        .category(Category::Dialogs);
    let hits: Vec<_> = doc.query(&filter).collect();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].key, "DQ_001", "键应去掉 translate 前缀");
    assert_eq!(hits[0].value, "Hallo");
    assert_eq!(Category::classify("DQ_001"), Category::Dialogs);

    // 对话节点按文本键分类，三个节点都引用 DQ_001
    let dialogs = Filter::new().category(Category::Dialogs);
    let all: Vec<_> = doc.query(&dialogs).collect();
    assert_eq!(all.len(), 4);
    assert!(all[1..].iter().all(|e| e.kind == EntityKind::Dialog && e.value == "Hallo"));
}

#[test]
fn test_dialog_cycle_walks_each_node_once() {
    let doc = load(&lan_with_cycle(), FormatKind::Lan).unwrap();
    assert_eq!(doc.dialogs().len(), 3);

    let walk = doc.walk_conversation("DQ_9#0");
    let ids: Vec<&str> = walk.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["DQ_9#0", "DQ_9#1", "DQ_9#2"]);
    assert_eq!(doc.dialog_text(walk[1]), Some("Hallo"));
}

#[test]
fn test_capability_matrix() {
    let mut lan = Document::new(FormatKind::Lan);
    assert!(matches!(
        lan.push_npc(Npc::new("NPC_1")),
        Err(CodecError::Unsupported { .. })
    ));
    assert!(lan.push_translation(Translation::new("DQ_1", "x")).is_ok());

    let mut qtx = Document::new(FormatKind::Qtx);
    assert!(qtx.push_translation(Translation::new("DQ_1", "x")).is_err());
    let mut npc = Npc::new("NPC_1");
    npc.has_drops = true;
    npc.drops.push("QITEM_A".to_string());
    assert!(qtx.push_npc(npc.clone()).is_ok(), "纯文本格式支持掉落物品");

    let mut shf = Document::new(FormatKind::Shf);
    assert!(matches!(shf.push_npc(npc), Err(CodecError::UnsupportedDrops(_))));
    assert!(!FormatKind::Shf.is_writable());
}

/// 只含一个地点、中间夹着一条坏记录的序列化流
fn shf_with_bad_record() -> (Vec<u8>, usize) {
    let mut data = vec![0u8];
    for value in [1i32, -1, 1, 0] {
        data.extend_from_slice(&value.to_le_bytes());
    }
    let text = |data: &mut Vec<u8>, s: &str| {
        data.push(s.len() as u8);
        data.extend_from_slice(s.as_bytes());
    };
    let int = |data: &mut Vec<u8>, v: i32| data.extend_from_slice(&v.to_le_bytes());

    // BinaryLibrary
    data.push(12);
    int(&mut data, 100);
    text(&mut data, "QuestEditor");
    // ClassWithMembersAndTypes: iid 字符串 + x 整数
    data.push(5);
    int(&mut data, 1);
    text(&mut data, "QuestEditor.NodeLocation");
    int(&mut data, 2);
    text(&mut data, "<iid>k__BackingField");
    text(&mut data, "x");
    data.extend_from_slice(&[1, 0, 8]);
    int(&mut data, 100);
    data.push(6);
    int(&mut data, 2);
    text(&mut data, "LOC_1");
    int(&mut data, 5);

    // ClassWithId 引用不存在的描述符 99
    let bad_offset = data.len();
    data.push(1);
    int(&mut data, 3);
    int(&mut data, 99);
    data.push(6);
    int(&mut data, 4);
    text(&mut data, "junk");

    data.push(1);
    int(&mut data, 5);
    int(&mut data, 1);
    data.push(6);
    int(&mut data, 6);
    text(&mut data, "LOC_2");
    int(&mut data, 7);
    data.push(11);
    (data, bad_offset)
}

#[test]
fn test_unknown_type_descriptor_is_skipped() {
    let (data, bad_offset) = shf_with_bad_record();
    let doc = load(&data, FormatKind::Shf).unwrap();

    let ids: Vec<&str> = doc.locations().iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec!["LOC_1", "LOC_2"]);
    assert_eq!(
        doc.warnings(),
        &[Warning::UnknownTypeDescriptor {
            id: 99,
            offset: bad_offset
        }]
    );
}

#[test]
fn test_shf_is_read_only() {
    let (data, _) = shf_with_bad_record();
    let doc = load(&data, FormatKind::Shf).unwrap();
    assert!(matches!(
        save(&doc),
        Err(CodecError::UnsupportedWrite(FormatKind::Shf))
    ));
}

const IDX: &str = r##"<?xml version="1.0" encoding="utf-8"?>
<SOAP-ENV:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:SOAP-ENC="http://schemas.xmlsoap.org/soap/encoding/" xmlns:SOAP-ENV="http://schemas.xmlsoap.org/soap/envelope/" xmlns:a1="http://schemas.microsoft.com/clr/nsassem/QuestEditor">
<SOAP-ENV:Body>
<a1:NodeQuest id="ref-1">
<iid>Q_7</iid>
<min_reputation>10</min_reputation>
<notes xsi:null="1"/>
<nodes xsi:null="1"/>
</a1:NodeQuest>
<a1:NodeLocation id="ref-2">
<iid>LOC_4</iid>
<x>12</x>
</a1:NodeLocation>
</SOAP-ENV:Body>
</SOAP-ENV:Envelope>
"##;

#[test]
fn test_xml_null_stays_null() {
    let mut doc = load(IDX.as_bytes(), FormatKind::Idx).unwrap();
    assert!(doc.quest("Q_7").unwrap().notes.is_none());

    doc.quest_mut("Q_7").unwrap().edit().reputation = Some(11);
    let out = String::from_utf8(save(&doc).unwrap()).unwrap();
    assert!(out.contains(r#"<notes xsi:null="1"/>"#), "空值不应变成空字符串");

    let reloaded = load(out.as_bytes(), FormatKind::Idx).unwrap();
    assert!(reloaded.quest("Q_7").unwrap().notes.is_none());
}

#[test]
fn test_objects_false_keeps_items() {
    let text = "NPC NPC_2 102 (null) 3 0 (null) 1 (null) 1 False (null) 0\n  OBJECTS False QITEM_OLD QITEM_NEW\nEND\n";
    let doc = load(text.as_bytes(), FormatKind::Qtx).unwrap();
    let npc = doc.npc("NPC_2").unwrap();
    assert!(!npc.has_drops);
    assert_eq!(npc.drops, vec!["QITEM_OLD", "QITEM_NEW"]);
    assert_eq!(save(&doc).unwrap(), text.as_bytes());
}

#[test]
fn test_diff_symmetry_on_loaded_documents() {
    let a = load(IDX.as_bytes(), FormatKind::Idx).unwrap();
    let changed = IDX.replace("<x>12</x>", "<x>13</x>");
    let b = load(changed.as_bytes(), FormatKind::Idx).unwrap();

    let forward = diff(&a, &b).unwrap();
    let backward = diff(&b, &a).unwrap();
    assert_eq!(forward.len(), 1);
    assert_eq!(backward.len(), 1);
    assert_eq!(forward[0].entity, EntityKind::Location);
    assert_eq!(forward[0].change, ChangeKind::Modified);

    let f = &forward[0].fields[0];
    let r = &backward[0].fields[0];
    assert_eq!(f.field, "x");
    assert_eq!((f.old.as_deref(), f.new.as_deref()), (Some("12"), Some("13")));
    assert_eq!((r.old.as_deref(), r.new.as_deref()), (Some("13"), Some("12")));

    let qtx = load(b"QUEST Q_1 G 1 GUILD 5 True\nEND\n", FormatKind::Qtx).unwrap();
    assert!(matches!(diff(&a, &qtx), Err(CodecError::KindMismatch { .. })));
}

#[test]
fn test_edit_and_save_with_backup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quests.qtx");
    let original = b"QUEST Q_1 ASHOS 301 MAGES 10 True\r\nEND\r\n";
    std::fs::write(&path, original).unwrap();

    let doc = DefaultDocumentReader::default().read(&path).unwrap();
    let mut editor = DocumentEditor::new(doc);
    assert!(editor
        .set_field(EntityKind::Quest, "Q_1", "add_to_log", Some("False"))
        .unwrap());
    editor
        .save(&DefaultDocumentWriter::with_backup(), &path)
        .unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, "QUEST Q_1 ASHOS 301 MAGES 10 False\r\nEND\r\n");

    let backups = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".bak"))
        .count();
    assert_eq!(backups, 1, "覆盖前应生成备份");

    // 新增记录追加到文件末尾
    let mut doc = DefaultDocumentReader::default().read(&path).unwrap();
    doc.push_quest(Quest::new("Q_2")).unwrap();
    DefaultDocumentWriter::default().write(&doc, &path).unwrap();
    let reloaded = DefaultDocumentReader::default().read(&path).unwrap();
    assert_eq!(reloaded.quests().len(), 2);
}
