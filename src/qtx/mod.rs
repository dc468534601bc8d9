//! 纯文本任务逻辑（.qtx）
//!
//! 每条记录由一个关键字行开头（`NPC`、`LOCATION`、`QUEST`），
//! 无法识别的行原样保留在原位置。保存时只重新渲染修改过的记录自己的行。

mod parser;
mod writer;

pub use parser::parse;
pub use writer::serialize;

use crate::datatypes::TextEncoding;

/// 纯文本格式选项
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QtxOptions {
    /// 新增子行（OBJECTS、指令）的缩进
    pub indent: String,
    /// 新增行使用的换行符；为空时沿用文件中第一个换行符
    pub newline: Option<String>,
}

impl Default for QtxOptions {
    fn default() -> Self {
        Self {
            indent: "  ".to_string(),
            newline: None,
        }
    }
}

/// 一行文本，换行符单独保存
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Line {
    pub text: String,
    /// `"\n"`、`"\r\n"`，最后一行可能为空
    pub ending: String,
}

impl Line {
    pub fn indent(&self) -> &str {
        let trimmed = self.text.trim_start();
        &self.text[..self.text.len() - trimmed.len()]
    }
}

/// 记录内各行的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LineRole {
    Header,
    Objects,
    Directive,
    End,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordKind {
    Npc,
    Location,
    Quest,
}

/// 文件中的一段：原样保留的行，或一条记录
#[derive(Debug, Clone)]
pub(crate) enum Block {
    Verbatim(Line),
    Record {
        kind: RecordKind,
        lines: Vec<(LineRole, Line)>,
    },
}

/// 保存时需要的原始结构
#[derive(Debug, Clone)]
pub struct QtxLayout {
    pub(crate) encoding: TextEncoding,
    pub(crate) has_bom: bool,
    pub(crate) newline: String,
    pub(crate) options: QtxOptions,
    pub(crate) blocks: Vec<Block>,
}

impl Default for QtxLayout {
    fn default() -> Self {
        Self {
            encoding: TextEncoding::Utf8,
            has_bom: false,
            newline: "\r\n".to_string(),
            options: QtxOptions::default(),
            blocks: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Directive, Document, Layout, Npc, Quest};
    use crate::utils::{CodecError, SourceLocation, Warning};

    const SAMPLE: &str = concat!(
        "\u{feff}// quest logic export\r\n",
        "NPC NPC_1 101 MRK_1 12 90 Q_1 5 PARTY_1 1 True CS(1)#SWORD 250\r\n",
        "  OBJECTS True QITEM_KEY QITEM_KEY GOLD\r\n",
        "END\r\n",
        "LOCATION LOC_1 201 MRK_L 3 100 200\r\n",
        "    NPC NPC_2 102 (null) 3 0 (null) 1 (null) 1 False (null) 0\r\n",
        "      OBJECTS False QITEM_OLD\r\n",
        "    END\r\n",
        "QUEST Q_1 ASHOS 301 MAGES 10 True\r\n",
        "  ACTION TALK 1 NPC_1\r\n",
        "  # designer note\r\n",
        "  GIVER 1 NPC_1 TALK (null)\r\n",
        "  REWARD GOLD 1 100\r\n",
        "END\r\n",
        "TRAILER without newline",
    );

    fn load(text: &str) -> Document {
        parse(text.as_bytes(), &QtxOptions::default()).unwrap()
    }

    fn save(doc: &Document) -> Vec<u8> {
        match &doc.layout {
            Layout::Qtx(layout) => serialize(doc, layout).unwrap(),
            _ => panic!("不是纯文本布局"),
        }
    }

    #[test]
    fn test_parse_sample() {
        let doc = load(SAMPLE);
        assert!(doc.warnings().is_empty(), "不应有警告: {:?}", doc.warnings());
        assert_eq!(doc.npcs().len(), 2);
        assert_eq!(doc.locations().len(), 1);
        assert_eq!(doc.quests().len(), 1);

        let npc = doc.npc("NPC_1").unwrap();
        assert_eq!(npc.iid.as_deref(), Some("101"));
        assert_eq!(npc.create_string.as_deref(), Some("CS(1)#SWORD"));
        assert_eq!(npc.exp.as_deref(), Some("250"));
        assert!(npc.has_drops);
        assert_eq!(npc.drops, vec!["QITEM_KEY", "QITEM_KEY", "GOLD"]);
        assert!(npc.location.is_none());

        let nested = doc.npc("NPC_2").unwrap();
        assert!(nested.marker.is_none());
        assert_eq!(nested.location.as_deref(), Some("LOC_1"));
        // False 带物品列表也能解析，列表保留
        assert!(!nested.has_drops);
        assert_eq!(nested.drops, vec!["QITEM_OLD"]);

        let location = doc.location("LOC_1").unwrap();
        assert_eq!(location.x.as_deref(), Some("100"));
        assert_eq!(location.y.as_deref(), Some("200"));

        let quest = doc.quest("Q_1").unwrap();
        assert_eq!(quest.group.as_deref(), Some("ASHOS"));
        assert_eq!(quest.guild.as_deref(), Some("MAGES"));
        assert_eq!(quest.reputation, Some(10));
        assert_eq!(quest.add_to_log, Some(true));
        assert_eq!(quest.directives.len(), 3);
        assert_eq!(quest.npcs, vec!["NPC_1"]);
    }

    #[test]
    fn test_roundtrip_unmodified() {
        let doc = load(SAMPLE);
        assert_eq!(save(&doc), SAMPLE.as_bytes());
    }

    #[test]
    fn test_edit_rerenders_only_own_lines() {
        let mut doc = load(SAMPLE);
        doc.npc_mut("NPC_2").unwrap().edit().has_drops = true;
        let out = String::from_utf8(save(&doc)).unwrap();

        assert!(out.contains("      OBJECTS True QITEM_OLD\r\n"), "输出:\n{}", out);
        assert!(out.contains("    NPC NPC_2 102 (null) 3 0 (null) 1 (null) 1 False (null) 0\r\n"));
        // 其它记录不变
        assert!(out.contains("  OBJECTS True QITEM_KEY QITEM_KEY GOLD\r\n"));
        assert!(out.ends_with("TRAILER without newline"));

        // 再加载再保存是不动点
        let again = load(&out);
        assert_eq!(String::from_utf8(save(&again)).unwrap(), out);
    }

    #[test]
    fn test_quest_edit_keeps_unknown_lines() {
        let mut doc = load(SAMPLE);
        {
            let quest = doc.quest_mut("Q_1").unwrap().edit();
            quest.reputation = Some(-5);
            quest.directives.push(Directive::parse("AOQ ADD 2 QITEM_KEY").unwrap());
        }
        let out = String::from_utf8(save(&doc)).unwrap();
        assert!(out.contains("QUEST Q_1 ASHOS 301 MAGES -5 True\r\n"));
        assert!(out.contains("  # designer note\r\n"));
        assert!(out.contains("  REWARD GOLD 1 100\r\n  AOQ ADD 2 QITEM_KEY\r\nEND\r\n"), "输出:\n{}", out);
    }

    #[test]
    fn test_malformed_record_is_localized() {
        let text = "QUEST Q_1 G 1 GUILD abc True\nEND\nQUEST Q_2 G 2 GUILD 5 False\nEND\nNPC\nEND\n";
        let doc = load(text);
        assert_eq!(doc.quests().len(), 1);
        assert_eq!(doc.quests()[0].id, "Q_2");
        assert_eq!(doc.warnings().len(), 2);
        assert!(matches!(
            doc.warnings()[0],
            Warning::MalformedRecord {
                location: SourceLocation::Line(1),
                ..
            }
        ));
        assert_eq!(save(&doc), text.as_bytes());
    }

    #[test]
    fn test_records_are_written_in_file_order() {
        let text: String = (0..50)
            .map(|i| format!("QUEST Q_{} G {} GUILD 5 True\r\nEND\r\n", i, i))
            .collect();
        let mut doc = load(&text);
        doc.quests_mut().reverse();
        doc.quests_mut()[0].edit().reputation = Some(6);

        let out = String::from_utf8(save(&doc)).unwrap();
        assert!(out.starts_with("QUEST Q_0 G 0 GUILD 5 True\r\n"));
        assert!(out.ends_with("QUEST Q_49 G 49 GUILD 6 True\r\nEND\r\n"));
        assert_eq!(out.len(), text.len());
    }

    #[test]
    fn test_npc_after_bad_location_has_no_location() {
        let text = concat!(
            "LOCATION LOC_1 201 MRK_L 3 100 200\n",
            "  NPC NPC_1 1 M 1 0 Q 1 P 1 True CS 0\n",
            "  END\n",
            "LOCATION\n",
            "  NPC NPC_2 2 M 1 0 Q 1 P 1 True CS 0\n",
            "  END\n",
        );
        let doc = load(text);
        assert_eq!(doc.locations().len(), 1);
        assert_eq!(doc.warnings().len(), 1);
        assert_eq!(doc.npc("NPC_1").unwrap().location.as_deref(), Some("LOC_1"));
        assert!(doc.npc("NPC_2").unwrap().location.is_none());
        assert_eq!(save(&doc), text.as_bytes());
    }

    #[test]
    fn test_bad_objects_bool_is_malformed() {
        let text = "NPC NPC_9 1 M 1 0 Q 1 P 1 True CS 0\n  OBJECTS true X\nEND\n";
        let doc = load(text);
        assert!(doc.npcs().is_empty());
        assert_eq!(doc.warnings().len(), 1);
        assert_eq!(save(&doc), text.as_bytes());
    }

    #[test]
    fn test_new_records_are_appended() {
        let mut doc = load("QUEST Q_1 G 1 GUILD 5 True\nEND");
        let mut npc = Npc::new("NPC_7");
        npc.has_drops = true;
        npc.drops = vec!["QITEM_A".to_string()];
        doc.push_npc(npc).unwrap();
        let mut quest = Quest::new("Q_2");
        quest.directives.push(Directive::parse("GIVER 1 NPC_7 TALK (null)").unwrap());
        doc.push_quest(quest).unwrap();

        let out = String::from_utf8(save(&doc)).unwrap();
        assert_eq!(
            out,
            "QUEST Q_1 G 1 GUILD 5 True\nEND\n\
NPC NPC_7 (null) (null) (null) (null) (null) (null) (null) (null) (null) (null) (null)\n  OBJECTS True QITEM_A\nEND\n\
QUEST Q_2 (null) (null) (null) (null) (null)\n  GIVER 1 NPC_7 TALK (null)\nEND\n"
        );

        let reloaded = load(&out);
        assert_eq!(reloaded.quest("Q_2").unwrap().npcs, vec!["NPC_7"]);
    }

    #[test]
    fn test_code_page_file_roundtrip() {
        let data = b"NPC NPC_1 1 M 1 0 Q 1 P 1 True Gr\xfc\xdfe 0\nEND\n".to_vec();
        let mut doc = parse(&data, &QtxOptions::default()).unwrap();
        assert_eq!(doc.npc("NPC_1").unwrap().create_string.as_deref(), Some("Grüße"));
        assert_eq!(save(&doc), data);

        doc.npc_mut("NPC_1").unwrap().edit().exp = Some("5".to_string());
        let out = save(&doc);
        assert!(out.windows(5).any(|w| w == b"Gr\xfc\xdfe"), "应按原代码页写回");
    }

    #[test]
    fn test_parse_error_never_fatal() {
        assert!(matches!(parse(b"", &QtxOptions::default()), Ok(_)));
        let _: Result<Document, CodecError> = parse(b"END\nEND\n", &QtxOptions::default());
    }
}
