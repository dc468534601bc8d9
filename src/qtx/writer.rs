use std::collections::HashMap;

use log::debug;

use super::{Block, Line, LineRole, QtxLayout, RecordKind};
use crate::model::entities::NULL_TOKEN;
use crate::model::{Document, Location, Npc, Quest, Tracked};
use crate::utils::CodecError;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 序列化纯文本任务文件
///
/// 未修改的记录写回原始行；修改过的记录只重写记录头、OBJECTS 行和指令行，
/// 其它行保持原样。新增记录追加在文件末尾。
pub fn serialize(doc: &Document, layout: &QtxLayout) -> Result<Vec<u8>, CodecError> {
    let mut out = TextOut {
        buf: Vec::new(),
        layout,
    };
    if layout.has_bom {
        out.buf.extend_from_slice(BOM);
    }

    let npcs = by_origin(&doc.npcs);
    let locations = by_origin(&doc.locations);
    let quests = by_origin(&doc.quests);

    let mut rerendered = 0;
    for (slot, block) in layout.blocks.iter().enumerate() {
        match block {
            Block::Verbatim(line) => out.line(line)?,
            Block::Record { kind, lines } => {
                let written = match kind {
                    RecordKind::Npc => write_slot(&mut out, &doc.npcs, &npcs, slot, |out, npc| {
                        render_npc(out, npc, lines)
                    })?,
                    RecordKind::Location => {
                        write_slot(&mut out, &doc.locations, &locations, slot, |out, location| {
                            render_location(out, location, lines)
                        })?
                    }
                    RecordKind::Quest => write_slot(&mut out, &doc.quests, &quests, slot, |out, quest| {
                        render_quest(out, quest, lines)
                    })?,
                };
                if written {
                    rerendered += 1;
                }
            }
        }
    }

    let mut appended = 0;
    for npc in doc.npcs.iter().filter(|n| n.origin().is_none()) {
        out.start_new_record()?;
        out.text(&npc_header(npc))?;
        out.newline()?;
        out.text(&layout.options.indent)?;
        out.text(&objects_line(npc))?;
        out.newline()?;
        out.text("END")?;
        out.newline()?;
        appended += 1;
    }
    for location in doc.locations.iter().filter(|l| l.origin().is_none()) {
        out.start_new_record()?;
        out.text(&location_header(location))?;
        out.newline()?;
        appended += 1;
    }
    for quest in doc.quests.iter().filter(|q| q.origin().is_none()) {
        out.start_new_record()?;
        out.text(&quest_header(quest))?;
        out.newline()?;
        for directive in &quest.directives {
            out.text(&layout.options.indent)?;
            out.text(&directive.line)?;
            out.newline()?;
        }
        out.text("END")?;
        out.newline()?;
        appended += 1;
    }

    debug!(
        "QTX 序列化完成: {} 条记录重写, {} 条记录追加, {} 字节",
        rerendered,
        appended,
        out.buf.len()
    );
    Ok(out.buf)
}

struct TextOut<'a> {
    buf: Vec<u8>,
    layout: &'a QtxLayout,
}

impl TextOut<'_> {
    /// 按文件原编码写出；原编码表示不了的字符报错
    fn text(&mut self, text: &str) -> Result<(), CodecError> {
        let bytes = self.layout.encoding.encode(text)?;
        self.buf.extend(bytes);
        Ok(())
    }

    fn line(&mut self, line: &Line) -> Result<(), CodecError> {
        self.text(&line.text)?;
        self.text(&line.ending)
    }

    /// 按原行的缩进和换行符写出新内容
    fn replace(&mut self, line: &Line, content: &str) -> Result<(), CodecError> {
        self.text(line.indent())?;
        self.text(content)?;
        self.text(&line.ending)
    }

    fn newline(&mut self) -> Result<(), CodecError> {
        let layout = self.layout;
        self.text(&layout.newline)
    }

    /// 追加记录前保证上一行已经结束
    fn start_new_record(&mut self) -> Result<(), CodecError> {
        if !self.buf.is_empty() && !self.buf.ends_with(b"\n") && self.buf != BOM {
            self.newline()?;
        }
        Ok(())
    }
}

/// 槽位到记录下标的映射，只含解析出的记录
fn by_origin<T>(records: &[Tracked<T>]) -> HashMap<usize, usize> {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| record.origin().map(|slot| (slot, index)))
        .collect()
}

/// 写出占据该槽位的记录；返回是否重新渲染
///
/// 槽位上已没有记录时整段省略。
fn write_slot<T>(
    out: &mut TextOut<'_>,
    records: &[Tracked<T>],
    slots: &HashMap<usize, usize>,
    slot: usize,
    render: impl FnOnce(&mut TextOut<'_>, &T) -> Result<(), CodecError>,
) -> Result<bool, CodecError> {
    let Some(record) = slots.get(&slot).and_then(|&index| records.get(index)) else {
        return Ok(false);
    };
    match record.reusable_raw() {
        Some(raw) => {
            out.buf.extend_from_slice(raw);
            Ok(false)
        }
        None => {
            render(out, record.get())?;
            Ok(true)
        }
    }
}

fn render_npc(out: &mut TextOut<'_>, npc: &Npc, lines: &[(LineRole, Line)]) -> Result<(), CodecError> {
    let header_indent = lines
        .first()
        .map(|(_, line)| line.indent().to_string())
        .unwrap_or_default();
    let layout = out.layout;
    let indent = &layout.options.indent;
    let needs_objects = npc.has_drops || !npc.drops.is_empty();
    let mut objects_written = false;

    for (role, line) in lines {
        match role {
            LineRole::Header => out.replace(line, &npc_header(npc))?,
            LineRole::Objects => {
                out.replace(line, &objects_line(npc))?;
                objects_written = true;
            }
            LineRole::End => {
                if !objects_written && needs_objects {
                    out.text(&header_indent)?;
                    out.text(indent)?;
                    out.text(&objects_line(npc))?;
                    out.newline()?;
                }
                out.line(line)?;
            }
            LineRole::Directive | LineRole::Other => out.line(line)?,
        }
    }
    Ok(())
}

fn render_location(
    out: &mut TextOut<'_>,
    location: &Location,
    lines: &[(LineRole, Line)],
) -> Result<(), CodecError> {
    for (role, line) in lines {
        match role {
            LineRole::Header => out.replace(line, &location_header(location))?,
            _ => out.line(line)?,
        }
    }
    Ok(())
}

/// 指令按顺序填回原来的指令行；多出的插在 END 之前，少了则删掉多余的行
fn render_quest(out: &mut TextOut<'_>, quest: &Quest, lines: &[(LineRole, Line)]) -> Result<(), CodecError> {
    let mut directives = quest.directives.iter();
    let mut directive_indent = lines
        .first()
        .map(|(_, line)| format!("{}{}", line.indent(), out.layout.options.indent))
        .unwrap_or_default();

    for (role, line) in lines {
        match role {
            LineRole::Header => out.replace(line, &quest_header(quest))?,
            LineRole::Directive => {
                directive_indent = line.indent().to_string();
                if let Some(directive) = directives.next() {
                    out.replace(line, &directive.line)?;
                }
            }
            LineRole::End => {
                for directive in directives.by_ref() {
                    out.text(&directive_indent)?;
                    out.text(&directive.line)?;
                    out.newline()?;
                }
                out.line(line)?;
            }
            LineRole::Objects | LineRole::Other => out.line(line)?,
        }
    }
    Ok(())
}

fn token(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or(NULL_TOKEN)
}

fn bool_token(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

fn npc_header(npc: &Npc) -> String {
    [
        "NPC",
        npc.id.as_str(),
        token(&npc.iid),
        token(&npc.marker),
        token(&npc.sector),
        token(&npc.angle),
        token(&npc.quest_ref),
        token(&npc.level),
        token(&npc.party_ref),
        token(&npc.size),
        token(&npc.active),
        token(&npc.create_string),
        token(&npc.exp),
    ]
    .join(" ")
}

fn objects_line(npc: &Npc) -> String {
    let mut parts = vec!["OBJECTS", bool_token(npc.has_drops)];
    parts.extend(npc.drops.iter().map(String::as_str));
    parts.join(" ")
}

fn location_header(location: &Location) -> String {
    [
        "LOCATION",
        location.id.as_str(),
        token(&location.iid),
        token(&location.marker),
        token(&location.sector),
        token(&location.x),
        token(&location.y),
    ]
    .join(" ")
}

fn quest_header(quest: &Quest) -> String {
    let reputation = quest.reputation.map(|r| r.to_string());
    let add_to_log = quest.add_to_log.map(|b| bool_token(b).to_string());
    [
        "QUEST",
        quest.id.as_str(),
        token(&quest.group),
        token(&quest.iid),
        token(&quest.guild),
        token(&reputation),
        token(&add_to_log),
    ]
    .join(" ")
}
