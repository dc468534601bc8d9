use log::debug;

use super::{Block, Line, LineRole, QtxLayout, QtxOptions, RecordKind};
use crate::datatypes::RawText;
use crate::model::entities::{parse_bool, NULL_TOKEN};
use crate::model::{Directive, DirectiveKind, Document, FormatKind, Layout, Location, Npc, Quest, Tracked};
use crate::utils::{CodecError, SourceLocation, Warning};

/// 解析纯文本任务文件
///
/// 单条记录损坏只产生警告，记录的行原样保留，不会中止整个文件。
pub fn parse(data: &[u8], options: &QtxOptions) -> Result<Document, CodecError> {
    let raw = RawText::decode(data);
    let lines = split_lines(&raw.content);
    let newline = options
        .newline
        .clone()
        .or_else(|| lines.iter().map(|l| l.ending.clone()).find(|e| !e.is_empty()))
        .unwrap_or_else(|| "\r\n".to_string());

    let mut doc = Document::new(FormatKind::Qtx);
    let mut blocks = Vec::new();
    let mut current_location: Option<String> = None;
    let mut i = 0;

    while i < lines.len() {
        let kind = match keyword(&lines[i].text) {
            "NPC" => RecordKind::Npc,
            "LOCATION" => RecordKind::Location,
            "QUEST" => RecordKind::Quest,
            _ => {
                blocks.push(Block::Verbatim(lines[i].clone()));
                i += 1;
                continue;
            }
        };

        let end = record_end(&lines, i, kind);
        let record_lines = &lines[i..end];
        let slot = blocks.len();
        let raw_bytes = raw.encoding.encode(&join_lines(record_lines))?;

        let parsed = match kind {
            RecordKind::Npc => parse_npc(record_lines).map(|(mut npc, roles)| {
                npc.location = current_location.clone();
                doc.npcs.push(Tracked::parsed(npc, raw_bytes, slot));
                roles
            }),
            RecordKind::Location => parse_location(record_lines).map(|(location, roles)| {
                current_location = Some(location.id.clone());
                doc.locations.push(Tracked::parsed(location, raw_bytes, slot));
                roles
            }),
            RecordKind::Quest => parse_quest(record_lines).map(|(quest, roles)| {
                current_location = None;
                doc.quests.push(Tracked::parsed(quest, raw_bytes, slot));
                roles
            }),
        };

        match parsed {
            Ok(roles) => blocks.push(Block::Record {
                kind,
                lines: roles.into_iter().zip(record_lines.iter().cloned()).collect(),
            }),
            Err(reason) => {
                // 坏的地点头之后的 NPC 不能挂到前一个地点上
                if kind != RecordKind::Npc {
                    current_location = None;
                }
                doc.warn(Warning::MalformedRecord {
                    location: SourceLocation::Line(i + 1),
                    reason,
                });
                blocks.extend(record_lines.iter().cloned().map(Block::Verbatim));
            }
        }
        i = end;
    }

    debug!(
        "QTX: {} 行, {} 个 NPC, {} 个地点, {} 个任务, {} 条警告",
        lines.len(),
        doc.npcs.len(),
        doc.locations.len(),
        doc.quests.len(),
        doc.warnings.len()
    );

    doc.layout = Layout::Qtx(QtxLayout {
        encoding: raw.encoding,
        has_bom: raw.has_bom,
        newline,
        options: options.clone(),
        blocks,
    });
    Ok(doc)
}

/// 按行切分，保留各行自己的换行符
fn split_lines(content: &str) -> Vec<Line> {
    content
        .split_inclusive('\n')
        .map(|piece| {
            let (text, ending) = if let Some(text) = piece.strip_suffix("\r\n") {
                (text, "\r\n")
            } else if let Some(text) = piece.strip_suffix('\n') {
                (text, "\n")
            } else {
                (piece, "")
            };
            Line {
                text: text.to_string(),
                ending: ending.to_string(),
            }
        })
        .collect()
}

pub(super) fn join_lines(lines: &[Line]) -> String {
    lines
        .iter()
        .flat_map(|line| [line.text.as_str(), line.ending.as_str()])
        .collect()
}

fn keyword(text: &str) -> &str {
    text.trim().split(' ').next().unwrap_or_default()
}

fn is_header(text: &str) -> bool {
    matches!(keyword(text), "NPC" | "LOCATION" | "QUEST")
}

/// 记录结束位置（不含）
///
/// NPC 和 QUEST 以 `END` 结束；缺少 `END` 时在下一个记录头之前截止。
/// LOCATION 只占一行，其后的 NPC 是独立记录。
fn record_end(lines: &[Line], start: usize, kind: RecordKind) -> usize {
    if kind == RecordKind::Location {
        return start + 1;
    }
    let mut i = start + 1;
    while i < lines.len() {
        let text = lines[i].text.trim();
        if text == "END" {
            return i + 1;
        }
        if is_header(text) {
            return i;
        }
        i += 1;
    }
    i
}

fn value(token: Option<&str>) -> Option<String> {
    match token {
        None | Some(NULL_TOKEN) | Some("") => None,
        Some(token) => Some(token.to_string()),
    }
}

fn require_id(token: Option<&str>, kind: &str) -> Result<String, String> {
    value(token).ok_or_else(|| format!("{} header without id", kind))
}

fn require_end(lines: &[Line]) -> Result<(), String> {
    match lines.last() {
        Some(line) if line.text.trim() == "END" => Ok(()),
        _ => Err("missing END".to_string()),
    }
}

fn parse_npc(lines: &[Line]) -> Result<(Npc, Vec<LineRole>), String> {
    require_end(lines)?;
    // 最后一个字段 exp 可以包含空格
    let mut parts = lines[0].text.trim().splitn(13, ' ').skip(1);
    let mut npc = Npc::new(require_id(parts.next(), "NPC")?);
    npc.iid = value(parts.next());
    npc.marker = value(parts.next());
    npc.sector = value(parts.next());
    npc.angle = value(parts.next());
    npc.quest_ref = value(parts.next());
    npc.level = value(parts.next());
    npc.party_ref = value(parts.next());
    npc.size = value(parts.next());
    npc.active = value(parts.next());
    npc.create_string = value(parts.next());
    npc.exp = value(parts.next());

    let mut roles = vec![LineRole::Header];
    for line in &lines[1..] {
        let text = line.text.trim();
        let role = if text == "END" {
            LineRole::End
        } else if keyword(text) == "OBJECTS" {
            let mut tokens = text.split_whitespace().skip(1);
            match tokens.next() {
                Some("True") => npc.has_drops = true,
                Some("False") => npc.has_drops = false,
                other => {
                    return Err(format!(
                        "OBJECTS flag must be True or False, got {:?}",
                        other.unwrap_or_default()
                    ))
                }
            }
            npc.drops = tokens.map(str::to_string).collect();
            LineRole::Objects
        } else {
            LineRole::Other
        };
        roles.push(role);
    }
    Ok((npc, roles))
}

fn parse_location(lines: &[Line]) -> Result<(Location, Vec<LineRole>), String> {
    let mut parts = lines[0].text.trim().split(' ').skip(1);
    let mut location = Location::new(require_id(parts.next(), "LOCATION")?);
    location.iid = value(parts.next());
    location.marker = value(parts.next());
    location.sector = value(parts.next());
    location.x = value(parts.next());
    location.y = value(parts.next());
    Ok((location, vec![LineRole::Header]))
}

fn parse_quest(lines: &[Line]) -> Result<(Quest, Vec<LineRole>), String> {
    require_end(lines)?;
    let mut parts = lines[0].text.trim().split(' ').skip(1);
    let mut quest = Quest::new(require_id(parts.next(), "QUEST")?);
    quest.group = value(parts.next());
    quest.iid = value(parts.next());
    quest.guild = value(parts.next());
    quest.reputation = match value(parts.next()) {
        None => None,
        Some(text) => Some(
            text.parse::<i32>()
                .map_err(|_| format!("min_rep is not a number: {}", text))?,
        ),
    };
    quest.add_to_log = match value(parts.next()) {
        None => None,
        Some(text) => {
            Some(parse_bool(&text).ok_or_else(|| format!("add_to_log is not a bool: {}", text))?)
        }
    };

    let mut roles = vec![LineRole::Header];
    for line in &lines[1..] {
        let text = line.text.trim();
        let role = if text == "END" {
            LineRole::End
        } else if let Some(directive) = Directive::parse(text) {
            if directive.kind == DirectiveKind::Giver {
                if let Some(npc) = directive.giver_npc() {
                    if !quest.npcs.iter().any(|n| n == npc) {
                        quest.npcs.push(npc.to_string());
                    }
                }
            }
            quest.directives.push(directive);
            LineRole::Directive
        } else {
            LineRole::Other
        };
        roles.push(role);
    }
    Ok((quest, roles))
}
