use log::{debug, warn};
use quick_xml::escape::partial_escape;
use std::ops::Range;

use super::binding::{self, preferred_elements};
use super::{FieldSlot, IdxLayout, RecordSlot};
use crate::model::{Document, Entity, FormatKind, Npc, Tracked};
use crate::utils::CodecError;

const BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// 源文本上的一次替换
struct Splice {
    range: Range<usize>,
    text: String,
}

/// 序列化 XML 任务导出
///
/// 只改写修改过的记录中值发生变化的字段，其余内容照抄原文。
/// 这个格式不支持新增记录。
pub fn serialize(doc: &Document, layout: &IdxLayout) -> Result<Vec<u8>, CodecError> {
    let mut splices = Vec::new();
    collect(&doc.quests, layout, &mut splices)?;
    collect(&doc.dialogs, layout, &mut splices)?;
    check_drop_flags(&doc.npcs)?;
    collect(&doc.npcs, layout, &mut splices)?;
    collect(&doc.locations, layout, &mut splices)?;
    splices.sort_by_key(|splice| (splice.range.start, splice.range.end));

    let source = &layout.source;
    let mut text = String::with_capacity(source.len());
    let mut pos = 0;
    let mut applied = 0;
    for splice in &splices {
        // 多个字段引用同一个共享字符串时只写第一次
        if splice.range.start < pos {
            warn!("IDX: 跳过重叠的修改 {:?}", splice.range);
            continue;
        }
        text.push_str(&source[pos..splice.range.start]);
        text.push_str(&splice.text);
        pos = splice.range.end;
        applied += 1;
    }
    text.push_str(&source[pos..]);

    debug!("IDX 序列化完成: {} 处修改", applied);

    let mut out = Vec::with_capacity(text.len() + BOM.len());
    if layout.has_bom {
        out.extend_from_slice(BOM);
    }
    out.extend(layout.encoding.encode(&text)?);
    Ok(out)
}

fn collect<E: Entity>(
    records: &[Tracked<E>],
    layout: &IdxLayout,
    splices: &mut Vec<Splice>,
) -> Result<(), CodecError> {
    for record in records {
        let Some(origin) = record.origin() else {
            return Err(CodecError::UnsupportedInsert {
                format: FormatKind::Idx,
                entity: E::KIND,
            });
        };
        if !record.is_modified() {
            continue;
        }
        let Some(slot) = layout.records.get(origin) else {
            continue;
        };

        for field in &slot.fields {
            let current = record.field(&field.field).flatten();
            if current != field.snapshot {
                splices.push(render_field(field, current.as_deref()));
            }
        }
        if let Some(splice) = insert_missing(record.get(), slot) {
            splices.push(splice);
        }
    }
    Ok(())
}

/// XML 里没有单独的掉落开关，是否掉落由 `objects` 列表是否为空决定。
/// 改过的 NPC 两者不一致时拒绝保存，不静默丢掉修改。
fn check_drop_flags(npcs: &[Tracked<Npc>]) -> Result<(), CodecError> {
    for npc in npcs.iter().filter(|n| n.is_modified()) {
        if npc.has_drops == npc.drops.is_empty() {
            return Err(CodecError::InvalidValue {
                field: format!("{}.has_drops", npc.id),
                value: npc.has_drops.to_string(),
            });
        }
    }
    Ok(())
}

/// 有值时只替换文本；设为空时整个元素改写成 `xsi:null`
fn render_field(field: &FieldSlot, value: Option<&str>) -> Splice {
    match (value, &field.inner) {
        (Some(value), Some(inner)) => Splice {
            range: inner.clone(),
            text: partial_escape(value).into_owned(),
        },
        (Some(value), None) => Splice {
            range: field.span.clone(),
            text: element(&field.tag, value),
        },
        (None, _) => Splice {
            range: field.span.clone(),
            text: null_element(&field.tag),
        },
    }
}

/// 原来没有对应子元素、现在有值的绑定字段，插在最后一个子元素之后
fn insert_missing<E: Entity>(record: &E, slot: &RecordSlot) -> Option<Splice> {
    let at = slot.insert_at?;
    let mut text = String::new();
    for (tag, field) in preferred_elements(binding::table_for(slot.kind)) {
        if slot.fields.iter().any(|f| f.field == field) {
            continue;
        }
        if let Some(value) = record.field(field).flatten().filter(|v| !v.is_empty()) {
            text.push_str(&slot.lead);
            text.push_str(&element(tag, &value));
        }
    }
    (!text.is_empty()).then(|| Splice { range: at..at, text })
}

fn element(tag: &str, value: &str) -> String {
    format!("<{tag}>{}</{tag}>", partial_escape(value))
}

fn null_element(tag: &str) -> String {
    format!("<{} xsi:null=\"1\"/>", tag)
}
