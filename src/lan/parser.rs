use log::debug;

use super::{dialog_id, LanLayout, LanOptions, TreeHeader, MAGIC};
use crate::datatypes::{ByteCursor, LengthWidth};
use crate::model::{
    Alias, DialogEntry, DialogFlags, Document, FormatKind, Layout, Lector, Tracked, Translation,
};
use crate::utils::CodecError;

/// 可选小节存在的最小剩余字节数（一个计数字段）
const SECTION_COUNT_SIZE: usize = 4;

/// 解析语言文件
pub fn parse(data: &[u8], options: &LanOptions) -> Result<Document, CodecError> {
    if data.len() < MAGIC.len() || &data[..MAGIC.len()] != MAGIC {
        return Err(CodecError::InvalidSignature {
            format: FormatKind::Lan,
        });
    }

    let mut cursor = ByteCursor::new(data);
    cursor.seek(MAGIC.len())?;
    let version = cursor.read_u32()?;

    let mut layout = LanLayout {
        version,
        options: options.clone(),
        ..Default::default()
    };
    let mut doc = Document::new(FormatKind::Lan);

    // 翻译表
    let count = cursor.read_u32()? as usize;
    for index in 0..count {
        let start = cursor.position();
        let (key, prefixed) = read_key(&mut cursor, options)?;
        let value = cursor.read_length_prefixed_string(LengthWidth::U32, options.value_encoding)?;
        let raw = data[start..cursor.position()].to_vec();
        doc.translations.push(Tracked::parsed(
            Translation {
                key,
                value,
                prefixed,
            },
            raw,
            index,
        ));
    }
    debug!("LAN v{}: {} 条翻译", version, count);

    // 别名表
    if cursor.remaining() >= SECTION_COUNT_SIZE {
        layout.alias_section = true;
        let count = cursor.read_u32()? as usize;
        for index in 0..count {
            let start = cursor.position();
            let (source, source_prefixed) = read_key(&mut cursor, options)?;
            let (target, target_prefixed) = read_key(&mut cursor, options)?;
            let raw = data[start..cursor.position()].to_vec();
            doc.aliases.push(Tracked::parsed(
                Alias {
                    source,
                    target,
                    source_prefixed,
                    target_prefixed,
                },
                raw,
                index,
            ));
        }
        debug!("LAN: {} 个别名", count);
    }

    // 对话树表
    if cursor.remaining() >= SECTION_COUNT_SIZE {
        layout.dialog_section = true;
        let tree_count = cursor.read_u32()? as usize;
        let mut origin = 0;
        for ordinal in 0..tree_count {
            let (tree, prefixed) = read_key(&mut cursor, options)?;
            let dialog_count = cursor.read_u32()? as usize;
            let reserved = cursor.read_u32()?;

            // 重名的树用序号区分 ID，否则节点 ID 会冲突
            let scope = if layout.trees.iter().any(|h| h.id == tree) {
                format!("{}@{}", tree, ordinal)
            } else {
                tree.clone()
            };

            for index in 0..dialog_count {
                let start = cursor.position();
                let entry = read_dialog(&mut cursor, options, &tree, &scope, index)?;
                let raw = data[start..cursor.position()].to_vec();
                doc.dialogs.push(Tracked::parsed(entry, raw, origin));
                layout.dialog_trees.push(ordinal);
                origin += 1;
            }

            layout.trees.push(TreeHeader {
                id: tree,
                prefixed,
                reserved,
            });
        }
        debug!("LAN: {} 棵对话树，{} 个对话节点", tree_count, origin);
    }

    // 剩余字节只能是零填充
    let rest = &data[cursor.position()..];
    if rest.iter().any(|&b| b != 0) {
        return Err(CodecError::SectionSizeMismatch {
            section: "lan",
            declared: data.len(),
            consumed: cursor.position(),
        });
    }
    layout.trailing = rest.to_vec();

    doc.layout = Layout::Lan(layout);
    Ok(doc)
}

fn read_key(cursor: &mut ByteCursor<'_>, options: &LanOptions) -> Result<(String, bool), CodecError> {
    let key = cursor.read_length_prefixed_string(LengthWidth::U32, options.key_encoding)?;
    Ok(options.strip_prefix(key))
}

/// 带保留字的 i32 数组：数量、保留字、数据
fn read_padded_array(cursor: &mut ByteCursor<'_>) -> Result<(Vec<i32>, u32), CodecError> {
    let count = cursor.read_u32()? as usize;
    let reserved = cursor.read_u32()?;
    // 先检查长度，避免按损坏的数量预分配
    if count.saturating_mul(4) > cursor.remaining() {
        return Err(CodecError::TruncatedInput {
            offset: cursor.position(),
            requested: count.saturating_mul(4),
            available: cursor.remaining(),
        });
    }
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(cursor.read_i32()?);
    }
    Ok((values, reserved))
}

fn read_dialog(
    cursor: &mut ByteCursor<'_>,
    options: &LanOptions,
    tree: &str,
    scope: &str,
    index: usize,
) -> Result<DialogEntry, CodecError> {
    let lector = cursor.read_i32()?;
    let (text_key, text_key_prefixed) = read_key(cursor, options)?;
    let sound_cue = cursor.read_length_prefixed_string(LengthWidth::U32, options.key_encoding)?;
    let (next, next_reserved) = read_padded_array(cursor)?;
    let flags = cursor.read_u32()?;
    let (camera, camera_reserved) = read_padded_array(cursor)?;
    let animation = cursor.read_u32()?;
    let animation_alt = cursor.read_u32()?;

    Ok(DialogEntry {
        id: dialog_id(scope, index),
        tree: Some(tree.to_string()),
        index: Some(index),
        state: None,
        lector: Some(Lector::Id(lector)),
        sound_cue: non_empty(sound_cue),
        next,
        camera,
        animation: Some(animation),
        animation_alt: Some(animation_alt),
        flags: DialogFlags::from_bits_retain(flags),
        text_key: non_empty(text_key),
        text_key_prefixed,
        text: None,
        reserved: [next_reserved, camera_reserved],
        extra: Default::default(),
    })
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
