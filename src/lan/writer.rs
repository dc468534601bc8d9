use std::collections::HashMap;

use log::debug;

use super::{LanLayout, LanOptions, MAGIC};
use crate::datatypes::{ByteWriter, LengthWidth};
use crate::model::{Alias, DialogEntry, Document, Lector, Tracked, Translation};
use crate::utils::CodecError;

/// 序列化语言文件
///
/// 未修改的记录直接写回原始字节，修改过的按当前字段重新编码。
pub fn serialize(doc: &Document, layout: &LanLayout) -> Result<Vec<u8>, CodecError> {
    let options = &layout.options;
    let mut out = ByteWriter::with_capacity(estimate_size(doc));

    out.write_bytes(MAGIC);
    out.write_u32(layout.version);

    write_count(&mut out, doc.translations.len())?;
    for translation in &doc.translations {
        write_record(&mut out, translation, |out, t| write_translation(out, options, t))?;
    }

    let trees = group_trees(doc, layout);
    let dialog_section = layout.dialog_section || !trees.is_empty();
    // 对话表在别名表之后，写对话表就必须先写别名表
    let alias_section = layout.alias_section || !doc.aliases.is_empty() || dialog_section;

    if alias_section {
        write_count(&mut out, doc.aliases.len())?;
        for alias in &doc.aliases {
            write_record(&mut out, alias, |out, a| write_alias(out, options, a))?;
        }
    }

    if dialog_section {
        write_count(&mut out, trees.len())?;
        for group in &trees {
            out.write_length_prefixed_string(
                LengthWidth::U32,
                options.key_encoding,
                &options.with_prefix(group.id, group.prefixed),
            )?;
            write_count(&mut out, group.dialogs.len())?;
            out.write_u32(group.reserved);
            for dialog in &group.dialogs {
                write_record(&mut out, dialog, |out, d| write_dialog(out, options, d))?;
            }
        }
    }

    out.write_bytes(&layout.trailing);

    debug!(
        "LAN 序列化完成: {} 条翻译, {} 个别名, {} 棵对话树, {} 字节",
        doc.translations.len(),
        doc.aliases.len(),
        trees.len(),
        out.position()
    );
    Ok(out.into_inner())
}

struct TreeGroup<'a> {
    id: &'a str,
    prefixed: bool,
    reserved: u32,
    dialogs: Vec<&'a Tracked<DialogEntry>>,
}

/// 按原始树顺序分组对话，新出现的树排在后面
///
/// 解析出的节点回到原来那棵树（按序号，重名的树不会合并），
/// 新节点或改过树名的节点归入第一棵同名树。
fn group_trees<'a>(doc: &'a Document, layout: &'a LanLayout) -> Vec<TreeGroup<'a>> {
    let mut trees: Vec<TreeGroup<'a>> = layout
        .trees
        .iter()
        .map(|header| TreeGroup {
            id: &header.id,
            prefixed: header.prefixed,
            reserved: header.reserved,
            dialogs: Vec::new(),
        })
        .collect();
    let mut first_by_name: HashMap<&str, usize> = HashMap::new();
    for (ordinal, group) in trees.iter().enumerate() {
        first_by_name.entry(group.id).or_insert(ordinal);
    }

    for dialog in &doc.dialogs {
        let tree = tree_of(dialog);
        let ordinal = dialog
            .origin()
            .and_then(|origin| layout.dialog_trees.get(origin).copied())
            .filter(|&ordinal| trees.get(ordinal).map_or(false, |g| g.id == tree))
            .or_else(|| first_by_name.get(tree).copied());
        let ordinal = match ordinal {
            Some(ordinal) => ordinal,
            None => {
                trees.push(TreeGroup {
                    id: tree,
                    prefixed: dialog.text_key_prefixed,
                    reserved: 0,
                    dialogs: Vec::new(),
                });
                first_by_name.insert(tree, trees.len() - 1);
                trees.len() - 1
            }
        };
        trees[ordinal].dialogs.push(dialog);
    }
    trees
}

fn tree_of(dialog: &DialogEntry) -> &str {
    match dialog.tree.as_deref() {
        Some(tree) => tree,
        None => dialog.id.split('#').next().unwrap_or_default(),
    }
}

fn write_record<T>(
    out: &mut ByteWriter,
    record: &Tracked<T>,
    encode: impl FnOnce(&mut ByteWriter, &T) -> Result<(), CodecError>,
) -> Result<(), CodecError> {
    match record.reusable_raw() {
        Some(raw) => {
            out.write_bytes(raw);
            Ok(())
        }
        None => encode(out, record.get()),
    }
}

fn write_count(out: &mut ByteWriter, count: usize) -> Result<(), CodecError> {
    out.write_length(LengthWidth::U32, count)
}

fn write_key(out: &mut ByteWriter, options: &LanOptions, key: &str, prefixed: bool) -> Result<(), CodecError> {
    out.write_length_prefixed_string(
        LengthWidth::U32,
        options.key_encoding,
        &options.with_prefix(key, prefixed),
    )
}

pub(super) fn write_translation(
    out: &mut ByteWriter,
    options: &LanOptions,
    translation: &Translation,
) -> Result<(), CodecError> {
    write_key(out, options, &translation.key, translation.prefixed)?;
    out.write_length_prefixed_string(LengthWidth::U32, options.value_encoding, &translation.value)
}

fn write_alias(out: &mut ByteWriter, options: &LanOptions, alias: &Alias) -> Result<(), CodecError> {
    write_key(out, options, &alias.source, alias.source_prefixed)?;
    write_key(out, options, &alias.target, alias.target_prefixed)
}

fn write_padded_array(out: &mut ByteWriter, values: &[i32], reserved: u32) -> Result<(), CodecError> {
    write_count(out, values.len())?;
    out.write_u32(reserved);
    for &value in values {
        out.write_i32(value);
    }
    Ok(())
}

fn write_dialog(out: &mut ByteWriter, options: &LanOptions, dialog: &DialogEntry) -> Result<(), CodecError> {
    let lector = match &dialog.lector {
        None => 0,
        Some(Lector::Id(id)) => *id,
        Some(Lector::Named(name)) => {
            return Err(CodecError::InvalidValue {
                field: "lector".to_string(),
                value: name.clone(),
            })
        }
    };
    out.write_i32(lector);
    write_key(
        out,
        options,
        dialog.text_key.as_deref().unwrap_or_default(),
        dialog.text_key_prefixed,
    )?;
    out.write_length_prefixed_string(
        LengthWidth::U32,
        options.key_encoding,
        dialog.sound_cue.as_deref().unwrap_or_default(),
    )?;
    write_padded_array(out, &dialog.next, dialog.reserved[0])?;
    out.write_u32(dialog.flags.bits());
    write_padded_array(out, &dialog.camera, dialog.reserved[1])?;
    out.write_u32(dialog.animation.unwrap_or(0));
    out.write_u32(dialog.animation_alt.unwrap_or(0));
    Ok(())
}

fn estimate_size(doc: &Document) -> usize {
    let raw_len = |raw: Option<&[u8]>| raw.map_or(64, <[u8]>::len);
    16 + doc.translations.iter().map(|t| raw_len(t.raw())).sum::<usize>()
        + doc.aliases.iter().map(|a| raw_len(a.raw())).sum::<usize>()
        + doc.dialogs.iter().map(|d| raw_len(d.raw())).sum::<usize>()
}
