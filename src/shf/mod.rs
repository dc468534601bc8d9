//! .NET 二进制序列化任务文件（.shf），只读
//!
//! 文件是一个 MS-NRBF 记录流。解码器单遍读出全部对象和字符串，
//! 再按类名把节点对象提取成任务、对话、NPC 和地点。

mod decoder;
mod extract;
mod pool;
mod records;

#[cfg(test)]
mod tests;

pub use pool::{PoolSummary, PooledString, StringPool};
pub use records::StreamHeader;

use log::debug;

use crate::model::{Document, FormatKind, Layout, Tracked};
use crate::utils::CodecError;

/// 保留下来的流信息
#[derive(Debug, Clone, Default)]
pub struct ShfLayout {
    pub(crate) header: StreamHeader,
    pub(crate) pool: StringPool,
}

/// 解码二进制序列化文件
///
/// 引用了未知类型描述符的记录会被跳过并记为警告，不会导致失败。
pub fn parse(data: &[u8]) -> Result<Document, CodecError> {
    let graph = decoder::decode(data)?;
    let extracted = extract::extract(&graph);

    let mut doc = Document::new(FormatKind::Shf);
    let raw_of = |id: i32| -> (Vec<u8>, usize) {
        match graph.objects.get_full(&id) {
            Some((index, _, object)) => (data[object.offset..object.end].to_vec(), index),
            None => (Vec::new(), 0),
        }
    };
    for (quest, id) in extracted.quests {
        let (raw, origin) = raw_of(id);
        doc.quests.push(Tracked::parsed(quest, raw, origin));
    }
    for (dialog, id) in extracted.dialogs {
        let (raw, origin) = raw_of(id);
        doc.dialogs.push(Tracked::parsed(dialog, raw, origin));
    }
    for (npc, id) in extracted.npcs {
        let (raw, origin) = raw_of(id);
        doc.npcs.push(Tracked::parsed(npc, raw, origin));
    }
    for (location, id) in extracted.locations {
        let (raw, origin) = raw_of(id);
        doc.locations.push(Tracked::parsed(location, raw, origin));
    }
    for warning in graph.warnings {
        doc.warn(warning);
    }

    debug!(
        "SHF: {} 个任务, {} 条对话, {} 个 NPC, {} 个地点",
        doc.quests.len(),
        doc.dialogs.len(),
        doc.npcs.len(),
        doc.locations.len()
    );

    doc.layout = Layout::Shf(ShfLayout {
        header: graph.header,
        pool: graph.pool,
    });
    Ok(doc)
}
