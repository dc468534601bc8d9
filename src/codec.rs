//! 统一的加载/保存入口和格式识别

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::lan::{self, LanOptions};
use crate::model::{Document, FormatKind, Layout};
use crate::qtx::{self, QtxOptions};
use crate::utils::CodecError;
use crate::{idx, shf};

/// 各格式的加载选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    pub lan: LanOptions,
    pub qtx: QtxOptions,
}

/// 按默认选项加载
pub fn load(bytes: &[u8], kind: FormatKind) -> Result<Document, CodecError> {
    load_with(bytes, kind, &LoadOptions::default())
}

pub fn load_with(
    bytes: &[u8],
    kind: FormatKind,
    options: &LoadOptions,
) -> Result<Document, CodecError> {
    log::debug!("加载 {} 文档, {} 字节", kind, bytes.len());
    match kind {
        FormatKind::Lan => lan::parse(bytes, &options.lan),
        FormatKind::Qtx => qtx::parse(bytes, &options.qtx),
        FormatKind::Idx => idx::parse(bytes),
        FormatKind::Shf => shf::parse(bytes),
    }
}

/// 保存文档
///
/// 未修改的记录原样输出，所以对刚加载的文档有 `save(load(b)) == b`。
pub fn save(doc: &Document) -> Result<Vec<u8>, CodecError> {
    match &doc.layout {
        Layout::Lan(layout) => lan::serialize(doc, layout),
        Layout::Qtx(layout) => qtx::serialize(doc, layout),
        Layout::Idx(layout) => idx::serialize(doc, layout),
        Layout::Shf(_) => Err(CodecError::UnsupportedWrite(FormatKind::Shf)),
    }
}

/// 根据文件内容猜测格式
pub fn sniff(bytes: &[u8]) -> Option<FormatKind> {
    if bytes.is_empty() {
        return None;
    }
    if bytes.starts_with(lan::MAGIC) {
        return Some(FormatKind::Lan);
    }
    // 流头：记录类型 0，之后是根 ID、头 ID 和两个版本号
    if bytes[0] == 0 && bytes.len() >= 17 {
        return Some(FormatKind::Shf);
    }
    let text = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes);
    match text.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => Some(FormatKind::Idx),
        _ => Some(FormatKind::Qtx),
    }
}

/// 先看扩展名，认不出时看内容
pub fn detect(path: &Path, bytes: &[u8]) -> Result<FormatKind, CodecError> {
    FormatKind::from_path(path)
        .or_else(|| sniff(bytes))
        .ok_or_else(|| CodecError::UnknownFormat(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(sniff(b"LAN\0\x03\0\0\0"), Some(FormatKind::Lan));
        assert_eq!(sniff(&[0u8; 17]), Some(FormatKind::Shf));
        assert_eq!(sniff(b"\xEF\xBB\xBF  \r\n<?xml version=\"1.0\"?>"), Some(FormatKind::Idx));
        assert_eq!(sniff(b"QUEST Q_1\r\n"), Some(FormatKind::Qtx));
        assert_eq!(sniff(b""), None);
    }

    #[test]
    fn test_extension_wins() {
        let kind = detect(Path::new("data/quests.qtx"), b"<not xml>").unwrap();
        assert_eq!(kind, FormatKind::Qtx);
        let kind = detect(Path::new("data/dump.bin"), b"<Envelope/>").unwrap();
        assert_eq!(kind, FormatKind::Idx);
        assert!(matches!(
            detect(Path::new("empty.bin"), b""),
            Err(CodecError::UnknownFormat(_))
        ));
    }

    #[test]
    fn test_shf_is_read_only() {
        let doc = Document::new(FormatKind::Shf);
        assert!(matches!(
            save(&doc),
            Err(CodecError::UnsupportedWrite(FormatKind::Shf))
        ));
    }

    #[test]
    fn test_qtx_roundtrip_through_codec() {
        let data = b"LOCATION LOC_1 201 MRK_L 3 100 200\r\nQUEST Q_1 ASHOS 301 MAGES 10 True\r\nEND\r\n";
        let doc = load(data, FormatKind::Qtx).unwrap();
        assert_eq!(doc.quests().len(), 1);
        assert_eq!(doc.locations().len(), 1);
        assert_eq!(save(&doc).unwrap(), data.to_vec());
    }
}
