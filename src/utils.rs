use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::model::{EntityKind, FormatKind};

/// 编解码错误
///
/// 结构性错误会中止整个文档的加载；单条记录的问题不走这里，
/// 而是以 [`Warning`] 的形式挂在文档上。
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("truncated input at offset {offset}: requested {requested} bytes, {available} available")]
    TruncatedInput {
        offset: usize,
        requested: usize,
        available: usize,
    },

    #[error("{section} section size mismatch: declared {declared} bytes, consumed {consumed}")]
    SectionSizeMismatch {
        section: &'static str,
        declared: usize,
        consumed: usize,
    },

    #[error("invalid {format} signature")]
    InvalidSignature { format: FormatKind },

    #[error("malformed record at {location}: {reason}")]
    MalformedRecord { location: SourceLocation, reason: String },

    #[error("value of {length} units does not fit a length prefix (max {max})")]
    ValueTooLong { length: usize, max: usize },

    #[error("{0} documents are read-only")]
    UnsupportedWrite(FormatKind),

    #[error("{format} documents cannot hold {entity} records")]
    Unsupported { format: FormatKind, entity: EntityKind },

    #[error("{0} documents cannot hold drop items")]
    UnsupportedDrops(FormatKind),

    #[error("cannot serialize new {entity} record into {format} document")]
    UnsupportedInsert { format: FormatKind, entity: EntityKind },

    #[error("cannot compare a {left} document with a {right} document")]
    KindMismatch { left: FormatKind, right: FormatKind },

    #[error("unknown file format: {0}")]
    UnknownFormat(String),

    #[error("{entity} '{key}' not found")]
    NotFound { entity: EntityKind, key: String },

    #[error("{entity} has no editable field '{field}'")]
    UnknownField { entity: EntityKind, field: String },

    #[error("invalid value '{value}' for field '{field}'")]
    InvalidValue { field: String, value: String },

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// 诊断信息中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SourceLocation {
    /// 字节偏移
    Offset(usize),
    /// 行号（从 1 开始）
    Line(usize),
    /// 记录序号（从 0 开始）
    Record(usize),
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Offset(offset) => write!(f, "offset 0x{:X}", offset),
            SourceLocation::Line(line) => write!(f, "line {}", line),
            SourceLocation::Record(index) => write!(f, "record #{}", index),
        }
    }
}

/// 部分加载的诊断信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Warning {
    /// 单条记录无法解析，其余内容照常加载
    MalformedRecord { location: SourceLocation, reason: String },
    /// 记录引用了未注册的类型描述符，已跳过
    UnknownTypeDescriptor { id: i32, offset: usize },
    /// 别名目标或对话链接无法解析
    DanglingReference { from: String, target: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::MalformedRecord { location, reason } => {
                write!(f, "malformed record at {}: {}", location, reason)
            }
            Warning::UnknownTypeDescriptor { id, offset } => {
                write!(f, "unknown type descriptor {} at offset 0x{:X}", id, offset)
            }
            Warning::DanglingReference { from, target } => {
                write!(f, "dangling reference {} -> {}", from, target)
            }
        }
    }
}

/// 创建文件备份
pub fn create_backup(file_path: &Path) -> Result<PathBuf, CodecError> {
    if !file_path.exists() {
        return Err(CodecError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "原文件不存在",
        )));
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d-%H-%M-%S");
    let extension = file_path
        .extension()
        .map(|ext| format!("{}.{}.bak", ext.to_string_lossy(), timestamp))
        .unwrap_or_else(|| format!("{}.bak", timestamp));
    let backup_path = file_path.with_extension(extension);

    std::fs::copy(file_path, &backup_path)?;

    Ok(backup_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_display() {
        assert_eq!(SourceLocation::Offset(255).to_string(), "offset 0xFF");
        assert_eq!(SourceLocation::Line(3).to_string(), "line 3");
        assert_eq!(SourceLocation::Record(0).to_string(), "record #0");
    }

    #[test]
    fn test_truncated_message_has_context() {
        let err = CodecError::TruncatedInput {
            offset: 12,
            requested: 4,
            available: 2,
        };
        let message = err.to_string();
        assert!(message.contains("12"), "错误信息应包含偏移量: {}", message);
        assert!(message.contains("requested 4"));
    }

    #[test]
    fn test_create_backup_keeps_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quests.qtx");
        std::fs::write(&path, b"QUEST Q_1").unwrap();

        let backup = create_backup(&path).unwrap();
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("quests.qtx."), "备份文件名: {}", name);
        assert!(name.ends_with(".bak"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"QUEST Q_1");
    }

    #[test]
    fn test_create_backup_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(create_backup(&dir.path().join("missing.lan")).is_err());
    }
}
