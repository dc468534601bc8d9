//! 二进制语言文件（.lan）
//!
//! 文件依次包含翻译表、别名表和对话树表，后两节可选。
//! 键是 8 位代码页字符串，值默认是 UTF-16LE。

mod parser;
mod writer;


pub use parser::parse;
pub use writer::serialize;

use crate::datatypes::TextEncoding;

/// 文件签名
pub const MAGIC: &[u8; 4] = b"LAN\0";

/// 磁盘上键的固定前缀，显示时去掉，保存时加回
pub const KEY_PREFIX: &str = "translate";

/// 语言文件的编码选项
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LanOptions {
    /// 翻译值的编码
    pub value_encoding: TextEncoding,
    /// 键、别名和声音提示的编码
    pub key_encoding: TextEncoding,
    pub key_prefix: String,
}

impl Default for LanOptions {
    fn default() -> Self {
        Self {
            value_encoding: TextEncoding::Utf16Le,
            key_encoding: TextEncoding::Windows1252,
            key_prefix: KEY_PREFIX.to_string(),
        }
    }
}

impl LanOptions {
    /// 去掉键前缀，返回显示键和是否带前缀
    pub(crate) fn strip_prefix(&self, key: String) -> (String, bool) {
        if !self.key_prefix.is_empty() {
            if let Some(rest) = key.strip_prefix(self.key_prefix.as_str()) {
                return (rest.to_string(), true);
            }
        }
        (key, false)
    }

    pub(crate) fn with_prefix(&self, key: &str, prefixed: bool) -> String {
        if prefixed {
            format!("{}{}", self.key_prefix, key)
        } else {
            key.to_string()
        }
    }
}

/// 对话树表头
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TreeHeader {
    pub id: String,
    pub prefixed: bool,
    pub reserved: u32,
}

/// 保存时需要的原始结构
#[derive(Debug, Clone, Default)]
pub struct LanLayout {
    pub(crate) version: u32,
    pub(crate) options: LanOptions,
    pub(crate) alias_section: bool,
    pub(crate) dialog_section: bool,
    pub(crate) trees: Vec<TreeHeader>,
    /// 每个解析出的对话节点所属树的序号，按节点原始位置索引
    pub(crate) dialog_trees: Vec<usize>,
    /// 最后一节之后的零填充
    pub(crate) trailing: Vec<u8>,
}

/// 对话条目 ID：`树#下标`
///
/// 文件中重名的树，从第二棵起 ID 写作 `树@序号#下标`。
pub fn dialog_id(tree: &str, index: usize) -> String {
    format!("{}#{}", tree, index)
}
