//! SOAP XML 任务导出（.idx）
//!
//! `Envelope > Body` 下每个对象带 `id="ref-N"`，字段是子元素，
//! `href="#ref-N"` 引用 Body 中的其它对象，`nodes` 字段指向子节点数组。
//! 保存时只改写修改过的字段所在的源文本片段，其余内容原样输出。

pub(crate) mod binding;
mod parser;
mod writer;
mod xml;


pub use parser::parse;
pub use writer::serialize;

use std::ops::Range;

use crate::datatypes::TextEncoding;
use crate::model::EntityKind;

/// 记录中一个字段在源文本中的位置
#[derive(Debug, Clone)]
pub(crate) struct FieldSlot {
    /// 模型字段名（未绑定的子元素用元素名）
    pub field: String,
    /// 源文本中的元素名，带前缀
    pub tag: String,
    /// 子元素本身
    pub span: Range<usize>,
    /// 文本所在位置；引用共享字符串时指向被引用对象的内容
    pub inner: Option<Range<usize>>,
    /// 加载时的值
    pub snapshot: Option<String>,
}

/// 一条记录的拼接信息
#[derive(Debug, Clone)]
pub(crate) struct RecordSlot {
    pub kind: EntityKind,
    pub fields: Vec<FieldSlot>,
    /// 新子元素的插入位置：最后一个子元素之后；自闭合记录为 `None`
    pub insert_at: Option<usize>,
    /// 子元素之间的空白
    pub lead: String,
}

/// 保存时需要的原始结构
#[derive(Debug, Clone)]
pub struct IdxLayout {
    pub(crate) source: String,
    pub(crate) encoding: TextEncoding,
    pub(crate) has_bom: bool,
    pub(crate) records: Vec<RecordSlot>,
}

impl Default for IdxLayout {
    fn default() -> Self {
        Self {
            source: String::new(),
            encoding: TextEncoding::Utf8,
            has_bom: false,
            records: Vec::new(),
        }
    }
}
