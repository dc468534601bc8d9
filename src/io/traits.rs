/// 读写接口
///
/// 调用方可以换成内存实现，便于测试。

use std::path::Path;

use crate::model::Document;
use crate::utils::CodecError;

/// 从路径加载文档
pub trait DocumentReader {
    /// 读取并解析文件；格式由扩展名或文件内容决定
    fn read(&self, path: &Path) -> Result<Document, CodecError>;
}

/// 把文档写到路径
pub trait DocumentWriter {
    /// 序列化并写入文件
    fn write(&self, doc: &Document, path: &Path) -> Result<(), CodecError>;
}
