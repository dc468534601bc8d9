/// 文件读写层
///
/// 编解码只处理字节，这里负责把文档从文件系统读进来、写回去。
/// 读取走内存映射，写入前可以先备份原文件。
///
/// # 使用示例
///
/// ```rust,ignore
/// use tw_quest_kit::io::{DefaultDocumentReader, DefaultDocumentWriter, DocumentReader, DocumentWriter};
///
/// let mut doc = DefaultDocumentReader::default().read(Path::new("quests.qtx"))?;
/// doc.quest_mut("Q_1").unwrap().edit().reputation = Some(5);
/// DefaultDocumentWriter::with_backup().write(&doc, Path::new("quests.qtx"))?;
/// ```
pub mod document_io;
pub mod traits;

pub use document_io::{DefaultDocumentReader, DefaultDocumentWriter};
pub use traits::{DocumentReader, DocumentWriter};
