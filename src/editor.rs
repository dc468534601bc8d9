/// 编辑器层
///
/// 在文档之上提供按名称修改字段的接口，并记录每次修改以支持撤销/重做。
/// 修改只在内存中进行，需要显式保存。
///
/// # 使用示例
///
/// ```rust,ignore
/// use tw_quest_kit::{DocumentEditor, EntityKind};
/// use tw_quest_kit::io::DefaultDocumentWriter;
///
/// let mut editor = DocumentEditor::new(doc);
/// editor.set_field(EntityKind::Quest, "Q_1", "guild", Some("MAGES"))?;
/// editor.undo()?;
/// editor.save(&DefaultDocumentWriter::with_backup(), Path::new("quests.qtx"))?;
/// ```
pub mod delta;
pub mod document_editor;

pub use delta::{ChangeLog, FieldEdit};
pub use document_editor::DocumentEditor;
