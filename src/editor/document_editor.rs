/// 文档编辑器
///
/// 按 (实体类型, 键, 字段名) 修改记录，每次修改都进入修改日志。
/// 撤销/重做会把字段值真正写回文档。

use log::debug;
use std::path::Path;
use std::time::Instant;

use super::delta::{ChangeLog, FieldEdit};
use crate::codec;
use crate::io::DocumentWriter;
use crate::model::{Document, Entity, EntityKind, Tracked};
use crate::utils::CodecError;

pub struct DocumentEditor {
    document: Document,
    changes: ChangeLog,
}

/// 一次字段写入的结果
struct Applied {
    old_value: Option<String>,
    key_after: String,
    changed: bool,
}

impl DocumentEditor {
    pub fn new(document: Document) -> Self {
        Self {
            document,
            changes: ChangeLog::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    /// 修改一个字段
    ///
    /// 记录不存在返回 `NotFound`；字段名或值无效时文档保持不变。
    /// 返回值表示字段值是否真的改变了。
    pub fn set_field(
        &mut self,
        entity: EntityKind,
        key: &str,
        field: &str,
        value: Option<&str>,
    ) -> Result<bool, CodecError> {
        let applied = self.apply(entity, key, field, value)?;
        if applied.changed {
            debug!("{} {}: {} 已修改", entity, key, field);
            self.changes.add_change(FieldEdit {
                entity,
                key: key.to_string(),
                key_after: applied.key_after,
                field: field.to_string(),
                old_value: applied.old_value,
                new_value: value.map(str::to_string),
                applied_at: Instant::now(),
            });
        }
        Ok(applied.changed)
    }

    /// 修改翻译文本
    pub fn set_translation(&mut self, key: &str, value: &str) -> Result<bool, CodecError> {
        self.set_field(EntityKind::Translation, key, "value", Some(value))
    }

    /// 撤销最后一次修改；没有可撤销的修改时返回 `false`
    pub fn undo(&mut self) -> Result<bool, CodecError> {
        let Some(change) = self.changes.undo().cloned() else {
            return Ok(false);
        };
        self.apply(
            change.entity,
            &change.key_after,
            &change.field,
            change.old_value.as_deref(),
        )?;
        Ok(true)
    }

    /// 重做最后一次撤销的修改
    pub fn redo(&mut self) -> Result<bool, CodecError> {
        let Some(change) = self.changes.redo().cloned() else {
            return Ok(false);
        };
        self.apply(
            change.entity,
            &change.key,
            &change.field,
            change.new_value.as_deref(),
        )?;
        Ok(true)
    }

    pub fn is_modified(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn modified_count(&self) -> usize {
        self.changes.len()
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    /// 序列化当前文档
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::save(&self.document)
    }

    /// 通过 writer 保存（需要显式调用）
    pub fn save(&self, writer: &dyn DocumentWriter, path: &Path) -> Result<(), CodecError> {
        writer.write(&self.document, path)
    }

    fn apply(
        &mut self,
        entity: EntityKind,
        key: &str,
        field: &str,
        value: Option<&str>,
    ) -> Result<Applied, CodecError> {
        let doc = &mut self.document;
        match entity {
            EntityKind::Translation => apply_in(doc.translations_mut(), key, field, value),
            EntityKind::Alias => apply_in(doc.aliases_mut(), key, field, value),
            EntityKind::Dialog => apply_in(doc.dialogs_mut(), key, field, value),
            EntityKind::Quest => apply_in(doc.quests_mut(), key, field, value),
            EntityKind::Npc => apply_in(doc.npcs_mut(), key, field, value),
            EntityKind::Location => apply_in(doc.locations_mut(), key, field, value),
        }
    }
}

/// 在副本上写入，成功且有变化时才替换原记录
fn apply_in<E: Entity + Clone + PartialEq>(
    items: &mut [Tracked<E>],
    key: &str,
    field: &str,
    value: Option<&str>,
) -> Result<Applied, CodecError> {
    let item = items
        .iter_mut()
        .find(|item| item.get().key() == key)
        .ok_or_else(|| CodecError::NotFound {
            entity: E::KIND,
            key: key.to_string(),
        })?;

    let mut updated = item.get().clone();
    let old_value = updated.field(field).flatten();
    updated.set_field(field, value)?;
    let key_after = updated.key().to_string();
    let changed = updated != *item.get();
    if changed {
        *item.edit() = updated;
    }
    Ok(Applied {
        old_value: if field_holds_key(field, key, &old_value) {
            Some(key.to_string())
        } else {
            old_value
        },
        key_after,
        changed,
    })
}

/// 键字段不在 `fields()` 中，旧值就是键本身
fn field_holds_key(field: &str, key: &str, old_value: &Option<String>) -> bool {
    old_value.is_none() && matches!(field, "key" | "source") && !key.is_empty()
}
