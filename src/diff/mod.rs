//! 两个同类文档之间的差异比较
//!
//! 每类记录按自然键匹配；同一个键出现多次时按出现序号配对。
//! 只比较解码后的字段，不看原始字节。

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use crate::model::{Document, Entity, EntityKind, Tracked};
use crate::utils::CodecError;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    /// 只在 B 中
    Added,
    /// 只在 A 中
    Removed,
    Modified,
}

impl ChangeKind {
    fn symbol(self) -> char {
        match self {
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
            ChangeKind::Modified => '~',
        }
    }
}

/// 单个字段的新旧值
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// 一条记录的差异
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Difference {
    pub entity: EntityKind,
    pub key: String,
    pub change: ChangeKind,
    pub fields: Vec<FieldChange>,
}

impl fmt::Display for Difference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.change.symbol(), self.entity, self.key)?;
        for change in &self.fields {
            write!(
                f,
                "\n    {}: {} -> {}",
                change.field,
                show(change.old.as_deref()),
                show(change.new.as_deref())
            )?;
        }
        Ok(())
    }
}

fn show(value: Option<&str>) -> String {
    match value {
        Some(text) => format!("{:?}", text),
        None => "(null)".to_string(),
    }
}

/// 比较两个文档
///
/// 结果先按 A 中的顺序列出 A 的记录，再按 B 中的顺序列出只在 B 中的记录。
pub fn diff(a: &Document, b: &Document) -> Result<Vec<Difference>, CodecError> {
    if a.kind() != b.kind() {
        return Err(CodecError::KindMismatch {
            left: a.kind(),
            right: b.kind(),
        });
    }

    let mut out = Vec::new();
    compare(a.translations(), b.translations(), &mut out);
    compare(a.aliases(), b.aliases(), &mut out);
    compare(a.dialogs(), b.dialogs(), &mut out);
    compare(a.quests(), b.quests(), &mut out);
    compare(a.npcs(), b.npcs(), &mut out);
    compare(a.locations(), b.locations(), &mut out);
    log::debug!("diff: {} 处差异", out.len());
    Ok(out)
}

/// 按 (键, 出现序号) 建索引
fn index<E: Entity>(items: &[Tracked<E>]) -> IndexMap<(&str, usize), &E> {
    let mut seen: IndexMap<&str, usize> = IndexMap::new();
    let mut map = IndexMap::with_capacity(items.len());
    for item in items {
        let key = item.get().key();
        let ordinal = seen.entry(key).or_insert(0);
        map.insert((key, *ordinal), item.get());
        *ordinal += 1;
    }
    map
}

fn compare<E: Entity>(a: &[Tracked<E>], b: &[Tracked<E>], out: &mut Vec<Difference>) {
    let left = index(a);
    let mut right = index(b);

    for (slot, old) in &left {
        match right.shift_remove(slot) {
            Some(new) => {
                let fields = changed_fields(old.fields(), new.fields());
                if !fields.is_empty() {
                    out.push(Difference {
                        entity: E::KIND,
                        key: slot.0.to_string(),
                        change: ChangeKind::Modified,
                        fields,
                    });
                }
            }
            None => out.push(Difference {
                entity: E::KIND,
                key: slot.0.to_string(),
                change: ChangeKind::Removed,
                fields: changed_fields(old.fields(), Vec::new()),
            }),
        }
    }

    for (slot, new) in right {
        out.push(Difference {
            entity: E::KIND,
            key: slot.0.to_string(),
            change: ChangeKind::Added,
            fields: changed_fields(Vec::new(), new.fields()),
        });
    }
}

/// 两组字段中值不同的字段；只在一边出现的字段视为另一边为空
fn changed_fields(
    old: Vec<(String, Option<String>)>,
    new: Vec<(String, Option<String>)>,
) -> Vec<FieldChange> {
    let mut merged: IndexMap<String, (Option<String>, Option<String>)> = IndexMap::new();
    for (field, value) in old {
        merged.entry(field).or_default().0 = value;
    }
    for (field, value) in new {
        merged.entry(field).or_default().1 = value;
    }
    merged
        .into_iter()
        .filter(|(_, (old, new))| old != new)
        .map(|(field, (old, new))| FieldChange { field, old, new })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormatKind, Translation};

    fn lan(entries: &[(&str, &str)]) -> Document {
        let mut doc = Document::new(FormatKind::Lan);
        for (key, value) in entries {
            doc.push_translation(Translation::new(*key, *value)).unwrap();
        }
        doc
    }

    #[test]
    fn test_kind_mismatch() {
        let a = Document::new(FormatKind::Lan);
        let b = Document::new(FormatKind::Qtx);
        assert!(matches!(
            diff(&a, &b),
            Err(CodecError::KindMismatch {
                left: FormatKind::Lan,
                right: FormatKind::Qtx
            })
        ));
    }

    #[test]
    fn test_added_removed_modified_in_order() {
        let a = lan(&[("DQ_1", "Hallo"), ("Q_1", "Quest"), ("TALK_1", "Hi")]);
        let b = lan(&[("NEW_1", "Neu"), ("Q_1", "Quest"), ("DQ_1", "Hallo!")]);
        let result = diff(&a, &b).unwrap();

        let summary: Vec<(&str, ChangeKind)> =
            result.iter().map(|d| (d.key.as_str(), d.change)).collect();
        assert_eq!(
            summary,
            vec![
                ("DQ_1", ChangeKind::Modified),
                ("TALK_1", ChangeKind::Removed),
                ("NEW_1", ChangeKind::Added),
            ]
        );
        assert_eq!(
            result[0].fields,
            vec![FieldChange {
                field: "value".to_string(),
                old: Some("Hallo".to_string()),
                new: Some("Hallo!".to_string()),
            }]
        );
    }

    #[test]
    fn test_duplicate_keys_match_by_ordinal() {
        let a = lan(&[("DUP", "one"), ("DUP", "two")]);
        let b = lan(&[("DUP", "one")]);
        let result = diff(&a, &b).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].change, ChangeKind::Removed);
        assert!(result[0]
            .fields
            .iter()
            .any(|f| f.field == "value" && f.old.as_deref() == Some("two")));
    }

    #[test]
    fn test_diff_is_symmetric() {
        let a = lan(&[("A", "1"), ("B", "2"), ("C", "3")]);
        let b = lan(&[("B", "2b"), ("C", "3"), ("D", "4")]);
        let forward = diff(&a, &b).unwrap();
        let backward = diff(&b, &a).unwrap();

        let mut forward_keys: Vec<&str> = forward.iter().map(|d| d.key.as_str()).collect();
        let mut backward_keys: Vec<&str> = backward.iter().map(|d| d.key.as_str()).collect();
        forward_keys.sort();
        backward_keys.sort();
        assert_eq!(forward_keys, backward_keys, "两个方向的键集合应相同");

        for d in &forward {
            let mirror = backward.iter().find(|m| m.key == d.key).unwrap();
            let expected = match d.change {
                ChangeKind::Added => ChangeKind::Removed,
                ChangeKind::Removed => ChangeKind::Added,
                ChangeKind::Modified => ChangeKind::Modified,
            };
            assert_eq!(mirror.change, expected);
            for f in &d.fields {
                let m = mirror.fields.iter().find(|m| m.field == f.field).unwrap();
                assert_eq!((&m.old, &m.new), (&f.new, &f.old), "新旧值应互换");
            }
        }
    }

    #[test]
    fn test_identical_documents() {
        let a = lan(&[("A", "1")]);
        assert!(diff(&a, &a.clone()).unwrap().is_empty());
    }

    #[test]
    fn test_display() {
        let a = lan(&[("A", "1")]);
        let b = lan(&[]);
        let result = diff(&a, &b).unwrap();
        let text = result[0].to_string();
        assert!(text.starts_with("- translation A"), "{}", text);
    }
}
