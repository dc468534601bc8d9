use serde::Serialize;
use std::borrow::Cow;

use super::{Category, Document, EntityKind};

/// 查询条件，全部为空时匹配所有条目
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub entity: Option<EntityKind>,
    pub category: Option<Category>,
    /// 不区分大小写的子串，匹配键或值
    pub text: Option<String>,
    pub key_prefix: Option<String>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity: EntityKind) -> Self {
        self.entity = Some(entity);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn contains(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into().to_lowercase());
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }

    fn admits_kind(&self, kind: EntityKind) -> bool {
        self.entity.map_or(true, |wanted| wanted == kind)
    }

    pub fn matches(&self, entry: &QueryEntry<'_>) -> bool {
        if !self.admits_kind(entry.kind) {
            return false;
        }
        if let Some(category) = self.category {
            if entry.category != category {
                return false;
            }
        }
        if let Some(prefix) = &self.key_prefix {
            if !entry.key.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            if !entry.key.to_lowercase().contains(&needle)
                && !entry.value.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// 查询结果中的一项，对外暴露的只读键值对
#[derive(Debug, Clone, Serialize)]
pub struct QueryEntry<'a> {
    pub kind: EntityKind,
    pub key: &'a str,
    pub value: Cow<'a, str>,
    pub category: Category,
}

impl Document {
    /// 惰性查询：按集合顺序产出匹配的条目
    pub fn query<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = QueryEntry<'a>> + 'a {
        let translations = self
            .translations
            .iter()
            .filter(move |_| filter.admits_kind(EntityKind::Translation))
            .map(|t| QueryEntry {
                kind: EntityKind::Translation,
                key: t.key.as_str(),
                value: Cow::Borrowed(t.value.as_str()),
                category: Category::classify(&t.key),
            });

        let aliases = self
            .aliases
            .iter()
            .filter(move |_| filter.admits_kind(EntityKind::Alias))
            .map(|a| QueryEntry {
                kind: EntityKind::Alias,
                key: a.source.as_str(),
                value: Cow::Borrowed(a.target.as_str()),
                category: Category::classify(&a.source),
            });

        let dialogs = self
            .dialogs
            .iter()
            .filter(move |_| filter.admits_kind(EntityKind::Dialog))
            .map(move |d| QueryEntry {
                kind: EntityKind::Dialog,
                key: d.id.as_str(),
                value: self
                    .dialog_text(d)
                    .map(Cow::Borrowed)
                    .unwrap_or(Cow::Borrowed("")),
                category: Category::classify(d.text_key.as_deref().unwrap_or(&d.id)),
            });

        let quests = self
            .quests
            .iter()
            .filter(move |_| filter.admits_kind(EntityKind::Quest))
            .map(|q| QueryEntry {
                kind: EntityKind::Quest,
                key: q.id.as_str(),
                value: Cow::Borrowed(
                    q.name_key
                        .as_deref()
                        .or(q.text.as_deref())
                        .unwrap_or_default(),
                ),
                category: Category::classify(&q.id),
            });

        let npcs = self
            .npcs
            .iter()
            .filter(move |_| filter.admits_kind(EntityKind::Npc))
            .map(|n| QueryEntry {
                kind: EntityKind::Npc,
                key: n.id.as_str(),
                value: if n.drops.is_empty() {
                    Cow::Borrowed(n.iid.as_deref().unwrap_or_default())
                } else {
                    Cow::Owned(n.drops.join(" "))
                },
                category: Category::classify(&n.id),
            });

        let locations = self
            .locations
            .iter()
            .filter(move |_| filter.admits_kind(EntityKind::Location))
            .map(|l| QueryEntry {
                kind: EntityKind::Location,
                key: l.id.as_str(),
                value: Cow::Borrowed(l.iid.as_deref().unwrap_or_default()),
                category: Category::classify(&l.id),
            });

        translations
            .chain(aliases)
            .chain(dialogs)
            .chain(quests)
            .chain(npcs)
            .chain(locations)
            .filter(move |entry| filter.matches(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormatKind, Translation};

    fn sample() -> Document {
        let mut doc = Document::new(FormatKind::Lan);
        doc.push_translation(Translation::new("DQ_001", "Hallo")).unwrap();
        doc.push_translation(Translation::new("Q_1_NAME", "Der Anfang")).unwrap();
        doc.push_translation(Translation::new("WP_SWORD", "Schwert")).unwrap();
        doc
    }

    #[test]
    fn test_query_by_category() {
        let doc = sample();
        let filter = Filter::new().category(Category::Dialogs);
        let hits: Vec<_> = doc.query(&filter).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "DQ_001");
        assert_eq!(hits[0].value, "Hallo");
    }

    #[test]
    fn test_query_case_insensitive_text() {
        let doc = sample();
        let filter = Filter::new().contains("SCHWERT");
        let keys: Vec<_> = doc.query(&filter).map(|e| e.key).collect();
        assert_eq!(keys, vec!["WP_SWORD"]);
    }

    #[test]
    fn test_query_prefix_and_kind() {
        let doc = sample();
        let filter = Filter::new().prefix("Q_").entity(EntityKind::Translation);
        assert_eq!(doc.query(&filter).count(), 1);

        let filter = Filter::new().entity(EntityKind::Quest);
        assert_eq!(doc.query(&filter).count(), 0);
    }
}
