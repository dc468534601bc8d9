//! 统一文档模型
//!
//! 四种格式都解析成同一个 [`Document`]。每条记录包在 [`Tracked`] 里，
//! 同时保存解码后的字段和原始字节片段；只有通过 [`Tracked::edit`]
//! 修改过的记录才会在保存时重新编码。

pub mod category;
pub mod entities;
pub mod graph;
pub mod query;
pub mod stats;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::path::Path;

pub use category::Category;
pub use entities::{
    Alias, DialogEntry, DialogFlags, Directive, DirectiveKind, Entity, Lector, Location, Npc,
    Quest, QuestState, Speaker, Translation,
};
pub use query::{Filter, QueryEntry};
pub use stats::Statistics;

use crate::utils::{CodecError, Warning};

/// 文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatKind {
    /// 二进制语言文件
    Lan,
    /// SOAP XML 任务导出
    Idx,
    /// 纯文本任务逻辑
    Qtx,
    /// .NET 二进制序列化（只读）
    Shf,
}

impl FormatKind {
    pub const ALL: [FormatKind; 4] = [
        FormatKind::Lan,
        FormatKind::Idx,
        FormatKind::Qtx,
        FormatKind::Shf,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            FormatKind::Lan => "lan",
            FormatKind::Idx => "idx",
            FormatKind::Qtx => "qtx",
            FormatKind::Shf => "shf",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.');
        FormatKind::ALL
            .into_iter()
            .find(|kind| kind.extension().eq_ignore_ascii_case(ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(FormatKind::from_extension)
    }

    /// 该格式的能力（对应格式能力表的一行）
    pub fn capabilities(self) -> Capabilities {
        use Support::*;
        match self {
            FormatKind::Lan => Capabilities {
                translations: Full,
                aliases: Full,
                quests: ViaTranslations,
                dialogs: Full,
                npcs: No,
                drops: false,
                locations: No,
                writable: true,
            },
            FormatKind::Idx => Capabilities {
                translations: No,
                aliases: No,
                quests: Full,
                dialogs: Full,
                npcs: Full,
                drops: true,
                locations: Full,
                writable: true,
            },
            FormatKind::Qtx => Capabilities {
                translations: No,
                aliases: No,
                quests: Full,
                dialogs: No,
                npcs: Full,
                drops: true,
                locations: Full,
                writable: true,
            },
            FormatKind::Shf => Capabilities {
                translations: No,
                aliases: No,
                quests: Extracted,
                dialogs: Extracted,
                npcs: Extracted,
                drops: false,
                locations: Extracted,
                writable: false,
            },
        }
    }

    pub fn is_writable(self) -> bool {
        self.capabilities().writable
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".{}", self.extension())
    }
}

/// 某类数据在某个格式中的支持程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Support {
    No,
    /// 只能通过翻译键间接表示
    ViaTranslations,
    Full,
    /// 从只读格式中提取
    Extracted,
}

impl Support {
    /// 文档能否直接持有该类记录
    pub fn holds(self) -> bool {
        matches!(self, Support::Full | Support::Extracted)
    }
}

/// 格式能力表的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub translations: Support,
    pub aliases: Support,
    pub quests: Support,
    pub dialogs: Support,
    pub npcs: Support,
    pub drops: bool,
    pub locations: Support,
    pub writable: bool,
}

impl Capabilities {
    pub fn support(&self, entity: EntityKind) -> Support {
        match entity {
            EntityKind::Translation => self.translations,
            EntityKind::Alias => self.aliases,
            EntityKind::Dialog => self.dialogs,
            EntityKind::Quest => self.quests,
            EntityKind::Npc => self.npcs,
            EntityKind::Location => self.locations,
        }
    }

    pub fn holds(&self, entity: EntityKind) -> bool {
        self.support(entity).holds()
    }
}

/// 实体类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Translation,
    Alias,
    Dialog,
    Quest,
    Npc,
    Location,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Translation,
        EntityKind::Alias,
        EntityKind::Dialog,
        EntityKind::Quest,
        EntityKind::Npc,
        EntityKind::Location,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Translation => "translation",
            EntityKind::Alias => "alias",
            EntityKind::Dialog => "dialog",
            EntityKind::Quest => "quest",
            EntityKind::Npc => "npc",
            EntityKind::Location => "location",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        EntityKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 带原始片段和修改标记的记录
///
/// 读取通过 `Deref`，修改必须经过 [`Tracked::edit`]。
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    inner: T,
    raw: Option<Vec<u8>>,
    origin: Option<usize>,
    modified: bool,
}

impl<T> Tracked<T> {
    /// 新建的记录，没有原始片段，保存时总是重新编码
    pub fn new(value: T) -> Self {
        Self {
            inner: value,
            raw: None,
            origin: None,
            modified: true,
        }
    }

    /// 解析得到的记录
    ///
    /// `origin` 是该记录在格式布局中的槽位编号。
    pub(crate) fn parsed(value: T, raw: Vec<u8>, origin: usize) -> Self {
        Self {
            inner: value,
            raw: Some(raw),
            origin: Some(origin),
            modified: false,
        }
    }

    /// 取可变引用并标记为已修改
    pub fn edit(&mut self) -> &mut T {
        self.modified = true;
        &mut self.inner
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// 原始字节片段（修改后仍保留，用于对比）
    pub fn raw(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// 可以原样写回的片段：未修改时才有
    pub(crate) fn reusable_raw(&self) -> Option<&[u8]> {
        if self.modified {
            None
        } else {
            self.raw.as_deref()
        }
    }

    pub(crate) fn origin(&self) -> Option<usize> {
        self.origin
    }

    pub fn get(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: Serialize> Serialize for Tracked<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.serialize(serializer)
    }
}

/// 各格式保存时需要的原始结构信息
#[derive(Debug, Clone)]
pub(crate) enum Layout {
    Lan(crate::lan::LanLayout),
    Qtx(crate::qtx::QtxLayout),
    Idx(crate::idx::IdxLayout),
    Shf(crate::shf::ShfLayout),
}

impl Layout {
    fn for_kind(kind: FormatKind) -> Self {
        match kind {
            FormatKind::Lan => Layout::Lan(Default::default()),
            FormatKind::Qtx => Layout::Qtx(Default::default()),
            FormatKind::Idx => Layout::Idx(Default::default()),
            FormatKind::Shf => Layout::Shf(Default::default()),
        }
    }
}

/// 已加载的文档
///
/// 文档独占全部记录；对话链接和别名目标只按 ID 查找，断开的链接不会导致崩溃。
#[derive(Debug, Clone)]
pub struct Document {
    kind: FormatKind,
    pub(crate) translations: Vec<Tracked<Translation>>,
    pub(crate) aliases: Vec<Tracked<Alias>>,
    pub(crate) dialogs: Vec<Tracked<DialogEntry>>,
    pub(crate) quests: Vec<Tracked<Quest>>,
    pub(crate) npcs: Vec<Tracked<Npc>>,
    pub(crate) locations: Vec<Tracked<Location>>,
    pub(crate) warnings: Vec<Warning>,
    pub(crate) layout: Layout,
}

macro_rules! collection_access {
    ($field:ident, $field_mut:ident, $one:ident, $one_mut:ident, $push:ident, $ty:ty) => {
        pub fn $field(&self) -> &[Tracked<$ty>] {
            &self.$field
        }

        /// 可变访问；字段修改请通过 [`Tracked::edit`]
        pub fn $field_mut(&mut self) -> &mut [Tracked<$ty>] {
            &mut self.$field
        }

        pub fn $one(&self, key: &str) -> Option<&Tracked<$ty>> {
            self.$field.iter().find(|item| item.key() == key)
        }

        pub fn $one_mut(&mut self, key: &str) -> Option<&mut Tracked<$ty>> {
            self.$field.iter_mut().find(|item| item.key() == key)
        }

        /// 添加新记录；格式不支持该类记录时返回错误
        pub fn $push(&mut self, item: $ty) -> Result<(), CodecError> {
            self.check_holds(<$ty as Entity>::KIND)?;
            self.$field.push(Tracked::new(item));
            Ok(())
        }
    };
}

impl Document {
    /// 创建空文档
    pub fn new(kind: FormatKind) -> Self {
        Self {
            kind,
            translations: Vec::new(),
            aliases: Vec::new(),
            dialogs: Vec::new(),
            quests: Vec::new(),
            npcs: Vec::new(),
            locations: Vec::new(),
            warnings: Vec::new(),
            layout: Layout::for_kind(kind),
        }
    }

    pub fn kind(&self) -> FormatKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.kind.capabilities()
    }

    collection_access!(translations, translations_mut, translation, translation_mut, push_translation, Translation);
    collection_access!(aliases, aliases_mut, alias, alias_mut, push_alias, Alias);
    collection_access!(dialogs, dialogs_mut, dialog, dialog_mut, push_dialog, DialogEntry);
    collection_access!(quests, quests_mut, quest, quest_mut, push_quest, Quest);
    collection_access!(locations, locations_mut, location, location_mut, push_location, Location);

    pub fn npcs(&self) -> &[Tracked<Npc>] {
        &self.npcs
    }

    pub fn npcs_mut(&mut self) -> &mut [Tracked<Npc>] {
        &mut self.npcs
    }

    pub fn npc(&self, id: &str) -> Option<&Tracked<Npc>> {
        self.npcs.iter().find(|npc| npc.id == id)
    }

    pub fn npc_mut(&mut self, id: &str) -> Option<&mut Tracked<Npc>> {
        self.npcs.iter_mut().find(|npc| npc.id == id)
    }

    /// 添加 NPC；不支持掉落物品的格式拒绝带掉落的 NPC
    pub fn push_npc(&mut self, npc: Npc) -> Result<(), CodecError> {
        self.check_holds(EntityKind::Npc)?;
        if !self.capabilities().drops && (npc.has_drops || !npc.drops.is_empty()) {
            return Err(CodecError::UnsupportedDrops(self.kind));
        }
        self.npcs.push(Tracked::new(npc));
        Ok(())
    }

    /// 删除翻译条目
    pub fn remove_translation(&mut self, key: &str) -> Option<Translation> {
        let index = self.translations.iter().position(|t| t.key == key)?;
        Some(self.translations.remove(index).into_inner())
    }

    /// 删除别名
    pub fn remove_alias(&mut self, source: &str) -> Option<Alias> {
        let index = self.aliases.iter().position(|a| a.source == source)?;
        Some(self.aliases.remove(index).into_inner())
    }

    /// 加载时收集的诊断信息
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub(crate) fn warn(&mut self, warning: Warning) {
        log::warn!("{}", warning);
        self.warnings.push(warning);
    }

    /// 是否有记录被修改或新增
    pub fn is_modified(&self) -> bool {
        self.translations.iter().any(|t| t.is_modified())
            || self.aliases.iter().any(|a| a.is_modified())
            || self.dialogs.iter().any(|d| d.is_modified())
            || self.quests.iter().any(|q| q.is_modified())
            || self.npcs.iter().any(|n| n.is_modified())
            || self.locations.iter().any(|l| l.is_modified())
    }

    /// 二进制序列化文件中提取的字符串池
    pub fn string_pool(&self) -> Option<&crate::shf::StringPool> {
        match &self.layout {
            Layout::Shf(layout) => Some(&layout.pool),
            _ => None,
        }
    }

    /// 二进制序列化文件的流头
    pub fn stream_header(&self) -> Option<&crate::shf::StreamHeader> {
        match &self.layout {
            Layout::Shf(layout) => Some(&layout.header),
            _ => None,
        }
    }

    /// 语言文件的版本号
    pub fn lan_version(&self) -> Option<u32> {
        match &self.layout {
            Layout::Lan(layout) => Some(layout.version),
            _ => None,
        }
    }

    fn check_holds(&self, entity: EntityKind) -> Result<(), CodecError> {
        if self.capabilities().holds(entity) {
            Ok(())
        } else {
            Err(CodecError::Unsupported {
                format: self.kind,
                entity,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_lookup() {
        assert_eq!(FormatKind::from_extension("LAN"), Some(FormatKind::Lan));
        assert_eq!(FormatKind::from_extension(".qtx"), Some(FormatKind::Qtx));
        assert_eq!(FormatKind::from_path(Path::new("a/b/quests.idx")), Some(FormatKind::Idx));
        assert_eq!(FormatKind::from_extension("esp"), None);
    }

    #[test]
    fn test_capability_matrix_is_enforced() {
        let mut lan = Document::new(FormatKind::Lan);
        match lan.push_npc(Npc::new("NPC_1")) {
            Err(CodecError::Unsupported { format, entity }) => {
                assert_eq!(format, FormatKind::Lan);
                assert_eq!(entity, EntityKind::Npc);
            }
            other => panic!("语言文件不应接受 NPC: {:?}", other),
        }
        assert!(lan.push_quest(Quest::new("Q_1")).is_err());
        assert!(lan.push_dialog(DialogEntry::new("DQ_1#0")).is_ok());

        let mut qtx = Document::new(FormatKind::Qtx);
        assert!(qtx.push_dialog(DialogEntry::new("x")).is_err());
        let mut npc = Npc::new("NPC_1");
        npc.drops.push("QITEM_1".to_string());
        assert!(qtx.push_npc(npc.clone()).is_ok());

        let mut shf = Document::new(FormatKind::Shf);
        assert!(matches!(shf.push_npc(npc), Err(CodecError::UnsupportedDrops(_))));
        assert!(!FormatKind::Shf.is_writable());
    }

    #[test]
    fn test_tracked_edit_marks_modified() {
        let mut tracked = Tracked::parsed(Translation::new("A", "a"), vec![1, 2, 3], 0);
        assert!(!tracked.is_modified());
        assert_eq!(tracked.reusable_raw(), Some(&[1u8, 2, 3][..]));

        tracked.edit().value = "b".to_string();
        assert!(tracked.is_modified());
        assert_eq!(tracked.reusable_raw(), None);
        assert_eq!(tracked.raw(), Some(&[1u8, 2, 3][..]));
        assert_eq!(tracked.value, "b");
    }
}
