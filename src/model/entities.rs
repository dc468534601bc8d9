use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;

use super::EntityKind;
use crate::utils::CodecError;

/// 统一的字段访问接口
///
/// 编辑器、差异比较和查询都通过字段名操作实体，
/// 字段值统一以字符串表示，`None` 表示未设置。
pub trait Entity {
    const KIND: EntityKind;

    /// 自然键（翻译键、任务 ID、NPC ID 等）
    fn key(&self) -> &str;

    /// 除键以外的全部字段，顺序固定
    fn fields(&self) -> Vec<(String, Option<String>)>;

    /// 按字段名设置值
    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError>;

    /// 按字段名读取值；字段不存在时返回 `None`
    fn field(&self, name: &str) -> Option<Option<String>> {
        self.fields()
            .into_iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

/// 翻译条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Translation {
    /// 显示用的键（已去掉 `translate` 前缀）
    pub key: String,
    pub value: String,
    /// 磁盘上的键是否带 `translate` 前缀
    pub prefixed: bool,
}

impl Translation {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            prefixed: true,
        }
    }
}

impl Entity for Translation {
    const KIND: EntityKind = EntityKind::Translation;

    fn key(&self) -> &str {
        &self.key
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        vec![("value".to_string(), Some(self.value.clone()))]
    }

    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError> {
        match field {
            "key" => self.key = required(field, value)?.to_string(),
            "value" => self.value = value.unwrap_or_default().to_string(),
            _ => return Err(unknown_field(Self::KIND, field)),
        }
        Ok(())
    }
}

/// 别名：把一个键重定向到另一个翻译
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alias {
    pub source: String,
    pub target: String,
    pub source_prefixed: bool,
    pub target_prefixed: bool,
}

impl Alias {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_prefixed: true,
            target_prefixed: true,
        }
    }
}

impl Entity for Alias {
    const KIND: EntityKind = EntityKind::Alias;

    fn key(&self) -> &str {
        &self.source
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        vec![("target".to_string(), Some(self.target.clone()))]
    }

    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError> {
        match field {
            "source" => self.source = required(field, value)?.to_string(),
            "target" => self.target = required(field, value)?.to_string(),
            _ => return Err(unknown_field(Self::KIND, field)),
        }
        Ok(())
    }
}

/// 说话者
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Lector {
    /// 语言文件中的数字编号
    Id(i32),
    /// XML 导出中的名字（如 `Hero`、`Default`）
    Named(String),
}

impl Lector {
    pub fn parse(text: &str) -> Self {
        match text.trim().parse::<i32>() {
            Ok(id) => Lector::Id(id),
            Err(_) => Lector::Named(text.to_string()),
        }
    }

    /// 是否是主角本人
    pub fn is_hero(&self) -> bool {
        match self {
            Lector::Id(id) => *id == 1,
            Lector::Named(name) => name == "Hero" || name == "HERO",
        }
    }
}

impl fmt::Display for Lector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lector::Id(id) => write!(f, "{}", id),
            Lector::Named(name) => f.write_str(name),
        }
    }
}

/// 对话的说话方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Speaker {
    Hero,
    Npc,
}

/// 判定为主角台词的状态子串
pub const HERO_STATE_MARKERS: &[&str] = &["CLOSE", "QC", "QNS", "QS"];

/// 按状态标记判定说话方：包含任一子串即为主角
pub fn classify_state(state: &str) -> Speaker {
    if HERO_STATE_MARKERS.iter().any(|marker| state.contains(marker)) {
        Speaker::Hero
    } else {
        Speaker::Npc
    }
}

bitflags::bitflags! {
    /// 对话标志位，未知位原样保留
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DialogFlags: u32 {
        const _ = !0;
    }
}

impl Serialize for DialogFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.bits())
    }
}

/// 对话树中的一个节点
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct DialogEntry {
    /// 文档内唯一的标识
    pub id: String,
    /// 所属对话树（任务）
    pub tree: Option<String>,
    /// 在树中的位置
    pub index: Option<usize>,
    /// 状态标记，决定说话方
    pub state: Option<String>,
    pub lector: Option<Lector>,
    pub sound_cue: Option<String>,
    /// 后续节点在同一棵树中的下标，空表示结束
    pub next: Vec<i32>,
    pub camera: Vec<i32>,
    pub animation: Option<u32>,
    pub animation_alt: Option<u32>,
    pub flags: DialogFlags,
    pub text_key: Option<String>,
    /// 文本键是否带 `translate` 前缀
    pub text_key_prefixed: bool,
    /// 内联文本（XML 导出直接携带）
    pub text: Option<String>,
    /// 语言文件中 next / camera 数组后的保留字
    #[serde(skip)]
    pub reserved: [u32; 2],
    pub extra: IndexMap<String, Option<String>>,
}

impl DialogEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text_key_prefixed: true,
            ..Default::default()
        }
    }

    /// 说话方：优先看状态标记，没有状态时看说话者
    pub fn speaker(&self) -> Speaker {
        match (&self.state, &self.lector) {
            (Some(state), _) if !state.is_empty() => classify_state(state),
            (_, Some(lector)) if lector.is_hero() => Speaker::Hero,
            _ => Speaker::Npc,
        }
    }
}

impl Entity for DialogEntry {
    const KIND: EntityKind = EntityKind::Dialog;

    fn key(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        let mut fields = vec![
            ("tree".to_string(), self.tree.clone()),
            ("index".to_string(), self.index.map(|i| i.to_string())),
            ("state".to_string(), self.state.clone()),
            ("lector".to_string(), self.lector.as_ref().map(|l| l.to_string())),
            ("sound_cue".to_string(), self.sound_cue.clone()),
            ("next".to_string(), Some(join_numbers(&self.next))),
            ("camera".to_string(), Some(join_numbers(&self.camera))),
            ("animation".to_string(), self.animation.map(|a| a.to_string())),
            ("animation_alt".to_string(), self.animation_alt.map(|a| a.to_string())),
            ("flags".to_string(), Some(format!("0x{:08X}", self.flags.bits()))),
            ("text_key".to_string(), self.text_key.clone()),
            ("text".to_string(), self.text.clone()),
        ];
        push_extra(&mut fields, &self.extra);
        fields
    }

    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError> {
        match field {
            "tree" => self.tree = value.map(str::to_string),
            "index" => self.index = parse_opt(field, value)?,
            "state" => self.state = value.map(str::to_string),
            "lector" => self.lector = value.map(Lector::parse),
            "sound_cue" => self.sound_cue = value.map(str::to_string),
            "next" => self.next = parse_list(field, value)?,
            "camera" => self.camera = parse_list(field, value)?,
            "animation" => self.animation = parse_opt(field, value)?,
            "animation_alt" => self.animation_alt = parse_opt(field, value)?,
            "flags" => self.flags = DialogFlags::from_bits_retain(parse_u32(field, value)?),
            "text_key" => self.text_key = value.map(str::to_string),
            "text" => self.text = value.map(str::to_string),
            _ => return set_extra(&mut self.extra, Self::KIND, field, value),
        }
        Ok(())
    }
}

/// 任务状态
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum QuestState {
    Active,
    Inactive,
    Solved,
    Failed,
    Closed,
    /// 未识别的取值，原样保留
    Other(String),
}

impl QuestState {
    pub fn parse(text: &str) -> Self {
        match text {
            "Active" => QuestState::Active,
            "Inactive" => QuestState::Inactive,
            "Solved" => QuestState::Solved,
            "Failed" => QuestState::Failed,
            "Closed" => QuestState::Closed,
            other => QuestState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for QuestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            QuestState::Active => "Active",
            QuestState::Inactive => "Inactive",
            QuestState::Solved => "Solved",
            QuestState::Failed => "Failed",
            QuestState::Closed => "Closed",
            QuestState::Other(other) => other,
        };
        f.write_str(text)
    }
}

/// 任务逻辑指令的关键字
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DirectiveKind {
    Action,
    Fc,
    Aoq,
    Reward,
    Giver,
}

impl DirectiveKind {
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "ACTION" => Some(DirectiveKind::Action),
            "FC" => Some(DirectiveKind::Fc),
            "AOQ" => Some(DirectiveKind::Aoq),
            "REWARD" => Some(DirectiveKind::Reward),
            "GIVER" => Some(DirectiveKind::Giver),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            DirectiveKind::Action => "ACTION",
            DirectiveKind::Fc => "FC",
            DirectiveKind::Aoq => "AOQ",
            DirectiveKind::Reward => "REWARD",
            DirectiveKind::Giver => "GIVER",
        }
    }
}

/// 任务下的一条逻辑指令（保留原始行文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directive {
    pub kind: DirectiveKind,
    /// 去掉缩进的整行文本
    pub line: String,
}

impl Directive {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let keyword = line.split(' ').next()?;
        let kind = DirectiveKind::from_keyword(keyword)?;
        Some(Self {
            kind,
            line: line.to_string(),
        })
    }

    /// 关键字之后的参数
    pub fn params(&self) -> Vec<&str> {
        self.line.split(' ').skip(1).filter(|p| !p.is_empty()).collect()
    }

    /// GIVER 指令引用的 NPC（第二个参数）
    pub fn giver_npc(&self) -> Option<&str> {
        if self.kind != DirectiveKind::Giver {
            return None;
        }
        self.params().get(1).copied().filter(|npc| *npc != NULL_TOKEN)
    }
}

/// 纯文本格式中表示未设置的记号
pub const NULL_TOKEN: &str = "(null)";

/// 任务
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Quest {
    pub id: String,
    pub iid: Option<String>,
    /// 所属区域分组（XML 导出中的上级文件夹）
    pub region_group: Option<String>,
    pub name_key: Option<String>,
    pub take_key: Option<String>,
    pub solve_key: Option<String>,
    pub close_key: Option<String>,
    pub text: Option<String>,
    pub activation: Option<String>,
    pub guild: Option<String>,
    pub group: Option<String>,
    /// 声望变化（最低声望要求）
    pub reputation: Option<i32>,
    pub state: Option<QuestState>,
    pub notes: Option<String>,
    pub add_to_log: Option<bool>,
    pub can_be_failed: Option<bool>,
    /// 有序的对话 ID
    pub dialogs: Vec<String>,
    /// 有序的 NPC ID
    pub npcs: Vec<String>,
    pub directives: Vec<Directive>,
    pub extra: IndexMap<String, Option<String>>,
}

impl Quest {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl Entity for Quest {
    const KIND: EntityKind = EntityKind::Quest;

    fn key(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        let mut fields = vec![
            ("iid".to_string(), self.iid.clone()),
            ("region_group".to_string(), self.region_group.clone()),
            ("name_key".to_string(), self.name_key.clone()),
            ("take_key".to_string(), self.take_key.clone()),
            ("solve_key".to_string(), self.solve_key.clone()),
            ("close_key".to_string(), self.close_key.clone()),
            ("text".to_string(), self.text.clone()),
            ("activation".to_string(), self.activation.clone()),
            ("guild".to_string(), self.guild.clone()),
            ("group".to_string(), self.group.clone()),
            ("reputation".to_string(), self.reputation.map(|r| r.to_string())),
            ("state".to_string(), self.state.as_ref().map(|s| s.to_string())),
            ("notes".to_string(), self.notes.clone()),
            ("add_to_log".to_string(), self.add_to_log.map(|b| b.to_string())),
            ("can_be_failed".to_string(), self.can_be_failed.map(|b| b.to_string())),
            ("dialogs".to_string(), Some(self.dialogs.join(" "))),
            ("npcs".to_string(), Some(self.npcs.join(" "))),
            (
                "directives".to_string(),
                Some(
                    self.directives
                        .iter()
                        .map(|d| d.line.as_str())
                        .collect::<Vec<_>>()
                        .join(" | "),
                ),
            ),
        ];
        push_extra(&mut fields, &self.extra);
        fields
    }

    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError> {
        match field {
            "iid" => self.iid = value.map(str::to_string),
            "region_group" => self.region_group = value.map(str::to_string),
            "name_key" => self.name_key = value.map(str::to_string),
            "take_key" => self.take_key = value.map(str::to_string),
            "solve_key" => self.solve_key = value.map(str::to_string),
            "close_key" => self.close_key = value.map(str::to_string),
            "text" => self.text = value.map(str::to_string),
            "activation" => self.activation = value.map(str::to_string),
            "guild" => self.guild = value.map(str::to_string),
            "group" => self.group = value.map(str::to_string),
            "reputation" => self.reputation = parse_opt(field, value)?,
            "state" => self.state = value.map(QuestState::parse),
            "notes" => self.notes = value.map(str::to_string),
            "add_to_log" => self.add_to_log = parse_opt_bool(field, value)?,
            "can_be_failed" => self.can_be_failed = parse_opt_bool(field, value)?,
            // 结构性字段由格式本身决定，不能按字段名改写
            "dialogs" | "npcs" | "directives" => return Err(unknown_field(Self::KIND, field)),
            _ => return set_extra(&mut self.extra, Self::KIND, field, value),
        }
        Ok(())
    }
}

/// NPC
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Npc {
    pub id: String,
    pub iid: Option<String>,
    pub marker: Option<String>,
    pub sector: Option<String>,
    pub angle: Option<String>,
    pub quest_ref: Option<String>,
    pub level: Option<String>,
    pub party_ref: Option<String>,
    pub size: Option<String>,
    pub active: Option<String>,
    pub create_string: Option<String>,
    pub exp: Option<String>,
    /// 所在地点
    pub location: Option<String>,
    pub has_drops: bool,
    /// 掉落物品，重复的 ID 表示多个实例
    pub drops: Vec<String>,
    pub extra: IndexMap<String, Option<String>>,
}

impl Npc {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl Entity for Npc {
    const KIND: EntityKind = EntityKind::Npc;

    fn key(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        let mut fields = vec![
            ("iid".to_string(), self.iid.clone()),
            ("marker".to_string(), self.marker.clone()),
            ("sector".to_string(), self.sector.clone()),
            ("angle".to_string(), self.angle.clone()),
            ("quest_ref".to_string(), self.quest_ref.clone()),
            ("level".to_string(), self.level.clone()),
            ("party_ref".to_string(), self.party_ref.clone()),
            ("size".to_string(), self.size.clone()),
            ("active".to_string(), self.active.clone()),
            ("create_string".to_string(), self.create_string.clone()),
            ("exp".to_string(), self.exp.clone()),
            ("location".to_string(), self.location.clone()),
            ("has_drops".to_string(), Some(self.has_drops.to_string())),
            ("drops".to_string(), Some(self.drops.join(" "))),
        ];
        push_extra(&mut fields, &self.extra);
        fields
    }

    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError> {
        match field {
            "iid" => self.iid = value.map(str::to_string),
            "marker" => self.marker = value.map(str::to_string),
            "sector" => self.sector = value.map(str::to_string),
            "angle" => self.angle = value.map(str::to_string),
            "quest_ref" => self.quest_ref = value.map(str::to_string),
            "level" => self.level = value.map(str::to_string),
            "party_ref" => self.party_ref = value.map(str::to_string),
            "size" => self.size = value.map(str::to_string),
            "active" => self.active = value.map(str::to_string),
            "create_string" => self.create_string = value.map(str::to_string),
            "exp" => self.exp = value.map(str::to_string),
            "location" => self.location = value.map(str::to_string),
            "has_drops" => self.has_drops = parse_opt_bool(field, value)?.unwrap_or(false),
            "drops" => {
                self.drops = value
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect()
            }
            _ => return set_extra(&mut self.extra, Self::KIND, field, value),
        }
        Ok(())
    }
}

/// 地点
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Location {
    pub id: String,
    pub iid: Option<String>,
    pub marker: Option<String>,
    pub sector: Option<String>,
    pub x: Option<String>,
    pub y: Option<String>,
    pub extra: IndexMap<String, Option<String>>,
}

impl Location {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

impl Entity for Location {
    const KIND: EntityKind = EntityKind::Location;

    fn key(&self) -> &str {
        &self.id
    }

    fn fields(&self) -> Vec<(String, Option<String>)> {
        let mut fields = vec![
            ("iid".to_string(), self.iid.clone()),
            ("marker".to_string(), self.marker.clone()),
            ("sector".to_string(), self.sector.clone()),
            ("x".to_string(), self.x.clone()),
            ("y".to_string(), self.y.clone()),
        ];
        push_extra(&mut fields, &self.extra);
        fields
    }

    fn set_field(&mut self, field: &str, value: Option<&str>) -> Result<(), CodecError> {
        match field {
            "iid" => self.iid = value.map(str::to_string),
            "marker" => self.marker = value.map(str::to_string),
            "sector" => self.sector = value.map(str::to_string),
            "x" => self.x = value.map(str::to_string),
            "y" => self.y = value.map(str::to_string),
            _ => return set_extra(&mut self.extra, Self::KIND, field, value),
        }
        Ok(())
    }
}

// ---- 字段解析辅助函数 ----

fn unknown_field(entity: EntityKind, field: &str) -> CodecError {
    CodecError::UnknownField {
        entity,
        field: field.to_string(),
    }
}

fn invalid(field: &str, value: &str) -> CodecError {
    CodecError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

fn required<'v>(field: &str, value: Option<&'v str>) -> Result<&'v str, CodecError> {
    value.ok_or_else(|| invalid(field, NULL_TOKEN))
}

fn parse_opt<T: std::str::FromStr>(field: &str, value: Option<&str>) -> Result<Option<T>, CodecError> {
    value
        .map(|v| v.trim().parse::<T>().map_err(|_| invalid(field, v)))
        .transpose()
}

fn parse_u32(field: &str, value: Option<&str>) -> Result<u32, CodecError> {
    let text = value.unwrap_or("0").trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    };
    parsed.map_err(|_| invalid(field, text))
}

fn parse_list(field: &str, value: Option<&str>) -> Result<Vec<i32>, CodecError> {
    value
        .unwrap_or_default()
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<i32>().map_err(|_| invalid(field, p)))
        .collect()
}

/// 解析布尔值，接受 `True`/`true`/`1` 等写法
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "True" | "true" | "TRUE" | "1" => Some(true),
        "False" | "false" | "FALSE" | "0" => Some(false),
        _ => None,
    }
}

fn parse_opt_bool(field: &str, value: Option<&str>) -> Result<Option<bool>, CodecError> {
    value
        .map(|v| parse_bool(v).ok_or_else(|| invalid(field, v)))
        .transpose()
}

fn join_numbers(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn push_extra(fields: &mut Vec<(String, Option<String>)>, extra: &IndexMap<String, Option<String>>) {
    fields.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
}

fn set_extra(
    extra: &mut IndexMap<String, Option<String>>,
    entity: EntityKind,
    field: &str,
    value: Option<&str>,
) -> Result<(), CodecError> {
    match extra.get_mut(field) {
        Some(slot) => {
            *slot = value.map(str::to_string);
            Ok(())
        }
        None => Err(unknown_field(entity, field)),
    }
}
