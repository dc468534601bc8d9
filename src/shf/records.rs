//! MS-NRBF 记录类型和解码后的对象

use std::fmt;

/// 记录类型标记（记录的第一个字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordType {
    SerializedStreamHeader,
    ClassWithId,
    SystemClassWithMembers,
    ClassWithMembers,
    SystemClassWithMembersAndTypes,
    ClassWithMembersAndTypes,
    BinaryObjectString,
    BinaryArray,
    MemberPrimitiveTyped,
    MemberReference,
    ObjectNull,
    MessageEnd,
    BinaryLibrary,
    ObjectNullMultiple256,
    ObjectNullMultiple,
    ArraySinglePrimitive,
    ArraySingleObject,
    ArraySingleString,
}

impl RecordType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        use RecordType::*;
        Some(match tag {
            0 => SerializedStreamHeader,
            1 => ClassWithId,
            2 => SystemClassWithMembers,
            3 => ClassWithMembers,
            4 => SystemClassWithMembersAndTypes,
            5 => ClassWithMembersAndTypes,
            6 => BinaryObjectString,
            7 => BinaryArray,
            8 => MemberPrimitiveTyped,
            9 => MemberReference,
            10 => ObjectNull,
            11 => MessageEnd,
            12 => BinaryLibrary,
            13 => ObjectNullMultiple256,
            14 => ObjectNullMultiple,
            15 => ArraySinglePrimitive,
            16 => ArraySingleObject,
            17 => ArraySingleString,
            _ => return None,
        })
    }

    /// 自带成员类型信息的类记录
    pub fn has_member_types(self) -> bool {
        matches!(
            self,
            RecordType::SystemClassWithMembersAndTypes | RecordType::ClassWithMembersAndTypes
        )
    }

    /// 类信息之后带库 ID 的类记录
    pub fn has_library(self) -> bool {
        matches!(
            self,
            RecordType::ClassWithMembers | RecordType::ClassWithMembersAndTypes
        )
    }
}

/// 基本类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveType {
    Boolean,
    Byte,
    Char,
    Decimal,
    Double,
    Int16,
    Int32,
    Int64,
    SByte,
    Single,
    TimeSpan,
    DateTime,
    UInt16,
    UInt32,
    UInt64,
    Null,
    String,
}

impl PrimitiveType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        use PrimitiveType::*;
        Some(match tag {
            1 => Boolean,
            2 => Byte,
            3 => Char,
            5 => Decimal,
            6 => Double,
            7 => Int16,
            8 => Int32,
            9 => Int64,
            10 => SByte,
            11 => Single,
            12 => TimeSpan,
            13 => DateTime,
            14 => UInt16,
            15 => UInt32,
            16 => UInt64,
            17 => Null,
            18 => String,
            _ => return None,
        })
    }
}

/// 成员的二进制类型及附加信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BinaryType {
    Primitive(PrimitiveType),
    String,
    Object,
    SystemClass(String),
    Class { name: String, library: i32 },
    ObjectArray,
    StringArray,
    PrimitiveArray(PrimitiveType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MemberInfo {
    pub name: String,
    /// 不带类型信息的类记录中为 `None`，成员值总是完整记录
    pub kind: Option<BinaryType>,
}

/// 类型描述符：类名和成员布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Descriptor {
    pub name: String,
    pub library: Option<i32>,
    pub members: Vec<MemberInfo>,
}

/// 成员值；对其它对象只保存 ID，不展开
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    Text(String),
    Ref(i32),
}

impl Value {
    /// 标量值的文本形式；引用和空值为 `None`
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Ref(_) => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::UInt(u) => Some(u.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Char(c) => Some(c.to_string()),
            Value::Text(text) => Some(text.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ObjectBody {
    Class {
        /// 描述符的元数据 ID
        descriptor: i32,
        members: Vec<(String, Value)>,
    },
    Array(Vec<Value>),
    String(String),
}

/// 对象表中的一项
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GraphObject {
    pub id: i32,
    /// 记录在文件中的范围
    pub offset: usize,
    pub end: usize,
    pub body: ObjectBody,
}

impl GraphObject {
    pub fn member(&self, name: &str) -> Option<&Value> {
        match &self.body {
            ObjectBody::Class { members, .. } => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }
}

/// 流头
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct StreamHeader {
    pub root_id: i32,
    pub header_id: i32,
    pub major_version: i32,
    pub minor_version: i32,
}

impl fmt::Display for StreamHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NRBF v{}.{} root={}",
            self.major_version, self.minor_version, self.root_id
        )
    }
}

/// 编译器生成的自动属性字段名 `<iid>k__BackingField` 还原为 `iid`
pub(crate) fn member_name(raw: &str) -> &str {
    raw.strip_prefix('<')
        .and_then(|rest| rest.strip_suffix(">k__BackingField"))
        .unwrap_or(raw)
}
