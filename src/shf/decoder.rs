//! MS-NRBF 记录流的单遍解码
//!
//! 记录按出现顺序读入对象表；对其它对象的引用只保存 ID，
//! 需要时再查表，所以环形对象图也能在一遍内读完。

use indexmap::IndexMap;
use log::{debug, warn};
use std::collections::HashMap;

use super::pool::StringPool;
use super::records::{
    member_name, BinaryType, Descriptor, GraphObject, MemberInfo, ObjectBody, PrimitiveType,
    RecordType, StreamHeader, Value,
};
use crate::datatypes::ByteCursor;
use crate::model::FormatKind;
use crate::utils::{CodecError, SourceLocation, Warning};

/// 内联嵌套记录的最大深度
const MAX_DEPTH: usize = 64;

/// 单个数组的最大元素数
const MAX_ARRAY_LEN: usize = 1 << 24;

/// 解码结果
#[derive(Debug, Default)]
pub(crate) struct Graph {
    pub header: StreamHeader,
    /// 元数据 ID -> 类型描述符
    pub descriptors: HashMap<i32, Descriptor>,
    /// 对象 ID -> 对象，按出现顺序
    pub objects: IndexMap<i32, GraphObject>,
    pub pool: StringPool,
    pub warnings: Vec<Warning>,
}

impl Graph {
    pub fn descriptor_of(&self, object: &GraphObject) -> Option<&Descriptor> {
        match &object.body {
            ObjectBody::Class { descriptor, .. } => self.descriptors.get(descriptor),
            _ => None,
        }
    }

    /// 引用指向字符串对象时返回其文本
    pub fn string(&self, id: i32) -> Option<&str> {
        match &self.objects.get(&id)?.body {
            ObjectBody::String(text) => Some(text),
            _ => None,
        }
    }
}

/// 解码整个流
///
/// 流头无效时失败；单条记录的问题记为警告，跳过后继续。
pub(crate) fn decode(data: &[u8]) -> Result<Graph, CodecError> {
    let mut decoder = Decoder::new(data);
    decoder.read_header()?;
    decoder.run();
    debug!(
        "SHF: {} 个类型, {} 个对象, {} 个字符串",
        decoder.graph.descriptors.len(),
        decoder.graph.objects.len(),
        decoder.graph.pool.len()
    );
    Ok(decoder.graph)
}

/// 读取一条记录失败的原因
enum Fault {
    UnknownDescriptor { id: i32, offset: usize },
    Codec(CodecError),
}

impl From<CodecError> for Fault {
    fn from(err: CodecError) -> Self {
        Fault::Codec(err)
    }
}

/// 一条记录读到的内容
enum Record {
    Value(Value),
    /// 连续 n 个空值
    Nulls(usize),
    Library,
    End,
}

struct Decoder<'a> {
    cursor: ByteCursor<'a>,
    graph: Graph,
    depth: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: ByteCursor::new(data),
            graph: Graph::default(),
            depth: 0,
        }
    }

    fn read_header(&mut self) -> Result<(), CodecError> {
        if self.cursor.data().first() != Some(&0) {
            return Err(CodecError::InvalidSignature {
                format: FormatKind::Shf,
            });
        }
        self.cursor.read_u8()?;
        self.graph.header = StreamHeader {
            root_id: self.cursor.read_i32()?,
            header_id: self.cursor.read_i32()?,
            major_version: self.cursor.read_i32()?,
            minor_version: self.cursor.read_i32()?,
        };
        debug!("SHF: {}", self.graph.header);
        Ok(())
    }

    fn run(&mut self) {
        loop {
            if self.cursor.is_at_end() {
                debug!("SHF: 流在 MessageEnd 之前结束");
                return;
            }
            let start = self.cursor.position();
            self.depth = 0;
            match self.read_record() {
                Ok(Record::End) => return,
                Ok(_) => {}
                Err(fault) => {
                    let warning = match fault {
                        Fault::UnknownDescriptor { id, offset } => {
                            Warning::UnknownTypeDescriptor { id, offset }
                        }
                        Fault::Codec(err) => Warning::MalformedRecord {
                            location: SourceLocation::Offset(start),
                            reason: err.to_string(),
                        },
                    };
                    self.graph.warnings.push(warning);

                    match self.resync(start + 1) {
                        Some(next) => {
                            warn!("SHF: 从 0x{:X} 跳到 0x{:X} 继续解码", start, next);
                            // resync 只返回缓冲区内的位置
                            if self.cursor.seek(next).is_err() {
                                return;
                            }
                        }
                        None => {
                            warn!("SHF: 0x{:X} 之后找不到可解码的记录", start);
                            return;
                        }
                    }
                }
            }
        }
    }

    /// 从 `from` 开始找下一个看起来完整的记录
    fn resync(&self, from: usize) -> Option<usize> {
        let data = self.cursor.data();
        (from..data.len()).find(|&pos| self.plausible_at(pos))
    }

    fn plausible_at(&self, pos: usize) -> bool {
        let data = self.cursor.data();
        let mut probe = ByteCursor::new(data);
        if probe.seek(pos).is_err() {
            return false;
        }
        let Ok(tag) = probe.read_u8() else {
            return false;
        };
        let Some(record) = RecordType::from_u8(tag) else {
            return false;
        };
        let nonzero_id = |probe: &mut ByteCursor<'_>| matches!(probe.read_i32(), Ok(id) if id != 0);

        match record {
            RecordType::ClassWithId => {
                nonzero_id(&mut probe)
                    && matches!(probe.read_i32(), Ok(meta) if self.graph.descriptors.contains_key(&meta))
            }
            RecordType::SystemClassWithMembers
            | RecordType::ClassWithMembers
            | RecordType::SystemClassWithMembersAndTypes
            | RecordType::ClassWithMembersAndTypes
            | RecordType::BinaryLibrary => {
                nonzero_id(&mut probe) && matches!(probe_string(&mut probe), Some(name) if is_type_name(&name))
            }
            RecordType::BinaryObjectString => nonzero_id(&mut probe) && probe_string(&mut probe).is_some(),
            RecordType::MessageEnd => pos + 1 == data.len(),
            RecordType::ArraySinglePrimitive => {
                nonzero_id(&mut probe)
                    && matches!(probe.read_i32(), Ok(len) if len >= 0)
                    && matches!(probe.read_u8(), Ok(p) if PrimitiveType::from_u8(p).is_some())
            }
            RecordType::ArraySingleObject | RecordType::ArraySingleString => {
                nonzero_id(&mut probe)
                    && matches!(probe.read_i32(), Ok(len) if len >= 0 && len as usize <= probe.remaining())
            }
            RecordType::BinaryArray => {
                nonzero_id(&mut probe)
                    && matches!(probe.read_u8(), Ok(kind) if kind <= 5)
                    && matches!(probe.read_i32(), Ok(rank) if (1..=32).contains(&rank))
            }
            _ => false,
        }
    }

    fn enter(&mut self) -> Result<(), Fault> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.malformed("records nested too deeply"));
        }
        Ok(())
    }

    fn malformed(&self, reason: &str) -> Fault {
        Fault::Codec(CodecError::MalformedRecord {
            location: SourceLocation::Offset(self.cursor.position()),
            reason: reason.to_string(),
        })
    }

    fn read_record(&mut self) -> Result<Record, Fault> {
        self.enter()?;
        let result = self.read_record_inner();
        self.depth -= 1;
        result
    }

    fn read_record_inner(&mut self) -> Result<Record, Fault> {
        let start = self.cursor.position();
        let tag = self.cursor.read_u8()?;
        let record = RecordType::from_u8(tag).ok_or_else(|| {
            Fault::Codec(CodecError::MalformedRecord {
                location: SourceLocation::Offset(start),
                reason: format!("unknown record type {}", tag),
            })
        })?;

        match record {
            RecordType::SerializedStreamHeader => Err(self.malformed("second stream header")),
            RecordType::ClassWithId => {
                let object_id = self.cursor.read_i32()?;
                let metadata_id = self.cursor.read_i32()?;
                let members = match self.graph.descriptors.get(&metadata_id) {
                    Some(descriptor) => descriptor.members.clone(),
                    None => {
                        return Err(Fault::UnknownDescriptor {
                            id: metadata_id,
                            offset: start,
                        })
                    }
                };
                self.read_class(start, object_id, metadata_id, &members)
            }
            RecordType::SystemClassWithMembers
            | RecordType::ClassWithMembers
            | RecordType::SystemClassWithMembersAndTypes
            | RecordType::ClassWithMembersAndTypes => {
                let object_id = self.cursor.read_i32()?;
                let name = self.read_string()?;
                let count = self.read_count()?;
                let mut names = Vec::with_capacity(count.min(self.cursor.remaining()));
                for _ in 0..count {
                    names.push(self.read_string()?);
                }
                let kinds = if record.has_member_types() {
                    self.read_member_types(count)?
                } else {
                    vec![None; count]
                };
                let library = if record.has_library() {
                    Some(self.cursor.read_i32()?)
                } else {
                    None
                };
                let members: Vec<MemberInfo> = names
                    .into_iter()
                    .zip(kinds)
                    .map(|(name, kind)| MemberInfo { name, kind })
                    .collect();
                // 先登记描述符，成员中的 ClassWithId 可以引用它
                self.graph.descriptors.insert(
                    object_id,
                    Descriptor {
                        name,
                        library,
                        members: members.clone(),
                    },
                );
                self.read_class(start, object_id, object_id, &members)
            }
            RecordType::BinaryObjectString => {
                let object_id = self.cursor.read_i32()?;
                let text = self.read_string()?;
                self.graph.pool.push(object_id, start, text.clone());
                self.store(object_id, start, ObjectBody::String(text));
                Ok(Record::Value(Value::Ref(object_id)))
            }
            RecordType::BinaryArray => self.read_binary_array(start),
            RecordType::MemberPrimitiveTyped => {
                let primitive = self.read_primitive_type()?;
                Ok(Record::Value(self.read_primitive(primitive)?))
            }
            RecordType::MemberReference => Ok(Record::Value(Value::Ref(self.cursor.read_i32()?))),
            RecordType::ObjectNull => Ok(Record::Value(Value::Null)),
            RecordType::MessageEnd => Ok(Record::End),
            RecordType::BinaryLibrary => {
                self.cursor.read_i32()?;
                self.read_string()?;
                Ok(Record::Library)
            }
            RecordType::ObjectNullMultiple256 => Ok(Record::Nulls(self.cursor.read_u8()? as usize)),
            RecordType::ObjectNullMultiple => Ok(Record::Nulls(self.read_count()?)),
            RecordType::ArraySinglePrimitive => {
                let object_id = self.cursor.read_i32()?;
                let len = self.read_count()?;
                let primitive = self.read_primitive_type()?;
                let items = self.read_primitives(primitive, len)?;
                self.store(object_id, start, ObjectBody::Array(items));
                Ok(Record::Value(Value::Ref(object_id)))
            }
            RecordType::ArraySingleObject | RecordType::ArraySingleString => {
                let object_id = self.cursor.read_i32()?;
                let len = self.read_count()?;
                let items = self.read_elements(len)?;
                self.store(object_id, start, ObjectBody::Array(items));
                Ok(Record::Value(Value::Ref(object_id)))
            }
        }
    }

    fn read_class(
        &mut self,
        start: usize,
        object_id: i32,
        descriptor: i32,
        members: &[MemberInfo],
    ) -> Result<Record, Fault> {
        let mut values = Vec::with_capacity(members.len());
        for member in members {
            let value = match &member.kind {
                Some(BinaryType::Primitive(primitive)) => self.read_primitive(*primitive)?,
                _ => self.read_value()?,
            };
            values.push((member_name(&member.name).to_string(), value));
        }
        self.store(
            object_id,
            start,
            ObjectBody::Class {
                descriptor,
                members: values,
            },
        );
        Ok(Record::Value(Value::Ref(object_id)))
    }

    fn read_binary_array(&mut self, start: usize) -> Result<Record, Fault> {
        let object_id = self.cursor.read_i32()?;
        let shape = self.cursor.read_u8()?;
        let rank = self.read_count()?;
        let mut len: usize = 1;
        for _ in 0..rank {
            let dim = self.read_count()?;
            len = len
                .checked_mul(dim)
                .filter(|&n| n <= MAX_ARRAY_LEN)
                .ok_or_else(|| self.malformed("array too large"))?;
        }
        // 带下界的数组形状
        if matches!(shape, 3..=5) {
            for _ in 0..rank {
                self.cursor.read_i32()?;
            }
        }
        let kind = self.read_binary_type()?;
        let items = match kind {
            BinaryType::Primitive(primitive) => self.read_primitives(primitive, len)?,
            _ => self.read_elements(len)?,
        };
        self.store(object_id, start, ObjectBody::Array(items));
        Ok(Record::Value(Value::Ref(object_id)))
    }

    /// 成员值：跳过库记录，遇到结束记录视为错误
    fn read_value(&mut self) -> Result<Value, Fault> {
        loop {
            match self.read_record()? {
                Record::Value(value) => return Ok(value),
                Record::Nulls(_) => return Ok(Value::Null),
                Record::Library => continue,
                Record::End => return Err(self.malformed("unexpected MessageEnd inside object")),
            }
        }
    }

    fn read_elements(&mut self, len: usize) -> Result<Vec<Value>, Fault> {
        if len > MAX_ARRAY_LEN {
            return Err(self.malformed("array too large"));
        }
        let mut items = Vec::with_capacity(len.min(self.cursor.remaining()));
        while items.len() < len {
            match self.read_record()? {
                Record::Value(value) => items.push(value),
                Record::Nulls(count) => {
                    let count = count.min(len - items.len());
                    items.extend(std::iter::repeat(Value::Null).take(count));
                }
                Record::Library => {}
                Record::End => return Err(self.malformed("unexpected MessageEnd inside array")),
            }
        }
        Ok(items)
    }

    fn read_member_types(&mut self, count: usize) -> Result<Vec<Option<BinaryType>>, Fault> {
        let tags = self.cursor.read_bytes(count)?;
        let mut kinds = Vec::with_capacity(count);
        for &tag in tags {
            kinds.push(Some(self.read_type_info(tag)?));
        }
        Ok(kinds)
    }

    fn read_binary_type(&mut self) -> Result<BinaryType, Fault> {
        let tag = self.cursor.read_u8()?;
        self.read_type_info(tag)
    }

    /// 二进制类型标记之后的附加信息
    fn read_type_info(&mut self, tag: u8) -> Result<BinaryType, Fault> {
        Ok(match tag {
            0 => BinaryType::Primitive(self.read_primitive_type()?),
            1 => BinaryType::String,
            2 => BinaryType::Object,
            3 => BinaryType::SystemClass(self.read_string()?),
            4 => {
                let name = self.read_string()?;
                let library = self.cursor.read_i32()?;
                BinaryType::Class { name, library }
            }
            5 => BinaryType::ObjectArray,
            6 => BinaryType::StringArray,
            7 => BinaryType::PrimitiveArray(self.read_primitive_type()?),
            other => return Err(self.malformed(&format!("unknown binary type {}", other))),
        })
    }

    fn read_primitive_type(&mut self) -> Result<PrimitiveType, Fault> {
        let tag = self.cursor.read_u8()?;
        PrimitiveType::from_u8(tag)
            .ok_or_else(|| self.malformed(&format!("unknown primitive type {}", tag)))
    }

    fn read_primitives(&mut self, primitive: PrimitiveType, len: usize) -> Result<Vec<Value>, Fault> {
        // 每个基本类型值至少一个字节（Null 除外）
        if len > MAX_ARRAY_LEN || (primitive != PrimitiveType::Null && len > self.cursor.remaining()) {
            return Err(self.malformed("array longer than the stream"));
        }
        (0..len).map(|_| self.read_primitive(primitive)).collect()
    }

    fn read_primitive(&mut self, primitive: PrimitiveType) -> Result<Value, Fault> {
        let c = &mut self.cursor;
        let value = match primitive {
            PrimitiveType::Boolean => Value::Bool(c.read_u8()? != 0),
            PrimitiveType::Byte => Value::UInt(c.read_u8()? as u64),
            PrimitiveType::SByte => Value::Int(c.read_u8()? as i8 as i64),
            PrimitiveType::Int16 => Value::Int(c.read_i16()? as i64),
            PrimitiveType::Int32 => Value::Int(c.read_i32()? as i64),
            PrimitiveType::Int64 | PrimitiveType::TimeSpan => Value::Int(c.read_i64()?),
            PrimitiveType::UInt16 => Value::UInt(c.read_u16()? as u64),
            PrimitiveType::UInt32 => Value::UInt(c.read_u32()? as u64),
            PrimitiveType::UInt64 | PrimitiveType::DateTime => Value::UInt(c.read_u64()?),
            PrimitiveType::Single => Value::Float(f32::from_bits(c.read_u32()?) as f64),
            PrimitiveType::Double => Value::Float(f64::from_bits(c.read_u64()?)),
            PrimitiveType::Null => Value::Null,
            PrimitiveType::Char => return Ok(Value::Char(self.read_char()?)),
            PrimitiveType::Decimal | PrimitiveType::String => {
                return Ok(Value::Text(self.read_string()?))
            }
        };
        Ok(value)
    }

    /// UTF-8 编码的单个字符
    fn read_char(&mut self) -> Result<char, Fault> {
        let first = self.cursor.read_u8()?;
        let extra = match first {
            0x00..=0x7F => 0,
            0xC0..=0xDF => 1,
            0xE0..=0xEF => 2,
            _ => 3,
        };
        let mut bytes = vec![first];
        bytes.extend_from_slice(self.cursor.read_bytes(extra)?);
        std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.chars().next())
            .ok_or_else(|| self.malformed("invalid UTF-8 char"))
    }

    /// 7 位变长前缀的 UTF-8 字符串
    fn read_string(&mut self) -> Result<String, Fault> {
        let len = self.cursor.read_7bit_len()?;
        let bytes = self.cursor.read_bytes(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    fn read_count(&mut self) -> Result<usize, Fault> {
        let value = self.cursor.read_i32()?;
        usize::try_from(value).map_err(|_| self.malformed("negative length"))
    }

    fn store(&mut self, id: i32, offset: usize, body: ObjectBody) {
        let end = self.cursor.position();
        self.graph.objects.insert(
            id,
            GraphObject {
                id,
                offset,
                end,
                body,
            },
        );
    }
}

/// 不移动解码位置地读一个字符串，要求是合法 UTF-8
fn probe_string(probe: &mut ByteCursor<'_>) -> Option<String> {
    let len = probe.read_7bit_len().ok()?;
    let bytes = probe.read_bytes(len).ok()?;
    String::from_utf8(bytes.to_vec()).ok()
}

fn is_type_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(char::is_control)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(root: i32) -> Vec<u8> {
        let mut out = vec![0u8];
        for value in [root, -1, 1, 0] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    fn string_record(id: i32, text: &str) -> Vec<u8> {
        let mut out = vec![6u8];
        out.extend_from_slice(&id.to_le_bytes());
        out.push(text.len() as u8);
        out.extend_from_slice(text.as_bytes());
        out
    }

    #[test]
    fn test_rejects_missing_header() {
        assert!(matches!(
            decode(b"<xml/>"),
            Err(CodecError::InvalidSignature { format: FormatKind::Shf })
        ));
        assert!(matches!(decode(&[0u8, 1, 0]), Err(CodecError::TruncatedInput { .. })));
    }

    #[test]
    fn test_strings_and_primitive_arrays() {
        let mut data = header(1);
        data.extend(string_record(1, "Hello"));
        // ArraySinglePrimitive id=2, 3 个 Int32
        data.push(15);
        data.extend_from_slice(&2i32.to_le_bytes());
        data.extend_from_slice(&3i32.to_le_bytes());
        data.push(8);
        for v in [7i32, -1, 300] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.push(11);

        let graph = decode(&data).unwrap();
        assert!(graph.warnings.is_empty(), "{:?}", graph.warnings);
        assert_eq!(graph.header.root_id, 1);
        assert_eq!(graph.string(1), Some("Hello"));
        assert_eq!(graph.pool.len(), 1);
        match &graph.objects[&2].body {
            ObjectBody::Array(items) => {
                assert_eq!(items, &vec![Value::Int(7), Value::Int(-1), Value::Int(300)])
            }
            other => panic!("应为数组: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_skipped_with_warning() {
        let mut data = header(1);
        data.extend(string_record(1, "first"));
        data.extend_from_slice(&[0xFE, 0xFE]);
        data.extend(string_record(2, "second"));
        data.push(11);

        let graph = decode(&data).unwrap();
        assert_eq!(graph.string(2), Some("second"), "跳过坏字节后应继续解码");
        assert_eq!(graph.warnings.len(), 1);
        assert!(matches!(
            graph.warnings[0],
            Warning::MalformedRecord { location: SourceLocation::Offset(o), .. } if o == 17 + 11
        ));
    }

    #[test]
    fn test_missing_message_end_is_tolerated() {
        let mut data = header(1);
        data.extend(string_record(1, "only"));
        let graph = decode(&data).unwrap();
        assert_eq!(graph.pool.len(), 1);
        assert!(graph.warnings.is_empty());
    }
}
