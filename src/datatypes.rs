use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use encoding_rs::{Encoding, UTF_16LE, UTF_8, WINDOWS_1252};
use std::io::Cursor;

use crate::utils::CodecError;

/// 长度前缀宽度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    U8,
    U16,
    U32,
}

impl LengthWidth {
    fn byte_len(self) -> usize {
        match self {
            LengthWidth::U8 => 1,
            LengthWidth::U16 => 2,
            LengthWidth::U32 => 4,
        }
    }
}

/// 字符串编码
///
/// `Windows1252` 是游戏使用的 8 位代码页；WHATWG 的映射覆盖全部 256 个字节，
/// 因此解码后再编码可以逐字节还原。`Utf16Le` 的长度前缀按码元计数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TextEncoding {
    Windows1252,
    Utf16Le,
    Utf8,
}

impl TextEncoding {
    /// 每个长度单位对应的字节数
    pub fn unit_size(self) -> usize {
        match self {
            TextEncoding::Utf16Le => 2,
            TextEncoding::Windows1252 | TextEncoding::Utf8 => 1,
        }
    }

    fn encoding(self) -> &'static Encoding {
        match self {
            TextEncoding::Windows1252 => WINDOWS_1252,
            TextEncoding::Utf16Le => UTF_16LE,
            TextEncoding::Utf8 => UTF_8,
        }
    }

    /// 解码字节（不做 BOM 嗅探）
    pub fn decode(self, bytes: &[u8]) -> String {
        let (text, _had_errors) = self.encoding().decode_without_bom_handling(bytes);
        text.into_owned()
    }

    /// 编码字符串
    ///
    /// encoding_rs 不提供 UTF-16 编码器，这里手动展开。
    /// 代码页里没有的字符返回 [`CodecError::InvalidValue`]，不写入替代字符。
    pub fn encode(self, text: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            TextEncoding::Utf16Le => Ok(text
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()),
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Windows1252 => {
                let (bytes, _, had_errors) = WINDOWS_1252.encode(text);
                if had_errors {
                    return Err(CodecError::InvalidValue {
                        field: "windows-1252 text".to_string(),
                        value: text.to_string(),
                    });
                }
                Ok(bytes.into_owned())
            }
        }
    }
}

// 文本文件按顺序尝试的编码
const TEXT_ENCODINGS: &[TextEncoding] = &[TextEncoding::Utf8, TextEncoding::Windows1252];

/// 带编码信息的解码文本
#[derive(Debug, Clone)]
pub struct RawText {
    pub content: String,
    pub encoding: TextEncoding,
    /// 是否带 UTF-8 BOM
    pub has_bom: bool,
}

impl RawText {
    /// 尝试多种编码解码文本文件
    pub fn decode(data: &[u8]) -> Self {
        let (data, has_bom) = match data.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
            Some(rest) => (rest, true),
            None => (data, false),
        };

        for encoding in TEXT_ENCODINGS {
            let (decoded, had_errors) = encoding.encoding().decode_without_bom_handling(data);
            if !had_errors {
                return RawText {
                    content: decoded.into_owned(),
                    encoding: *encoding,
                    has_bom,
                };
            }
        }

        // Windows-1252 对任意字节都成功，走不到这里
        RawText {
            content: String::from_utf8_lossy(data).into_owned(),
            encoding: TextEncoding::Utf8,
            has_bom,
        }
    }

    /// 按原编码还原为字节
    pub fn encode(&self, content: &str) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(content.len() + 3);
        if self.has_bom {
            out.extend_from_slice(&[0xEF, 0xBB, 0xBF]);
        }
        out.extend(self.encoding.encode(content)?);
        Ok(out)
    }
}

/// 定长缓冲区上的顺序读取器
///
/// 所有越界读取都返回 [`CodecError::TruncatedInput`]，带上偏移量便于定位。
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    /// 当前偏移量
    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    /// 跳转到绝对偏移量
    pub fn seek(&mut self, offset: usize) -> Result<(), CodecError> {
        let len = self.len();
        if offset > len {
            return Err(CodecError::TruncatedInput {
                offset,
                requested: 0,
                available: 0,
            });
        }
        self.inner.set_position(offset as u64);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.get_ref().is_empty()
    }

    /// 剩余字节数
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    pub fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// 底层完整缓冲区
    pub fn data(&self) -> &'a [u8] {
        self.inner.get_ref()
    }

    fn ensure(&self, requested: usize) -> Result<(), CodecError> {
        let available = self.remaining();
        if requested > available {
            return Err(CodecError::TruncatedInput {
                offset: self.position(),
                requested,
                available,
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.ensure(1)?;
        Ok(self.inner.read_u8()?)
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.ensure(2)?;
        Ok(self.inner.read_u16::<LittleEndian>()?)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        Ok(self.inner.read_u32::<LittleEndian>()?)
    }

    pub fn read_i16(&mut self) -> Result<i16, CodecError> {
        self.ensure(2)?;
        Ok(self.inner.read_i16::<LittleEndian>()?)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        Ok(self.inner.read_i32::<LittleEndian>()?)
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        self.ensure(8)?;
        Ok(self.inner.read_i64::<LittleEndian>()?)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.ensure(8)?;
        Ok(self.inner.read_u64::<LittleEndian>()?)
    }

    /// 读取 n 个原始字节（借用，不拷贝）
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.ensure(n)?;
        let start = self.position();
        let data: &'a [u8] = self.inner.get_ref();
        self.inner.set_position((start + n) as u64);
        Ok(&data[start..start + n])
    }

    /// 读取长度前缀
    pub fn read_length(&mut self, width: LengthWidth) -> Result<usize, CodecError> {
        Ok(match width {
            LengthWidth::U8 => self.read_u8()? as usize,
            LengthWidth::U16 => self.read_u16()? as usize,
            LengthWidth::U32 => self.read_u32()? as usize,
        })
    }

    /// 读取长度前缀字符串
    pub fn read_length_prefixed_string(
        &mut self,
        width: LengthWidth,
        encoding: TextEncoding,
    ) -> Result<String, CodecError> {
        let start = self.position();
        let units = self.read_length(width)?;
        let byte_len = units.checked_mul(encoding.unit_size()).ok_or(
            CodecError::TruncatedInput {
                offset: start,
                requested: usize::MAX,
                available: self.remaining(),
            },
        )?;
        let bytes = self.read_bytes(byte_len)?;
        Ok(encoding.decode(bytes))
    }

    /// 读取 7 位变长整数（.NET BinaryWriter 的字符串长度格式）
    pub fn read_7bit_len(&mut self) -> Result<usize, CodecError> {
        let start = self.position();
        let mut result: usize = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.read_u8()?;
            result |= ((byte & 0x7F) as usize) << shift;
            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }
        Err(CodecError::MalformedRecord {
            location: crate::utils::SourceLocation::Offset(start),
            reason: "7-bit length longer than 5 bytes".to_string(),
        })
    }
}

/// 顺序写入器，与 [`ByteCursor`] 一一对应
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        // 写入 Vec 不会失败
        let _ = self.buf.write_u16::<LittleEndian>(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_length(&mut self, width: LengthWidth, len: usize) -> Result<(), CodecError> {
        let max = match width {
            LengthWidth::U8 => u8::MAX as usize,
            LengthWidth::U16 => u16::MAX as usize,
            LengthWidth::U32 => u32::MAX as usize,
        };
        if len > max {
            return Err(CodecError::ValueTooLong {
                length: len,
                max,
            });
        }
        match width {
            LengthWidth::U8 => self.write_u8(len as u8),
            LengthWidth::U16 => self.write_u16(len as u16),
            LengthWidth::U32 => self.write_u32(len as u32),
        }
        Ok(())
    }

    /// 写入长度前缀字符串，长度按编码重新计算
    pub fn write_length_prefixed_string(
        &mut self,
        width: LengthWidth,
        encoding: TextEncoding,
        text: &str,
    ) -> Result<(), CodecError> {
        let bytes = encoding.encode(text)?;
        self.write_length(width, bytes.len() / encoding.unit_size())?;
        self.write_bytes(&bytes);
        Ok(())
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}
