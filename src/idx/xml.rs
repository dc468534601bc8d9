//! 带源码位置的轻量 XML 树
//!
//! 保存时要把修改拼接回原文，所以每个元素都记下自己在源文本中的范围。

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::ops::Range;

use crate::utils::{CodecError, SourceLocation};

#[derive(Debug, Clone, Default)]
pub(crate) struct XmlElement {
    /// 去掉命名空间前缀的名字
    pub name: String,
    /// 源文本中的完整名字
    pub qname: String,
    /// (本地名, 值)
    pub attrs: Vec<(String, String)>,
    /// 从 `<` 到结束标签的 `>`
    pub span: Range<usize>,
    /// 开始标签与结束标签之间的内容；自闭合元素为 `None`
    pub inner: Option<Range<usize>>,
    pub children: Vec<XmlElement>,
    pub text: String,
    /// 第一个子元素之前的空白
    pub lead: String,
}

impl XmlElement {
    fn open(e: &BytesStart<'_>, span: Range<usize>) -> Result<Self, CodecError> {
        let mut attrs = Vec::new();
        for attr in e.attributes() {
            let attr = attr?;
            attrs.push((
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                attr.unescape_value()?.into_owned(),
            ));
        }
        Ok(Self {
            name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
            qname: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
            attrs,
            span,
            ..Default::default()
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `xsi:null="1"`
    pub fn is_null(&self) -> bool {
        matches!(self.attr("null"), Some("1") | Some("true"))
    }

    /// `href="#ref-N"` 指向的 ID
    pub fn href(&self) -> Option<&str> {
        self.attr("href").map(|href| href.trim_start_matches('#'))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }
}

/// 解析整篇文档，返回根元素
pub(crate) fn parse_tree(source: &str) -> Result<XmlElement, CodecError> {
    let mut reader = Reader::from_str(source);
    reader.trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root = None;

    loop {
        let start = reader.buffer_position();
        let event = reader.read_event()?;
        let end = reader.buffer_position();

        match event {
            Event::Start(e) => {
                let mut element = XmlElement::open(&e, start..end)?;
                element.inner = Some(end..end);
                stack.push(element);
            }
            Event::Empty(e) => {
                let element = XmlElement::open(&e, start..end)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let mut element = stack.pop().ok_or_else(|| unbalanced(start))?;
                element.span.end = end;
                if let Some(inner) = element.inner.as_mut() {
                    inner.end = start;
                }
                attach(&mut stack, &mut root, element);
            }
            Event::Text(e) => {
                if let Some(top) = stack.last_mut() {
                    let text = e.unescape()?;
                    if top.children.is_empty() && text.trim().is_empty() {
                        top.lead.push_str(&text);
                    }
                    top.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CodecError::MalformedRecord {
            location: SourceLocation::Offset(open.span.start),
            reason: format!("element <{}> is never closed", open.qname),
        });
    }
    root.ok_or_else(|| CodecError::MalformedRecord {
        location: SourceLocation::Offset(0),
        reason: "document has no root element".to_string(),
    })
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn unbalanced(offset: usize) -> CodecError {
    CodecError::MalformedRecord {
        location: SourceLocation::Offset(offset),
        reason: "unexpected end tag".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_cover_source() {
        let source = "<a x=\"1\">\n  <b>t&amp;t</b>\n  <c xsi:null=\"1\"/>\n</a>";
        let root = parse_tree(source).unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(&source[root.span.clone()], source);
        assert_eq!(root.lead, "\n  ");

        let b = root.child("b").unwrap();
        assert_eq!(&source[b.span.clone()], "<b>t&amp;t</b>");
        assert_eq!(&source[b.inner.clone().unwrap()], "t&amp;t");
        assert_eq!(b.text, "t&t");

        let c = root.child("c").unwrap();
        assert!(c.is_null());
        assert!(c.inner.is_none());
    }

    #[test]
    fn test_prefixed_names() {
        let root = parse_tree("<SOAP-ENV:Body><a1:Node id=\"ref-1\"/></SOAP-ENV:Body>").unwrap();
        assert_eq!(root.name, "Body");
        assert_eq!(root.qname, "SOAP-ENV:Body");
        assert_eq!(root.children[0].attr("id"), Some("ref-1"));
    }

    #[test]
    fn test_unclosed_element() {
        assert!(parse_tree("<a><b>").is_err());
    }
}
