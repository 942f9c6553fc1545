//! Minimal mutable XML element tree on top of quick-xml.
//!
//! Enough to load a processor configuration template, edit named properties
//! and write it back out deterministically.

use crate::types::{SarError, SarResult};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element(XmlElement),
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
}

impl XmlElement {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.set_text(text);
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text content of direct children
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|child| match child {
                XmlNode::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replace all children with a single text node
    pub fn set_text<S: Into<String>>(&mut self, text: S) {
        let text = text.into();
        self.children.clear();
        if !text.is_empty() {
            self.children.push(XmlNode::Text(text));
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &XmlElement> {
        self.children.iter().filter_map(|child| match child {
            XmlNode::Element(element) => Some(element),
            _ => None,
        })
    }

    /// Direct child `<tag name="name">`
    pub fn find_named(&self, tag: &str, name: &str) -> Option<&XmlElement> {
        self.elements()
            .find(|e| e.name == tag && e.attribute("name") == Some(name))
    }

    pub fn find_named_mut(&mut self, tag: &str, name: &str) -> Option<&mut XmlElement> {
        self.children.iter_mut().find_map(|child| match child {
            XmlNode::Element(e) if e.name == tag && e.attribute("name") == Some(name) => Some(e),
            _ => None,
        })
    }

    /// Number of direct `<tag name="name">` children
    pub fn count_named(&self, tag: &str, name: &str) -> usize {
        self.elements()
            .filter(|e| e.name == tag && e.attribute("name") == Some(name))
            .count()
    }

    /// Remove every direct `<tag name="name">` child, returning how many went
    pub fn remove_named(&mut self, tag: &str, name: &str) -> usize {
        let before = self.children.len();
        self.children.retain(|child| {
            !matches!(
                child,
                XmlNode::Element(e) if e.name == tag && e.attribute("name") == Some(name)
            )
        });
        before - self.children.len()
    }

    pub fn push(&mut self, element: XmlElement) {
        self.children.push(XmlNode::Element(element));
    }
}

/// A parsed document with a single root element
#[derive(Debug, Clone, PartialEq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

fn xml_error<E: std::fmt::Display>(position: usize, e: E) -> SarError {
    SarError::XmlParsing(format!("Error at position {}: {}", position, e))
}

impl XmlDocument {
    pub fn parse(xml: &str) -> SarResult<Self> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let position = reader.buffer_position();
            let event = reader.read_event().map_err(|e| xml_error(position, e))?;
            match event {
                Event::Start(start) => stack.push(element_from_start(&start, position)?),
                Event::Empty(start) => {
                    let element = element_from_start(&start, position)?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::End(_) => {
                    let element = stack
                        .pop()
                        .ok_or_else(|| xml_error(position, "unexpected closing tag"))?;
                    attach(&mut stack, &mut root, element, position)?;
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(|e| xml_error(position, e))?;
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Text(value.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&data).into_owned();
                        parent.children.push(XmlNode::Text(value));
                    }
                }
                Event::Comment(comment) => {
                    if let Some(parent) = stack.last_mut() {
                        let value = String::from_utf8_lossy(&comment).into_owned();
                        parent.children.push(XmlNode::Comment(value));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(SarError::XmlParsing(format!("Unclosed element <{}>", open.name)));
        }
        let root = root
            .ok_or_else(|| SarError::XmlParsing("Document has no root element".to_string()))?;
        Ok(Self { root })
    }

    /// Serialize with an XML declaration and 4-space indentation.
    /// Identical trees always produce identical bytes.
    pub fn to_xml_string(&self) -> SarResult<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| SarError::XmlParsing(e.to_string()))?;
        write_element(&mut writer, &self.root)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| SarError::XmlParsing(e.to_string()))
    }
}

fn element_from_start(start: &BytesStart<'_>, position: usize) -> SarResult<XmlElement> {
    let mut element = XmlElement::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| xml_error(position, e))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute
            .unescape_value()
            .map_err(|e| xml_error(position, e))?
            .into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
    position: usize,
) -> SarResult<()> {
    match stack.last_mut() {
        Some(parent) => parent.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(xml_error(position, "multiple root elements")),
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> SarResult<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    let write_err = |e: quick_xml::Error| SarError::XmlParsing(e.to_string());

    if element.children.is_empty() {
        return writer.write_event(Event::Empty(start)).map_err(write_err);
    }

    writer.write_event(Event::Start(start)).map_err(write_err)?;
    for child in &element.children {
        match child {
            XmlNode::Element(e) => write_element(writer, e)?,
            XmlNode::Text(text) => writer
                .write_event(Event::Text(BytesText::new(text)))
                .map_err(write_err)?,
            XmlNode::Comment(comment) => writer
                .write_event(Event::Comment(BytesText::from_escaped(comment.as_str())))
                .map_err(write_err)?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<topsApp>
  <!-- sample -->
  <component name="topsinsar">
    <property name="do unwrap">False</property>
    <property name="label">a &amp; b</property>
    <component name="reference">
      <property name="safe"/>
    </component>
  </component>
</topsApp>"#;

    #[test]
    fn test_parse_and_query() {
        let doc = XmlDocument::parse(DOC).unwrap();
        assert_eq!(doc.root.name, "topsApp");

        let comp = doc.root.find_named("component", "topsinsar").unwrap();
        assert_eq!(comp.find_named("property", "do unwrap").unwrap().text(), "False");
        assert_eq!(comp.find_named("property", "label").unwrap().text(), "a & b");

        let reference = comp.find_named("component", "reference").unwrap();
        assert_eq!(reference.find_named("property", "safe").unwrap().text(), "");
    }

    #[test]
    fn test_write_is_stable() {
        let mut doc = XmlDocument::parse(DOC).unwrap();
        doc.root
            .find_named_mut("component", "topsinsar")
            .unwrap()
            .find_named_mut("property", "do unwrap")
            .unwrap()
            .set_text("True");

        let first = doc.to_xml_string().unwrap();
        let second = XmlDocument::parse(&first).unwrap().to_xml_string().unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<topsApp>"));
        assert!(first.contains("<property name=\"do unwrap\">True</property>"));
        assert!(first.contains("a &amp; b"));
        assert!(first.contains("<!-- sample -->"));
    }

    #[test]
    fn test_remove_named() {
        let mut doc = XmlDocument::parse(DOC).unwrap();
        let comp = doc.root.find_named_mut("component", "topsinsar").unwrap();
        comp.push(XmlElement::new("property").with_attribute("name", "label").with_text("x"));
        assert_eq!(comp.count_named("property", "label"), 2);
        assert_eq!(comp.remove_named("property", "label"), 2);
        assert_eq!(comp.count_named("property", "label"), 0);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(XmlDocument::parse("<a><b></a>").is_err());
        assert!(XmlDocument::parse("<a>").is_err());
        assert!(XmlDocument::parse("").is_err());
        assert!(XmlDocument::parse("<a/><b/>").is_err());
    }
}
