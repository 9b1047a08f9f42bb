//! Minimal owned XML tree over `quick-xml` events.
//!
//! Element and attribute names are kept as written (`bf:Work`). Namespace
//! declarations on the root element are indexed so callers can build names
//! from namespace URIs regardless of the prefixes a document uses.

use std::collections::HashMap;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use reconcile_shared::{ReconcileError, Result};

/// RDF syntax namespace.
pub const RDF_NS: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

/// RDF Schema namespace.
pub const RDFS_NS: &str = "http://www.w3.org/2000/01/rdf-schema#";

/// Prefixes used when a namespace is not declared by the document.
const CONVENTIONAL_PREFIXES: &[(&str, &str)] = &[
    ("rdf", RDF_NS),
    ("rdfs", RDFS_NS),
    ("bf", reconcile_shared::BF_NS),
    ("bflc", reconcile_shared::BFLC_NS),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(Node::Element(child));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Part of the name after the prefix.
    pub fn local_name(&self) -> &str {
        self.name.rsplit(':').next().unwrap_or(&self.name)
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    pub fn elements_mut(&mut self) -> impl Iterator<Item = &mut Element> {
        self.children.iter_mut().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// Child elements named `name`.
    pub fn children_named<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Element> {
        self.elements().filter(move |e| e.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|e| e.name == name)
    }

    /// Every text node under this element, in document order.
    pub fn texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_texts(self, &mut out);
        out
    }

    /// Replace every attribute value equal to `from` in this subtree.
    pub fn replace_attr_values(&mut self, from: &str, to: &str) -> usize {
        let mut replaced = 0;
        for (_, value) in self.attributes.iter_mut() {
            if value == from {
                *value = to.to_string();
                replaced += 1;
            }
        }
        for child in self.elements_mut() {
            replaced += child.replace_attr_values(from, to);
        }
        replaced
    }
}

fn collect_texts<'a>(element: &'a Element, out: &mut Vec<&'a str>) {
    for child in &element.children {
        match child {
            Node::Text(t) => out.push(t),
            Node::Element(e) => collect_texts(e, out),
        }
    }
}

/// A parsed XML document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub root: Element,
    /// Namespace URI -> prefix, from the root element's declarations.
    prefixes: HashMap<String, String>,
}

impl Document {
    pub fn new(root: Element) -> Self {
        let prefixes = root
            .attributes
            .iter()
            .filter_map(|(k, v)| {
                if k == "xmlns" {
                    Some((v.clone(), String::new()))
                } else {
                    k.strip_prefix("xmlns:").map(|p| (v.clone(), p.to_string()))
                }
            })
            .collect();
        Self { root, prefixes }
    }

    /// Qualified name for `local` in namespace `ns`, using the document's
    /// prefix for it when declared.
    pub fn qname(&self, ns: &str, local: &str) -> String {
        let prefix = self.prefixes.get(ns).map(String::as_str).or_else(|| {
            CONVENTIONAL_PREFIXES
                .iter()
                .find(|(_, uri)| *uri == ns)
                .map(|(p, _)| *p)
        });
        match prefix {
            Some("") | None => local.to_string(),
            Some(p) => format!("{p}:{local}"),
        }
    }

    /// Declare `ns` on the root with its conventional prefix if missing.
    pub fn ensure_namespace(&mut self, ns: &str) {
        if self.prefixes.contains_key(ns) {
            return;
        }
        if let Some((prefix, _)) = CONVENTIONAL_PREFIXES.iter().find(|(_, uri)| *uri == ns) {
            self.root.set_attr(format!("xmlns:{prefix}"), ns);
            self.prefixes.insert(ns.to_string(), prefix.to_string());
        }
    }

    pub fn parse(xml: &str) -> Result<Self> {
        // Text is kept untrimmed so entity references keep their surrounding
        // spaces; formatting whitespace is dropped when an element closes.
        let mut reader = Reader::from_str(xml);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| doc_error(reader.buffer_position(), e))?;
            match event {
                Event::Start(ref e) => stack.push(start_element(&reader, e)?),
                Event::Empty(ref e) => {
                    let element = start_element(&reader, e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| ReconcileError::Document("unbalanced end tag".into()))?;
                    if element.elements().next().is_some() {
                        element
                            .children
                            .retain(|n| !matches!(n, Node::Text(t) if t.trim().is_empty()));
                    }
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(ref e) => {
                    let raw = reader
                        .decoder()
                        .decode(e)
                        .map_err(|e| doc_error(reader.buffer_position(), e))?;
                    let text = unescape(&raw)
                        .map(|t| t.into_owned())
                        .unwrap_or_else(|_| raw.to_string());
                    push_text(&mut stack, &text);
                }
                Event::CData(ref e) => {
                    let text = reader
                        .decoder()
                        .decode(e)
                        .map_err(|e| doc_error(reader.buffer_position(), e))?;
                    push_text(&mut stack, &text);
                }
                Event::GeneralRef(ref e) => {
                    let name = reader
                        .decoder()
                        .decode(e)
                        .map_err(|e| doc_error(reader.buffer_position(), e))?;
                    let reference = format!("&{name};");
                    let text = unescape(&reference)
                        .map(|t| t.into_owned())
                        .unwrap_or(reference);
                    push_text(&mut stack, &text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(ReconcileError::Document(format!(
                "unclosed element <{}>",
                stack.last().map(|e| e.name.as_str()).unwrap_or_default()
            )));
        }
        root.map(Self::new)
            .ok_or_else(|| ReconcileError::Document("document has no root element".into()))
    }

    pub fn read(path: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(path).map_err(|e| ReconcileError::io(path, e))?;
        Self::parse(&xml)
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(|e| ReconcileError::Document(e.to_string()))?;
        write_element(&mut writer, &self.root)?;

        let mut bytes = writer.into_inner();
        bytes.push(b'\n');
        String::from_utf8(bytes).map_err(|e| ReconcileError::Document(e.to_string()))
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let xml = self.to_xml()?;
        std::fs::write(path, xml).map_err(|e| ReconcileError::io(path, e))
    }
}

fn doc_error(position: impl std::fmt::Display, e: impl std::fmt::Display) -> ReconcileError {
    ReconcileError::Document(format!("at byte {position}: {e}"))
}

fn start_element(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Result<Element> {
    let decoder = reader.decoder();
    let name = decoder
        .decode(e.name().as_ref())
        .map_err(|err| doc_error(reader.buffer_position(), err))?
        .into_owned();

    let mut element = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| doc_error(reader.buffer_position(), err))?;
        let key = decoder
            .decode(attr.key.as_ref())
            .map_err(|err| doc_error(reader.buffer_position(), err))?
            .into_owned();
        let raw = decoder
            .decode(&attr.value)
            .map_err(|err| doc_error(reader.buffer_position(), err))?;
        let value = unescape(&raw)
            .map(|v| v.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(element)),
        None if root.is_none() => *root = Some(element),
        None => {
            return Err(ReconcileError::Document(
                "more than one root element".into(),
            ));
        }
    }
    Ok(())
}

/// Append text to the open element, merging with a preceding text node.
fn push_text(stack: &mut [Element], text: &str) {
    let Some(parent) = stack.last_mut() else {
        return;
    };
    if let Some(Node::Text(prev)) = parent.children.last_mut() {
        prev.push_str(text);
    } else {
        parent.children.push(Node::Text(text.to_string()));
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (k, v) in &element.attributes {
        start.push_attribute((k.as_str(), v.as_str()));
    }

    if element.children.is_empty() {
        return writer
            .write_event(Event::Empty(start))
            .map_err(|e| ReconcileError::Document(e.to_string()));
    }

    writer
        .write_event(Event::Start(start))
        .map_err(|e| ReconcileError::Document(e.to_string()))?;
    for child in &element.children {
        match child {
            Node::Element(e) => write_element(writer, e)?,
            Node::Text(t) => writer
                .write_event(Event::Text(BytesText::new(t)))
                .map_err(|e| ReconcileError::Document(e.to_string()))?,
        }
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(|e| ReconcileError::Document(e.to_string()))
}
