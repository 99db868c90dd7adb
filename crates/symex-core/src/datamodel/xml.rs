//! Structured XML export and import of the data model
//!
//! Every node and condition maps to one element, so a written model reads
//! back into a structurally equal tree. The `when` attribute on
//! alternatives is for human readers only and ignored on import.

use super::model::DataModel;
use super::node::{ArrayKey, DataNode, Literal};
use crate::condition::Condition;
use crate::control::ControlSignal;
use crate::error::{Result, SymexError};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

fn xml_error(e: impl std::fmt::Display) -> SymexError {
    SymexError::Xml(e.to_string())
}

/// Serialize a model to an XML document
pub fn write_model(model: &DataModel) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let mut root = BytesStart::new("datamodel");
    if let Some(source) = model.source() {
        root.push_attribute(("source", source));
    }
    writer.write_event(Event::Start(root)).map_err(xml_error)?;
    write_node(&mut writer, model.root())?;
    writer
        .write_event(Event::End(BytesEnd::new("datamodel")))
        .map_err(xml_error)?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(xml_error)
}

fn empty(writer: &mut XmlWriter, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
    let mut start = BytesStart::new(name);
    for attribute in attributes {
        start.push_attribute(*attribute);
    }
    writer.write_event(Event::Empty(start)).map_err(xml_error)?;
    Ok(())
}

fn open(writer: &mut XmlWriter, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
    let mut start = BytesStart::new(name);
    for attribute in attributes {
        start.push_attribute(*attribute);
    }
    writer.write_event(Event::Start(start)).map_err(xml_error)?;
    Ok(())
}

fn close(writer: &mut XmlWriter, name: &str) -> Result<()> {
    writer
        .write_event(Event::End(BytesEnd::new(name)))
        .map_err(xml_error)?;
    Ok(())
}

fn write_node(writer: &mut XmlWriter, node: &DataNode) -> Result<()> {
    match node {
        DataNode::Concrete(lit) => write_literal(writer, lit),
        DataNode::Symbolic(description) => empty(writer, "symbolic", &[("expr", description.as_str())]),
        DataNode::Concat(parts) => {
            open(writer, "concat", &[])?;
            for part in parts {
                write_node(writer, part)?;
            }
            close(writer, "concat")
        }
        DataNode::Conditional(alternatives) => {
            open(writer, "conditional", &[])?;
            for alt in alternatives {
                let when = alt.condition.to_string();
                open(writer, "alternative", &[("when", when.as_str())])?;
                write_condition(writer, &alt.condition)?;
                write_node(writer, &alt.node)?;
                close(writer, "alternative")?;
            }
            close(writer, "conditional")
        }
        DataNode::Control(signal) => match signal.levels() {
            Some(levels) => {
                let levels = levels.to_string();
                empty(writer, "control", &[("signal", signal.name()), ("levels", levels.as_str())])
            }
            None => empty(writer, "control", &[("signal", signal.name())]),
        },
        DataNode::Unset => empty(writer, "unset", &[]),
        DataNode::Approximate(reason) => empty(writer, "approximate", &[("reason", reason.as_str())]),
    }
}

fn write_literal(writer: &mut XmlWriter, lit: &Literal) -> Result<()> {
    match lit {
        Literal::Null => empty(writer, "null", &[]),
        Literal::Bool(b) => empty(writer, "bool", &[("value", if *b { "true" } else { "false" })]),
        Literal::Int(n) => empty(writer, "int", &[("value", n.to_string().as_str())]),
        Literal::Float(f) => empty(writer, "float", &[("value", f.to_string().as_str())]),
        Literal::Str(s) if s.is_empty() => empty(writer, "string", &[]),
        Literal::Str(s) => {
            open(writer, "string", &[])?;
            writer
                .write_event(Event::Text(BytesText::new(s)))
                .map_err(xml_error)?;
            close(writer, "string")
        }
        Literal::Array(entries) => {
            open(writer, "array", &[])?;
            for (key, value) in entries {
                let (kind, text) = match key {
                    ArrayKey::Int(n) => ("int", n.to_string()),
                    ArrayKey::Str(s) => ("string", s.clone()),
                };
                open(writer, "entry", &[("key", text.as_str()), ("key-type", kind)])?;
                write_node(writer, value)?;
                close(writer, "entry")?;
            }
            close(writer, "array")
        }
    }
}

fn write_condition(writer: &mut XmlWriter, condition: &Condition) -> Result<()> {
    match condition {
        Condition::True => empty(writer, "true", &[]),
        Condition::False => empty(writer, "false", &[]),
        Condition::Atom(text) => empty(writer, "atom", &[("name", text.as_str())]),
        Condition::Not(inner) => {
            open(writer, "not", &[])?;
            write_condition(writer, inner)?;
            close(writer, "not")
        }
        Condition::And(items) | Condition::Or(items) => {
            let name = if matches!(condition, Condition::And(_)) { "and" } else { "or" };
            open(writer, name, &[])?;
            for item in items {
                write_condition(writer, item)?;
            }
            close(writer, name)
        }
    }
}

/// A parsed element with its attributes, children and text content
#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn required(&self, key: &str) -> Result<&str> {
        self.attribute(key).ok_or_else(|| {
            SymexError::Xml(format!("<{}> is missing attribute '{}'", self.name, key))
        })
    }

    fn only_child(&self) -> Result<&Element> {
        match self.children.as_slice() {
            [child] => Ok(child),
            _ => Err(SymexError::Xml(format!(
                "<{}> must have exactly one child, found {}",
                self.name,
                self.children.len()
            ))),
        }
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element> {
    let mut element = Element {
        name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Element::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute.map_err(xml_error)?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(xml_error)?.into_owned();
        element.attributes.push((key, value));
    }
    Ok(element)
}

fn parse_document(text: &str) -> Result<Element> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(element_from_start(&start)?),
            Event::Empty(start) => {
                let element = element_from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(content) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&content.unescape().map_err(xml_error)?);
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| SymexError::Xml("unbalanced closing tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| SymexError::Xml("document has no root element".to_string()))
}

/// Read a model written by [`write_model`]
pub fn read_model(text: &str) -> Result<DataModel> {
    let root = parse_document(text)?;
    if root.name != "datamodel" {
        return Err(SymexError::Xml(format!(
            "expected <datamodel> root, found <{}>",
            root.name
        )));
    }
    let node = read_node(root.only_child()?)?;
    let model = DataModel::new(node);
    Ok(match root.attribute("source") {
        Some(source) => model.with_source(source),
        None => model,
    })
}

fn parse_number<T: std::str::FromStr>(element: &Element) -> Result<T> {
    let value = element.required("value")?;
    value
        .parse()
        .map_err(|_| SymexError::Xml(format!("invalid {} value '{}'", element.name, value)))
}

fn read_node(element: &Element) -> Result<DataNode> {
    let node = match element.name.as_str() {
        "null" => DataNode::null(),
        "bool" => DataNode::bool(element.required("value")? == "true"),
        "int" => DataNode::int(parse_number(element)?),
        "float" => DataNode::float(parse_number(element)?),
        "string" => DataNode::string(element.text.clone()),
        "array" => {
            let mut entries = Vec::with_capacity(element.children.len());
            for entry in &element.children {
                let key = entry.required("key")?;
                let key = match entry.attribute("key-type") {
                    Some("int") => ArrayKey::Int(key.parse().map_err(|_| {
                        SymexError::Xml(format!("invalid integer array key '{}'", key))
                    })?),
                    _ => ArrayKey::Str(key.to_string()),
                };
                entries.push((key, read_node(entry.only_child()?)?));
            }
            DataNode::array(entries)
        }
        "symbolic" => DataNode::symbolic(element.required("expr")?),
        "concat" => DataNode::Concat(
            element
                .children
                .iter()
                .map(read_node)
                .collect::<Result<Vec<_>>>()?,
        ),
        "conditional" => {
            let mut alternatives = Vec::with_capacity(element.children.len());
            for alt in &element.children {
                let [condition, node] = alt.children.as_slice() else {
                    return Err(SymexError::Xml(
                        "<alternative> needs a condition and a node".to_string(),
                    ));
                };
                alternatives.push(super::node::Alternative::new(
                    read_condition(condition)?,
                    read_node(node)?,
                ));
            }
            DataNode::Conditional(alternatives)
        }
        "control" => {
            let name = element.required("signal")?;
            let levels = element.attribute("levels").and_then(|l| l.parse().ok());
            let signal = ControlSignal::from_parts(name, levels)
                .ok_or_else(|| SymexError::Xml(format!("unknown control signal '{}'", name)))?;
            DataNode::Control(signal)
        }
        "unset" => DataNode::Unset,
        "approximate" => DataNode::Approximate(element.required("reason")?.to_string()),
        other => return Err(SymexError::Xml(format!("unknown node element <{}>", other))),
    };
    Ok(node)
}

fn read_condition(element: &Element) -> Result<Condition> {
    let condition = match element.name.as_str() {
        "true" => Condition::True,
        "false" => Condition::False,
        "atom" => Condition::Atom(element.required("name")?.to_string()),
        "not" => Condition::Not(Box::new(read_condition(element.only_child()?)?)),
        "and" | "or" => {
            let items = element
                .children
                .iter()
                .map(read_condition)
                .collect::<Result<Vec<_>>>()?;
            if element.name == "and" {
                Condition::And(items)
            } else {
                Condition::Or(items)
            }
        }
        other => {
            return Err(SymexError::Xml(format!(
                "unknown condition element <{}>",
                other
            )))
        }
    };
    Ok(condition)
}
