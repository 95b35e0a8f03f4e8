//! Redaction of sensitive header values and body fields.
//!
//! Body rules come in two shapes:
//!
//! - a bare key (`password`) matches that key at every depth
//! - a dotted path (`user.credentials.password`) matches one path from the
//!   document root
//!
//! Matched values are replaced by [`REDACTED`]; the document keeps its shape.
//! JSON bodies are tried first, then XML. Anything else passes through as is.

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use quick_xml::events::{BytesStart, BytesText, Event as XmlEvent};
use quick_xml::{Reader, Writer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

/// Marker written in place of redacted values.
pub const REDACTED: &str = "[Redacted]";

/// Redaction rules applied to captured requests and responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionOptions {
    /// Header names, matched case-insensitively.
    pub redact_headers: Vec<String>,
    /// Body keys or dotted paths.
    pub redact_body_keys: Vec<String>,
}

impl RedactionOptions {
    /// True when no rule is configured.
    pub fn is_empty(&self) -> bool {
        self.redact_headers.is_empty() && self.redact_body_keys.is_empty()
    }

    /// Redact a body and a header map.
    ///
    /// With no rules configured both inputs come back untouched without the
    /// body ever being parsed.
    pub fn redact<'a>(&self, body: Bytes, headers: &'a HeaderMap) -> (Bytes, Cow<'a, HeaderMap>) {
        if self.is_empty() {
            return (body, Cow::Borrowed(headers));
        }
        (self.redact_body(body), self.redact_headers(headers))
    }

    /// Redact listed headers on a copy of `headers`.
    ///
    /// The map is only cloned when at least one listed header is present.
    pub fn redact_headers<'a>(&self, headers: &'a HeaderMap) -> Cow<'a, HeaderMap> {
        let mut out = Cow::Borrowed(headers);
        for name in &self.redact_headers {
            let Ok(name) = HeaderName::from_bytes(name.trim().as_bytes()) else {
                debug!(header = %name, "Skipping invalid header name in redaction rules.");
                continue;
            };
            if headers.contains_key(&name) {
                out.to_mut()
                    .insert(name, HeaderValue::from_static(REDACTED));
            }
        }
        out
    }

    /// Redact body fields in a JSON or XML document.
    ///
    /// Bodies that are neither come back unchanged.
    pub fn redact_body(&self, body: Bytes) -> Bytes {
        if self.redact_body_keys.is_empty() || body.is_empty() {
            return body;
        }

        let rules: Vec<Rule<'_>> = self.redact_body_keys.iter().map(|r| Rule::parse(r)).collect();

        match redact_json(&body, &rules) {
            Ok(redacted) => return Bytes::from(redacted),
            Err(err) => debug!(error = %err, "Unable to parse body as JSON."),
        }

        match XmlDocument::parse(&body) {
            Some(mut doc) => {
                doc.redact(&rules);
                if let Some(redacted) = doc.write() {
                    return Bytes::from(redacted);
                }
                debug!("Unable to write redacted XML body.");
            }
            None => debug!("Unable to parse body as XML."),
        }

        body
    }
}

#[derive(Debug, Clone, Copy)]
enum Rule<'a> {
    Key(&'a str),
    Path(&'a str),
}

impl<'a> Rule<'a> {
    fn parse(rule: &'a str) -> Self {
        if rule.contains('.') {
            Rule::Path(rule)
        } else {
            Rule::Key(rule)
        }
    }

    fn segments(path: &'a str) -> Vec<&'a str> {
        path.split('.').collect()
    }
}

fn marker() -> Value {
    Value::String(REDACTED.to_string())
}

fn redact_json(body: &[u8], rules: &[Rule<'_>]) -> Result<Vec<u8>, serde_json::Error> {
    let mut value: Value = serde_json::from_slice(body)?;
    for rule in rules {
        match *rule {
            Rule::Key(key) => redact_json_key(&mut value, key),
            Rule::Path(path) => redact_json_path(&mut value, &Rule::segments(path)),
        }
    }
    serde_json::to_vec(&value)
}

fn redact_json_key(value: &mut Value, key: &str) {
    match value {
        Value::Object(map) => {
            for (name, child) in map.iter_mut() {
                if name == key {
                    *child = marker();
                } else {
                    redact_json_key(child, key);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| redact_json_key(item, key)),
        _ => {}
    }
}

// Arrays are transparent: a path step applies to every element.
fn redact_json_path(value: &mut Value, path: &[&str]) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(|item| redact_json_path(item, path)),
        Value::Object(map) => {
            let Some((head, rest)) = path.split_first() else {
                return;
            };
            if let Some(child) = map.get_mut(*head) {
                if rest.is_empty() {
                    *child = marker();
                } else {
                    redact_json_path(child, rest);
                }
            }
        }
        _ => {}
    }
}

enum XmlNode {
    Element(XmlElement),
    Other(XmlEvent<'static>),
}

struct XmlElement {
    start: BytesStart<'static>,
    children: Vec<XmlNode>,
    self_closing: bool,
}

impl XmlElement {
    fn new(start: BytesStart<'static>, self_closing: bool) -> Self {
        Self {
            start,
            children: Vec::new(),
            self_closing,
        }
    }

    fn is(&self, name: &str) -> bool {
        self.start.name().as_ref() == name.as_bytes()
    }

    fn elements_mut(&mut self) -> impl Iterator<Item = &mut XmlElement> {
        self.children.iter_mut().filter_map(|node| match node {
            XmlNode::Element(el) => Some(el),
            XmlNode::Other(_) => None,
        })
    }

    fn redact_content(&mut self) {
        self.children = vec![XmlNode::Other(XmlEvent::Text(BytesText::new(REDACTED)))];
        self.self_closing = false;
    }

    fn redact_attribute(&mut self, key: &str) {
        let parsed: Result<Vec<(Vec<u8>, Vec<u8>)>, _> = self
            .start
            .attributes()
            .map(|attr| attr.map(|a| (a.key.as_ref().to_vec(), a.value.into_owned())))
            .collect();
        let Ok(attributes) = parsed else {
            return;
        };
        if !attributes.iter().any(|(name, _)| name == key.as_bytes()) {
            return;
        }

        self.start.clear_attributes();
        for (name, value) in &attributes {
            let value: &[u8] = if name == key.as_bytes() {
                REDACTED.as_bytes()
            } else {
                value
            };
            self.start.push_attribute((name.as_slice(), value));
        }
    }

    fn redact_key(&mut self, key: &str) {
        self.redact_attribute(key);
        if self.is(key) {
            self.redact_content();
            return;
        }
        for child in self.elements_mut() {
            child.redact_key(key);
        }
    }

    // `path[0]` names this element; the last step may name an attribute.
    fn redact_path(&mut self, path: &[&str]) {
        let Some((head, rest)) = path.split_first() else {
            return;
        };
        if !self.is(head) {
            return;
        }
        match rest {
            [] => self.redact_content(),
            [last] => {
                self.redact_attribute(last);
                for child in self.elements_mut() {
                    child.redact_path(rest);
                }
            }
            _ => {
                for child in self.elements_mut() {
                    child.redact_path(rest);
                }
            }
        }
    }

    fn write(&self, writer: &mut Writer<Vec<u8>>) -> Option<()> {
        if self.self_closing && self.children.is_empty() {
            return writer.write_event(XmlEvent::Empty(self.start.borrow())).ok();
        }
        writer.write_event(XmlEvent::Start(self.start.borrow())).ok()?;
        for child in &self.children {
            match child {
                XmlNode::Element(el) => el.write(writer)?,
                XmlNode::Other(event) => writer.write_event(event.borrow()).ok()?,
            }
        }
        writer.write_event(XmlEvent::End(self.start.to_end())).ok()
    }
}

/// A single-rooted XML document, kept in enough detail to write it back.
struct XmlDocument {
    prolog: Vec<XmlEvent<'static>>,
    root: XmlElement,
    epilog: Vec<XmlEvent<'static>>,
}

impl XmlDocument {
    fn parse(body: &[u8]) -> Option<Self> {
        let mut reader = Reader::from_reader(body);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut prolog = Vec::new();
        let mut epilog = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let finished = match reader.read_event().ok()? {
                XmlEvent::Start(start) => {
                    stack.push(XmlElement::new(start.into_owned(), false));
                    None
                }
                XmlEvent::Empty(start) => Some(XmlElement::new(start.into_owned(), true)),
                XmlEvent::End(_) => Some(stack.pop()?),
                XmlEvent::Eof => break,
                event => {
                    if let Some(parent) = stack.last_mut() {
                        parent.children.push(XmlNode::Other(event.into_owned()));
                    } else {
                        if let XmlEvent::Text(text) = &event {
                            if !text.iter().all(u8::is_ascii_whitespace) {
                                return None;
                            }
                        }
                        let outside = if root.is_none() { &mut prolog } else { &mut epilog };
                        outside.push(event.into_owned());
                    }
                    None
                }
            };

            if let Some(element) = finished {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(XmlNode::Element(element));
                } else if root.is_none() {
                    root = Some(element);
                } else {
                    return None;
                }
            }
        }

        if !stack.is_empty() {
            return None;
        }
        Some(Self {
            prolog,
            root: root?,
            epilog,
        })
    }

    fn redact(&mut self, rules: &[Rule<'_>]) {
        for rule in rules {
            match *rule {
                Rule::Key(key) => self.root.redact_key(key),
                Rule::Path(path) => self.root.redact_path(&Rule::segments(path)),
            }
        }
    }

    fn write(&self) -> Option<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        for event in &self.prolog {
            writer.write_event(event.borrow()).ok()?;
        }
        self.root.write(&mut writer)?;
        for event in &self.epilog {
            writer.write_event(event.borrow()).ok()?;
        }
        Some(writer.into_inner())
    }
}
