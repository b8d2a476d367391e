use crate::error::NetconfResult;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use quick_xml::writer::Writer;
use std::io::Cursor;

/// A namespace-qualified element name. `ns` is the resolved namespace URI
/// (not the prefix) — spec.md §3 requires containment-map keys to use the
/// qualified name while selection/matching use the local name alone,
/// because datastore field identifiers are unqualified within a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct QName {
    pub ns: Option<String>,
    pub local: String,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        QName {
            ns: None,
            local: local.into(),
        }
    }

    pub fn qualified(ns: impl Into<String>, local: impl Into<String>) -> Self {
        QName {
            ns: Some(ns.into()),
            local: local.into(),
        }
    }
}

/// A generic, dynamically-shaped XML element: the `config`, `filter`,
/// action, and `data` payloads a NETCONF server exchanges are not fixed
/// schemas the codec can know in advance, so they are represented as a
/// plain tree rather than typed structs. Mirrors the original
/// implementation's `Msg` type (`XMLName`/`Attrs`/`Content`/`Elems`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    pub name: QName,
    pub attrs: Vec<(QName, String)>,
    /// Raw (untrimmed) character data. Whitespace is preserved because
    /// content-match filters may depend on it (spec.md §4.2).
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    pub fn new(name: QName) -> Self {
        XmlElement {
            name,
            attrs: Vec::new(),
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.local == local)
            .map(|(_, v)| v.as_str())
    }

    pub fn attr_ns(&self, ns: &str, local: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n.local == local && n.ns.as_deref() == Some(ns))
            .map(|(_, v)| v.as_str())
    }

    pub fn child(&self, local: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name.local == local)
    }

    pub fn children_named<'a>(&'a self, local: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name.local == local)
    }

    /// Parses a single top-level element from a complete XML document or
    /// fragment. Namespace-aware: a reader must resolve `xmlns`
    /// declarations before `containment` lookups are meaningful.
    pub fn parse(input: &str) -> NetconfResult<XmlElement> {
        let mut reader = NsReader::from_str(input);
        reader.trim_text(false);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            let (ns, event) = reader.read_resolved_event()?;
            match event {
                Event::Start(start) => {
                    stack.push(build_element(&reader, &ns, &start)?);
                }
                Event::Empty(start) => {
                    let elem = build_element(&reader, &ns, &start)?;
                    push_completed(&mut stack, &mut root, elem);
                }
                Event::End(_) => {
                    let elem = stack.pop().expect("matching start for end event");
                    push_completed(&mut stack, &mut root, elem);
                    if root.is_some() && stack.is_empty() {
                        break;
                    }
                }
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        let raw = String::from_utf8_lossy(&text.into_inner());
                        top.text.push_str(&unescape(&raw)?);
                    }
                }
                Event::CData(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text
                            .push_str(&String::from_utf8_lossy(&text.into_inner()));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        root.ok_or_else(|| quick_xml::Error::TextNotFound.into())
    }

    /// Serializes this element (and its descendants) back to XML bytes,
    /// preserving the namespace declaration on the element itself.
    pub fn to_xml_string(&self) -> String {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        write_element(&mut writer, self).expect("writing to an in-memory buffer cannot fail");
        String::from_utf8(writer.into_inner().into_inner()).expect("quick-xml emits valid UTF-8")
    }

    pub fn trimmed_text(&self) -> &str {
        self.text.trim()
    }
}

fn push_completed(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, elem: XmlElement) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
    } else {
        *root = Some(elem);
    }
}

fn resolved_ns(ns: &ResolveResult) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).to_string()),
        _ => None,
    }
}

fn build_element(
    reader: &NsReader<&[u8]>,
    ns: &ResolveResult,
    start: &BytesStart,
) -> NetconfResult<XmlElement> {
    let local = String::from_utf8_lossy(start.local_name().as_ref()).to_string();
    let mut elem = XmlElement::new(QName {
        ns: resolved_ns(ns),
        local,
    });
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let raw_key = attr.key.as_ref();
        if raw_key == b"xmlns" || raw_key.starts_with(b"xmlns:") {
            continue;
        }
        // Unlike element names, attributes without a prefix take no
        // namespace at all (RFC 3986 / XML namespaces: the default
        // `xmlns` binding never applies to unprefixed attributes).
        let (attr_ns, attr_local_name) = reader.resolve_attribute(attr.key);
        let attr_local = String::from_utf8_lossy(attr_local_name.as_ref()).to_string();
        let raw_value = String::from_utf8_lossy(&attr.value);
        let value = unescape(&raw_value)?.to_string();
        elem.attrs.push((
            QName {
                ns: resolved_ns(&attr_ns),
                local: attr_local,
            },
            value,
        ));
    }
    Ok(elem)
}

fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    elem: &XmlElement,
) -> quick_xml::Result<()> {
    let tag = elem.name.local.as_str();
    let mut start = BytesStart::new(tag);
    if let Some(ns) = &elem.name.ns {
        start.push_attribute(("xmlns", ns.as_str()));
    }
    for (name, value) in &elem.attrs {
        start.push_attribute((name.local.as_str(), value.as_str()));
    }
    if elem.children.is_empty() && elem.text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if !elem.text.is_empty() {
        writer.write_event(Event::Text(quick_xml::events::BytesText::new(&elem.text)))?;
    }
    for child in &elem.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(quick_xml::events::BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_nested_elements_with_namespace() {
        let xml = r#"<top xmlns="https://example.com/schema/1.2/config"><users><user><name>fred</name></user></users></top>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name.local, "top");
        assert_eq!(
            root.name.ns.as_deref(),
            Some("https://example.com/schema/1.2/config")
        );
        let users = root.child("users").unwrap();
        let user = users.child("user").unwrap();
        assert_eq!(user.child("name").unwrap().trimmed_text(), "fred");
    }

    #[test]
    fn round_trips_attributes() {
        let xml = r#"<size nc:operation="delete" xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0">16</size>"#;
        let elem = XmlElement::parse(xml).unwrap();
        assert_eq!(elem.trimmed_text(), "16");
        assert_eq!(
            elem.attr_ns("urn:ietf:params:xml:ns:netconf:base:1.0", "operation"),
            Some("delete")
        );
    }
}
