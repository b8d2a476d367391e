//! edit-config walking and conflict detection (spec.md §4.4).
//!
//! Grounded in `examples/original_source/edit.go`'s `editBuilder`: a
//! recursive walk over the `<config>` tree collecting every element that
//! carries an `operation` attribute in the base-1.1 namespace. That walk
//! is schema-driven there (`OnChild`/`OnNext`/`OnField` hooks from a YANG
//! browser); ours walks the raw XML tree directly since `memstore`
//! doesn't compile YANG schemas, treating any element whose first child
//! is a leaf-only node as a list entry keyed on that leaf's text
//! (matching the worked example in spec.md §8: `<tire><pos>0</pos>...`
//! yields path `tire=0`, even though there is only one `<tire>` in that
//! particular document).

use crate::message::request::EditDefaultOperation;
use crate::message::response::RpcError;
use crate::message::XmlElement;
use crate::NETCONF_URN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub local: String,
    pub key: Option<String>,
}

impl PathSegment {
    pub fn to_path_string(&self) -> String {
        match &self.key {
            Some(key) => format!("{}={}", self.local, key),
            None => self.local.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOperation {
    Merge,
    Replace,
    Create,
    Remove,
    Delete,
}

impl EditOperation {
    fn parse(value: &str) -> Option<EditOperation> {
        match value {
            "merge" => Some(EditOperation::Merge),
            "replace" => Some(EditOperation::Replace),
            "create" => Some(EditOperation::Create),
            "remove" => Some(EditOperation::Remove),
            "delete" => Some(EditOperation::Delete),
            _ => None,
        }
    }

    fn from_default(default: EditDefaultOperation) -> EditOperation {
        match default {
            EditDefaultOperation::Merge => EditOperation::Merge,
            EditDefaultOperation::Replace => EditOperation::Replace,
            EditDefaultOperation::None => EditOperation::Merge,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EditEntry {
    pub path: Vec<PathSegment>,
    pub op: EditOperation,
    pub payload: XmlElement,
}

impl EditEntry {
    pub fn path_string(&self) -> String {
        self.path
            .iter()
            .map(PathSegment::to_path_string)
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walks `config`, collecting every `operation`-bearing element into an
/// ordered [`EditEntry`] list, then rejects the whole request if any
/// edit's path is a (component-wise, not string) strict prefix of a
/// later edit's path (spec.md §4.4, "Edit conflict detection"; §8).
pub fn collect_edits(
    config: &XmlElement,
    default_operation: EditDefaultOperation,
) -> Result<Vec<EditEntry>, RpcError> {
    let mut edits = Vec::new();
    let mut path = Vec::new();
    walk(config, &mut path, &mut edits)?;

    if edits.is_empty() {
        edits.push(EditEntry {
            path: Vec::new(),
            op: EditOperation::from_default(default_operation),
            payload: config.clone(),
        });
        return Ok(edits);
    }

    for earlier in 0..edits.len() {
        for later in (earlier + 1)..edits.len() {
            if is_strict_prefix(&edits[earlier].path, &edits[later].path) {
                let path = edits[later].path_string();
                return Err(RpcError::data_conflict(path));
            }
        }
    }

    Ok(edits)
}

fn is_strict_prefix(a: &[PathSegment], b: &[PathSegment]) -> bool {
    a.len() < b.len() && a == &b[..a.len()]
}

/// List-entry key heuristic shared with `memstore`'s navigation: the
/// first leaf-only child's text value, matching the worked example in
/// spec.md §8 (`<tire><pos>0</pos>...</tire>` keys on `"0"`).
pub(crate) fn key_of(elem: &XmlElement) -> Option<String> {
    let first = elem.children.first()?;
    if first.children.is_empty() && !first.trimmed_text().is_empty() {
        Some(first.trimmed_text().to_string())
    } else {
        None
    }
}

fn walk(elem: &XmlElement, path: &mut Vec<PathSegment>, edits: &mut Vec<EditEntry>) -> Result<(), RpcError> {
    for child in &elem.children {
        path.push(PathSegment {
            local: child.name.local.clone(),
            key: key_of(child),
        });

        match child.attr_ns(NETCONF_URN, "operation") {
            Some(op_value) => {
                let op = EditOperation::parse(op_value)
                    .ok_or_else(|| RpcError::bad_element(format!("operation={op_value:?}")))?;
                edits.push(EditEntry {
                    path: path.clone(),
                    op,
                    payload: child.clone(),
                });
            }
            None => {
                walk(child, path, edits)?;
            }
        }

        path.pop();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::response::ErrorTag;
    use pretty_assertions::assert_eq;

    #[test]
    fn collects_two_edits_in_document_order() {
        let xml = format!(
            r#"<car xmlns:nc="{ns}">
                <tire><pos>0</pos><size nc:operation="delete">16</size></tire>
                <speed nc:operation="merge">10</speed>
            </car>"#,
            ns = NETCONF_URN
        );
        let config = XmlElement::parse(&xml).unwrap();
        let edits = collect_edits(&config, EditDefaultOperation::Merge).unwrap();
        assert_eq!(edits.len(), 2);
        assert_eq!(edits[0].path_string(), "tire=0/size");
        assert_eq!(edits[0].op, EditOperation::Delete);
        assert_eq!(edits[1].path_string(), "speed");
        assert_eq!(edits[1].op, EditOperation::Merge);
    }

    #[test]
    fn conflicting_edits_are_rejected() {
        let xml = format!(
            r#"<root xmlns:nc="{ns}">
                <a nc:operation="merge"><b nc:operation="replace">x</b></a>
            </root>"#,
            ns = NETCONF_URN
        );
        let config = XmlElement::parse(&xml).unwrap();
        let err = collect_edits(&config, EditDefaultOperation::Merge).unwrap_err();
        assert_eq!(err.error_tag, ErrorTag::OperationFailed);
    }

    #[test]
    fn absent_operation_attribute_yields_single_default_edit() {
        let xml = r#"<car><speed>10</speed></car>"#;
        let config = XmlElement::parse(xml).unwrap();
        let edits = collect_edits(&config, EditDefaultOperation::Replace).unwrap();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].path.is_empty());
        assert_eq!(edits[0].op, EditOperation::Replace);
    }

    #[test]
    fn explicit_attr_helper_finds_namespaced_attribute() {
        let elem = XmlElement::parse(&format!(
            r#"<size xmlns:nc="{ns}" nc:operation="delete">16</size>"#,
            ns = NETCONF_URN
        ))
        .unwrap();
        assert_eq!(elem.attr_ns(NETCONF_URN, "operation"), Some("delete"));
    }
}
