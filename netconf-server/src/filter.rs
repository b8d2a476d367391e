//! RFC 6241 §6 subtree filter compiler and evaluator (spec.md §4.3).
//!
//! Grounded in `examples/original_source/filter.go` and its near-duplicate
//! `subtree.go`: both implement this same compiler/evaluator pair against
//! a `context.Context`-threaded "current filter". SPEC_FULL.md §4.3
//! collapses the duplication into one implementation and threads the
//! current filter as an explicit value (Design Note, spec.md §9) instead
//! of through a context map.
//!
//! The sentinel values from the Go source (`filterSelectNone`, an
//! identity-compared singleton) become a tagged enum here, per spec.md's
//! explicit preference for that shape "in a systems language".

use crate::message::{QName, XmlElement};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The default/empty filter: every descendant is included.
    SelectAll,
    /// A pruned branch: nothing below this point is included.
    SelectNone,
    Compiled {
        /// Keyed by qualified name (spec.md §3: "containment map keys
        /// use the qualified name"), since two modules can share a local
        /// element name in different namespaces.
        containment: HashMap<QName, Filter>,
        /// Local names only (spec.md §3: "selection and matching use
        /// local names during evaluation") — datastore field identifiers
        /// are unqualified within a module.
        selection: Vec<String>,
        matching: Vec<(String, String)>,
    },
}

impl Default for Filter {
    fn default() -> Self {
        Filter::SelectAll
    }
}

impl Filter {
    /// Compiles a `<filter>` element's children into a [`Filter`]
    /// (spec.md §4.3, "Compilation"). An empty filter (no children)
    /// compiles to [`Filter::SelectAll`].
    pub fn compile(filter_element: &XmlElement) -> Filter {
        let mut containment = HashMap::new();
        let mut selection = Vec::new();
        let mut matching = Vec::new();
        for child in &filter_element.children {
            compile_component(child, &mut containment, &mut selection, &mut matching);
        }
        finish(containment, selection, matching)
    }

    pub fn is_select_all(&self) -> bool {
        matches!(self, Filter::SelectAll)
    }

    /// `selected(filter, name)` from spec.md §4.3: returns whether
    /// `name` is included and the filter that should govern its
    /// subtree, in the priority order the spec lists. Containment is
    /// resolved by the full qualified name; selection and matching only
    /// ever compare `name.local` (spec.md §3).
    pub fn selected(&self, name: &QName) -> (bool, Filter) {
        match self {
            Filter::SelectNone => (false, Filter::SelectNone),
            Filter::SelectAll => (true, Filter::SelectAll),
            Filter::Compiled {
                containment,
                selection,
                matching,
            } => {
                if let Some(child) = containment.get(name) {
                    return (true, child.clone());
                }
                if selection.iter().any(|s| s == &name.local) {
                    return (true, Filter::SelectAll);
                }
                if matching.iter().any(|(field, _)| field == &name.local) {
                    return (true, self.clone());
                }
                (false, Filter::SelectNone)
            }
        }
    }

    /// List post-check (spec.md §4.3 step 3): every matching predicate on
    /// this filter must hold against the materialized entry. `lookup`
    /// reads a leaf's string value out of that entry by local name.
    pub fn list_entry_matches(&self, lookup: impl Fn(&str) -> Option<String>) -> bool {
        let matching = match self {
            Filter::Compiled { matching, .. } => matching.as_slice(),
            _ => return true,
        };
        matching
            .iter()
            .all(|(field, expected)| lookup(field).as_deref() == Some(expected.as_str()))
    }
}

fn finish(
    containment: HashMap<QName, Filter>,
    selection: Vec<String>,
    matching: Vec<(String, String)>,
) -> Filter {
    if containment.is_empty() && selection.is_empty() && matching.is_empty() {
        Filter::SelectAll
    } else {
        Filter::Compiled {
            containment,
            selection,
            matching,
        }
    }
}

fn compile_component(
    elem: &XmlElement,
    containment: &mut HashMap<QName, Filter>,
    selection: &mut Vec<String>,
    matching: &mut Vec<(String, String)>,
) {
    if !elem.children.is_empty() || !elem.attrs.is_empty() {
        let mut child_containment = HashMap::new();
        let mut child_selection = Vec::new();
        let mut child_matching = Vec::new();
        if !elem.attrs.is_empty() {
            for (name, value) in &elem.attrs {
                child_matching.push((name.local.clone(), value.clone()));
            }
        } else {
            for child in &elem.children {
                compile_component(
                    child,
                    &mut child_containment,
                    &mut child_selection,
                    &mut child_matching,
                );
            }
        }
        let child_filter = finish(child_containment, child_selection, child_matching);
        merge_containment(containment, elem.name.clone(), child_filter);
        return;
    }

    let text = elem.trimmed_text();
    if !text.is_empty() {
        matching.push((elem.name.local.clone(), text.to_string()));
        return;
    }
    selection.push(elem.name.local.clone());
}

/// spec.md §4.3: "Sibling entries accumulate; duplicate containment keys
/// merge."
fn merge_containment(containment: &mut HashMap<QName, Filter>, key: QName, incoming: Filter) {
    match containment.remove(&key) {
        None => {
            containment.insert(key, incoming);
        }
        Some(existing) => {
            containment.insert(key, merge_filters(existing, incoming));
        }
    }
}

fn merge_filters(a: Filter, b: Filter) -> Filter {
    match (a, b) {
        (Filter::SelectAll, _) | (_, Filter::SelectAll) => Filter::SelectAll,
        (Filter::SelectNone, other) | (other, Filter::SelectNone) => other,
        (
            Filter::Compiled {
                containment: mut ca,
                selection: mut sa,
                matching: mut ma,
            },
            Filter::Compiled {
                containment: cb,
                selection: sb,
                matching: mb,
            },
        ) => {
            for (key, filter) in cb {
                merge_containment(&mut ca, key, filter);
            }
            sa.extend(sb);
            ma.extend(mb);
            Filter::Compiled {
                containment: ca,
                selection: sa,
                matching: ma,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_filter(xml: &str) -> Filter {
        let elem = XmlElement::parse(xml).unwrap();
        Filter::compile(&elem)
    }

    #[test]
    fn empty_filter_selects_everything() {
        let filter = parse_filter(r#"<filter/>"#);
        assert!(filter.is_select_all());
        assert_eq!(
            filter.selected(&QName::local("anything")),
            (true, Filter::SelectAll)
        );
    }

    #[test]
    fn selection_leaf_yields_select_all_below() {
        let filter = parse_filter(r#"<filter><top><users><user><name/></user></users></top></filter>"#);
        let (ok, top) = filter.selected(&QName::local("top"));
        assert!(ok);
        let (ok, users) = top.selected(&QName::local("users"));
        assert!(ok);
        let (ok, user) = users.selected(&QName::local("user"));
        assert!(ok);
        let (ok, name_filter) = user.selected(&QName::local("name"));
        assert!(ok);
        assert!(name_filter.is_select_all());
        assert_eq!(
            user.selected(&QName::local("age")),
            (false, Filter::SelectNone)
        );
    }

    #[test]
    fn content_match_selects_field_and_keeps_filter_for_matching() {
        let filter = parse_filter(
            r#"<filter><top><users><user><name>fred</name></user></users></top></filter>"#,
        );
        let (_, top) = filter.selected(&QName::local("top"));
        let (_, users) = top.selected(&QName::local("users"));
        let (_, user) = users.selected(&QName::local("user"));
        let (ok, same) = user.selected(&QName::local("name"));
        assert!(ok);
        assert!(same.list_entry_matches(|field| {
            if field == "name" {
                Some("fred".to_string())
            } else {
                None
            }
        }));
        assert!(!same.list_entry_matches(|field| {
            if field == "name" {
                Some("barney".to_string())
            } else {
                None
            }
        }));
    }

    #[test]
    fn attributes_become_matching_on_child_not_self() {
        let elem = XmlElement::parse(
            r#"<filter><user id="fred"/></filter>"#,
        )
        .unwrap();
        let filter = Filter::compile(&elem);
        let (ok, user_filter) = filter.selected(&QName::local("user"));
        assert!(ok);
        match user_filter {
            Filter::Compiled { matching, .. } => {
                assert_eq!(matching, vec![("id".to_string(), "fred".to_string())]);
            }
            other => panic!("expected compiled matching filter, got {other:?}"),
        }
    }

    #[test]
    fn select_none_rejects_every_ident() {
        assert_eq!(
            Filter::SelectNone.selected(&QName::local("x")),
            (false, Filter::SelectNone)
        );
    }

    #[test]
    fn duplicate_containment_keys_merge() {
        let filter = parse_filter(
            r#"<filter><user><name/></user><user><age/></user></filter>"#,
        );
        let (_, user) = filter.selected(&QName::local("user"));
        assert_eq!(user.selected(&QName::local("name")).0, true);
        assert_eq!(user.selected(&QName::local("age")).0, true);
    }
}
