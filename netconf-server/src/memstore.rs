//! An in-memory reference [`Datastore`] implementation. Not a YANG
//! engine: modules are registered by hand with a config and an
//! operational root element, and list-entry identity uses the same
//! first-leaf-child heuristic `edit.rs` uses to build edit paths. This
//! exists to exercise `executor.rs` and `filter.rs` end to end in tests
//! and to back the `netconf-serverd` demo binary.

use crate::datastore::{Browser, ContentKind, Datastore, ModuleDescriptor, Selection};
use crate::edit::{key_of, PathSegment};
use crate::filter::Filter;
use crate::message::XmlElement;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct ModuleTree {
    config: XmlElement,
    operational: XmlElement,
}

pub struct MemDatastore {
    descriptors: Vec<ModuleDescriptor>,
    trees: HashMap<String, Arc<Mutex<ModuleTree>>>,
}

impl MemDatastore {
    pub fn new() -> Self {
        MemDatastore {
            descriptors: Vec::new(),
            trees: HashMap::new(),
        }
    }

    pub fn register_module(
        &mut self,
        name: impl Into<String>,
        namespace: impl Into<String>,
        config_root: XmlElement,
        operational_root: XmlElement,
    ) {
        let name = name.into();
        self.descriptors.push(ModuleDescriptor {
            name: name.clone(),
            namespace: namespace.into(),
        });
        self.trees.insert(
            name,
            Arc::new(Mutex::new(ModuleTree {
                config: config_root,
                operational: operational_root,
            })),
        );
    }
}

impl Default for MemDatastore {
    fn default() -> Self {
        MemDatastore::new()
    }
}

impl Datastore for MemDatastore {
    fn modules(&self) -> Vec<ModuleDescriptor> {
        self.descriptors.clone()
    }

    fn browser(&self, module: &str) -> Result<Box<dyn Browser>> {
        let tree = self
            .trees
            .get(module)
            .ok_or_else(|| anyhow!("no such module {module:?}"))?
            .clone();
        Ok(Box::new(MemBrowser { tree }))
    }
}

struct MemBrowser {
    tree: Arc<Mutex<ModuleTree>>,
}

impl Browser for MemBrowser {
    fn root(&self, kind: ContentKind) -> Box<dyn Selection> {
        Box::new(MemSelection {
            tree: self.tree.clone(),
            kind,
            path: Vec::new(),
        })
    }
}

struct MemSelection {
    tree: Arc<Mutex<ModuleTree>>,
    kind: ContentKind,
    path: Vec<PathSegment>,
}

fn root_of(tree: &ModuleTree, kind: ContentKind) -> &XmlElement {
    match kind {
        ContentKind::Config => &tree.config,
        ContentKind::Operational => &tree.operational,
    }
}

fn root_of_mut(tree: &mut ModuleTree, kind: ContentKind) -> &mut XmlElement {
    match kind {
        ContentKind::Config => &mut tree.config,
        ContentKind::Operational => &mut tree.operational,
    }
}

fn matches_key(elem: &XmlElement, key: &Option<String>) -> bool {
    match key {
        None => true,
        Some(expected) => key_of(elem).as_deref() == Some(expected.as_str()),
    }
}

fn navigate<'a>(mut current: &'a XmlElement, path: &[PathSegment]) -> Option<&'a XmlElement> {
    for segment in path {
        current = current
            .children
            .iter()
            .find(|child| child.name.local == segment.local && matches_key(child, &segment.key))?;
    }
    Some(current)
}

fn navigate_mut<'a>(
    mut current: &'a mut XmlElement,
    path: &[PathSegment],
) -> Option<&'a mut XmlElement> {
    for segment in path {
        let index = current
            .children
            .iter()
            .position(|child| child.name.local == segment.local && matches_key(child, &segment.key))?;
        current = &mut current.children[index];
    }
    Some(current)
}

fn merge_into(target: &mut XmlElement, src: &XmlElement) {
    if src.children.is_empty() {
        target.text = src.text.clone();
        return;
    }
    for src_child in &src.children {
        let key = key_of(src_child);
        let existing = target
            .children
            .iter_mut()
            .find(|c| c.name.local == src_child.name.local && matches_key(c, &key));
        match existing {
            Some(existing) => merge_into(existing, src_child),
            None => target.children.push(src_child.clone()),
        }
    }
}

/// Applies `filter` while copying a subtree (spec.md §4.3, "Evaluation"):
/// folds the container/field pre-checks and the list post-check into one
/// recursive pass, since this reference store has no separate traversal
/// engine to install callbacks on.
fn serialize_with_filter(elem: &XmlElement, filter: &Filter) -> XmlElement {
    let mut out = XmlElement::new(elem.name.clone());
    out.attrs = elem.attrs.clone();
    out.text = elem.text.clone();
    for child in &elem.children {
        let (included, child_filter) = filter.selected(&child.name);
        if !included {
            continue;
        }
        let matches = child_filter.list_entry_matches(|field| {
            child.child(field).map(|leaf| leaf.trimmed_text().to_string())
        });
        if !matches {
            continue;
        }
        out.children.push(serialize_with_filter(child, &child_filter));
    }
    out
}

impl Selection for MemSelection {
    fn find(&self, path: &[PathSegment]) -> Result<Option<Box<dyn Selection>>> {
        let tree = self.tree.lock().expect("datastore mutex poisoned");
        let root = root_of(&tree, self.kind);
        let mut full_path = self.path.clone();
        full_path.extend_from_slice(path);
        Ok(navigate(root, &full_path).map(|_| {
            Box::new(MemSelection {
                tree: self.tree.clone(),
                kind: self.kind,
                path: full_path,
            }) as Box<dyn Selection>
        }))
    }

    fn serialize(&self, filter: &Filter) -> Result<XmlElement> {
        let tree = self.tree.lock().expect("datastore mutex poisoned");
        let root = root_of(&tree, self.kind);
        let node = navigate(root, &self.path).ok_or_else(|| anyhow!("selection no longer exists"))?;
        Ok(serialize_with_filter(node, filter))
    }

    fn upsert_from(&mut self, src: &XmlElement) -> Result<()> {
        let mut tree = self.tree.lock().expect("datastore mutex poisoned");
        let root = root_of_mut(&mut tree, self.kind);
        let node =
            navigate_mut(root, &self.path).ok_or_else(|| anyhow!("selection no longer exists"))?;
        merge_into(node, src);
        Ok(())
    }

    fn replace_from(&mut self, src: &XmlElement) -> Result<()> {
        let mut tree = self.tree.lock().expect("datastore mutex poisoned");
        let root = root_of_mut(&mut tree, self.kind);
        let node =
            navigate_mut(root, &self.path).ok_or_else(|| anyhow!("selection no longer exists"))?;
        node.attrs = src.attrs.clone();
        node.text = src.text.clone();
        node.children = src.children.clone();
        Ok(())
    }

    fn insert_from(&mut self, src: &XmlElement) -> Result<bool> {
        let mut tree = self.tree.lock().expect("datastore mutex poisoned");
        let root = root_of_mut(&mut tree, self.kind);
        let parent =
            navigate_mut(root, &self.path).ok_or_else(|| anyhow!("selection no longer exists"))?;
        let key = key_of(src);
        let exists = parent
            .children
            .iter()
            .any(|c| c.name.local == src.name.local && matches_key(c, &key));
        if exists {
            return Ok(false);
        }
        parent.children.push(src.clone());
        Ok(true)
    }

    fn delete(&mut self) -> Result<bool> {
        if self.path.is_empty() {
            return Err(anyhow!("cannot delete the datastore root"));
        }
        let mut tree = self.tree.lock().expect("datastore mutex poisoned");
        let root = root_of_mut(&mut tree, self.kind);
        let parent_path = &self.path[..self.path.len() - 1];
        let last = &self.path[self.path.len() - 1];
        let parent =
            navigate_mut(root, parent_path).ok_or_else(|| anyhow!("selection no longer exists"))?;
        let index = parent
            .children
            .iter()
            .position(|c| c.name.local == last.local && matches_key(c, &last.key));
        match index {
            Some(index) => {
                parent.children.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn action(&mut self, _input: &XmlElement) -> Result<Option<XmlElement>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::QName;
    use pretty_assertions::assert_eq;

    fn users_module() -> MemDatastore {
        let mut store = MemDatastore::new();
        let config = XmlElement::parse(
            r#"<top>
                <users>
                    <user><name>root</name><role>superuser</role></user>
                    <user><name>fred</name><role>admin</role></user>
                    <user><name>barney</name><role>admin</role></user>
                </users>
            </top>"#,
        )
        .unwrap();
        let operational = XmlElement::new(QName::local("top"));
        store.register_module("top", "urn:example:users", config, operational);
        store
    }

    #[test]
    fn filter_selects_single_user_by_name() {
        let store = users_module();
        let browser = store.browser("top").unwrap();
        let root = browser.root(ContentKind::Config);
        let filter_xml =
            r#"<filter><top><users><user><name>fred</name></user></users></top></filter>"#;
        let filter_elem = XmlElement::parse(filter_xml).unwrap();
        let filter = Filter::compile(&filter_elem);
        // `root` here already denotes the "top" module element, so the
        // installed filter is the one `top` resolves to, same as the
        // executor does for each top-level selection (spec.md §4.4).
        let (_, top_filter) = filter.selected(&QName::local("top"));
        let serialized = root.serialize(&top_filter).unwrap();
        let users = serialized.child("users").unwrap();
        assert_eq!(users.children.len(), 1);
        assert_eq!(users.children[0].child("name").unwrap().trimmed_text(), "fred");
        assert_eq!(
            users.children[0].child("role").unwrap().trimmed_text(),
            "admin"
        );
    }

    #[test]
    fn filter_emits_only_name_leaf_for_every_user() {
        let store = users_module();
        let browser = store.browser("top").unwrap();
        let root = browser.root(ContentKind::Config);
        let filter_xml = r#"<filter><top><users><user><name/></user></users></top></filter>"#;
        let filter_elem = XmlElement::parse(filter_xml).unwrap();
        let filter = Filter::compile(&filter_elem);
        let (_, top_filter) = filter.selected(&QName::local("top"));
        let serialized = root.serialize(&top_filter).unwrap();
        let users = serialized.child("users").unwrap();
        assert_eq!(users.children.len(), 3);
        for user in &users.children {
            assert!(user.child("name").is_some());
            assert!(user.child("role").is_none());
        }
    }

    #[test]
    fn insert_from_fails_when_entry_already_exists() {
        let store = users_module();
        let browser = store.browser("top").unwrap();
        let root = browser.root(ContentKind::Config);
        let mut users = root
            .find(&[PathSegment {
                local: "users".to_string(),
                key: None,
            }])
            .unwrap()
            .unwrap();
        let duplicate =
            XmlElement::parse("<user><name>fred</name><role>admin</role></user>").unwrap();
        assert!(!users.insert_from(&duplicate).unwrap());
        let new_user =
            XmlElement::parse("<user><name>wilma</name><role>viewer</role></user>").unwrap();
        assert!(users.insert_from(&new_user).unwrap());
    }
}
