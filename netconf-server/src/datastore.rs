//! The datastore boundary (spec.md §6, "Datastore boundary";
//! SPEC_FULL.md §6). This crate does not implement a YANG engine: it
//! defines the trait shape the executor (`executor.rs`) needs and ships
//! one in-memory reference implementation (`memstore`) that satisfies it
//! well enough to exercise the RPC executor and subtree filter end to
//! end.
//!
//! Simplification versus SPEC_FULL.md's sketch: the generic
//! `AddConstraint(category, priority, tiebreak, plugin)` registration
//! point collapses into a `Filter` parameter taken directly by
//! [`Selection::serialize`]. With one concrete datastore the extra
//! indirection bought nothing, and spec.md's own Design Note (§9)
//! already prefers threading the current filter as an explicit
//! parameter over any form of global or registered state.

use crate::edit::PathSegment;
use crate::filter::Filter;
use crate::message::XmlElement;
use anyhow::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Config,
    Operational,
}

/// `name` doubles as the module's datastore root ident: the executor
/// resolves a `<filter>`'s top-level containment/selection entries
/// against it before calling [`Selection::serialize`] on that module's
/// root (spec.md §4.3/§4.4), so a registered module's `name` must match
/// the local name of the XML element its `Browser::root` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub name: String,
    pub namespace: String,
}

pub trait Datastore: Send + Sync {
    fn modules(&self) -> Vec<ModuleDescriptor>;
    fn browser(&self, module: &str) -> Result<Box<dyn Browser>>;
}

pub trait Browser: Send {
    fn root(&self, kind: ContentKind) -> Box<dyn Selection>;
}

/// A node in the datastore tree, scoped to one [`ContentKind`]. All
/// traversal, serialization, and mutation happens through a `Selection`.
pub trait Selection: Send {
    /// Resolves a component-wise path (spec.md §4.4, "Edit application")
    /// against this selection.
    fn find(&self, path: &[PathSegment]) -> Result<Option<Box<dyn Selection>>>;

    /// Serializes this selection's subtree, honoring `filter` at every
    /// level (spec.md §4.3, "Evaluation"). The returned element's own
    /// name/namespace come from the selection itself.
    fn serialize(&self, filter: &Filter) -> Result<XmlElement>;

    fn upsert_from(&mut self, src: &XmlElement) -> Result<()>;
    fn replace_from(&mut self, src: &XmlElement) -> Result<()>;
    /// `Ok(false)` if the node already existed (spec.md §4.4: "create ...
    /// fail if the node already exists").
    fn insert_from(&mut self, src: &XmlElement) -> Result<bool>;
    /// `Ok(false)` if nothing was there to delete.
    fn delete(&mut self) -> Result<bool>;
    fn action(&mut self, input: &XmlElement) -> Result<Option<XmlElement>>;
}
