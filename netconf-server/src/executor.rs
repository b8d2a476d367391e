//! RPC dispatch (spec.md §4.4): turns a decoded [`RpcRequest`] into
//! either a reply to write back on the session's frame, or one of the
//! session-level effects (`close-session`, `kill-session`,
//! `create-subscription`) that the session state machine (`session.rs`)
//! has to act on beyond just writing a reply.
//!
//! Grounded in `original_source/msgs.go`'s `handleRPC`/`dispatchRPC`
//! dispatch table, adapted to return a value the session drives instead
//! of writing to a connection itself — this executor never touches I/O.

use crate::datastore::{ContentKind, Datastore, ModuleDescriptor};
use crate::edit::{collect_edits, EditOperation};
use crate::filter::Filter;
use crate::message::request::{Datastore as TargetDatastore, EditDefaultOperation, FilterKind, RawFilter, TestOption};
use crate::message::{response::ErrorInfo, QName, RpcBody, RpcError, RpcReply, RpcRequest};
use crate::stream::{StreamService, SubscriptionHandle};
use std::sync::Arc;

/// What the session must do after an RPC has been executed. Every
/// variant still carries the reply to write; `Close`/`Kill`/`Subscribe`
/// additionally tell the session to change state once that reply has
/// gone out (spec.md §4.5, "close-session"/"kill-session").
pub enum ExecutorOutcome {
    Reply(RpcReply),
    Close(RpcReply),
    Kill(RpcReply, u64),
    Subscribe(RpcReply, Box<dyn SubscriptionHandle>),
}

impl ExecutorOutcome {
    /// The reply every outcome carries, regardless of session-level
    /// effect — convenient for callers that only care about the wire
    /// frame and let the session match on the rest.
    pub fn reply(&self) -> &RpcReply {
        match self {
            ExecutorOutcome::Reply(reply)
            | ExecutorOutcome::Close(reply)
            | ExecutorOutcome::Kill(reply, _)
            | ExecutorOutcome::Subscribe(reply, _) => reply,
        }
    }
}

pub struct Executor {
    datastore: Arc<dyn Datastore>,
    stream_service: Arc<dyn StreamService>,
}

impl Executor {
    pub fn new(datastore: Arc<dyn Datastore>, stream_service: Arc<dyn StreamService>) -> Self {
        Executor {
            datastore,
            stream_service,
        }
    }

    pub fn handle(&self, request: RpcRequest) -> ExecutorOutcome {
        let RpcRequest {
            message_id,
            extra_attrs,
            body,
        } = request;

        let result = match body {
            RpcBody::GetConfig { filter, .. } => self.get(ContentKind::Config, filter),
            RpcBody::Get { filter } => self.get(ContentKind::Operational, filter),
            RpcBody::EditConfig {
                default_operation,
                test_option,
                config,
                ..
            } => self.edit_config(default_operation, test_option, &config),
            RpcBody::CopyConfig { .. } => Err(vec![RpcError::operation_not_supported(
                "copy-config between datastores",
            )]),
            RpcBody::DeleteConfig { target } => self.delete_config(target),
            RpcBody::CloseSession => {
                return ExecutorOutcome::Close(RpcReply::ok(message_id, extra_attrs));
            }
            RpcBody::KillSession { session_id } => {
                return ExecutorOutcome::Kill(RpcReply::ok(message_id, extra_attrs), session_id);
            }
            RpcBody::CreateSubscription { stream, filter } => {
                return self.create_subscription(message_id, extra_attrs, stream, filter);
            }
            RpcBody::Action { element } => self.action(&element),
            RpcBody::Malformed { reason } => Err(vec![RpcError::bad_element(reason)]),
        };

        let reply = match result {
            Ok(body) => RpcReply {
                message_id,
                extra_attrs,
                body,
            },
            Err(errors) => RpcReply::error(message_id, extra_attrs, errors),
        };
        ExecutorOutcome::Reply(reply)
    }

    fn module_for(&self, namespace: Option<&str>) -> Result<(ModuleDescriptor, Arc<dyn Datastore>), Vec<RpcError>> {
        let modules = self.datastore.modules();
        let descriptor = match namespace {
            Some(ns) => modules.into_iter().find(|m| m.namespace == ns),
            None => modules.into_iter().next(),
        };
        descriptor
            .map(|d| (d, self.datastore.clone()))
            .ok_or_else(|| vec![RpcError::operation_not_supported("no datastore module registered")])
    }

    /// spec.md §4.4: a nil/absent `<filter>` means "return everything
    /// across all modules"; a present but empty `<filter/>` means
    /// "return nothing" — distinct from an absent one, and distinct from
    /// `Filter::compile`'s own notion of an empty *component list* deep
    /// inside a non-empty filter tree, which still selects everything
    /// below that point.
    fn compile_filter(raw: &Option<RawFilter>) -> Result<Filter, Vec<RpcError>> {
        match raw {
            None => Ok(Filter::SelectAll),
            Some(raw) if raw.kind == FilterKind::Xpath => {
                Err(vec![RpcError::operation_not_supported("xpath filters")])
            }
            Some(raw) if raw.element.children.is_empty() => Ok(Filter::SelectNone),
            Some(raw) => Ok(Filter::compile(&raw.element)),
        }
    }

    /// `get`/`get-config` (spec.md §4.4): every registered module
    /// contributes its root element, filtered, as a sibling under
    /// `<data>`. Simplification versus real NETCONF: `get-config` reads
    /// only `ContentKind::Config` and `get` only `ContentKind::Operational`,
    /// rather than real NETCONF's config+state merge for `<get>`.
    fn get(
        &self,
        kind: ContentKind,
        raw_filter: Option<RawFilter>,
    ) -> Result<crate::message::RpcReplyBody, Vec<RpcError>> {
        let filter = Self::compile_filter(&raw_filter)?;
        let mut data = Vec::new();
        for descriptor in self.datastore.modules() {
            let browser = self
                .datastore
                .browser(&descriptor.name)
                .map_err(|err| vec![RpcError::operation_not_supported(err.to_string())])?;
            let root = browser.root(kind);
            let module_qname = QName::qualified(descriptor.namespace.clone(), descriptor.name.clone());
            let (included, root_filter) = filter.selected(&module_qname);
            if !included {
                continue;
            }
            let serialized = root
                .serialize(&root_filter)
                .map_err(|err| vec![RpcError::operation_not_supported(err.to_string())])?;
            data.push(serialized);
        }
        Ok(crate::message::RpcReplyBody::Data(data))
    }

    /// `edit-config` (spec.md §4.4): collect every edit in document
    /// order, reject the whole request on a path conflict, then apply
    /// every edit against the target module atomically
    /// (collect-then-validate-then-apply, never short-circuiting after
    /// the first successful edit — the Open Question this crate commits
    /// to fixing).
    fn edit_config(
        &self,
        default_operation: EditDefaultOperation,
        test_option: TestOption,
        config: &crate::message::XmlElement,
    ) -> Result<crate::message::RpcReplyBody, Vec<RpcError>> {
        if test_option == TestOption::TestOnly {
            return Ok(crate::message::RpcReplyBody::Ok);
        }
        let edits = collect_edits(config, default_operation).map_err(|err| vec![err])?;
        let (descriptor, datastore) = self.module_for(config.name.ns.as_deref())?;
        let browser = datastore
            .browser(&descriptor.name)
            .map_err(|err| vec![RpcError::operation_not_supported(err.to_string())])?;

        for entry in &edits {
            let mut selection = browser.root(ContentKind::Config);
            let parent_path = if entry.path.is_empty() {
                &entry.path[..]
            } else {
                &entry.path[..entry.path.len() - 1]
            };
            if !entry.path.is_empty() {
                selection = selection
                    .find(parent_path)
                    .map_err(|err| vec![RpcError::operation_not_supported(err.to_string())])?
                    .ok_or_else(|| vec![RpcError::data_missing(entry.path_string())])?;
            }

            let outcome = match entry.op {
                EditOperation::Merge => selection.upsert_from(&entry.payload),
                EditOperation::Replace => selection.replace_from(&entry.payload),
                EditOperation::Create => selection.insert_from(&entry.payload).and_then(|inserted| {
                    if inserted {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("data-exists"))
                    }
                }),
                EditOperation::Delete => selection.delete().and_then(|existed| {
                    if existed {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("data-missing"))
                    }
                }),
                EditOperation::Remove => {
                    selection.delete().map(|_| ())
                }
            };

            if let Err(err) = outcome {
                let tag_error = match entry.op {
                    EditOperation::Delete => RpcError::data_missing(entry.path_string()),
                    EditOperation::Create => RpcError::new(
                        crate::message::response::ErrorType::App,
                        crate::message::response::ErrorTag::DataExists,
                    )
                    .with_path(entry.path_string())
                    .with_message(err.to_string()),
                    _ => RpcError::operation_not_supported(err.to_string()),
                };
                return Err(vec![tag_error]);
            }
        }
        Ok(crate::message::RpcReplyBody::Ok)
    }

    fn delete_config(&self, target: TargetDatastore) -> Result<crate::message::RpcReplyBody, Vec<RpcError>> {
        if target == TargetDatastore::Running {
            return Err(vec![RpcError::operation_not_supported(
                "deleting the running datastore",
            )]);
        }
        Ok(crate::message::RpcReplyBody::Ok)
    }

    /// Action dispatch (spec.md §4.2, "unknown child elements ... MUST
    /// be treated as an Action"): the element's namespace picks the
    /// module, the element's local name and children are handed to
    /// [`crate::datastore::Selection::action`] wholesale.
    fn action(&self, element: &crate::message::XmlElement) -> Result<crate::message::RpcReplyBody, Vec<RpcError>> {
        let (descriptor, datastore) = self.module_for(element.name.ns.as_deref())?;
        let browser = datastore
            .browser(&descriptor.name)
            .map_err(|err| vec![RpcError::operation_not_supported(err.to_string())])?;
        let mut root = browser.root(ContentKind::Operational);
        let output = root
            .action(element)
            .map_err(|err| vec![RpcError::operation_not_supported(err.to_string())])?;
        match output {
            Some(output) => Ok(crate::message::RpcReplyBody::Output(output)),
            None => Ok(crate::message::RpcReplyBody::Ok),
        }
    }

    fn create_subscription(
        &self,
        message_id: String,
        extra_attrs: Vec<(crate::message::QName, String)>,
        stream: Option<String>,
        raw_filter: Option<RawFilter>,
    ) -> ExecutorOutcome {
        let filter = match Self::compile_filter(&raw_filter) {
            Ok(filter) => filter,
            Err(errors) => return ExecutorOutcome::Reply(RpcReply::error(message_id, extra_attrs, errors)),
        };
        match self
            .stream_service
            .establish_subscription(stream.as_deref(), Some(filter))
        {
            Ok(handle) => {
                ExecutorOutcome::Subscribe(RpcReply::ok(message_id, extra_attrs), handle)
            }
            Err(err) => ExecutorOutcome::Reply(RpcReply::error(
                message_id,
                extra_attrs,
                vec![RpcError::operation_not_supported(err.to_string())
                    .with_info(ErrorInfo::default())],
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemDatastore;
    use crate::message::request::{FilterKind, RawFilter};
    use crate::message::{QName, RpcBody, RpcReplyBody, XmlElement};
    use crate::stream::BroadcastStreamService;
    use pretty_assertions::assert_eq;

    fn executor_with_users() -> Executor {
        let mut store = MemDatastore::new();
        let config = XmlElement::parse(
            r#"<top>
                <users>
                    <user><name>fred</name><role>admin</role></user>
                </users>
            </top>"#,
        )
        .unwrap();
        let operational = XmlElement::new(QName::local("top"));
        store.register_module("top", "urn:example:users", config, operational);
        Executor::new(Arc::new(store), Arc::new(BroadcastStreamService::new()))
    }

    fn request(body: RpcBody) -> RpcRequest {
        RpcRequest {
            message_id: "1".to_string(),
            extra_attrs: Vec::new(),
            body,
        }
    }

    #[test]
    fn get_config_returns_datastore_contents() {
        let executor = executor_with_users();
        let outcome = executor.handle(request(RpcBody::GetConfig {
            source: TargetDatastore::Running,
            filter: None,
        }));
        match outcome.reply().body {
            RpcReplyBody::Data(ref data) => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].child("users").unwrap().children.len(), 1);
            }
            ref other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn get_config_applies_subtree_filter() {
        let executor = executor_with_users();
        let filter_elem =
            XmlElement::parse(r#"<filter><top><users><user><name>fred</name></user></users></top></filter>"#)
                .unwrap();
        let outcome = executor.handle(request(RpcBody::GetConfig {
            source: TargetDatastore::Running,
            filter: Some(RawFilter {
                kind: FilterKind::Subtree,
                element: filter_elem,
            }),
        }));
        match outcome.reply().body {
            RpcReplyBody::Data(ref data) => {
                let users = data[0].child("users").unwrap();
                assert_eq!(users.children.len(), 1);
            }
            ref other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn empty_filter_element_selects_no_modules() {
        let executor = executor_with_users();
        let filter_elem = XmlElement::parse(r#"<filter/>"#).unwrap();
        let outcome = executor.handle(request(RpcBody::GetConfig {
            source: TargetDatastore::Running,
            filter: Some(RawFilter {
                kind: FilterKind::Subtree,
                element: filter_elem,
            }),
        }));
        match outcome.reply().body {
            RpcReplyBody::Data(ref data) => assert!(data.is_empty()),
            ref other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn edit_config_merges_new_user() {
        let executor = executor_with_users();
        let config = XmlElement::parse(
            r#"<top xmlns="urn:example:users"><users><user><name>barney</name><role>viewer</role></user></users></top>"#,
        )
        .unwrap();
        let outcome = executor.handle(request(RpcBody::EditConfig {
            target: TargetDatastore::Running,
            default_operation: EditDefaultOperation::Merge,
            test_option: TestOption::Set,
            error_option: crate::message::request::ErrorOption::StopOnError,
            config,
        }));
        assert!(matches!(outcome.reply().body, RpcReplyBody::Ok));

        let check = executor.handle(request(RpcBody::GetConfig {
            source: TargetDatastore::Running,
            filter: None,
        }));
        match check.reply().body {
            RpcReplyBody::Data(ref data) => {
                assert_eq!(data[0].child("users").unwrap().children.len(), 2);
            }
            ref other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn close_session_outcome_carries_ok_reply_and_closes() {
        let executor = executor_with_users();
        let outcome = executor.handle(request(RpcBody::CloseSession));
        assert!(matches!(outcome, ExecutorOutcome::Close(_)));
    }

    #[test]
    fn kill_session_outcome_carries_target_session_id() {
        let executor = executor_with_users();
        let outcome = executor.handle(request(RpcBody::KillSession { session_id: 7 }));
        match outcome {
            ExecutorOutcome::Kill(_, session_id) => assert_eq!(session_id, 7),
            _ => panic!("expected Kill outcome"),
        }
    }

    #[test]
    fn create_subscription_outcome_carries_handle() {
        let executor = executor_with_users();
        let outcome = executor.handle(request(RpcBody::CreateSubscription {
            stream: None,
            filter: None,
        }));
        assert!(matches!(outcome, ExecutorOutcome::Subscribe(_, _)));
    }
}
