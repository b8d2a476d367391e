use crate::message::xml_element::{QName, XmlElement};
use crate::message::Hello;

/// The three shapes a decoded top-level message can take (spec.md §3,
/// "Request"). `Other` retains the raw element for callers that need to
/// react to something outside the RPC envelope (a bare `<rpc-reply>`
/// would land here too, though clients never send one).
#[derive(Debug, Clone)]
pub enum Request {
    Hello(Hello),
    Rpc(RpcRequest),
    Other(XmlElement),
}

#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub message_id: String,
    /// Attributes on `<rpc>` other than `message-id`, echoed verbatim
    /// onto the reply per spec.md §4.2.
    pub extra_attrs: Vec<(QName, String)>,
    pub body: RpcBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datastore {
    Running,
    Candidate,
    Startup,
}

impl Datastore {
    fn from_local_name(name: &str) -> Result<Datastore, String> {
        match name {
            "running" => Ok(Datastore::Running),
            "candidate" => Ok(Datastore::Candidate),
            "startup" => Ok(Datastore::Startup),
            other => Err(format!("unknown datastore {other:?}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }
}

/// A `<filter>` element kept in raw form at the codec layer; compiling it
/// into containment/selection/matching constraints is `filter::compile`'s
/// job (spec.md §4.3), not the codec's.
#[derive(Debug, Clone)]
pub struct RawFilter {
    pub kind: FilterKind,
    pub element: XmlElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Subtree,
    /// RFC 6241 §6.5; out of scope beyond the shortcode form spec.md's
    /// Open Questions call out. Requests carrying it decode successfully
    /// but the executor rejects them with `operation-not-supported`.
    Xpath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditDefaultOperation {
    Merge,
    Replace,
    None,
}

impl Default for EditDefaultOperation {
    fn default() -> Self {
        EditDefaultOperation::Merge
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOption {
    TestThenSet,
    Set,
    TestOnly,
}

impl Default for TestOption {
    fn default() -> Self {
        TestOption::TestThenSet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOption {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl Default for ErrorOption {
    fn default() -> Self {
        ErrorOption::StopOnError
    }
}

#[derive(Debug, Clone)]
pub enum RpcBody {
    GetConfig {
        source: Datastore,
        filter: Option<RawFilter>,
    },
    Get {
        filter: Option<RawFilter>,
    },
    EditConfig {
        target: Datastore,
        default_operation: EditDefaultOperation,
        test_option: TestOption,
        error_option: ErrorOption,
        config: XmlElement,
    },
    CopyConfig {
        target: Datastore,
        source: Datastore,
    },
    DeleteConfig {
        target: Datastore,
    },
    CloseSession,
    KillSession {
        session_id: u64,
    },
    CreateSubscription {
        stream: Option<String>,
        filter: Option<RawFilter>,
    },
    /// A YANG-declared action or an otherwise-unrecognized `rpc` child,
    /// retained for dynamic dispatch against the datastore (spec.md §4.2,
    /// "unknown child elements ... MUST be treated as an Action").
    Action {
        element: XmlElement,
    },
    /// The operation element didn't match the shape this codec expects
    /// for its own name (e.g. `<get-config>` with no `<source>`). Carries
    /// message-id so the executor can still reply with `bad-element`
    /// instead of tearing the session down (spec.md §7).
    Malformed {
        reason: String,
    },
}

/// Parses one complete top-level XML document into a [`Request`].
pub fn decode(xml: &str) -> Request {
    let elem = match XmlElement::parse(xml) {
        Ok(elem) => elem,
        Err(err) => {
            return Request::Rpc(RpcRequest {
                message_id: "0".to_string(),
                extra_attrs: Vec::new(),
                body: RpcBody::Malformed {
                    reason: err.to_string(),
                },
            })
        }
    };
    match elem.name.local.as_str() {
        "hello" => match Hello::parse_client(xml) {
            Ok(hello) => Request::Hello(hello),
            Err(_) => Request::Other(elem),
        },
        "rpc" => Request::Rpc(decode_rpc(elem)),
        _ => Request::Other(elem),
    }
}

fn decode_rpc(elem: XmlElement) -> RpcRequest {
    let message_id = elem
        .attr("message-id")
        .map(str::to_string)
        .unwrap_or_else(|| "0".to_string());
    let extra_attrs = elem
        .attrs
        .iter()
        .filter(|(name, _)| name.local != "message-id")
        .cloned()
        .collect();

    let body = match elem.children.first() {
        None => RpcBody::Malformed {
            reason: "<rpc> has no operation child".to_string(),
        },
        Some(operation) => decode_operation(operation),
    };

    RpcRequest {
        message_id,
        extra_attrs,
        body,
    }
}

fn decode_operation(operation: &XmlElement) -> RpcBody {
    match operation.name.local.as_str() {
        "get-config" => decode_get_config(operation),
        "get" => RpcBody::Get {
            filter: decode_filter(operation),
        },
        "edit-config" => decode_edit_config(operation),
        "copy-config" => decode_copy_config(operation),
        "delete-config" => decode_delete_config(operation),
        "close-session" => RpcBody::CloseSession,
        "kill-session" => decode_kill_session(operation),
        "create-subscription" => decode_create_subscription(operation),
        _ => RpcBody::Action {
            element: operation.clone(),
        },
    }
}

fn datastore_wrapper(elem: &XmlElement, wrapper: &str) -> Result<Datastore, String> {
    let wrap = elem
        .child(wrapper)
        .ok_or_else(|| format!("missing <{wrapper}>"))?;
    let name = wrap
        .children
        .first()
        .ok_or_else(|| format!("<{wrapper}> names no datastore"))?;
    Datastore::from_local_name(&name.name.local)
}

fn decode_filter(elem: &XmlElement) -> Option<RawFilter> {
    let filter = elem.child("filter")?;
    let kind = match filter.attr("type") {
        Some("xpath") => FilterKind::Xpath,
        _ => FilterKind::Subtree,
    };
    Some(RawFilter {
        kind,
        element: filter.clone(),
    })
}

fn decode_get_config(elem: &XmlElement) -> RpcBody {
    match datastore_wrapper(elem, "source") {
        Ok(source) => RpcBody::GetConfig {
            source,
            filter: decode_filter(elem),
        },
        Err(reason) => RpcBody::Malformed { reason },
    }
}

fn decode_copy_config(elem: &XmlElement) -> RpcBody {
    let target = datastore_wrapper(elem, "target");
    let source = datastore_wrapper(elem, "source");
    match (target, source) {
        (Ok(target), Ok(source)) => RpcBody::CopyConfig { target, source },
        (Err(reason), _) | (_, Err(reason)) => RpcBody::Malformed { reason },
    }
}

fn decode_delete_config(elem: &XmlElement) -> RpcBody {
    match datastore_wrapper(elem, "target") {
        Ok(target) => RpcBody::DeleteConfig { target },
        Err(reason) => RpcBody::Malformed { reason },
    }
}

fn decode_edit_config(elem: &XmlElement) -> RpcBody {
    let target = match datastore_wrapper(elem, "target") {
        Ok(target) => target,
        Err(reason) => return RpcBody::Malformed { reason },
    };
    // `<config>` is only a wrapper; its single child is the module's own
    // top-level data node, which is what the rest of the pipeline (path
    // building, module resolution) operates on.
    let config = match elem.child("config").and_then(|wrapper| wrapper.children.first()) {
        Some(config) => config.clone(),
        None => {
            return RpcBody::Malformed {
                reason: "<edit-config> has no <config> with a top-level data node".to_string(),
            }
        }
    };
    let default_operation = match elem.child("default-operation").map(|e| e.trimmed_text()) {
        Some("replace") => EditDefaultOperation::Replace,
        Some("none") => EditDefaultOperation::None,
        _ => EditDefaultOperation::Merge,
    };
    let test_option = match elem.child("test-option").map(|e| e.trimmed_text()) {
        Some("set") => TestOption::Set,
        Some("test-only") => TestOption::TestOnly,
        _ => TestOption::TestThenSet,
    };
    let error_option = match elem.child("error-option").map(|e| e.trimmed_text()) {
        Some("continue-on-error") => ErrorOption::ContinueOnError,
        Some("rollback-on-error") => ErrorOption::RollbackOnError,
        _ => ErrorOption::StopOnError,
    };
    RpcBody::EditConfig {
        target,
        default_operation,
        test_option,
        error_option,
        config,
    }
}

fn decode_kill_session(elem: &XmlElement) -> RpcBody {
    match elem
        .child("session-id")
        .map(|e| e.trimmed_text())
        .and_then(|text| text.parse::<u64>().ok())
    {
        Some(session_id) => RpcBody::KillSession { session_id },
        None => RpcBody::Malformed {
            reason: "<kill-session> has no numeric <session-id>".to_string(),
        },
    }
}

fn decode_create_subscription(elem: &XmlElement) -> RpcBody {
    RpcBody::CreateSubscription {
        stream: elem.child("stream").map(|e| e.trimmed_text().to_string()),
        filter: decode_filter(elem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_get_config_with_filter() {
        let xml = r#"<rpc message-id="1" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
            <get-config>
                <source><running/></source>
                <filter type="subtree"><top><users/></top></filter>
            </get-config>
        </rpc>"#;
        let request = decode(xml);
        match request {
            Request::Rpc(rpc) => {
                assert_eq!(rpc.message_id, "1");
                match rpc.body {
                    RpcBody::GetConfig { source, filter } => {
                        assert_eq!(source, Datastore::Running);
                        assert!(filter.is_some());
                    }
                    other => panic!("unexpected body: {other:?}"),
                }
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn unknown_operation_becomes_action() {
        let xml = r#"<rpc message-id="2" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
            <reboot xmlns="urn:example:device"><delay>5</delay></reboot>
        </rpc>"#;
        let request = decode(xml);
        match request {
            Request::Rpc(rpc) => match rpc.body {
                RpcBody::Action { element } => assert_eq!(element.name.local, "reboot"),
                other => panic!("unexpected body: {other:?}"),
            },
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn decode_edit_config_unwraps_the_config_element() {
        let xml = r#"<rpc message-id="4" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
            <edit-config>
                <target><running/></target>
                <config><top xmlns="urn:example:users"><users/></top></config>
            </edit-config>
        </rpc>"#;
        let request = decode(xml);
        match request {
            Request::Rpc(rpc) => match rpc.body {
                RpcBody::EditConfig { config, .. } => {
                    assert_eq!(config.name.local, "top");
                    assert_eq!(config.name.ns.as_deref(), Some("urn:example:users"));
                }
                other => panic!("unexpected body: {other:?}"),
            },
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn close_session_has_no_payload() {
        let xml = r#"<rpc message-id="3" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0"><close-session/></rpc>"#;
        let request = decode(xml);
        assert!(matches!(
            request,
            Request::Rpc(RpcRequest {
                body: RpcBody::CloseSession,
                ..
            })
        ));
    }
}
