use crate::message::xml_element::{QName, XmlElement};
use crate::{NETCONF_URN, NOTIFICATION_URN};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Mirrors the teacher's `message::Error`/`ErrorType`/`ErrorTag` shape,
/// which the teacher's client already decodes from a server — this
/// server is simply the other producer of the same wire format
/// (SPEC_FULL.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    App,
}

impl ErrorType {
    fn as_str(self) -> &'static str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::App => "app",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Error,
    Warning,
}

impl ErrorSeverity {
    fn as_str(self) -> &'static str {
        match self {
            ErrorSeverity::Error => "error",
            ErrorSeverity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
}

impl ErrorTag {
    fn as_str(self) -> &'static str {
        match self {
            ErrorTag::InUse => "in-use",
            ErrorTag::InvalidValue => "invalid-value",
            ErrorTag::TooBig => "too-big",
            ErrorTag::MissingAttribute => "missing-attribute",
            ErrorTag::BadAttribute => "bad-attribute",
            ErrorTag::UnknownAttribute => "unknown-attribute",
            ErrorTag::MissingElement => "missing-element",
            ErrorTag::BadElement => "bad-element",
            ErrorTag::UnknownElement => "unknown-element",
            ErrorTag::UnknownNamespace => "unknown-namespace",
            ErrorTag::AccessDenied => "access-denied",
            ErrorTag::LockDenied => "lock-denied",
            ErrorTag::ResourceDenied => "resource-denied",
            ErrorTag::RollbackFailed => "rollback-failed",
            ErrorTag::DataExists => "data-exists",
            ErrorTag::DataMissing => "data-missing",
            ErrorTag::OperationNotSupported => "operation-not-supported",
            ErrorTag::OperationFailed => "operation-failed",
            ErrorTag::PartialOperation => "partial-operation",
            ErrorTag::MalformedMessage => "malformed-message",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorInfo {
    pub bad_element: Option<String>,
    pub bad_attribute: Option<String>,
    pub bad_namespace: Option<String>,
    pub ok_element: Option<String>,
    pub err_element: Option<String>,
    pub noop_element: Option<String>,
    pub session_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RpcError {
    pub error_type: ErrorType,
    pub error_tag: ErrorTag,
    pub error_severity: ErrorSeverity,
    pub error_app_tag: Option<String>,
    pub error_path: Option<String>,
    pub error_message: Option<String>,
    pub error_info: Option<ErrorInfo>,
}

impl RpcError {
    pub fn new(error_type: ErrorType, error_tag: ErrorTag) -> Self {
        RpcError {
            error_type,
            error_tag,
            error_severity: ErrorSeverity::Error,
            error_app_tag: None,
            error_path: None,
            error_message: None,
            error_info: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    pub fn with_info(mut self, info: ErrorInfo) -> Self {
        self.error_info = Some(info);
        self
    }

    /// spec.md §7: "xml-decode-error ... otherwise a bad-element reply".
    pub fn bad_element(name: impl Into<String>) -> Self {
        let name = name.into();
        RpcError::new(ErrorType::Rpc, ErrorTag::BadElement)
            .with_message(format!("element {name:?} is not valid in this context"))
            .with_info(ErrorInfo {
                bad_element: Some(name),
                ..Default::default()
            })
    }

    /// spec.md §7: "unknown-operation — operation-not-supported reply".
    pub fn operation_not_supported(what: impl Into<String>) -> Self {
        let what = what.into();
        RpcError::new(ErrorType::Protocol, ErrorTag::OperationNotSupported)
            .with_message(format!("{what} is not supported"))
    }

    /// spec.md §7: "data-missing — emitted by delete on absent nodes".
    pub fn data_missing(path: impl Into<String>) -> Self {
        let path = path.into();
        RpcError::new(ErrorType::App, ErrorTag::DataMissing)
            .with_message(format!("no data exists at {path}"))
            .with_path(path)
    }

    /// spec.md §7: "data-conflict — emitted on edit-path prefix conflicts".
    pub fn data_conflict(path: impl Into<String>) -> Self {
        let path = path.into();
        RpcError::new(ErrorType::App, ErrorTag::OperationFailed)
            .with_message(format!(
                "edit at {path} conflicts with an edit on a containing element"
            ))
            .with_path(path)
    }

    pub fn invalid_value(message: impl Into<String>) -> Self {
        RpcError::new(ErrorType::App, ErrorTag::InvalidValue).with_message(message)
    }

    fn to_xml_element(&self) -> XmlElement {
        let mut elem = XmlElement::new(QName::local("rpc-error"));
        elem.children
            .push(text_child("error-type", self.error_type.as_str()));
        elem.children
            .push(text_child("error-tag", self.error_tag.as_str()));
        elem.children
            .push(text_child("error-severity", self.error_severity.as_str()));
        if let Some(app_tag) = &self.error_app_tag {
            elem.children.push(text_child("error-app-tag", app_tag));
        }
        if let Some(path) = &self.error_path {
            elem.children.push(text_child("error-path", path));
        }
        if let Some(message) = &self.error_message {
            elem.children.push(text_child("error-message", message));
        }
        if let Some(info) = &self.error_info {
            let mut info_elem = XmlElement::new(QName::local("error-info"));
            if let Some(v) = &info.bad_element {
                info_elem.children.push(text_child("bad-element", v));
            }
            if let Some(v) = &info.bad_attribute {
                info_elem.children.push(text_child("bad-attribute", v));
            }
            if let Some(v) = &info.bad_namespace {
                info_elem.children.push(text_child("bad-namespace", v));
            }
            if let Some(v) = &info.ok_element {
                info_elem.children.push(text_child("ok-element", v));
            }
            if let Some(v) = &info.err_element {
                info_elem.children.push(text_child("err-element", v));
            }
            if let Some(v) = &info.noop_element {
                info_elem.children.push(text_child("noop-element", v));
            }
            if let Some(v) = info.session_id {
                info_elem
                    .children
                    .push(text_child("session-id", &v.to_string()));
            }
            elem.children.push(info_elem);
        }
        elem
    }
}

fn text_child(local: &str, text: &str) -> XmlElement {
    let mut elem = XmlElement::new(QName::local(local));
    elem.text = text.to_string();
    elem
}

#[derive(Debug, Clone)]
pub enum RpcReplyBody {
    Ok,
    /// `get`/`get-config` results: each element becomes a child of the
    /// reply's `<data>` wrapper (spec.md §4.4).
    Data(Vec<XmlElement>),
    /// Action output (spec.md §4.4, "Action"); empty means `<ok/>` was
    /// used instead, so this variant is only built when there is output.
    Output(XmlElement),
    Errors(Vec<RpcError>),
}

#[derive(Debug, Clone)]
pub struct RpcReply {
    pub message_id: String,
    pub extra_attrs: Vec<(QName, String)>,
    pub body: RpcReplyBody,
}

impl RpcReply {
    pub fn ok(message_id: impl Into<String>, extra_attrs: Vec<(QName, String)>) -> Self {
        RpcReply {
            message_id: message_id.into(),
            extra_attrs,
            body: RpcReplyBody::Ok,
        }
    }

    pub fn data(
        message_id: impl Into<String>,
        extra_attrs: Vec<(QName, String)>,
        data: Vec<XmlElement>,
    ) -> Self {
        RpcReply {
            message_id: message_id.into(),
            extra_attrs,
            body: RpcReplyBody::Data(data),
        }
    }

    pub fn output(
        message_id: impl Into<String>,
        extra_attrs: Vec<(QName, String)>,
        output: XmlElement,
    ) -> Self {
        RpcReply {
            message_id: message_id.into(),
            extra_attrs,
            body: RpcReplyBody::Output(output),
        }
    }

    pub fn error(
        message_id: impl Into<String>,
        extra_attrs: Vec<(QName, String)>,
        errors: Vec<RpcError>,
    ) -> Self {
        RpcReply {
            message_id: message_id.into(),
            extra_attrs,
            body: RpcReplyBody::Errors(errors),
        }
    }

    pub fn to_xml_string(&self) -> String {
        let mut envelope = XmlElement::new(QName::qualified(NETCONF_URN, "rpc-reply"));
        envelope
            .attrs
            .push((QName::local("message-id"), self.message_id.clone()));
        envelope.attrs.extend(self.extra_attrs.iter().cloned());

        match &self.body {
            RpcReplyBody::Ok => envelope.children.push(XmlElement::new(QName::local("ok"))),
            RpcReplyBody::Data(elements) => {
                let mut data = XmlElement::new(QName::local("data"));
                data.children = elements.clone();
                envelope.children.push(data);
            }
            RpcReplyBody::Output(output) => envelope.children.push(output.clone()),
            RpcReplyBody::Errors(errors) => {
                envelope
                    .children
                    .extend(errors.iter().map(RpcError::to_xml_element));
            }
        }
        envelope.to_xml_string()
    }
}

/// `<notification>` messages pushed to subscribers (spec.md §3, §4.4
/// "create-subscription").
#[derive(Debug, Clone)]
pub struct Notification {
    pub event_time: OffsetDateTime,
    pub payload: XmlElement,
}

impl Notification {
    pub fn to_xml_string(&self) -> String {
        let mut envelope = XmlElement::new(QName::qualified(NOTIFICATION_URN, "notification"));
        let time_text = self
            .event_time
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.event_time.unix_timestamp().to_string());
        envelope.children.push(text_child("eventTime", &time_text));
        envelope.children.push(self.payload.clone());
        envelope.to_xml_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ok_reply_round_trips_message_id() {
        let reply = RpcReply::ok("5", Vec::new());
        let xml = reply.to_xml_string();
        assert!(xml.contains(r#"message-id="5""#));
        assert!(xml.contains("<ok"));
    }

    #[test]
    fn error_reply_serializes_tag_and_message() {
        let reply = RpcReply::error(
            "6",
            Vec::new(),
            vec![RpcError::data_missing("interfaces/interface=eth0")],
        );
        let xml = reply.to_xml_string();
        assert!(xml.contains("<error-tag>data-missing</error-tag>"));
        assert!(xml.contains("interfaces/interface=eth0"));
    }

    #[test]
    fn data_reply_wraps_elements_under_data() {
        let mut leaf = XmlElement::new(QName::local("name"));
        leaf.text = "fred".to_string();
        let reply = RpcReply::data("7", Vec::new(), vec![leaf]);
        let xml = reply.to_xml_string();
        assert!(xml.contains("<data>"));
        assert!(xml.contains("<name>fred</name>"));
    }
}
