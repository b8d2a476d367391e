//! The NETCONF XML codec (spec.md §4.2): the `hello` handshake type, the
//! decoded request variants, the reply/notification encoders, and the
//! generic [`xml_element::XmlElement`] tree used for every dynamically
//! shaped payload (`config`, `filter`, action input/output, `data`).

pub mod hello;
pub mod request;
pub mod response;
pub mod xml_element;

pub use hello::Hello;
pub use request::{decode, Datastore, RawFilter, Request, RpcBody, RpcRequest};
pub use response::{ErrorInfo, ErrorSeverity, ErrorTag, ErrorType, Notification, RpcError, RpcReply, RpcReplyBody};
pub use xml_element::{QName, XmlElement};
