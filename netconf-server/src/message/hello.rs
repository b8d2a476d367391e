use crate::error::NetconfResult;
use crate::NETCONF_URN;
use core::fmt;
use core::fmt::Display;
use quick_xml::de::from_str;
use quick_xml::se::Serializer;
use serde_derive::{Deserialize, Serialize};

/// The `<hello>` exchange (spec.md §3, "Capability"; §4.5). The same
/// struct serializes the server's outbound hello and deserializes the
/// client's inbound one, mirroring the teacher's `message::Hello`; only
/// the server ever sets `session_id` since RFC 6241 §8.1 forbids the
/// client from sending one.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename(serialize = "hello"))]
pub struct Hello {
    #[serde(rename = "@xmlns")]
    xmlns: String,
    capabilities: Capabilities,
    #[serde(rename = "session-id", skip_serializing_if = "Option::is_none")]
    session_id: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Capabilities {
    capability: Vec<String>,
}

impl Hello {
    /// Builds the server's own hello for a newly accepted session.
    pub fn server(session_id: u64, capabilities: Vec<String>) -> Hello {
        Hello {
            xmlns: NETCONF_URN.to_string(),
            session_id: Some(session_id),
            capabilities: Capabilities {
                capability: capabilities,
            },
        }
    }

    pub fn parse_client(xml: &str) -> NetconfResult<Hello> {
        let hello: Hello = from_str(xml)?;
        Ok(hello)
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities.capability
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities
            .capability
            .iter()
            .any(|cap| cap == capability)
    }

    pub fn session_id(&self) -> Option<u64> {
        self.session_id
    }
}

impl Display for Hello {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buffer = String::with_capacity(206);
        let ser = Serializer::new(&mut buffer);
        self.serialize(ser).map_err(|_| fmt::Error)?;
        write!(f, "{buffer}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_client_hello_with_session_id_absent() {
        let xml = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
            <capabilities>
                <capability>urn:ietf:params:netconf:base:1.0</capability>
                <capability>urn:ietf:params:netconf:base:1.1</capability>
                <capability>http://example.net/router/2.3/myfeature</capability>
            </capabilities>
        </hello>"#;
        let hello = Hello::parse_client(xml).unwrap();
        assert_eq!(hello.session_id(), None);
        assert!(hello.has_capability("urn:ietf:params:netconf:base:1.1"));
        assert_eq!(
            hello.capabilities()[2].trim(),
            "http://example.net/router/2.3/myfeature"
        );
    }

    #[test]
    fn decodes_session_id_when_present() {
        let xml = r#"<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
            <capabilities><capability>urn:ietf:params:netconf:base:1.1</capability></capabilities>
            <session-id>4</session-id>
        </hello>"#;
        let hello = Hello::parse_client(xml).unwrap();
        assert_eq!(hello.session_id(), Some(4));
    }

    #[test]
    fn server_hello_serializes_session_id() {
        let hello = Hello::server(
            7,
            vec![
                "urn:ietf:params:netconf:base:1.1".to_string(),
                "urn:ietf:params:netconf:capability:notification:1.0".to_string(),
            ],
        );
        let xml = hello.to_string();
        assert!(xml.contains("<session-id>7</session-id>"));
        assert!(xml.contains("urn:ietf:params:netconf:base:1.1"));
    }
}
