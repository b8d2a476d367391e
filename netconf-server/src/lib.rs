//! # netconf-server
//!
//! Core protocol engine for a NETCONF (RFC 6241 / RFC 6242) server: chunked
//! message framing, the XML request/response codec, the subtree filter
//! compiler and evaluator, RPC dispatch, and the per-connection session
//! state machine.
//!
//! The datastore and event-stream service are external collaborators: this
//! crate only defines the trait boundary they must satisfy
//! ([`datastore`], [`stream`]) plus one in-memory reference implementation
//! ([`memstore`]) used by the test suite and the `netconf-serverd` binary.

pub mod datastore;
pub mod edit;
pub mod error;
pub mod executor;
pub mod filter;
pub mod framer;
pub mod memstore;
pub mod message;
pub mod server;
pub mod session;
pub mod stream;
pub mod transport;

pub const NETCONF_URN: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";
pub const NOTIFICATION_URN: &str = "urn:ietf:params:xml:ns:netconf:notification:1.0";
pub const NETCONF_BASE_10_CAP: &str = "urn:ietf:params:netconf:base:1.0";
pub const NETCONF_BASE_11_CAP: &str = "urn:ietf:params:netconf:base:1.1";
pub const NOTIFICATION_CAP: &str = "urn:ietf:params:netconf:capability:notification:1.0";
