use thiserror::Error;

pub type NetconfResult<T> = Result<T, NetconfError>;

/// Session-fatal errors: anything that reaches the request loop as an
/// `Err` forces the session through CLOSING (spec.md §7, "Propagation
/// policy"). Per-RPC failures never appear here — they are converted to
/// an `<rpc-error>` reply by the executor instead, see
/// [`crate::message::response::RpcErrorReply`].
#[derive(Debug, Error)]
pub enum NetconfError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Framing(#[from] FramingError),
    #[error(transparent)]
    Xml(#[from] quick_xml::DeError),
    #[error(transparent)]
    XmlParse(#[from] quick_xml::Error),
    #[cfg(feature = "russh")]
    #[error(transparent)]
    Ssh(#[from] russh::Error),
    #[error(transparent)]
    Datastore(#[from] anyhow::Error),
    #[error("client did not advertise {0}")]
    MissingCapability(&'static str),
    #[error("client hello must not carry a session-id attribute")]
    ClientSentSessionId,
    #[error("a second hello was received after the session became active")]
    DuplicateHello,
}

/// RFC 6242 §4.1 chunk framing violations. Fatal: terminate the session
/// without a reply (spec.md §7, "framing-error").
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("expected '\\n' at start of chunk header, found {0:?}")]
    ExpectedLineFeed(u8),
    #[error("expected '#' after '\\n' in chunk header, found {0:?}")]
    ExpectedHash(u8),
    #[error("illegal framing byte {0:?} in chunk size prefix")]
    IllegalSizeByte(u8),
    #[error("chunk size {0} exceeds the 2^32-1 limit")]
    ChunkTooLarge(u64),
    #[error("end-of-message delimiter with a non-empty size accumulator")]
    MalformedTerminator,
}
