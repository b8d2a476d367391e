//! Transport boundary (spec.md §6, "Transport"): an accepted and
//! authenticated duplex byte channel handed to a new
//! [`crate::session::Session`]. Mirrors the teacher's `transport::Transport`
//! trait, inverted for a server: instead of dialing out to a device, a
//! `Transport` accepts incoming channels and authenticates the caller.

use crate::error::NetconfResult;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// One accepted `netconf` subsystem channel, split into its halves, plus
/// the username the transport authenticated at accept time. Logged (not
/// authorized) by the session — see `session.rs`.
pub struct AuthenticatedChannel {
    pub user: String,
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub writer: Box<dyn AsyncWrite + Unpin + Send>,
}

#[async_trait]
pub trait Transport: Send {
    /// Waits for the next authenticated channel. `Ok(None)` means the
    /// listener shut down cleanly and no more channels will arrive.
    async fn accept(&mut self) -> NetconfResult<Option<AuthenticatedChannel>>;
}

#[cfg(feature = "russh")]
pub mod ssh;
