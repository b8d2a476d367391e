//! The server registry (spec.md §4.6): allocates session IDs, holds the
//! shared datastore and stream-service handles every session's executor
//! is built from, and tracks enough per-session state to let one session's
//! `kill-session` actually terminate another's request loop.
//!
//! Grounded in `examples/original_source/server.go`'s `Server`/
//! `SessionManager` (`NextSessionId`, `HandleErr`), generalized from a
//! single in-process counter into the `Arc`-shared registry a
//! multi-connection `tokio` server needs (spec.md §5, "Shared resources").

use crate::datastore::Datastore;
use crate::session;
use crate::stream::StreamService;
use crate::transport::Transport;
use crate::{NETCONF_BASE_10_CAP, NETCONF_BASE_11_CAP, NOTIFICATION_CAP};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub struct Server {
    next_id: AtomicU64,
    datastore: Arc<dyn Datastore>,
    stream_service: Arc<dyn StreamService>,
    extra_capabilities: Vec<String>,
    sessions: Mutex<HashMap<u64, Arc<Notify>>>,
}

impl Server {
    pub fn new(
        datastore: Arc<dyn Datastore>,
        stream_service: Arc<dyn StreamService>,
        extra_capabilities: Vec<String>,
    ) -> Arc<Server> {
        Arc::new(Server {
            next_id: AtomicU64::new(1),
            datastore,
            stream_service,
            extra_capabilities,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    pub fn datastore(&self) -> Arc<dyn Datastore> {
        self.datastore.clone()
    }

    pub fn stream_service(&self) -> Arc<dyn StreamService> {
        self.stream_service.clone()
    }

    /// Capabilities advertised in the server hello: the two mandatory
    /// base capabilities, the notification capability (this crate always
    /// supports `create-subscription`), plus any module-specific
    /// capabilities the caller configured (spec.md §6).
    pub fn capabilities(&self) -> Vec<String> {
        let mut caps = vec![
            NETCONF_BASE_10_CAP.to_string(),
            NETCONF_BASE_11_CAP.to_string(),
            NOTIFICATION_CAP.to_string(),
        ];
        caps.extend(self.extra_capabilities.iter().cloned());
        caps
    }

    fn next_session_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn register_session(&self, id: u64) -> Arc<Notify> {
        let cancel = Arc::new(Notify::new());
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .insert(id, cancel.clone());
        cancel
    }

    pub(crate) fn unregister_session(&self, id: u64) {
        self.sessions
            .lock()
            .expect("session registry mutex poisoned")
            .remove(&id);
    }

    /// `kill-session` targeting a different session (spec.md §4.4):
    /// wakes that session's request loop, which treats the wakeup as a
    /// cancellation and transitions straight to CLOSING. Returns `false`
    /// if no such session is currently registered (it may have already
    /// closed on its own).
    pub(crate) fn kill_session(&self, id: u64) -> bool {
        match self
            .sessions
            .lock()
            .expect("session registry mutex poisoned")
            .get(&id)
        {
            Some(cancel) => {
                cancel.notify_one();
                true
            }
            None => false,
        }
    }

    /// Owns the accept loop: allocates a session id for every channel the
    /// transport hands back and spawns one cooperative task per session
    /// (spec.md §4.6, §5 "Scheduling").
    pub async fn serve(self: &Arc<Self>, mut transport: Box<dyn Transport>) -> crate::error::NetconfResult<()> {
        loop {
            let channel = match transport.accept().await? {
                Some(channel) => channel,
                None => return Ok(()),
            };
            let id = self.next_session_id();
            let cancel = self.register_session(id);
            let server = self.clone();
            tokio::spawn(async move {
                session::run(id, channel, server, cancel).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memstore::MemDatastore;
    use crate::stream::BroadcastStreamService;
    use pretty_assertions::assert_eq;

    fn server() -> Arc<Server> {
        Server::new(
            Arc::new(MemDatastore::new()),
            Arc::new(BroadcastStreamService::new()),
            Vec::new(),
        )
    }

    #[test]
    fn session_ids_start_at_one_and_increment() {
        let server = server();
        assert_eq!(server.next_session_id(), 1);
        assert_eq!(server.next_session_id(), 2);
    }

    #[tokio::test]
    async fn kill_session_wakes_registered_notify_and_reports_unknown_sessions() {
        let server = server();
        let cancel = server.register_session(5);
        assert!(!server.kill_session(9));
        assert!(server.kill_session(5));
        // `notify_one` buffers a single permit, so a wait registered
        // after the call still resolves immediately.
        tokio::time::timeout(std::time::Duration::from_millis(50), cancel.notified())
            .await
            .expect("kill_session should have woken the registered notify");
    }

    #[test]
    fn unregister_session_drops_its_notify() {
        let server = server();
        server.register_session(7);
        server.unregister_session(7);
        assert!(!server.kill_session(7));
    }
}
