//! The per-connection session state machine (spec.md §4.5):
//!
//! ```text
//! INIT → sent_hello → await_hello → ACTIVE → CLOSING → CLOSED
//! ```
//!
//! Grounded in `examples/original_source/session.go`'s `Session`/
//! `readMessages`/`handleRpc`, adapted from its synchronous single-reader
//! loop into a `tokio` task that also forwards subscription notifications
//! onto the same output writer, serialized at the frame granularity
//! (spec.md §5, "Ordering").

use crate::error::{NetconfError, NetconfResult};
use crate::executor::{Executor, ExecutorOutcome};
use crate::framer::{hello as hello_framer, ChunkedReader, ChunkedWriter};
use crate::message::{self, Hello, Notification, Request, RpcReply};
use crate::server::Server;
use crate::stream::{ReceiverOutcome, SubscriptionHandle};
use crate::transport::AuthenticatedChannel;
use crate::NETCONF_BASE_11_CAP;
use std::sync::{Arc, Weak};
use tokio::io::AsyncReadExt;
use tokio::sync::{mpsc, Mutex, Notify};

/// Drives one accepted channel through the full session lifecycle. Runs
/// until the client closes the session, a fatal codec/framing error
/// occurs, the transport channel reaches EOF, or `cancel` is notified by
/// another session's `kill-session` (spec.md §4.4).
pub async fn run(id: u64, channel: AuthenticatedChannel, server: Arc<Server>, cancel: Arc<Notify>) {
    log::info!("accepted session {id} for user {}", channel.user);

    let AuthenticatedChannel { user, reader, mut writer } = channel;

    // INIT -> sent_hello: unprompted, per RFC 6242 §3.1.
    let server_hello = Hello::server(id, server.capabilities()).to_string();
    if let Err(err) = hello_framer::write_hello(&mut writer, &server_hello).await {
        log::warn!("session {id}: failed writing server hello: {err}");
        return;
    }

    // sent_hello -> await_hello: the client hello is unchunked.
    let mut reader = reader;
    let (client_hello_xml, leftover) = match hello_framer::read_hello(&mut reader).await {
        Ok(result) => result,
        Err(err) => {
            log::warn!("session {id}: failed reading client hello: {err}");
            return;
        }
    };

    // await_hello -> ACTIVE, or -> CLOSING on validation failure.
    if let Err(err) = validate_client_hello(&client_hello_xml) {
        log::warn!("session {id}: rejecting client hello: {err}");
        return;
    }
    log::info!("session {id}: negotiated base:1.1 with {user}");

    // A client that pipelines its first chunked rpc onto the same write
    // as its hello can leave bytes in `leftover` that the chunked reader
    // must see before anything else arrives on `reader`.
    let reader = ChunkedReader::new(std::io::Cursor::new(leftover).chain(reader));
    let writer = Arc::new(Mutex::new(ChunkedWriter::new(writer)));
    let executor = Executor::new(server.datastore(), server.stream_service());

    request_loop(id, reader, writer, executor, &server, &cancel).await;

    // CLOSING -> CLOSED.
    server.unregister_session(id);
    log::info!("session {id}: closed");
}

fn validate_client_hello(xml: &str) -> NetconfResult<Hello> {
    let hello = match message::decode(xml) {
        Request::Hello(hello) => hello,
        _ => Hello::parse_client(xml)?,
    };
    if hello.session_id().is_some() {
        return Err(NetconfError::ClientSentSessionId);
    }
    if !hello.has_capability(NETCONF_BASE_11_CAP) {
        return Err(NetconfError::MissingCapability(NETCONF_BASE_11_CAP));
    }
    Ok(hello)
}

async fn request_loop(
    id: u64,
    mut reader: ChunkedReader,
    writer: Arc<Mutex<ChunkedWriter<Box<dyn tokio::io::AsyncWrite + Unpin + Send>>>>,
    executor: Executor,
    server: &Arc<Server>,
    cancel: &Notify,
) {
    loop {
        let mut message_source = tokio::select! {
            result = reader.next_message() => match result {
                Ok(Some(source)) => source,
                Ok(None) => {
                    log::debug!("session {id}: transport reached end of stream");
                    return;
                }
                Err(err) => {
                    log::warn!("session {id}: framing error: {err}");
                    return;
                }
            },
            _ = cancel.notified() => {
                log::info!("session {id}: killed by another session");
                return;
            }
        };

        let mut xml = String::new();
        if let Err(err) = message_source.read_to_string(&mut xml).await {
            log::warn!("session {id}: failed reading framed message: {err}");
            return;
        }

        let request = match message::decode(&xml) {
            Request::Rpc(rpc) => rpc,
            Request::Hello(_) => {
                log::warn!("session {id}: received a second hello, closing");
                return;
            }
            Request::Other(_) => continue,
        };

        let message_id = request.message_id.clone();
        let outcome = executor.handle(request);

        if write_reply(&writer, outcome.reply()).await.is_err() {
            log::warn!("session {id}: failed writing reply to rpc {message_id}");
            return;
        }

        match outcome {
            ExecutorOutcome::Reply(_) => continue,
            ExecutorOutcome::Close(_) => return,
            ExecutorOutcome::Kill(_, target) => {
                if target != id {
                    server.kill_session(target);
                }
                return;
            }
            ExecutorOutcome::Subscribe(_, handle) => {
                spawn_subscription_forwarder(id, handle, Arc::downgrade(&writer));
            }
        }
    }
}

async fn write_reply(
    writer: &Arc<Mutex<ChunkedWriter<Box<dyn tokio::io::AsyncWrite + Unpin + Send>>>>,
    reply: &RpcReply,
) -> NetconfResult<()> {
    let xml = reply.to_xml_string();
    writer.lock().await.write_message(xml.as_bytes()).await
}

/// Registers a receiver with `handle` that serializes each delivered
/// event as a `<notification>` frame and forwards it to this session's
/// output writer, then drives the subscription to completion as a
/// cooperative background task (spec.md §5: "A separate cooperative task
/// per session forwards notifications from the stream service").
///
/// The writer is captured weakly: once the session's own strong `Arc`
/// drops (the request loop returned), the forwarder's next upgrade
/// fails, it stops draining the channel, and the receiver callback's
/// next send fails too, which tells the stream service this receiver is
/// "suspended" rather than leaking it (spec.md §4.4, "create-subscription").
fn spawn_subscription_forwarder(
    session_id: u64,
    mut handle: Box<dyn SubscriptionHandle>,
    writer: Weak<Mutex<ChunkedWriter<Box<dyn tokio::io::AsyncWrite + Unpin + Send>>>>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    handle.add_receiver(
        "session-writer",
        Box::new(move |event_time, payload| {
            let notification = Notification {
                event_time,
                payload: payload.clone(),
            };
            match tx.send(notification.to_xml_string()) {
                Ok(()) => ReceiverOutcome::Active,
                Err(_) => ReceiverOutcome::Suspended,
            }
        }),
    );

    tokio::spawn(async move {
        while let Some(xml) = rx.recv().await {
            let Some(writer) = writer.upgrade() else {
                break;
            };
            if writer.lock().await.write_message(xml.as_bytes()).await.is_err() {
                break;
            }
        }
        log::debug!("session {session_id}: subscription forwarder stopped");
    });

    tokio::spawn(handle.run());
}
