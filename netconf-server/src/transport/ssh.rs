//! `russh`-backed SSH server transport: accepts TCP connections, performs
//! the SSH handshake, and waits for a `netconf` subsystem request on a
//! session channel, exactly as `examples/original_source/ssh.go`'s
//! `handleNewChannels`/`handleConn` do for the Go `golang.org/x/crypto/ssh`
//! server. `russh` is the server-capable sibling of the `async-ssh2-lite`
//! client crate the teacher's `netconf-cli` depends on; the dependency
//! choice is grounded in `examples/other_examples/manifests/jiegec-netconf-rs`,
//! which reaches for `russh`/`russh-keys` for the same purpose.

use crate::error::{NetconfError, NetconfResult};
use crate::transport::{AuthenticatedChannel, Transport};
use async_trait::async_trait;
use russh::server::{Auth, Config, Handle, Handler, Msg, Server as RusshServer, Session};
use russh::{Channel, ChannelId, CryptoVec};
use russh_keys::key::{KeyPair, PublicKey};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

const SUBSYSTEM: &str = "netconf";

pub struct SshTransport {
    accepted: mpsc::Receiver<AuthenticatedChannel>,
}

impl SshTransport {
    /// Binds `addr` and starts accepting SSH connections in the
    /// background. Public-key and password auth both succeed
    /// unconditionally: this reference server logs who connected (spec.md
    /// §4.5 supplement) without enforcing an authorization policy, which
    /// is the transport layer's job in a real deployment, not this
    /// crate's (see SPEC_FULL.md's Non-goals).
    pub async fn bind(addr: SocketAddr, host_key_path: &Path) -> NetconfResult<Self> {
        let key_pem = tokio::fs::read_to_string(host_key_path).await?;
        let key_pair: KeyPair = russh_keys::decode_secret_key(&key_pem, None)
            .map_err(|err| NetconfError::Datastore(anyhow::anyhow!("bad host key: {err}")))?;

        let config = Arc::new(Config {
            inactivity_timeout: Some(Duration::from_secs(3600)),
            auth_rejection_time: Duration::from_secs(1),
            keys: vec![key_pair],
            ..Default::default()
        });

        let (accept_tx, accept_rx) = mpsc::channel(16);
        let mut factory = HandlerFactory { accept_tx };

        tokio::spawn(async move {
            if let Err(err) = factory.run_on_address(config, addr).await {
                log::error!("ssh listener on {addr} exited: {err}");
            }
        });

        Ok(SshTransport { accepted: accept_rx })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn accept(&mut self) -> NetconfResult<Option<AuthenticatedChannel>> {
        Ok(self.accepted.recv().await)
    }
}

#[derive(Clone)]
struct HandlerFactory {
    accept_tx: mpsc::Sender<AuthenticatedChannel>,
}

impl RusshServer for HandlerFactory {
    type Handler = ConnectionHandler;

    fn new_client(&mut self, addr: Option<SocketAddr>) -> ConnectionHandler {
        if let Some(addr) = addr {
            log::debug!("accepted ssh connection from {addr}");
        }
        ConnectionHandler {
            accept_tx: self.accept_tx.clone(),
            user: String::new(),
            inbound_writers: HashMap::new(),
        }
    }
}

struct ConnectionHandler {
    accept_tx: mpsc::Sender<AuthenticatedChannel>,
    user: String,
    inbound_writers: HashMap<ChannelId, DuplexStream>,
}

#[async_trait]
impl Handler for ConnectionHandler {
    type Error = russh::Error;

    async fn auth_publickey(&mut self, user: &str, _key: &PublicKey) -> Result<Auth, Self::Error> {
        log::info!("{user} authenticated with a public key");
        self.user = user.to_string();
        Ok(Auth::Accept)
    }

    async fn auth_password(&mut self, user: &str, _password: &str) -> Result<Auth, Self::Error> {
        log::info!("{user} authenticated with a password");
        self.user = user.to_string();
        Ok(Auth::Accept)
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn subsystem_request(
        &mut self,
        channel_id: ChannelId,
        name: &str,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if name != SUBSYSTEM {
            session.channel_failure(channel_id);
            return Ok(());
        }

        let (inbound_read, inbound_write) = tokio::io::duplex(8192);
        let (outbound_read, outbound_write) = tokio::io::duplex(8192);
        self.inbound_writers.insert(channel_id, inbound_write);

        let handle = session.handle();
        tokio::spawn(pump_outbound(outbound_read, handle, channel_id));

        let channel = AuthenticatedChannel {
            user: self.user.clone(),
            reader: Box::new(inbound_read),
            writer: Box::new(outbound_write),
        };
        if self.accept_tx.send(channel).await.is_err() {
            log::warn!("no listener for accepted netconf subsystem channel {channel_id:?}");
        }

        session.channel_success(channel_id);
        Ok(())
    }

    async fn data(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(writer) = self.inbound_writers.get_mut(&channel_id) {
            let _ = writer.write_all(data).await;
        }
        Ok(())
    }

    async fn channel_eof(&mut self, channel_id: ChannelId, session: &mut Session) -> Result<(), Self::Error> {
        self.inbound_writers.remove(&channel_id);
        session.close(channel_id);
        Ok(())
    }
}

async fn pump_outbound(mut outbound_read: DuplexStream, handle: Handle, channel_id: ChannelId) {
    let mut buf = [0u8; 8192];
    loop {
        match outbound_read.read(&mut buf).await {
            Ok(0) => return,
            Ok(n) => {
                if handle.data(channel_id, CryptoVec::from_slice(&buf[..n])).await.is_err() {
                    return;
                }
            }
            Err(_) => return,
        }
    }
}
