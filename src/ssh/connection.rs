//! SSH Connection
//!
//! One authenticated SSH transport to a single remote host. The connection
//! moves through `Unopened -> Open -> Closed`; every transition and every
//! session creation happens under the same lock.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handle};
use russh::keys::PrivateKeyWithHashAlg;
use russh::Channel;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

use super::context::Context;
use super::handler::SshHandler;
use crate::error::{Error, Result};

/// Observable lifecycle state of a [`Connection`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

/// Per-operation settings inherited from the context at connect time
#[derive(Debug, Clone)]
pub(crate) struct SessionSettings {
    pub(crate) operation_timeout: Option<Duration>,
    pub(crate) scp_command: String,
}

/// Live transport of an open connection
struct Live {
    /// Handle owning the TCP socket and the SSH session
    handle: Handle<SshHandler>,

    /// Resolved remote address of the socket
    peer: SocketAddr,

    settings: SessionSettings,
}

enum State {
    Unopened,
    Open(Live),
    Closed,
}

impl State {
    fn kind(&self) -> ConnectionState {
        match self {
            State::Unopened => ConnectionState::Unopened,
            State::Open(_) => ConnectionState::Open,
            State::Closed => ConnectionState::Closed,
        }
    }
}

/// SSH Connection
///
/// Owns the SSH handle (and through it the TCP socket) exclusively. Share
/// it between tasks behind an `Arc`; sessions are created one at a time.
pub struct Connection {
    /// Target `host:port`
    addr: String,

    /// Lifecycle state, also used to serialize session creation
    state: Mutex<State>,
}

impl Connection {
    /// Create an unopened connection to `addr`
    ///
    /// Does not touch the network; call [`Connection::connect`] or use
    /// [`Context::open`].
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            state: Mutex::new(State::Unopened),
        }
    }

    /// Dial, handshake and authenticate using `ctx`
    ///
    /// The TCP dial is bounded by the context timeout. A deadline of
    /// `now + timeout` is then fixed once and bounds the SSH handshake and
    /// authentication; it is not applied to later operations.
    ///
    /// # Errors
    /// * `Error::InvalidState` - the connection is not `Unopened`
    /// * `Error::Dial` - TCP connect failed or timed out
    /// * `Error::Handshake` - SSH negotiation or authentication failed
    /// * `Error::Deadline` - handshake did not finish before the deadline
    pub async fn connect(&self, ctx: &Context) -> Result<()> {
        let mut state = self.state.lock().await;
        if !matches!(*state, State::Unopened) {
            error!(
                "Connect to {} rejected: connection is {:?}",
                self.addr,
                state.kind()
            );
            return Err(Error::invalid_state(format!(
                "cannot connect a {:?} connection to {}",
                state.kind(),
                self.addr
            )));
        }

        info!("Connecting to {}@{}...", ctx.username(), self.addr);

        let timeout_ms = ctx.timeout().as_millis() as u64;
        let stream = match timeout(ctx.timeout(), TcpStream::connect(self.addr.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                error!("Create ssh connection to {} failed: {}", self.addr, e);
                return Err(Error::dial(&self.addr, e));
            }
            Err(_) => {
                error!(
                    "Create ssh connection to {} timed out after {}ms",
                    self.addr, timeout_ms
                );
                return Err(Error::dial(
                    &self.addr,
                    format!("timed out after {}ms", timeout_ms),
                ));
            }
        };

        let peer = stream.peer_addr().map_err(|e| {
            error!("Resolve peer address of {} failed: {}", self.addr, e);
            Error::dial(&self.addr, e)
        })?;
        debug!("TCP connection to {} ({}) established", self.addr, peer);

        let deadline = Instant::now() + ctx.timeout();
        let handle = match timeout_at(deadline, self.handshake(ctx, stream)).await {
            Ok(result) => result?,
            Err(_) => {
                error!(
                    "SSH handshake with {} exceeded deadline of {}ms",
                    self.addr, timeout_ms
                );
                return Err(Error::Deadline {
                    addr: self.addr.clone(),
                    timeout_ms,
                });
            }
        };

        *state = State::Open(Live {
            handle,
            peer,
            settings: SessionSettings {
                operation_timeout: ctx.operation_timeout(),
                scp_command: ctx.scp_command().to_string(),
            },
        });

        info!("Successfully connected to {}@{}", ctx.username(), self.addr);
        Ok(())
    }

    /// SSH handshake over the dialed socket followed by public-key auth
    async fn handshake(&self, ctx: &Context, stream: TcpStream) -> Result<Handle<SshHandler>> {
        let config = Arc::new(client::Config::default());

        let mut handle = client::connect_stream(config, stream, SshHandler::new(&self.addr))
            .await
            .map_err(|e| {
                error!("SSH handshake with {} failed: {}", self.addr, e);
                Error::handshake(&self.addr, e)
            })?;

        debug!(
            "Attempting key authentication for user '{}' with {}",
            ctx.username(),
            ctx.fingerprint()
        );

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| {
                error!("Query RSA hash support of {} failed: {}", self.addr, e);
                Error::handshake(&self.addr, e)
            })?
            .flatten();

        let auth_result = handle
            .authenticate_publickey(ctx.username(), PrivateKeyWithHashAlg::new(ctx.key(), hash_alg))
            .await
            .map_err(|e| {
                error!("Key authentication to {} failed: {}", self.addr, e);
                Error::handshake(&self.addr, e)
            })?;

        if !auth_result.success() {
            error!(
                "Key authentication for '{}' rejected by {}",
                ctx.username(),
                self.addr
            );
            return Err(Error::handshake(&self.addr, "key authentication rejected"));
        }

        debug!("Key authentication successful");
        Ok(handle)
    }

    /// Open a new session channel
    ///
    /// Holds the connection lock while the channel is being opened, so at
    /// most one session is created at a time. Returns the channel together
    /// with the settings operations should run under.
    pub(crate) async fn open_session(&self) -> Result<(Channel<client::Msg>, SessionSettings)> {
        let state = self.state.lock().await;
        let live = match &*state {
            State::Open(live) => live,
            other => {
                error!(
                    "Open session on {} rejected: connection is {:?}",
                    self.addr,
                    other.kind()
                );
                return Err(Error::invalid_state(format!(
                    "connection to {} is {:?}",
                    self.addr,
                    other.kind()
                )));
            }
        };

        let channel = live.handle.channel_open_session().await.map_err(|e| {
            error!("Open session on {} failed: {}", self.addr, e);
            Error::session_open(format!("{}: {}", self.addr, e))
        })?;

        debug!("Opened session channel {:?} on {}", channel.id(), self.addr);
        Ok((channel, live.settings.clone()))
    }

    /// Close the connection
    ///
    /// Sends an SSH disconnect and drops the handle, which closes the
    /// socket. Closing an already closed connection is a no-op.
    ///
    /// # Errors
    /// * `Error::InvalidState` - the connection was never opened
    pub async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, State::Closed) {
            State::Unopened => {
                *state = State::Unopened;
                error!("Close of {} rejected: connection was never opened", self.addr);
                Err(Error::invalid_state(format!(
                    "connection to {} was never opened",
                    self.addr
                )))
            }
            State::Closed => {
                debug!("Connection to {} already closed", self.addr);
                Ok(())
            }
            State::Open(live) => {
                if let Err(e) = live
                    .handle
                    .disconnect(russh::Disconnect::ByApplication, "", "en")
                    .await
                {
                    warn!("Disconnect from {} failed: {}", self.addr, e);
                }
                info!("SSH connection to {} closed", self.addr);
                Ok(())
            }
        }
    }

    /// Target address as given at construction
    pub fn address(&self) -> &str {
        &self.addr
    }

    /// Remote socket address, once open
    pub async fn peer_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock().await {
            State::Open(live) => Some(live.peer),
            _ => None,
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.state.lock().await.kind()
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == ConnectionState::Open
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.try_lock().map(|s| s.kind()).ok();
        f.debug_struct("Connection")
            .field("addr", &self.addr)
            .field("state", &state)
            .finish()
    }
}
