//! Async line-protocol connection.
//!
//! # Design
//! [`Connector::connect`] opens the TCP stream, logs in, and then hands the
//! stream to a background task. Public methods talk to that task over a
//! bounded channel; the channel's capacity is the backpressure gate, so a
//! burst of commands waits for room instead of growing a buffer. Each
//! command carries a oneshot sender that is queued in the [`Session`] after
//! the bytes are written, and the next response frame resolves the oldest
//! queued sender.
//!
//! Errors that arrive with nothing waiting for them are logged and passed to
//! the hooks registered with [`Connector::on_error`]; the task keeps running.
//! Losing the connection resolves every waiting command with
//! [`ApiError::ConnectionLost`], and later commands fail with
//! [`ApiError::TransportUnavailable`].

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::paginator::{PageSource, Paginator};
use crate::query::Query;
use crate::types::{DbStats, Page};

use super::command::{Command, Flag, Login};
use super::response::{LineResults, Response, ResponseType};
use super::session::{FrameDecoder, Session, SessionState};

const COMMAND_CHANNEL_CAPACITY: usize = 32;
const READ_BUFFER_SIZE: usize = 8 * 1024;

type Reply = oneshot::Sender<Result<Response, ApiError>>;

/// Callback for errors no pending command is waiting for.
pub type ErrorHook = Arc<dyn Fn(&ApiError) + Send + Sync>;

type Hooks = Arc<Mutex<Vec<ErrorHook>>>;

// ── Commands ────────────────────────────────────────────────────────────────

/// Requests sent from the public API to the background task.
enum Request {
    /// Write an encoded command and queue its reply sender.
    Send { bytes: Vec<u8>, reply: Reply },
    /// Close the stream.
    Shutdown,
}

// ── Connector (public handle) ───────────────────────────────────────────────

pub struct Connector {
    cmd_tx: mpsc::Sender<Request>,
    state_rx: watch::Receiver<SessionState>,
    hooks: Hooks,
    session_token: Option<String>,
    debug: bool,
    _task: JoinHandle<()>,
}

impl Connector {
    /// Connect to `config.address()` and log in.
    ///
    /// Only the TCP connect is bounded by `config.connect_timeout`.
    pub async fn connect(config: &ClientConfig, login: Login) -> Result<Self, ApiError> {
        login.validate()?;
        let address = config.address();
        log::debug!("connecting to {address}");
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ApiError::ConnectTimeout(config.connect_timeout))??;
        Self::handshake(stream, login, config.debug).await
    }

    /// Log in over an already-open stream.
    pub async fn with_stream<S>(stream: S, login: Login) -> Result<Self, ApiError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        login.validate()?;
        Self::handshake(stream, login, false).await
    }

    async fn handshake<S>(mut stream: S, login: Login, debug: bool) -> Result<Self, ApiError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut session: Session<Reply> = Session::new();
        session.begin_connect()?;
        session.connected()?;

        let resumed_token = login.session_token().map(str::to_string);
        stream.write_all(&Command::Login(login).encode()?).await?;
        let mut decoder = FrameDecoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        let (frame, backlog) = loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(ApiError::ConnectionLost);
            }
            let mut frames = decoder.push(&buf[..n]).into_iter();
            if let Some(frame) = frames.next() {
                break (frame, frames.collect::<Vec<_>>());
            }
        };
        session.on_login_reply(Response::decode(&frame)?)?;
        log::info!("logged in");

        let session_token = session.session_token().map(str::to_string).or(resumed_token);
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(session.state());
        let hooks: Hooks = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(connection_task(
            stream,
            session,
            decoder,
            backlog,
            cmd_rx,
            state_tx,
            hooks.clone(),
        ));

        Ok(Self {
            cmd_tx,
            state_rx,
            hooks,
            session_token,
            debug,
            _task: task,
        })
    }

    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Token returned by a login that asked for a session.
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Register a callback for errors that no pending command owns.
    pub fn on_error<F>(&self, hook: F)
    where
        F: Fn(&ApiError) + Send + Sync + 'static,
    {
        if let Ok(mut hooks) = self.hooks.lock() {
            hooks.push(Arc::new(hook));
        }
    }

    /// Send a command and wait for its response. `error` responses come
    /// back as `Err`.
    pub async fn send(&self, command: Command) -> Result<Response, ApiError> {
        let bytes = command.encode()?;
        if self.debug {
            log::trace!("-> {}", String::from_utf8_lossy(&bytes[..bytes.len() - 1]));
        }
        let (reply, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(Request::Send { bytes, reply })
            .await
            .map_err(|_| ApiError::TransportUnavailable)?;
        reply_rx.await.map_err(|_| ApiError::ConnectionLost)?
    }

    /// Run a `get` for one page of `query`.
    pub async fn get<M: DeserializeOwned>(&self, query: &Query, flags: &[Flag]) -> Result<Page<M>, ApiError> {
        let response = self.send(Command::get(query, flags)?).await?;
        let results: LineResults<M> = response.expect_kind(ResponseType::Results)?.payload()?;
        Ok(results.into())
    }

    pub async fn dbstats(&self) -> Result<DbStats, ApiError> {
        self.send(Command::DbStats).await?.expect_kind(ResponseType::DbStats)?.payload()
    }

    /// Add or update a visual novel on the user's list.
    pub async fn set_ulist(&self, vn_id: u64, fields: Value) -> Result<(), ApiError> {
        self.send(Command::SetUlist { vn_id, fields })
            .await?
            .expect_kind(ResponseType::Ok)?;
        Ok(())
    }

    /// Invalidate the session token and close. Only valid for sessions that
    /// were created with a token.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if self.session_token.is_none() {
            return Err(ApiError::MissingToken);
        }
        self.send(Command::Logout).await?.expect_kind(ResponseType::Ok)?;
        self.close().await;
        Ok(())
    }

    /// Close the connection and wait for the task to finish.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Request::Shutdown).await;
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx.wait_for(|state| *state == SessionState::Closed).await;
    }

    /// Paginate `query` with `basic` info; use [`Connector::source`] for
    /// other flags.
    pub fn pages<M>(&self, query: &Query, page_size: u32) -> Result<Paginator<'_, Self, M>, ApiError>
    where
        M: DeserializeOwned + Clone + Send,
    {
        Paginator::new(self, query, page_size)
    }

    /// A [`PageSource`] that fetches with `get` and `flags`.
    pub fn source(&self, flags: &[Flag]) -> LineSource<'_> {
        LineSource {
            connector: self,
            flags: flags.to_vec(),
        }
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        // Best-effort shutdown signal.
        let _ = self.cmd_tx.try_send(Request::Shutdown);
    }
}

#[async_trait]
impl PageSource for Connector {
    async fn fetch_page<M>(&self, query: &Query) -> Result<Page<M>, ApiError>
    where
        M: DeserializeOwned + Send,
    {
        self.get(query, &[]).await
    }
}

/// Pages a query over a [`Connector`] with a fixed set of flags.
pub struct LineSource<'a> {
    connector: &'a Connector,
    flags: Vec<Flag>,
}

#[async_trait]
impl<'a> PageSource for LineSource<'a> {
    async fn fetch_page<M>(&self, query: &Query) -> Result<Page<M>, ApiError>
    where
        M: DeserializeOwned + Send,
    {
        self.connector.get(query, &self.flags).await
    }
}

// ── Background connection task ──────────────────────────────────────────────

async fn connection_task<S>(
    stream: S,
    mut session: Session<Reply>,
    mut decoder: FrameDecoder,
    backlog: Vec<Vec<u8>>,
    mut cmd_rx: mpsc::Receiver<Request>,
    state_tx: watch::Sender<SessionState>,
    hooks: Hooks,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    // Frames that arrived in the same read as the login reply.
    for frame in backlog {
        dispatch(&frame, &mut session, &hooks);
    }

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Request::Send { bytes, reply }) => {
                    if let Err(e) = writer.write_all(&bytes).await {
                        log::warn!("write failed: {e}");
                        let _ = reply.send(Err(ApiError::ConnectionLost));
                        break;
                    }
                    if let Err(e) = session.enqueue(reply) {
                        log::warn!("command sent outside a ready session: {e}");
                    }
                }
                Some(Request::Shutdown) | None => {
                    session.begin_close();
                    let _ = state_tx.send(session.state());
                    let _ = writer.shutdown().await;
                    break;
                }
            },
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    log::warn!("server closed the connection");
                    break;
                }
                Ok(n) => {
                    for frame in decoder.push(&buf[..n]) {
                        dispatch(&frame, &mut session, &hooks);
                    }
                }
                Err(e) => {
                    log::warn!("read failed: {e}");
                    break;
                }
            },
        }
    }

    drop(cmd_rx);
    let orphaned = session.closed();
    if !orphaned.is_empty() {
        log::debug!("failing {} pending commands", orphaned.len());
    }
    for reply in orphaned {
        let _ = reply.send(Err(ApiError::ConnectionLost));
    }
    let _ = state_tx.send(SessionState::Closed);
    log::debug!("connection task exited");
}

/// Route one frame to the oldest pending command, or to the error hooks.
fn dispatch(frame: &[u8], session: &mut Session<Reply>, hooks: &Hooks) {
    let result = Response::decode(frame).and_then(Response::into_result);
    match session.complete() {
        Some(reply) => {
            // The caller may have given up waiting.
            let _ = reply.send(result);
        }
        None => match result {
            Err(err) => {
                log::warn!("unhandled server error: {err}");
                // Hooks run unlocked so they may register more hooks.
                let hooks: Vec<ErrorHook> = hooks.lock().map(|guard| guard.clone()).unwrap_or_default();
                for hook in &hooks {
                    hook(&err);
                }
            }
            Ok(response) => log::debug!("dropping unsolicited '{}' response", response.kind),
        },
    }
}
