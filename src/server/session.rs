use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::command::{self, Command, DIAGNOSTIC_MUTED, HELP_TEXT, SHUTDOWN_NOTICE};
use super::registry::{Registration, SessionId};
use crate::error::LoggedError;
use crate::logger::{LogModule, LogPipeline};
use crate::{log_info, log_warning};

/// How long the shutdown notice may wait on a peer that stopped reading.
const SHUTDOWN_NOTICE_TIMEOUT: Duration = Duration::from_millis(100);

/// Identity of a session once its handshake succeeded.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub display_name: String,
    pub address: SocketAddr,
}

/// Why the session ended.
#[derive(Debug)]
enum CloseReason {
    Quit,
    PeerClosed,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
    Shutdown,
}

/// Failures while dispatching a single command.
#[derive(Debug, Error)]
enum SessionError {
    /// The connection is done for; the session has to close.
    #[error("session closing: {0:?}")]
    Closed(CloseReason),

    #[error(transparent)]
    Logged(#[from] LoggedError),
}

impl From<CloseReason> for SessionError {
    fn from(reason: CloseReason) -> Self {
        SessionError::Closed(reason)
    }
}

/// Result of one read attempt.
enum Inbound {
    Message(String),
    PeerClosed,
    Failed(io::Error),
    Shutdown,
}

enum Flow {
    Continue,
    Close(CloseReason),
}

/// Drives one connection from handshake to close.
///
/// A session waits for its name, then serves commands until it quits, the
/// peer goes away or the server shuts down. The listener registers the
/// session before the handler starts; the [`Registration`] removes it again
/// exactly once, even if the task is aborted.
pub struct SessionHandler {
    registration: Registration,
    address: SocketAddr,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pipeline: Arc<LogPipeline>,
    closer: CancellationToken,
    max_message_len: usize,
}

impl SessionHandler {
    pub fn new(
        registration: Registration,
        stream: TcpStream,
        address: SocketAddr,
        pipeline: Arc<LogPipeline>,
        closer: CancellationToken,
        max_message_len: usize,
    ) -> Self {
        let (reader_half, writer_half) = stream.into_split();
        Self {
            registration,
            address,
            reader: BufReader::new(reader_half),
            writer: writer_half,
            pipeline,
            closer,
            max_message_len,
        }
    }

    /// Runs the session to completion.
    pub async fn run(mut self) {
        let Some(session) = self.handshake().await else {
            // no name, nothing worth logging
            self.close().await;
            return;
        };

        log_info!(
            self.pipeline,
            LogModule::Network,
            "Session {} ({}) connected from {}",
            session.id,
            session.display_name,
            session.address
        );

        let reason = match self.send_line(&command::welcome(session.id, &session.display_name)).await {
            Ok(()) => self.serve(&session).await,
            Err(reason) => reason,
        };

        if matches!(reason, CloseReason::Shutdown) {
            self.send_shutdown_notice().await;
        }

        let remaining = self.close().await;
        self.log_close(&session, reason, remaining);
    }

    /// Reads the display name. `None` on EOF, read error, empty name or shutdown.
    async fn handshake(&mut self) -> Option<Session> {
        match self.next_message().await {
            Inbound::Message(name) if !name.is_empty() => Some(Session {
                id: self.registration.id(),
                display_name: name,
                address: self.address,
            }),
            _ => None,
        }
    }

    async fn serve(&mut self, session: &Session) -> CloseReason {
        loop {
            let message = match self.next_message().await {
                Inbound::Message(message) => message,
                Inbound::PeerClosed => return CloseReason::PeerClosed,
                Inbound::Failed(e) => return CloseReason::ReadFailed(e),
                Inbound::Shutdown => return CloseReason::Shutdown,
            };

            match self.dispatch(session, &message).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Close(reason)) | Err(SessionError::Closed(reason)) => return reason,
                Err(SessionError::Logged(err)) => {
                    // reported to this client only; the session keeps going
                    if let Err(reason) = self.send_line(&command::error_reply(&err.message)).await {
                        return reason;
                    }
                }
            }
        }
    }

    async fn dispatch(&mut self, session: &Session, message: &str) -> Result<Flow, SessionError> {
        match Command::parse(message) {
            Command::Quit => {
                self.send_line(&command::farewell(&session.display_name)).await?;
                Ok(Flow::Close(CloseReason::Quit))
            }
            Command::List => {
                let sessions = self.registration.registry().snapshot();
                self.send_line(&command::list_reply(session.id, &sessions)).await?;
                Ok(Flow::Continue)
            }
            Command::Help => {
                self.send_line(HELP_TEXT).await?;
                Ok(Flow::Continue)
            }
            Command::Diagnostic => {
                self.pipeline.error(
                    LogModule::Network,
                    format!(
                        "Diagnostic error triggered by session {} ({})",
                        session.id, session.display_name
                    ),
                )?;
                // only reached when error logging is off
                self.send_line(DIAGNOSTIC_MUTED).await?;
                Ok(Flow::Continue)
            }
            Command::Empty => Ok(Flow::Continue),
            Command::Echo(text) => {
                self.send_line(&command::echo(text)).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Waits for the next line or for the server to close this session.
    async fn next_message(&mut self) -> Inbound {
        tokio::select! {
            _ = self.closer.cancelled() => Inbound::Shutdown,
            read = read_message(&mut self.reader, self.max_message_len) => match read {
                Ok(Some(message)) => Inbound::Message(message),
                Ok(None) => Inbound::PeerClosed,
                Err(e) => Inbound::Failed(e),
            },
        }
    }

    /// Writes one response line, giving up if the server closes this session
    /// while the peer is not reading.
    async fn send_line(&mut self, line: &str) -> Result<(), CloseReason> {
        let out = line_bytes(line);
        tokio::select! {
            _ = self.closer.cancelled() => Err(CloseReason::Shutdown),
            written = self.writer.write_all(&out) => written.map_err(CloseReason::WriteFailed),
        }
    }

    /// Best effort: a peer that stopped reading does not get the notice.
    async fn send_shutdown_notice(&mut self) {
        let out = line_bytes(SHUTDOWN_NOTICE);
        let _ = time::timeout(SHUTDOWN_NOTICE_TIMEOUT, self.writer.write_all(&out)).await;
    }

    /// Deregisters and shuts the connection down, returning the remaining registry size.
    async fn close(&mut self) -> usize {
        self.registration.release();
        let _ = self.writer.shutdown().await;
        self.registration.registry().len()
    }

    fn log_close(&self, session: &Session, reason: CloseReason, remaining: usize) {
        let who = format!("Session {} ({})", session.id, session.display_name);
        let pipeline = &self.pipeline;
        match reason {
            CloseReason::Quit => log_info!(
                pipeline,
                LogModule::Network,
                "{} left voluntarily; {} session(s) remain",
                who,
                remaining
            ),
            CloseReason::PeerClosed => log_info!(
                pipeline,
                LogModule::Network,
                "{} disconnected; {} session(s) remain",
                who,
                remaining
            ),
            CloseReason::ReadFailed(e) => log_warning!(
                pipeline,
                LogModule::Network,
                "{} read failed: {}; {} session(s) remain",
                who,
                e,
                remaining
            ),
            CloseReason::WriteFailed(e) => log_warning!(
                pipeline,
                LogModule::Network,
                "{} write failed: {}; {} session(s) remain",
                who,
                e,
                remaining
            ),
            CloseReason::Shutdown => log_warning!(
                pipeline,
                LogModule::Network,
                "{} closed by server shutdown; {} session(s) remain",
                who,
                remaining
            ),
        }
    }
}

fn line_bytes(line: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len() + 1);
    out.extend_from_slice(line.as_bytes());
    out.push(b'\n');
    out
}

/// Reads one newline-terminated message.
///
/// The trailing `\n` (and `\r`) is stripped. Lines longer than `max_len`
/// bytes are cut to `max_len` and the rest of the line is discarded. A final
/// unterminated line still counts as a message; `None` means EOF.
pub async fn read_message<R>(reader: &mut R, max_len: usize) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(max_len.min(1024));
    let limit = max_len as u64 + 1;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > max_len {
        buf.truncate(max_len);
        discard_line(reader).await?;
    }

    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

async fn discard_line<R>(reader: &mut R) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(());
        }
        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = available.len();
        reader.consume(len);
    }
}
