//! Per-connection request handling.
//!
//! A connection moves through
//! `AwaitRequest -> {Uploading, Finishing, Polling} -> Closed`.
//! Only an upload returns to `AwaitRequest`; a finish or a poll ends the
//! session. Any error ends the session too and never touches shared state
//! beyond uploads already acknowledged.

use bytes::BytesMut;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::{self, JoinError};
use tracing::{debug, trace};

use crate::coordinator::DrawCoordinator;
use crate::lottery::WinnerPredicate;
use crate::protocol::{Bet, CodecError, Request, Response};
use crate::storage::BetLedger;

/// State shared by every connection.
#[derive(Clone)]
pub struct Shared {
    pub ledger: Arc<BetLedger>,
    pub coordinator: Arc<DrawCoordinator>,
    pub predicate: Arc<dyn WinnerPredicate>,
}

/// How a session terminated without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Peer closed the connection between requests
    Disconnected,
    /// Agency signalled it finished uploading
    Finished,
    /// Poll answered
    Polled,
}

#[derive(Debug)]
pub enum SessionError {
    /// Malformed request or socket failure
    Codec(CodecError),
    /// Bet store could not be read or written
    Storage(io::Error),
    /// Blocking storage task panicked or was cancelled
    Task(JoinError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Codec(e) => write!(f, "{}", e),
            SessionError::Storage(e) => write!(f, "Storage error: {}", e),
            SessionError::Task(e) => write!(f, "Storage task failed: {}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Codec(e) => Some(e),
            SessionError::Storage(e) => Some(e),
            SessionError::Task(e) => Some(e),
        }
    }
}

impl From<CodecError> for SessionError {
    fn from(e: CodecError) -> Self {
        SessionError::Codec(e)
    }
}

impl From<JoinError> for SessionError {
    fn from(e: JoinError) -> Self {
        SessionError::Task(e)
    }
}

enum State {
    AwaitRequest,
    Uploading(Vec<Bet>),
    Finishing,
    Polling(u32),
    Closed(SessionEnd),
}

/// Serve one agency connection until it finishes, polls, disconnects or fails.
pub async fn handle_connection<S>(mut stream: S, shared: &Shared) -> Result<SessionEnd, SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut state = State::AwaitRequest;

    loop {
        state = match state {
            State::AwaitRequest => match Request::read(&mut stream).await? {
                None => State::Closed(SessionEnd::Disconnected),
                Some(request) => {
                    trace!(request = request.name(), "Received request");
                    match request {
                        Request::Upload(bets) => State::Uploading(bets),
                        Request::Finish => State::Finishing,
                        Request::Poll { agency } => State::Polling(agency),
                    }
                }
            },

            State::Uploading(bets) => {
                let count = bets.len();
                let ledger = Arc::clone(&shared.ledger);
                task::spawn_blocking(move || ledger.append(&bets))
                    .await?
                    .map_err(SessionError::Storage)?;
                send(&mut stream, &Response::Ack).await?;
                debug!(bets = count, "Upload acknowledged");
                State::AwaitRequest
            }

            State::Finishing => {
                shared.coordinator.record_finisher();
                debug!(
                    finished = shared.coordinator.finished(),
                    agencies = shared.coordinator.agencies(),
                    "Agency finished uploading"
                );
                State::Closed(SessionEnd::Finished)
            }

            State::Polling(agency) => {
                let response = if shared.coordinator.quorum_reached() {
                    let ledger = Arc::clone(&shared.ledger);
                    let predicate = Arc::clone(&shared.predicate);
                    let winners = task::spawn_blocking(move || {
                        ledger.winners(agency, predicate.as_ref())
                    })
                    .await?
                    .map_err(SessionError::Storage)?;
                    debug!(agency, winners = winners.len(), "Sending winners");
                    Response::Winners(winners)
                } else {
                    debug!(agency, "Draw pending, asking agency to wait");
                    Response::Wait
                };
                send(&mut stream, &response).await?;
                State::Closed(SessionEnd::Polled)
            }

            State::Closed(end) => {
                // The peer may already be gone; the session outcome stands
                let _ = stream.shutdown().await;
                return Ok(end);
            }
        };
    }
}

async fn send<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<(), CodecError> {
    let mut buf = BytesMut::new();
    response.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}
