//! TCP server for agency connections.
//!
//! Accepts connections, runs one session task per connection and keeps track
//! of them so that shutdown can wait for every in-flight session to finish.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::coordinator::DrawCoordinator;
use crate::lottery::{WinnerPredicate, WinningNumber};
use crate::session::{self, SessionEnd, Shared};
use crate::storage::{BetLedger, CsvBetStore};

/// Pause before accepting again after a failed accept, e.g. when the
/// process is out of file descriptors.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Server instance
pub struct Server {
    listener: TcpListener,
    shared: Shared,
}

impl Server {
    /// Bind the listening socket with the given accept backlog.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(
        addr: SocketAddr,
        backlog: u32,
        ledger: Arc<BetLedger>,
        coordinator: Arc<DrawCoordinator>,
        predicate: Arc<dyn WinnerPredicate>,
    ) -> io::Result<Self> {
        let listener = create_listener(addr, backlog)?;
        info!(address = %listener.local_addr()?, backlog, "Server listening");

        Ok(Server {
            listener,
            shared: Shared {
                ledger,
                coordinator,
                predicate,
            },
        })
    }

    /// Bind a server backed by the CSV bet store and the configured winning number.
    pub fn from_config(config: &Config) -> io::Result<Self> {
        let addr: SocketAddr = config
            .listen
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        Self::bind(
            addr,
            config.backlog,
            BetLedger::new(CsvBetStore::new(&config.bets_file)),
            Arc::new(DrawCoordinator::new(config.agencies)),
            Arc::new(WinningNumber(config.winning_number)),
        )
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn shared(&self) -> &Shared {
        &self.shared
    }

    /// Accept connections until `shutdown` completes, then wait for every
    /// running session to end on its own.
    pub async fn run<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server { listener, shared } = self;
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");
                        let shared = shared.clone();
                        sessions.spawn(serve(stream, peer, shared));
                    }
                    Err(e) => accept_failed(e).await,
                },
            }

            // Reap finished sessions without blocking the accept loop
            while let Some(result) = sessions.try_join_next() {
                reap(result);
            }
        }

        drop(listener);

        info!(in_flight = sessions.len(), "Draining connections");
        while let Some(result) = sessions.join_next().await {
            reap(result);
        }
        info!("Server stopped");

        Ok(())
    }
}

/// Run one session and log how it ended. Errors stay local to the connection.
async fn serve(stream: TcpStream, peer: SocketAddr, shared: Shared) {
    match session::handle_connection(stream, &shared).await {
        Ok(SessionEnd::Finished) => {
            info!(
                peer = %peer,
                finished = shared.coordinator.finished(),
                "Agency finished uploading"
            );
        }
        Ok(end) => debug!(peer = %peer, ?end, "Connection closed"),
        Err(e) => warn!(peer = %peer, error = %e, "Connection failed"),
    }
}

async fn accept_failed(e: io::Error) {
    error!(error = %e, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
}

fn reap(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Connection task failed");
    }
}

fn create_listener(addr: SocketAddr, backlog: u32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    let backlog = i32::try_from(backlog)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    TcpListener::from_std(socket.into())
}
