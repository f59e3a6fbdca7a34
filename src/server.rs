//! TCP server: listener, admission control, and per-connection handling.
//!
//! One spawned task per accepted connection, bounded by a semaphore.
//! Each connection reads into a single buffer, feeds the incremental
//! request parser, dispatches complete requests through the router, and
//! writes framed responses back. A structural parse error answers with a
//! literal 400 and closes the connection; on any exit path the session
//! bound to the connection is removed so no session outlives its socket.

use crate::config::Config;
use crate::protocol::request::{self, ParseResult};
use crate::protocol::response;
use crate::router::Router;
use crate::services::Context;
use crate::session::{ConnId, SessionStore};
use crate::store::Store;
use bytes::{Buf, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
    router: Arc<Router>,
    sessions: Arc<SessionStore>,
    connection_limit: Arc<Semaphore>,
    next_conn_id: AtomicU64,
}

impl Server {
    /// Bind the listening socket and wire up the application components.
    /// A bind failure is fatal and propagates to startup.
    pub async fn bind(config: &Config) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.listen).await?;

        let store = Store::new();
        let sessions = SessionStore::new();
        let router = Arc::new(Router::new(Context {
            store,
            sessions: Arc::clone(&sessions),
            upload_dir: config.upload_dir.clone(),
        }));

        Ok(Server {
            listener,
            router,
            sessions,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Address the listener actually bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Never returns under normal operation; accept errors
    /// are logged and skipped.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!(address = %self.local_addr()?, "Server listening");

        loop {
            // Wait for a connection slot before accepting.
            let permit = Arc::clone(&self.connection_limit).acquire_owned().await?;

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let conn = self.next_conn_id.fetch_add(1, Ordering::SeqCst);
                    debug!(peer = %addr, conn, "New connection");

                    let router = Arc::clone(&self.router);
                    let sessions = Arc::clone(&self.sessions);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &router, conn).await {
                            debug!(conn, error = %e, "Connection error");
                        }
                        // No session survives a dead socket.
                        sessions.remove_conn(conn);
                        drop(permit);
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    /// Session store handle for tests.
    #[cfg(test)]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }
}

/// Handle a single client connection until EOF, a write error, or a
/// structural protocol error.
async fn handle_connection(
    mut stream: TcpStream,
    router: &Router,
    conn: ConnId,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        // Drain every complete request already buffered.
        loop {
            match request::parse(&buffer) {
                ParseResult::Complete(req, consumed) => {
                    trace!(conn, method = %req.method, path = %req.path, "Processing request");

                    let body = router.dispatch(&req, conn).await;
                    stream.write_all(&response::ok(&body)).await?;
                    buffer.advance(consumed);

                    if buffer.is_empty() {
                        break;
                    }
                }
                ParseResult::Incomplete => break,
                ParseResult::Error(e) => {
                    warn!(conn, error = %e, "Malformed request");
                    stream.write_all(response::bad_request()).await?;
                    // Deterministic policy: structural errors end the
                    // connection, not just the request.
                    return Ok(());
                }
            }
        }

        let n = stream.read_buf(&mut buffer).await?;
        if n == 0 {
            trace!(conn, "Connection closed by client");
            return Ok(());
        }
    }
}
