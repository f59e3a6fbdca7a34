//! Session store and token generation.
//!
//! The store is the only cross-connection mutable state in the server.
//! It keeps two indices, sessions by user id and a token-to-user map,
//! that must always be mutated together, so every operation takes the one
//! mutex for its whole critical section.
//!
//! One session per user: a second login for the same user replaces the
//! first and invalidates its token. Tokens are never checked for
//! collisions; a colliding token lets the newer session's entry win.

use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Token length in characters.
pub const TOKEN_LEN: usize = 32;

/// Identifier the server assigns to each accepted connection.
pub type ConnId = u64;

/// Generate a fresh session token: 32 alphanumeric characters from a
/// thread-local, entropy-seeded (non-cryptographic) generator.
pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// A live session for an authenticated connection.
#[derive(Debug, Clone)]
struct Session {
    user_id: i64,
    username: String,
    conn: ConnId,
    token: String,
    online: bool,
}

/// Identity resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: i64,
    pub username: String,
}

#[derive(Default)]
struct Inner {
    /// Primary index: one session per user id.
    by_user: HashMap<i64, Session>,
    /// Secondary index, kept in lock-step with `by_user`.
    by_token: HashMap<String, i64>,
}

/// Concurrent registry of authenticated connections.
///
/// Constructed once at startup and shared by `Arc`; every component that
/// needs identity resolution receives a handle rather than reaching for
/// process-global state.
pub struct SessionStore {
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Create a session for a freshly authenticated user and return its
    /// token. An existing session for the same user is replaced and its
    /// token invalidated.
    pub fn login(&self, user_id: i64, username: &str, conn: ConnId) -> String {
        let token = generate_token();
        let mut inner = self.lock();

        if let Some(previous) = inner.by_user.remove(&user_id) {
            inner.by_token.remove(&previous.token);
            debug!(user_id, "Replacing existing session");
        }

        inner.by_user.insert(
            user_id,
            Session {
                user_id,
                username: username.to_string(),
                conn,
                token: token.clone(),
                online: true,
            },
        );
        inner.by_token.insert(token.clone(), user_id);

        token
    }

    /// Remove the session identified by `token`. Returns whether a session
    /// existed; logging out an unknown token is a no-op.
    pub fn logout(&self, token: &str) -> bool {
        let mut inner = self.lock();
        let user_id = match inner.by_token.remove(token) {
            Some(user_id) => user_id,
            None => return false,
        };
        inner.by_user.remove(&user_id);
        true
    }

    /// Resolve a bearer token to the identity it was issued for.
    pub fn resolve_token(&self, token: &str) -> Option<SessionInfo> {
        let inner = self.lock();
        let user_id = *inner.by_token.get(token)?;
        inner.by_user.get(&user_id).map(|session| SessionInfo {
            user_id: session.user_id,
            username: session.username.clone(),
        })
    }

    /// Find the user bound to a connection. O(n) over active sessions.
    pub fn resolve_conn(&self, conn: ConnId) -> Option<i64> {
        let inner = self.lock();
        inner
            .by_user
            .values()
            .find(|session| session.conn == conn)
            .map(|session| session.user_id)
    }

    /// Disconnect cleanup: drop any session bound to `conn` along with its
    /// token entry, so no session outlives its socket.
    pub fn remove_conn(&self, conn: ConnId) {
        let mut inner = self.lock();
        let stale: Vec<i64> = inner
            .by_user
            .values()
            .filter(|session| session.conn == conn)
            .map(|session| session.user_id)
            .collect();
        for user_id in stale {
            if let Some(session) = inner.by_user.remove(&user_id) {
                inner.by_token.remove(&session.token);
                debug!(user_id, conn, "Removed session for closed connection");
            }
        }
    }

    /// Presence query: is this user currently logged in?
    pub fn is_online(&self, user_id: i64) -> bool {
        let inner = self.lock();
        inner
            .by_user
            .get(&user_id)
            .map(|session| session.online)
            .unwrap_or(false)
    }

    /// Number of active sessions.
    pub fn active_count(&self) -> usize {
        self.lock().by_user.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned mutex means a panic mid-update; the indices may be
        // torn, so propagating the panic is the only safe option.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("session store mutex poisoned: {}", poisoned),
        }
    }
}
