//! Route dispatch.
//!
//! Maps (method, path) pairs onto handlers in a fixed, deterministic
//! order: the one prefix rule (`GET /api/post/<id>`) is tried first, then
//! the exact-match table. Only GET and POST are supported; anything else
//! is answered with an unsupported-method envelope, and unmatched pairs
//! with an unknown-route envelope. Dispatch never panics; every failure
//! becomes an error envelope.

use crate::protocol::request::Request;
use crate::protocol::response;
use crate::services::{self, files, forum, messages, users, Context};
use crate::session::ConnId;
use tracing::debug;

/// Prefix rule for fetching a single post by trailing numeric id.
const POST_DETAIL_PREFIX: &str = "/api/post/";

/// Dispatches parsed requests to business handlers.
///
/// Owns nothing but injected handles; the server constructs one router at
/// startup and shares it across connections.
pub struct Router {
    ctx: Context,
}

impl Router {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Resolve the caller's session and route the request.
    pub async fn dispatch(&self, req: &Request, conn: ConnId) -> String {
        let session = req
            .bearer_token
            .as_deref()
            .and_then(|token| self.ctx.sessions.resolve_token(token));
        let session = session.as_ref();

        debug!(method = %req.method, path = %req.path, "Dispatching request");

        // Prefix rule first, then exact matches.
        if req.method == "GET" && req.path.starts_with(POST_DETAIL_PREFIX) {
            let remainder = &req.path[POST_DETAIL_PREFIX.len()..];
            if remainder.is_empty() {
                return response::error("post id required");
            }
            return match services::parse_id(remainder, "post id") {
                Ok(post_id) => forum::get_post_detail(&self.ctx, post_id),
                Err(message) => response::error(&message),
            };
        }

        match (req.method.as_str(), req.path.as_str()) {
            ("POST", "/api/register") => users::register(&self.ctx, req),
            ("POST", "/api/login") => users::login(&self.ctx, req, conn),
            ("POST", "/api/logout") => users::logout(&self.ctx, req),
            ("GET", "/api/user/profile") => users::profile(session),

            ("POST", "/api/send_message") => messages::send_message(&self.ctx, req, session),
            ("GET", "/api/get_messages") => messages::get_messages(&self.ctx, session),
            ("GET", "/api/get_contacts") => messages::get_contacts(&self.ctx, session),

            ("POST", "/api/create_group") => messages::create_group(&self.ctx, req, session),
            ("POST", "/api/join_group") => messages::join_group(&self.ctx, req, session),
            ("POST", "/api/leave_group") => messages::leave_group(&self.ctx, req, session),
            ("GET", "/api/get_groups") => messages::get_groups(&self.ctx, session),
            ("GET", "/api/get_group_messages") => {
                messages::get_group_messages(&self.ctx, req, session)
            }

            ("POST", "/api/create_post") => forum::create_post(&self.ctx, req, session),
            ("GET", "/api/get_posts") => forum::get_posts(&self.ctx),
            ("POST", "/api/reply_post") => forum::reply_post(&self.ctx, req, session),
            ("GET", "/api/get_post_replies") => forum::get_post_replies(&self.ctx, req),

            ("POST", "/api/upload_file") => files::upload_file(&self.ctx, req, session).await,
            ("GET", "/api/download_file") => files::download_file(&self.ctx, req).await,

            (method, _) if method != "GET" && method != "POST" => {
                response::error(&format!("unsupported method: {}", method))
            }
            (method, path) => response::error(&format!("unknown route: {} {}", method, path)),
        }
    }
}
