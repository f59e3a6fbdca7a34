//! Account handlers: register, login, logout, profile.

use super::{parse_body, str_field, Context};
use crate::protocol::request::Request;
use crate::protocol::response;
use crate::session::{ConnId, SessionInfo};
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct LoginPayload<'a> {
    user_id: i64,
    username: &'a str,
    token: &'a str,
}

#[derive(Serialize)]
struct ProfilePayload<'a> {
    user_id: i64,
    username: &'a str,
}

pub fn register(ctx: &Context, req: &Request) -> String {
    let body = parse_body(&req.body);
    let username = str_field(&body, "username");
    let password = str_field(&body, "password");

    if username.is_empty() || password.is_empty() {
        return response::error("username and password required");
    }
    if ctx.store.user_exists(username) {
        return response::error("username already taken");
    }
    if !ctx.store.create_user(username, password) {
        return response::error("registration failed");
    }

    info!(username, "Registered user");
    response::success("registered")
}

pub fn login(ctx: &Context, req: &Request, conn: ConnId) -> String {
    let body = parse_body(&req.body);
    let username = str_field(&body, "username");
    let password = str_field(&body, "password");

    if username.is_empty() || password.is_empty() {
        return response::error("username and password required");
    }

    let profile = match ctx.store.verify_user(username, password) {
        Some(profile) => profile,
        None => return response::error("invalid username or password"),
    };

    let token = ctx.sessions.login(profile.user_id, &profile.username, conn);
    info!(user_id = profile.user_id, username, "User logged in");

    let payload = LoginPayload {
        user_id: profile.user_id,
        username: &profile.username,
        token: &token,
    };
    match serde_json::to_string(&payload) {
        Ok(json) => response::success(&json),
        Err(_) => response::error("login failed"),
    }
}

pub fn logout(ctx: &Context, req: &Request) -> String {
    let token = match req.bearer_token.as_deref() {
        Some(token) => token,
        None => return response::error("not logged in"),
    };
    if !ctx.sessions.logout(token) {
        return response::error("not logged in");
    }
    response::success("logged out")
}

pub fn profile(session: Option<&SessionInfo>) -> String {
    let session = match session {
        Some(session) => session,
        None => return response::error("not logged in"),
    };
    let payload = ProfilePayload {
        user_id: session.user_id,
        username: &session.username,
    };
    match serde_json::to_string(&payload) {
        Ok(json) => response::success(&json),
        Err(_) => response::error("profile unavailable"),
    }
}
