//! Forum handlers: posts, replies, post detail.

use super::{id_field, now_timestamp, parse_body, parse_id, str_field, Context};
use crate::protocol::request::Request;
use crate::protocol::response;
use crate::session::SessionInfo;
use crate::store::ReplyRecord;
use serde::Serialize;

#[derive(Serialize)]
struct PostView {
    post_id: i64,
    user_id: i64,
    username: String,
    title: String,
    content: String,
    timestamp: String,
}

#[derive(Serialize)]
struct PostDetailView {
    post_id: i64,
    user_id: i64,
    username: String,
    title: String,
    content: String,
    timestamp: String,
    replies: Vec<ReplyView>,
}

#[derive(Serialize)]
struct ReplyView {
    reply_id: i64,
    post_id: i64,
    user_id: i64,
    username: String,
    content: String,
    timestamp: String,
}

fn reply_view(ctx: &Context, reply: ReplyRecord) -> ReplyView {
    let username = ctx.store.username_by_id(reply.user_id).unwrap_or_default();
    ReplyView {
        reply_id: reply.reply_id,
        post_id: reply.post_id,
        user_id: reply.user_id,
        username,
        content: reply.content,
        timestamp: reply.timestamp,
    }
}

pub fn create_post(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match session {
        Some(session) => session,
        None => return response::error("not logged in"),
    };

    let body = parse_body(&req.body);
    let title = str_field(&body, "title");
    let content = str_field(&body, "content");
    if title.is_empty() || content.is_empty() {
        return response::error("title and content required");
    }

    if ctx
        .store
        .create_post(session.user_id, title, content, &now_timestamp())
    {
        response::success("post created")
    } else {
        response::error("failed to create post")
    }
}

pub fn get_posts(ctx: &Context) -> String {
    let views: Vec<PostView> = ctx
        .store
        .posts()
        .into_iter()
        .map(|post| PostView {
            username: ctx.store.username_by_id(post.user_id).unwrap_or_default(),
            post_id: post.post_id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            timestamp: post.timestamp,
        })
        .collect();
    match serde_json::to_string(&views) {
        Ok(json) => response::success(&json),
        Err(_) => response::error("serialization failed"),
    }
}

pub fn reply_post(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match session {
        Some(session) => session,
        None => return response::error("not logged in"),
    };

    let body = parse_body(&req.body);
    let content = str_field(&body, "content");
    let post_id = match id_field(&body, "post_id") {
        Ok(Some(post_id)) => post_id,
        Ok(None) => return response::error("post id and content required"),
        Err(message) => return response::error(&message),
    };
    if content.is_empty() {
        return response::error("post id and content required");
    }

    if ctx
        .store
        .reply_post(post_id, session.user_id, content, &now_timestamp())
    {
        response::success("reply posted")
    } else {
        response::error("failed to post reply")
    }
}

pub fn get_post_replies(ctx: &Context, req: &Request) -> String {
    let raw = match req.query_param("post_id") {
        Some(raw) if !raw.is_empty() => raw,
        _ => return response::error("post id required"),
    };
    let post_id = match parse_id(raw, "post id") {
        Ok(post_id) => post_id,
        Err(message) => return response::error(&message),
    };

    let views: Vec<ReplyView> = ctx
        .store
        .replies_of(post_id)
        .into_iter()
        .map(|reply| reply_view(ctx, reply))
        .collect();
    match serde_json::to_string(&views) {
        Ok(json) => response::success(&json),
        Err(_) => response::error("serialization failed"),
    }
}

/// Detail for one post, replies included.
pub fn get_post_detail(ctx: &Context, post_id: i64) -> String {
    let post = match ctx.store.post_by_id(post_id) {
        Some(post) => post,
        None => return response::error("post not found"),
    };

    let detail = PostDetailView {
        username: ctx.store.username_by_id(post.user_id).unwrap_or_default(),
        post_id: post.post_id,
        user_id: post.user_id,
        title: post.title,
        content: post.content,
        timestamp: post.timestamp,
        replies: ctx
            .store
            .replies_of(post_id)
            .into_iter()
            .map(|reply| reply_view(ctx, reply))
            .collect(),
    };
    match serde_json::to_string(&detail) {
        Ok(json) => response::success(&json),
        Err(_) => response::error("serialization failed"),
    }
}
