//! Messaging handlers: direct messages, contacts, and groups.
//!
//! Group membership rules follow the store: senders must belong to a group
//! to post into it or read its history, joining twice and leaving without
//! membership are reported as errors.

use super::{id_field, now_timestamp, parse_body, parse_id, str_field, Context};
use crate::protocol::request::Request;
use crate::protocol::response;
use crate::session::SessionInfo;
use crate::store::{GroupRecord, MessageRecord};
use serde::Serialize;

/// Wire view of a message. Absent receiver/group ids serialize as -1,
/// the sentinel existing clients expect.
#[derive(Serialize)]
struct MessageView {
    message_id: i64,
    sender_id: i64,
    sender_username: String,
    receiver_id: i64,
    group_id: i64,
    content: String,
    #[serde(rename = "type")]
    kind: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ContactView {
    user_id: i64,
    username: String,
    online: bool,
}

#[derive(Serialize)]
struct GroupView {
    group_id: i64,
    group_name: String,
    description: String,
    creator_id: i64,
    created_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_member: Option<bool>,
}

fn require(session: Option<&SessionInfo>) -> Result<&SessionInfo, String> {
    session.ok_or_else(|| response::error("not logged in"))
}

fn message_view(ctx: &Context, message: MessageRecord) -> MessageView {
    let sender_username = ctx
        .store
        .username_by_id(message.sender_id)
        .unwrap_or_default();
    MessageView {
        message_id: message.message_id,
        sender_id: message.sender_id,
        sender_username,
        receiver_id: message.receiver_id.unwrap_or(-1),
        group_id: message.group_id.unwrap_or(-1),
        content: message.content,
        kind: message.kind,
        timestamp: message.timestamp,
    }
}

fn json_list<T: Serialize>(items: &[T]) -> String {
    match serde_json::to_string(items) {
        Ok(json) => response::success(&json),
        Err(_) => response::error("serialization failed"),
    }
}

pub fn send_message(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let body = parse_body(&req.body);
    let content = str_field(&body, "content");
    if content.is_empty() {
        return response::error("message content required");
    }

    let receiver_id = match id_field(&body, "receiver_id") {
        Ok(id) => id,
        Err(message) => return response::error(&message),
    };
    let group_id = match id_field(&body, "group_id") {
        Ok(id) => id,
        Err(message) => return response::error(&message),
    };

    let kind = match str_field(&body, "type") {
        "" => "text",
        other => other,
    };

    // Direct delivery takes precedence when both targets are present.
    let (receiver_id, group_id) = match (receiver_id, group_id) {
        (Some(receiver), _) => (Some(receiver), None),
        (None, Some(group)) => {
            if !ctx.store.is_member(session.user_id, group) {
                return response::error("not a member of this group");
            }
            (None, Some(group))
        }
        (None, None) => return response::error("receiver_id or group_id required"),
    };

    if ctx.store.save_message(
        session.user_id,
        receiver_id,
        group_id,
        content,
        kind,
        &now_timestamp(),
    ) {
        response::success("message sent")
    } else {
        response::error("failed to send message")
    }
}

pub fn get_messages(ctx: &Context, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let views: Vec<MessageView> = ctx
        .store
        .messages_for(session.user_id)
        .into_iter()
        .map(|message| message_view(ctx, message))
        .collect();
    json_list(&views)
}

pub fn get_contacts(ctx: &Context, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let views: Vec<ContactView> = ctx
        .store
        .contacts_of(session.user_id)
        .into_iter()
        .map(|contact| ContactView {
            online: ctx.sessions.is_online(contact.user_id),
            user_id: contact.user_id,
            username: contact.username,
        })
        .collect();
    json_list(&views)
}

pub fn create_group(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let body = parse_body(&req.body);
    let group_name = str_field(&body, "group_name");
    let description = str_field(&body, "description");
    if group_name.is_empty() {
        return response::error("group name required");
    }

    match ctx
        .store
        .create_group(group_name, description, session.user_id, &now_timestamp())
    {
        Some(_) => response::success("group created"),
        None => response::error("failed to create group"),
    }
}

pub fn join_group(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let group_id = match group_id_from_body(&req.body) {
        Ok(group_id) => group_id,
        Err(envelope) => return envelope,
    };

    if ctx.store.is_member(session.user_id, group_id) {
        return response::error("already a member of this group");
    }
    if ctx.store.join_group(session.user_id, group_id) {
        response::success("joined group")
    } else {
        response::error("failed to join group")
    }
}

pub fn leave_group(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let group_id = match group_id_from_body(&req.body) {
        Ok(group_id) => group_id,
        Err(envelope) => return envelope,
    };

    if !ctx.store.is_member(session.user_id, group_id) {
        return response::error("not a member of this group");
    }
    if ctx.store.leave_group(session.user_id, group_id) {
        response::success("left group")
    } else {
        response::error("failed to leave group")
    }
}

/// Anonymous callers see every group; logged-in callers see their own
/// groups with an `is_member` flag.
pub fn get_groups(ctx: &Context, session: Option<&SessionInfo>) -> String {
    let (groups, user_id): (Vec<GroupRecord>, Option<i64>) = match session {
        Some(session) => (ctx.store.groups_of(session.user_id), Some(session.user_id)),
        None => (ctx.store.all_groups(), None),
    };

    let views: Vec<GroupView> = groups
        .into_iter()
        .map(|group| GroupView {
            is_member: user_id.map(|id| ctx.store.is_member(id, group.group_id)),
            group_id: group.group_id,
            group_name: group.group_name,
            description: group.description,
            creator_id: group.creator_id,
            created_time: group.created_time,
        })
        .collect();
    json_list(&views)
}

pub fn get_group_messages(ctx: &Context, req: &Request, session: Option<&SessionInfo>) -> String {
    let session = match require(session) {
        Ok(session) => session,
        Err(envelope) => return envelope,
    };

    let raw = match req.query_param("group_id") {
        Some(raw) if !raw.is_empty() => raw,
        _ => return response::error("group id required"),
    };
    let group_id = match parse_id(raw, "group id") {
        Ok(group_id) => group_id,
        Err(message) => return response::error(&message),
    };

    if !ctx.store.is_member(session.user_id, group_id) {
        return response::error("not a member of this group");
    }

    let views: Vec<MessageView> = ctx
        .store
        .group_messages(group_id)
        .into_iter()
        .map(|message| message_view(ctx, message))
        .collect();
    json_list(&views)
}

fn group_id_from_body(body: &str) -> Result<i64, String> {
    let body = parse_body(body);
    match id_field(&body, "group_id") {
        Ok(Some(group_id)) => Ok(group_id),
        Ok(None) => Err(response::error("group id required")),
        Err(message) => Err(response::error(&message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::store::Store;
    use serde_json::Value;

    fn test_ctx() -> Context {
        Context {
            store: Store::new(),
            sessions: SessionStore::new(),
            upload_dir: std::env::temp_dir(),
        }
    }

    fn post(body: &str) -> Request {
        Request {
            method: "POST".to_string(),
            path: "/api/test".to_string(),
            query: Default::default(),
            bearer_token: None,
            body: body.to_string(),
        }
    }

    fn get(query: &[(&str, &str)]) -> Request {
        Request {
            method: "GET".to_string(),
            path: "/api/test".to_string(),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            bearer_token: None,
            body: String::new(),
        }
    }

    fn user(ctx: &Context, name: &str) -> SessionInfo {
        ctx.store.create_user(name, "pw");
        let profile = ctx.store.verify_user(name, "pw").unwrap();
        SessionInfo {
            user_id: profile.user_id,
            username: profile.username,
        }
    }

    fn data(envelope: &str) -> Value {
        let value: Value = serde_json::from_str(envelope).unwrap();
        assert_eq!(value["status"], "success", "envelope: {}", envelope);
        value["data"].clone()
    }

    #[test]
    fn test_send_message_requires_login() {
        let ctx = test_ctx();
        assert_eq!(
            send_message(&ctx, &post(r#"{"content":"hi"}"#), None),
            response::error("not logged in")
        );
    }

    #[test]
    fn test_send_message_validation() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");

        assert_eq!(
            send_message(&ctx, &post(r#"{"receiver_id":2}"#), Some(&alice)),
            response::error("message content required")
        );
        assert_eq!(
            send_message(&ctx, &post(r#"{"content":"hi"}"#), Some(&alice)),
            response::error("receiver_id or group_id required")
        );
        // Non-numeric id is a validation error, not a fault.
        assert_eq!(
            send_message(
                &ctx,
                &post(r#"{"content":"hi","receiver_id":"abc"}"#),
                Some(&alice)
            ),
            response::error("invalid receiver_id")
        );
    }

    #[test]
    fn test_direct_message_round_trip() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");
        let bob = user(&ctx, "bob");

        let body = format!(r#"{{"content":"hi bob","receiver_id":{}}}"#, bob.user_id);
        assert_eq!(
            send_message(&ctx, &post(&body), Some(&alice)),
            response::success("message sent")
        );

        let inbox = data(&get_messages(&ctx, Some(&bob)));
        assert_eq!(inbox.as_array().unwrap().len(), 1);
        assert_eq!(inbox[0]["content"], "hi bob");
        assert_eq!(inbox[0]["sender_username"], "alice");
        assert_eq!(inbox[0]["group_id"], -1);
        assert_eq!(inbox[0]["type"], "text");
    }

    #[test]
    fn test_group_send_requires_membership() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");
        let bob = user(&ctx, "bob");

        create_group(&ctx, &post(r#"{"group_name":"g1"}"#), Some(&alice));
        let groups = data(&get_groups(&ctx, Some(&alice)));
        let group_id = groups[0]["group_id"].as_i64().unwrap();

        let body = format!(r#"{{"content":"yo","group_id":{}}}"#, group_id);
        assert_eq!(
            send_message(&ctx, &post(&body), Some(&bob)),
            response::error("not a member of this group")
        );
        assert_eq!(
            send_message(&ctx, &post(&body), Some(&alice)),
            response::success("message sent")
        );
    }

    #[test]
    fn test_contacts_carry_presence() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");
        let bob = user(&ctx, "bob");
        ctx.sessions.login(bob.user_id, &bob.username, 7);

        let contacts = data(&get_contacts(&ctx, Some(&alice)));
        let contacts = contacts.as_array().unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0]["username"], "bob");
        assert_eq!(contacts[0]["online"], true);
    }

    #[test]
    fn test_group_join_leave_rules() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");
        let bob = user(&ctx, "bob");

        create_group(&ctx, &post(r#"{"group_name":"g1"}"#), Some(&alice));
        let groups = data(&get_groups(&ctx, Some(&alice)));
        let group_id = groups[0]["group_id"].as_i64().unwrap();
        assert_eq!(groups[0]["is_member"], true);

        let body = format!(r#"{{"group_id":{}}}"#, group_id);
        assert_eq!(
            join_group(&ctx, &post(&body), Some(&alice)),
            response::error("already a member of this group")
        );
        assert_eq!(
            leave_group(&ctx, &post(&body), Some(&bob)),
            response::error("not a member of this group")
        );
        assert_eq!(
            join_group(&ctx, &post(&body), Some(&bob)),
            response::success("joined group")
        );
        assert_eq!(
            leave_group(&ctx, &post(&body), Some(&bob)),
            response::success("left group")
        );
        assert_eq!(
            join_group(&ctx, &post(r#"{"group_id":"zzz"}"#), Some(&bob)),
            response::error("invalid group_id")
        );
    }

    #[test]
    fn test_group_history_requires_membership() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");
        let bob = user(&ctx, "bob");

        create_group(&ctx, &post(r#"{"group_name":"g1"}"#), Some(&alice));
        let groups = data(&get_groups(&ctx, Some(&alice)));
        let group_id = groups[0]["group_id"].as_i64().unwrap();
        let id_string = group_id.to_string();

        let req = get(&[("group_id", &id_string)]);
        assert_eq!(
            get_group_messages(&ctx, &req, Some(&bob)),
            response::error("not a member of this group")
        );

        let body = format!(r#"{{"content":"first","group_id":{}}}"#, group_id);
        send_message(&ctx, &post(&body), Some(&alice));
        let history = data(&get_group_messages(&ctx, &req, Some(&alice)));
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["content"], "first");

        let bad = get(&[("group_id", "nope")]);
        assert_eq!(
            get_group_messages(&ctx, &bad, Some(&alice)),
            response::error("invalid group id")
        );
    }

    #[test]
    fn test_anonymous_group_listing_has_no_member_flag() {
        let ctx = test_ctx();
        let alice = user(&ctx, "alice");
        create_group(&ctx, &post(r#"{"group_name":"g1"}"#), Some(&alice));

        let groups = data(&get_groups(&ctx, None));
        assert_eq!(groups.as_array().unwrap().len(), 1);
        assert!(groups[0].get("is_member").is_none());
    }
}
