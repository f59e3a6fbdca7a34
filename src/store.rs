//! In-process data-access collaborator.
//!
//! Backs the business handlers with a thread-safe store for users,
//! messages, groups, and forum posts. Operations report failure through
//! booleans and `Option`s; nothing here panics or blocks indefinitely.
//! The server core treats this as an opaque collaborator; swapping in a
//! relational backend would not change any caller.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// A registered user, including the stored password.
#[derive(Debug, Clone)]
struct UserRecord {
    user_id: i64,
    username: String,
    password: String,
}

/// Public view of a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: String,
}

/// A stored chat message. Exactly one of `receiver_id` / `group_id` is set.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub message_id: i64,
    pub sender_id: i64,
    pub receiver_id: Option<i64>,
    pub group_id: Option<i64>,
    pub content: String,
    pub kind: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct GroupRecord {
    pub group_id: i64,
    pub group_name: String,
    pub description: String,
    pub creator_id: i64,
    pub created_time: String,
}

#[derive(Debug, Clone)]
pub struct PostRecord {
    pub post_id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct ReplyRecord {
    pub reply_id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
    pub timestamp: String,
}

#[derive(Default)]
struct Tables {
    users: HashMap<i64, UserRecord>,
    users_by_name: HashMap<String, i64>,
    messages: Vec<MessageRecord>,
    groups: HashMap<i64, GroupRecord>,
    /// group id -> member user ids
    members: HashMap<i64, HashSet<i64>>,
    posts: HashMap<i64, PostRecord>,
    replies: Vec<ReplyRecord>,
}

/// Thread-safe application data store.
pub struct Store {
    tables: RwLock<Tables>,
    next_user_id: AtomicI64,
    next_message_id: AtomicI64,
    next_group_id: AtomicI64,
    next_post_id: AtomicI64,
    next_reply_id: AtomicI64,
}

impl Store {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            tables: RwLock::new(Tables::default()),
            next_user_id: AtomicI64::new(1),
            next_message_id: AtomicI64::new(1),
            next_group_id: AtomicI64::new(1),
            next_post_id: AtomicI64::new(1),
            next_reply_id: AtomicI64::new(1),
        })
    }

    // --- users ---

    /// Register a user. Fails if the username is already taken.
    pub fn create_user(&self, username: &str, password: &str) -> bool {
        let mut tables = self.write();
        if tables.users_by_name.contains_key(username) {
            return false;
        }
        let user_id = self.next_user_id.fetch_add(1, Ordering::SeqCst);
        tables.users_by_name.insert(username.to_string(), user_id);
        tables.users.insert(
            user_id,
            UserRecord {
                user_id,
                username: username.to_string(),
                password: password.to_string(),
            },
        );
        debug!(user_id, username, "Created user");
        true
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.read().users_by_name.contains_key(username)
    }

    /// Check credentials, returning the user's profile on a match.
    pub fn verify_user(&self, username: &str, password: &str) -> Option<UserProfile> {
        let tables = self.read();
        let user_id = *tables.users_by_name.get(username)?;
        let user = tables.users.get(&user_id)?;
        if user.password != password {
            return None;
        }
        Some(UserProfile {
            user_id: user.user_id,
            username: user.username.clone(),
        })
    }

    pub fn username_by_id(&self, user_id: i64) -> Option<String> {
        self.read()
            .users
            .get(&user_id)
            .map(|user| user.username.clone())
    }

    /// All users other than the caller, sorted by id.
    pub fn contacts_of(&self, user_id: i64) -> Vec<UserProfile> {
        let tables = self.read();
        let mut contacts: Vec<UserProfile> = tables
            .users
            .values()
            .filter(|user| user.user_id != user_id)
            .map(|user| UserProfile {
                user_id: user.user_id,
                username: user.username.clone(),
            })
            .collect();
        contacts.sort_by_key(|profile| profile.user_id);
        contacts
    }

    // --- messages ---

    /// Persist a message and return whether it was stored.
    pub fn save_message(
        &self,
        sender_id: i64,
        receiver_id: Option<i64>,
        group_id: Option<i64>,
        content: &str,
        kind: &str,
        timestamp: &str,
    ) -> bool {
        let mut tables = self.write();
        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        tables.messages.push(MessageRecord {
            message_id,
            sender_id,
            receiver_id,
            group_id,
            content: content.to_string(),
            kind: kind.to_string(),
            timestamp: timestamp.to_string(),
        });
        true
    }

    /// Direct messages the user sent or received, in arrival order.
    pub fn messages_for(&self, user_id: i64) -> Vec<MessageRecord> {
        self.read()
            .messages
            .iter()
            .filter(|message| {
                message.group_id.is_none()
                    && (message.sender_id == user_id || message.receiver_id == Some(user_id))
            })
            .cloned()
            .collect()
    }

    /// Messages for a group, in arrival order.
    pub fn group_messages(&self, group_id: i64) -> Vec<MessageRecord> {
        self.read()
            .messages
            .iter()
            .filter(|message| message.group_id == Some(group_id))
            .cloned()
            .collect()
    }

    // --- groups ---

    /// Create a group; the creator joins automatically.
    pub fn create_group(
        &self,
        group_name: &str,
        description: &str,
        creator_id: i64,
        created_time: &str,
    ) -> Option<i64> {
        let mut tables = self.write();
        let group_id = self.next_group_id.fetch_add(1, Ordering::SeqCst);
        tables.groups.insert(
            group_id,
            GroupRecord {
                group_id,
                group_name: group_name.to_string(),
                description: description.to_string(),
                creator_id,
                created_time: created_time.to_string(),
            },
        );
        tables
            .members
            .entry(group_id)
            .or_default()
            .insert(creator_id);
        debug!(group_id, group_name, "Created group");
        Some(group_id)
    }

    pub fn all_groups(&self) -> Vec<GroupRecord> {
        let mut groups: Vec<GroupRecord> = self.read().groups.values().cloned().collect();
        groups.sort_by_key(|group| group.group_id);
        groups
    }

    /// Groups the user belongs to, sorted by id.
    pub fn groups_of(&self, user_id: i64) -> Vec<GroupRecord> {
        let tables = self.read();
        let mut groups: Vec<GroupRecord> = tables
            .groups
            .values()
            .filter(|group| {
                tables
                    .members
                    .get(&group.group_id)
                    .is_some_and(|members| members.contains(&user_id))
            })
            .cloned()
            .collect();
        groups.sort_by_key(|group| group.group_id);
        groups
    }

    /// Add the user to a group. Fails if the group does not exist or the
    /// user is already a member.
    pub fn join_group(&self, user_id: i64, group_id: i64) -> bool {
        let mut tables = self.write();
        if !tables.groups.contains_key(&group_id) {
            return false;
        }
        tables.members.entry(group_id).or_default().insert(user_id)
    }

    /// Remove the user from a group. Fails if they were not a member.
    pub fn leave_group(&self, user_id: i64, group_id: i64) -> bool {
        let mut tables = self.write();
        tables
            .members
            .get_mut(&group_id)
            .is_some_and(|members| members.remove(&user_id))
    }

    pub fn is_member(&self, user_id: i64, group_id: i64) -> bool {
        self.read()
            .members
            .get(&group_id)
            .is_some_and(|members| members.contains(&user_id))
    }

    // --- forum ---

    pub fn create_post(&self, user_id: i64, title: &str, content: &str, timestamp: &str) -> bool {
        let mut tables = self.write();
        let post_id = self.next_post_id.fetch_add(1, Ordering::SeqCst);
        tables.posts.insert(
            post_id,
            PostRecord {
                post_id,
                user_id,
                title: title.to_string(),
                content: content.to_string(),
                timestamp: timestamp.to_string(),
            },
        );
        true
    }

    /// All posts, newest first.
    pub fn posts(&self) -> Vec<PostRecord> {
        let mut posts: Vec<PostRecord> = self.read().posts.values().cloned().collect();
        posts.sort_by_key(|post| std::cmp::Reverse(post.post_id));
        posts
    }

    pub fn post_by_id(&self, post_id: i64) -> Option<PostRecord> {
        self.read().posts.get(&post_id).cloned()
    }

    /// Attach a reply to an existing post.
    pub fn reply_post(&self, post_id: i64, user_id: i64, content: &str, timestamp: &str) -> bool {
        let mut tables = self.write();
        if !tables.posts.contains_key(&post_id) {
            return false;
        }
        let reply_id = self.next_reply_id.fetch_add(1, Ordering::SeqCst);
        tables.replies.push(ReplyRecord {
            reply_id,
            post_id,
            user_id,
            content: content.to_string(),
            timestamp: timestamp.to_string(),
        });
        true
    }

    /// Replies to a post, in arrival order.
    pub fn replies_of(&self, post_id: i64) -> Vec<ReplyRecord> {
        self.read()
            .replies
            .iter()
            .filter(|reply| reply.post_id == post_id)
            .cloned()
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        match self.tables.read() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("store lock poisoned: {}", poisoned),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        match self.tables.write() {
            Ok(guard) => guard,
            Err(poisoned) => panic!("store lock poisoned: {}", poisoned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_verify_user() {
        let store = Store::new();
        assert!(store.create_user("alice", "pw1"));
        assert!(!store.create_user("alice", "other"));
        assert!(store.user_exists("alice"));
        assert!(!store.user_exists("bob"));

        let profile = store.verify_user("alice", "pw1").unwrap();
        assert_eq!(profile.username, "alice");
        assert!(store.verify_user("alice", "wrong").is_none());
        assert!(store.verify_user("bob", "pw1").is_none());

        assert_eq!(store.username_by_id(profile.user_id).as_deref(), Some("alice"));
    }

    #[test]
    fn test_contacts_exclude_self() {
        let store = Store::new();
        store.create_user("alice", "a");
        store.create_user("bob", "b");
        store.create_user("carol", "c");
        let alice = store.verify_user("alice", "a").unwrap();

        let contacts = store.contacts_of(alice.user_id);
        assert_eq!(contacts.len(), 2);
        assert!(contacts.iter().all(|c| c.username != "alice"));
    }

    #[test]
    fn test_direct_messages_filtered_by_participant() {
        let store = Store::new();
        store.save_message(1, Some(2), None, "hi bob", "text", "t1");
        store.save_message(2, Some(1), None, "hi alice", "text", "t2");
        store.save_message(3, Some(4), None, "unrelated", "text", "t3");
        store.save_message(1, None, Some(9), "group chatter", "text", "t4");

        let messages = store.messages_for(1);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "hi bob");
        assert_eq!(messages[1].content, "hi alice");
    }

    #[test]
    fn test_group_lifecycle() {
        let store = Store::new();
        let group_id = store.create_group("rustaceans", "crab talk", 1, "t0").unwrap();

        // Creator auto-joins.
        assert!(store.is_member(1, group_id));
        assert!(!store.join_group(1, group_id));

        assert!(store.join_group(2, group_id));
        assert!(store.is_member(2, group_id));
        assert_eq!(store.groups_of(2).len(), 1);

        assert!(store.leave_group(2, group_id));
        assert!(!store.is_member(2, group_id));
        assert!(!store.leave_group(2, group_id));

        // Unknown group.
        assert!(!store.join_group(1, 999));
    }

    #[test]
    fn test_group_messages() {
        let store = Store::new();
        let group_id = store.create_group("g", "", 1, "t0").unwrap();
        store.save_message(1, None, Some(group_id), "one", "text", "t1");
        store.save_message(1, Some(2), None, "direct", "text", "t2");

        let messages = store.group_messages(group_id);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "one");
    }

    #[test]
    fn test_posts_newest_first_and_replies() {
        let store = Store::new();
        assert!(store.create_post(1, "first", "body", "t1"));
        assert!(store.create_post(2, "second", "body", "t2"));

        let posts = store.posts();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "second");

        let post_id = posts[1].post_id;
        assert!(store.reply_post(post_id, 2, "nice", "t3"));
        assert!(!store.reply_post(999, 2, "ghost", "t3"));

        let replies = store.replies_of(post_id);
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].content, "nice");

        assert!(store.post_by_id(post_id).is_some());
        assert!(store.post_by_id(999).is_none());
    }
}
