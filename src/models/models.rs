use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct PrivacySettings {
    pub bio: bool,
    pub age: bool,
    pub dob: bool,
    pub relationship_status: bool,
    pub profile_pic: bool,
    pub last_login: bool,
    pub online_status: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            bio: true,
            age: true,
            dob: false,
            relationship_status: true,
            profile_pic: true,
            last_login: true,
            online_status: true,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct User {
    pub username: String,
    pub password: String,
    pub created_at: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub relationship_status: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub profile_complete: bool,
    #[serde(default)]
    pub friends: Vec<String>,
    /// Incoming friend requests, by sender.
    #[serde(default)]
    pub pending_requests: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
    #[serde(default)]
    pub privacy: PrivacySettings,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub last_login: Option<String>,
}

impl User {
    pub fn new(username: String, password_hash: String, created_at: String) -> Self {
        Self {
            username,
            password: password_hash,
            created_at,
            ..Self::default()
        }
    }

    pub fn is_friend(&self, other: &str) -> bool {
        self.friends.iter().any(|f| f == other)
    }

    pub fn has_blocked(&self, other: &str) -> bool {
        self.blocked.iter().any(|b| b == other)
    }

    pub fn has_request_from(&self, other: &str) -> bool {
        self.pending_requests.iter().any(|p| p == other)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Comment {
    pub user: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Post {
    pub id: String,
    pub username: String,
    pub message: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub likes: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: String,
}

/// The day-scoped post document.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct PostBoard {
    /// UTC day (`YYYY-MM-DD`) the board was started on.
    #[serde(default)]
    pub day: String,
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DirectMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    pub message: String,
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: String,
}

impl DirectMessage {
    /// True when the message belongs to the conversation between `a` and `b`,
    /// regardless of direction.
    pub fn between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    pub fn involves(&self, username: &str) -> bool {
        self.from == username || self.to == username
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    FriendAccepted,
    Like,
    Comment,
    DirectMessage,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Notification {
    pub kind: NotificationKind,
    pub from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    pub created_at: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Session {
    pub username: String,
    pub created_at: String,
}

pub type Users = BTreeMap<String, User>;
pub type Messages = Vec<DirectMessage>;
pub type Sessions = BTreeMap<String, Session>;
pub type Notifications = BTreeMap<String, Vec<Notification>>;
