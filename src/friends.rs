//! Friend requests, friendships and blocks.
//!
//! The transitions operate on the in-memory users document; handlers run them
//! inside a transaction so both sides of a relation are written together.

use serde::Serialize;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_user;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{ok_json, parse_body, required_str};
use crate::core::store::Document;
use crate::models::models::{NotificationKind, Notifications, User, Users};
use crate::notifications::notify;
use crate::visibility::{relationship, Relationship};
use crate::App;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Sent,
    AlreadyPending,
    AlreadyFriends,
    /// The recipient had already asked the sender; the pair are now friends.
    Accepted,
}

fn user<'a>(users: &'a Users, name: &str) -> ApiResult<&'a User> {
    users
        .get(name)
        .ok_or_else(|| ApiError::not_found(format!("User '{name}' not found")))
}

fn user_mut<'a>(users: &'a mut Users, name: &str) -> ApiResult<&'a mut User> {
    users
        .get_mut(name)
        .ok_or_else(|| ApiError::not_found(format!("User '{name}' not found")))
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n == name) {
        list.push(name.to_string());
    }
}

fn make_friends(users: &mut Users, a: &str, b: &str) -> ApiResult<()> {
    let first = user_mut(users, a)?;
    first.pending_requests.retain(|p| p != b);
    push_unique(&mut first.friends, b);

    let second = user_mut(users, b)?;
    second.pending_requests.retain(|p| p != a);
    push_unique(&mut second.friends, a);
    Ok(())
}

pub fn send_request(users: &mut Users, sender: &str, recipient: &str) -> ApiResult<RequestOutcome> {
    if sender == recipient {
        return Err(ApiError::bad_request("You cannot befriend yourself"));
    }
    let state = relationship(user(users, sender)?, user(users, recipient)?);

    match state {
        Relationship::Blocked | Relationship::BlockedBy => {
            Err(ApiError::forbidden("Friend request not allowed"))
        }
        Relationship::Friends => Ok(RequestOutcome::AlreadyFriends),
        Relationship::PendingOutgoing => Ok(RequestOutcome::AlreadyPending),
        Relationship::PendingIncoming => {
            make_friends(users, sender, recipient)?;
            Ok(RequestOutcome::Accepted)
        }
        Relationship::None => {
            user_mut(users, recipient)?
                .pending_requests
                .push(sender.to_string());
            Ok(RequestOutcome::Sent)
        }
    }
}

/// Resolves the pending request `from` → `recipient`. Returns whether the
/// two are now friends.
pub fn respond_to_request(users: &mut Users, recipient: &str, from: &str, accept: bool) -> ApiResult<bool> {
    user(users, from)?;
    if !user(users, recipient)?.has_request_from(from) {
        return Err(ApiError::not_found(format!("No pending request from '{from}'")));
    }

    if accept {
        make_friends(users, recipient, from)?;
    } else {
        user_mut(users, recipient)?.pending_requests.retain(|p| p != from);
    }
    Ok(accept)
}

pub fn remove_friend(users: &mut Users, username: &str, friend: &str) -> ApiResult<()> {
    if !user(users, username)?.is_friend(friend) {
        return Err(ApiError::not_found(format!("'{friend}' is not your friend")));
    }
    user_mut(users, username)?.friends.retain(|f| f != friend);
    if let Some(other) = users.get_mut(friend) {
        other.friends.retain(|f| f != username);
    }
    Ok(())
}

/// Blocks `target`, stripping friendship and pending requests both ways.
pub fn block_user(users: &mut Users, blocker: &str, target: &str) -> ApiResult<()> {
    if blocker == target {
        return Err(ApiError::bad_request("You cannot block yourself"));
    }
    user(users, target)?;

    let me = user_mut(users, blocker)?;
    push_unique(&mut me.blocked, target);
    me.friends.retain(|f| f != target);
    me.pending_requests.retain(|p| p != target);

    let other = user_mut(users, target)?;
    other.friends.retain(|f| f != blocker);
    other.pending_requests.retain(|p| p != blocker);
    Ok(())
}

/// Returns whether a block was lifted.
pub fn unblock_user(users: &mut Users, blocker: &str, target: &str) -> ApiResult<bool> {
    let me = user_mut(users, blocker)?;
    let before = me.blocked.len();
    me.blocked.retain(|b| b != target);
    Ok(me.blocked.len() != before)
}

// === HTTP Handlers ===

pub fn list_friends(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let me = user(&users, &username)?;
    ok_json(&serde_json::json!({ "friends": me.friends }))
}

pub fn list_requests(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let me = user(&users, &username)?;
    ok_json(&serde_json::json!({ "requests": me.pending_requests }))
}

pub fn handle_friend_request(app: &App, req: Request) -> ApiResult<Response> {
    let sender = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let recipient = required_str(&body, "recipient")?;

    let outcome = app.repo.transaction(&[Document::Users, Document::Notifications], |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        let outcome = send_request(&mut users, &sender, recipient)?;

        let kind = match outcome {
            RequestOutcome::Sent => Some(NotificationKind::FriendRequest),
            RequestOutcome::Accepted => Some(NotificationKind::FriendAccepted),
            RequestOutcome::AlreadyPending | RequestOutcome::AlreadyFriends => None,
        };
        if let Some(kind) = kind {
            tx.stage(Document::Users, &users)?;
            let mut queues: Notifications = tx.load(Document::Notifications)?;
            notify(&mut queues, &users, recipient, &sender, kind, None);
            tx.stage(Document::Notifications, &queues)?;
        }
        Ok(outcome)
    })?;

    info!(%sender, %recipient, ?outcome, "friend request");
    ok_json(&serde_json::json!({ "ok": true, "status": outcome }))
}

pub fn handle_respond(app: &App, req: Request) -> ApiResult<Response> {
    let recipient = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let from = required_str(&body, "from")?;
    let accept = body["accept"]
        .as_bool()
        .ok_or_else(|| ApiError::bad_request("Field 'accept' must be a boolean"))?;

    let friends = app.repo.transaction(&[Document::Users, Document::Notifications], |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        let friends = respond_to_request(&mut users, &recipient, from, accept)?;
        tx.stage(Document::Users, &users)?;

        if friends {
            let mut queues: Notifications = tx.load(Document::Notifications)?;
            notify(&mut queues, &users, from, &recipient, NotificationKind::FriendAccepted, None);
            tx.stage(Document::Notifications, &queues)?;
        }
        Ok(friends)
    })?;

    info!(%recipient, %from, accepted = friends, "friend request resolved");
    ok_json(&serde_json::json!({ "ok": true, "friends": friends }))
}

pub fn handle_remove_friend(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let friend = required_str(&body, "friend")?;

    app.repo.update(Document::Users, |users: &mut Users| {
        remove_friend(users, &username, friend)
    })?;

    info!(%username, %friend, "friend removed");
    ok_json(&serde_json::json!({ "ok": true }))
}

pub fn get_relationship(app: &App, req: Request, target: &str) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let state = relationship(user(&users, &username)?, user(&users, target)?);
    ok_json(&serde_json::json!({ "username": target, "relationship": state }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(names: &[&str]) -> Users {
        names
            .iter()
            .map(|n| (n.to_string(), User::new(n.to_string(), String::new(), String::new())))
            .collect()
    }

    #[test]
    fn accepted_request_is_symmetric_and_clears_pending() {
        let mut users = users(&["alice", "bob"]);
        assert_eq!(send_request(&mut users, "alice", "bob").unwrap(), RequestOutcome::Sent);
        assert_eq!(users["bob"].pending_requests, vec!["alice".to_string()]);

        assert!(respond_to_request(&mut users, "bob", "alice", true).unwrap());
        assert!(users["alice"].is_friend("bob"));
        assert!(users["bob"].is_friend("alice"));
        assert!(users["bob"].pending_requests.is_empty());
    }

    #[test]
    fn denied_request_leaves_no_residue_and_can_be_resent() {
        let mut users = users(&["alice", "bob"]);
        send_request(&mut users, "alice", "bob").unwrap();
        assert!(!respond_to_request(&mut users, "bob", "alice", false).unwrap());
        assert!(users["bob"].pending_requests.is_empty());
        assert!(users["alice"].friends.is_empty());

        assert_eq!(send_request(&mut users, "alice", "bob").unwrap(), RequestOutcome::Sent);
    }

    #[test]
    fn repeated_and_mutual_requests() {
        let mut users = users(&["alice", "bob"]);
        send_request(&mut users, "alice", "bob").unwrap();
        assert_eq!(
            send_request(&mut users, "alice", "bob").unwrap(),
            RequestOutcome::AlreadyPending
        );
        assert_eq!(users["bob"].pending_requests.len(), 1);

        assert_eq!(send_request(&mut users, "bob", "alice").unwrap(), RequestOutcome::Accepted);
        assert!(users["alice"].is_friend("bob") && users["bob"].is_friend("alice"));
        assert!(users["bob"].pending_requests.is_empty());
        assert_eq!(
            send_request(&mut users, "alice", "bob").unwrap(),
            RequestOutcome::AlreadyFriends
        );
    }

    #[test]
    fn invalid_requests() {
        let mut users = users(&["alice"]);
        assert!(matches!(send_request(&mut users, "alice", "alice"), Err(ApiError::BadRequest(_))));
        assert!(matches!(send_request(&mut users, "alice", "ghost"), Err(ApiError::NotFound(_))));
        assert!(matches!(
            respond_to_request(&mut users, "alice", "ghost", true),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn responding_without_request_fails() {
        let mut users = users(&["alice", "bob"]);
        assert!(matches!(
            respond_to_request(&mut users, "bob", "alice", true),
            Err(ApiError::NotFound(_))
        ));
        assert!(users["bob"].friends.is_empty());
    }

    #[test]
    fn removal_is_symmetric() {
        let mut users = users(&["alice", "bob"]);
        send_request(&mut users, "alice", "bob").unwrap();
        respond_to_request(&mut users, "bob", "alice", true).unwrap();

        remove_friend(&mut users, "bob", "alice").unwrap();
        assert!(users["alice"].friends.is_empty());
        assert!(users["bob"].friends.is_empty());
        assert!(matches!(remove_friend(&mut users, "bob", "alice"), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn block_strips_friendship_and_requests_both_ways() {
        let mut users = users(&["alice", "bob"]);
        send_request(&mut users, "alice", "bob").unwrap();
        respond_to_request(&mut users, "bob", "alice", true).unwrap();
        users.get_mut("alice").unwrap().pending_requests.push("bob".to_string());

        block_user(&mut users, "alice", "bob").unwrap();
        assert!(users["alice"].friends.is_empty());
        assert!(users["bob"].friends.is_empty());
        assert!(users["alice"].pending_requests.is_empty());
        assert!(users["alice"].has_blocked("bob"));

        assert!(matches!(send_request(&mut users, "bob", "alice"), Err(ApiError::Forbidden(_))));
        assert!(matches!(send_request(&mut users, "alice", "bob"), Err(ApiError::Forbidden(_))));
    }

    #[test]
    fn unblock_returns_to_no_relation() {
        let mut users = users(&["alice", "bob"]);
        block_user(&mut users, "alice", "bob").unwrap();
        block_user(&mut users, "alice", "bob").unwrap();
        assert_eq!(users["alice"].blocked.len(), 1);

        assert!(unblock_user(&mut users, "alice", "bob").unwrap());
        assert!(!unblock_user(&mut users, "alice", "bob").unwrap());
        assert_eq!(relationship(&users["alice"], &users["bob"]), Relationship::None);
    }
}
