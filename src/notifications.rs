use spin_sdk::http::{Request, Response};
use tracing::debug;

use crate::auth::require_user;
use crate::core::errors::ApiResult;
use crate::core::helpers::{now_iso, ok_json};
use crate::core::store::Document;
use crate::models::models::{Notification, NotificationKind, Notifications, Users};
use crate::App;

/// Queues a notification for `to`, unless it is a self-action or `to` has
/// blocked the actor.
pub fn notify(
    queues: &mut Notifications,
    users: &Users,
    to: &str,
    from: &str,
    kind: NotificationKind,
    post_id: Option<&str>,
) {
    if to == from {
        return;
    }
    match users.get(to) {
        Some(recipient) if !recipient.has_blocked(from) => {}
        _ => return,
    }

    queues.entry(to.to_string()).or_default().push(Notification {
        kind,
        from: from.to_string(),
        post_id: post_id.map(str::to_string),
        created_at: now_iso(),
    });
}

/// Hands out everything queued for the caller and clears the queue.
pub fn poll_notifications(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let delivered = app.repo.update(Document::Notifications, |queues: &mut Notifications| {
        Ok(queues.remove(&username).unwrap_or_default())
    })?;

    if !delivered.is_empty() {
        debug!(%username, count = delivered.len(), "delivered notifications");
    }
    ok_json(&serde_json::json!({ "notifications": delivered }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::models::User;

    fn users() -> Users {
        let mut users = Users::new();
        for name in ["alice", "bob"] {
            users.insert(name.to_string(), User::new(name.to_string(), String::new(), now_iso()));
        }
        users
    }

    #[test]
    fn queues_for_recipient() {
        let users = users();
        let mut queues = Notifications::new();
        notify(&mut queues, &users, "bob", "alice", NotificationKind::FriendRequest, None);
        assert_eq!(queues["bob"].len(), 1);
        assert_eq!(queues["bob"][0].kind, NotificationKind::FriendRequest);
    }

    #[test]
    fn skips_self_blocked_and_unknown() {
        let mut users = users();
        users.get_mut("bob").unwrap().blocked.push("alice".to_string());
        let mut queues = Notifications::new();

        notify(&mut queues, &users, "alice", "alice", NotificationKind::Like, Some("p"));
        notify(&mut queues, &users, "bob", "alice", NotificationKind::Like, Some("p"));
        notify(&mut queues, &users, "ghost", "alice", NotificationKind::Comment, None);
        assert!(queues.is_empty());
    }
}
