use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_user;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{ok_json, parse_body, required_str};
use crate::core::store::Document;
use crate::friends::{block_user, unblock_user};
use crate::models::models::{Notifications, Users};
use crate::App;

pub fn handle_block(app: &App, req: Request) -> ApiResult<Response> {
    let blocker = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let target = required_str(&body, "username")?;

    app.repo.transaction(&[Document::Users, Document::Notifications], |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        block_user(&mut users, &blocker, target)?;
        tx.stage(Document::Users, &users)?;

        // Drop anything the blocked user still has queued for the blocker.
        let mut queues: Notifications = tx.load(Document::Notifications)?;
        if let Some(queue) = queues.get_mut(&blocker) {
            queue.retain(|n| n.from != target);
            tx.stage(Document::Notifications, &queues)?;
        }
        Ok(())
    })?;

    info!(%blocker, %target, "user blocked");
    ok_json(&serde_json::json!({ "ok": true }))
}

pub fn handle_unblock(app: &App, req: Request) -> ApiResult<Response> {
    let blocker = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let target = required_str(&body, "username")?;

    let lifted = app.repo.update(Document::Users, |users: &mut Users| {
        unblock_user(users, &blocker, target)
    })?;

    info!(%blocker, %target, lifted, "user unblocked");
    ok_json(&serde_json::json!({ "ok": true, "unblocked": lifted }))
}

pub fn list_blocked(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let me = users.get(&username).ok_or(ApiError::Unauthorized)?;
    ok_json(&serde_json::json!({ "blocked": me.blocked }))
}
