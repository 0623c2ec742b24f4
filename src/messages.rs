//! Direct messages between two users.
//!
//! Sending needs DM visibility (friends, no block). History is never
//! redacted: either participant can read what was exchanged even after an
//! unfriend or a block.

use std::collections::BTreeMap;

use http::StatusCode;
use spin_sdk::http::{Request, Response};
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::require_user;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{json_response, now_iso, ok_json, optional_image, parse_body, required_str};
use crate::core::query_params::{get_int, get_string, parse_query_params};
use crate::core::store::Document;
use crate::models::models::{DirectMessage, Messages, NotificationKind, Notifications, Users};
use crate::notifications::notify;
use crate::posts::filter_post_content;
use crate::visibility::{is_visible, ContentKind};
use crate::App;

/// Messages exchanged by `a` and `b`, oldest first.
pub fn thread<'a>(messages: &'a [DirectMessage], a: &str, b: &str) -> Vec<&'a DirectMessage> {
    let mut thread: Vec<&DirectMessage> = messages.iter().filter(|m| m.between(a, b)).collect();
    thread.sort_by(|x, y| x.created_at.cmp(&y.created_at));
    thread
}

/// One entry per conversation partner with the latest message, newest first.
pub fn conversations<'a>(messages: &'a [DirectMessage], username: &str) -> Vec<(&'a str, &'a DirectMessage)> {
    let mut latest: BTreeMap<&str, &DirectMessage> = BTreeMap::new();
    for message in messages.iter().filter(|m| m.involves(username)) {
        let partner = if message.from == username {
            message.to.as_str()
        } else {
            message.from.as_str()
        };
        let entry = latest.entry(partner).or_insert(message);
        if message.created_at >= entry.created_at {
            *entry = message;
        }
    }

    let mut list: Vec<(&str, &DirectMessage)> = latest.into_iter().collect();
    list.sort_by(|x, y| y.1.created_at.cmp(&x.1.created_at));
    list
}

pub fn get_thread(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let params = parse_query_params(req.uri());
    let partner = get_string(&params, "user")
        .ok_or_else(|| ApiError::bad_request("Query parameter 'user' is required"))?;

    let users: Users = app.repo.read(Document::Users)?;
    if !users.contains_key(&partner) {
        return Err(ApiError::not_found("User not found"));
    }

    let messages: Messages = app.repo.read(Document::Messages)?;
    let thread = thread(&messages, &username, &partner);
    debug!(%username, %partner, count = thread.len(), "read thread");
    ok_json(&thread)
}

pub fn send_message(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let friend = required_str(&body, "friend")?.to_string();

    let text = body["message"].as_str().unwrap_or_default().trim();
    let image = optional_image(&body, MAX_IMAGE_REF_LENGTH)?;
    if text.is_empty() && image.is_none() {
        return Err(ApiError::bad_request("Message required"));
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Message too long (max {MAX_MESSAGE_LENGTH} characters)"
        )));
    }

    let message = DirectMessage {
        id: Uuid::new_v4().to_string(),
        from: username.clone(),
        to: friend.clone(),
        message: filter_post_content(text),
        image,
        created_at: now_iso(),
    };

    app.repo.transaction(
        &[Document::Users, Document::Messages, Document::Notifications],
        |tx| {
            let users: Users = tx.load(Document::Users)?;
            let sender = users.get(&username).ok_or(ApiError::Unauthorized)?;
            let recipient = users
                .get(&friend)
                .ok_or_else(|| ApiError::not_found("User not found"))?;
            if !is_visible(sender, recipient, ContentKind::DirectMessage) {
                return Err(ApiError::forbidden("You can only message friends"));
            }

            let mut messages: Messages = tx.load(Document::Messages)?;
            messages.push(message.clone());
            tx.stage(Document::Messages, &messages)?;

            let mut queues: Notifications = tx.load(Document::Notifications)?;
            notify(&mut queues, &users, &friend, &username, NotificationKind::DirectMessage, None);
            tx.stage(Document::Notifications, &queues)?;
            Ok(())
        },
    )?;

    info!(from = %username, to = %friend, "direct message sent");
    json_response(StatusCode::CREATED, &message)
}

pub fn list_conversations(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let params = parse_query_params(req.uri());
    let limit = get_int(&params, "limit", 50);

    let messages: Messages = app.repo.read(Document::Messages)?;
    let list: Vec<serde_json::Value> = conversations(&messages, &username)
        .into_iter()
        .take(limit)
        .map(|(partner, last)| serde_json::json!({ "user": partner, "last_message": last }))
        .collect();

    ok_json(&serde_json::json!({ "conversations": list }))
}
