use chrono::Utc;
use http::StatusCode;
use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::{cleared_cookie, issue_session, require_user, session_response};
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{
    age_on, hash_password, now_iso, ok_json, parse_body, parse_dob, parse_iso, required_str,
    validate_username, verify_password,
};
use crate::core::query_params::{get_string, parse_query_params};
use crate::core::store::Document;
use crate::models::models::{
    DirectMessage, Messages, Notifications, PostBoard, Sessions, User, Users,
};
use crate::visibility::{is_visible, relationship, ContentKind, ProfileField};
use crate::App;

pub fn presence(user: &User, online_secs: i64) -> &'static str {
    let recent = user
        .last_seen
        .as_deref()
        .and_then(parse_iso)
        .map(|seen| (Utc::now() - seen).num_seconds() <= online_secs)
        .unwrap_or(false);
    if user.online && recent {
        "online"
    } else {
        "offline"
    }
}

/// Profile of `target` as `viewer` may see it. Fields hidden by privacy or a
/// block are omitted.
pub fn profile_json(viewer: &User, target: &User, online_secs: i64) -> serde_json::Value {
    let shows = |field| is_visible(viewer, target, ContentKind::ProfileField(field));
    let mut profile = serde_json::json!({
        "username": target.username,
        "created_at": target.created_at,
    });

    if shows(ProfileField::Bio) {
        profile["bio"] = serde_json::json!(target.bio);
    }
    if shows(ProfileField::Age) {
        profile["age"] = serde_json::json!(target.age);
    }
    if shows(ProfileField::Dob) {
        profile["dob"] = serde_json::json!(target.dob);
    }
    if shows(ProfileField::RelationshipStatus) {
        profile["relationship_status"] = serde_json::json!(target.relationship_status);
    }
    if shows(ProfileField::ProfilePic) {
        profile["profile_pic"] = serde_json::json!(target.profile_pic);
    }
    if shows(ProfileField::LastLogin) {
        profile["last_login"] = serde_json::json!(target.last_login);
    }
    if shows(ProfileField::OnlineStatus) {
        profile["status"] = serde_json::json!(presence(target, online_secs));
    }
    if viewer.username != target.username {
        profile["relationship"] = serde_json::json!(relationship(viewer, target));
    }
    profile
}

pub fn create_account(app: &App, req: Request) -> ApiResult<Response> {
    let body = parse_body(&req)?;
    let username = body["username"].as_str().unwrap_or_default().trim();
    let password = body["password"].as_str().unwrap_or_default();

    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }
    validate_username(username)?;
    if password.len() < MIN_PASSWORD_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    let password_hash = hash_password(password)?;
    let hours = app.config.session_hours;
    let token = app.repo.transaction(&[Document::Users, Document::Sessions], |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        // Names are unique regardless of case so search and lookups stay unambiguous.
        if users.keys().any(|existing| existing.eq_ignore_ascii_case(username)) {
            return Err(ApiError::Conflict("Username already exists".to_string()));
        }

        let now = now_iso();
        let mut user = User::new(username.to_string(), password_hash, now.clone());
        user.online = true;
        user.last_seen = Some(now.clone());
        user.last_login = Some(now);
        users.insert(username.to_string(), user);
        tx.stage(Document::Users, &users)?;

        issue_session(tx, username, hours)
    })?;

    info!(%username, "account created");
    session_response(StatusCode::CREATED, username, &token, hours)
}

pub fn get_me(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let me = users
        .get(&username)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let mut body = profile_json(me, me, app.config.online_secs);
    body["profile_complete"] = serde_json::json!(me.profile_complete);
    body["privacy"] = serde_json::json!(me.privacy);
    ok_json(&body)
}

pub fn get_user_profile(app: &App, req: Request, target_name: &str) -> ApiResult<Response> {
    let viewer_name = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let viewer = users.get(&viewer_name).ok_or(ApiError::Unauthorized)?;
    let target = users
        .get(target_name)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    ok_json(&profile_json(viewer, target, app.config.online_secs))
}

fn validated_bio(body: &serde_json::Value) -> ApiResult<String> {
    let bio = required_str(body, "bio")?.to_string();
    let len = bio.chars().count();
    if len == 0 || len > MAX_BIO_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Bio must be 1-{MAX_BIO_LENGTH} characters"
        )));
    }
    Ok(bio)
}

fn optional_profile_pic(body: &serde_json::Value) -> ApiResult<Option<String>> {
    match body["profile_pic"].as_str().map(str::trim) {
        None | Some("") => Ok(None),
        Some(pic) if pic.len() > MAX_IMAGE_REF_LENGTH => {
            Err(ApiError::bad_request("Profile picture reference too long"))
        }
        Some(pic) => Ok(Some(pic.to_string())),
    }
}

/// First-time profile: date of birth (adults only) and bio.
pub fn complete_profile(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;

    let dob_text = required_str(&body, "dob")?;
    let birth = parse_dob(dob_text)?;
    let age = age_on(birth, Utc::now().date_naive());
    if age < MIN_AGE {
        return Err(ApiError::bad_request(format!(
            "You must be at least {MIN_AGE} years old"
        )));
    }
    let bio = validated_bio(&body)?;
    let profile_pic = optional_profile_pic(&body)?;

    let online_secs = app.config.online_secs;
    let profile = app.repo.update(Document::Users, |users: &mut Users| {
        let user = users
            .get_mut(&username)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        user.dob = Some(dob_text.to_string());
        user.age = Some(age);
        user.bio = Some(bio);
        if profile_pic.is_some() {
            user.profile_pic = profile_pic;
        }
        user.profile_complete = true;
        Ok(profile_json(user, user, online_secs))
    })?;

    info!(%username, "profile completed");
    ok_json(&profile)
}

pub fn edit_profile(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;

    let bio = validated_bio(&body)?;
    let relationship_status = match body["relationship_status"].as_str() {
        Some(status) => {
            let status = status.trim().to_string();
            if status.chars().count() > MAX_RELATIONSHIP_STATUS_LENGTH {
                return Err(ApiError::bad_request("Relationship status too long"));
            }
            Some(status)
        }
        None => None,
    };
    let profile_pic = optional_profile_pic(&body)?;

    let online_secs = app.config.online_secs;
    let profile = app.repo.update(Document::Users, |users: &mut Users| {
        let user = users
            .get_mut(&username)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        user.bio = Some(bio);
        if let Some(status) = relationship_status {
            user.relationship_status = (!status.is_empty()).then_some(status);
        }
        if profile_pic.is_some() {
            user.profile_pic = profile_pic;
        }
        Ok(profile_json(user, user, online_secs))
    })?;

    ok_json(&profile)
}

fn touch_presence(app: &App, req: &Request, login: bool) -> ApiResult<Response> {
    let username = require_user(app, req)?;
    let now = now_iso();
    app.repo.update(Document::Users, |users: &mut Users| {
        let user = users
            .get_mut(&username)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        user.online = true;
        user.last_seen = Some(now.clone());
        if login {
            user.last_login = Some(now.clone());
        }
        Ok(())
    })?;
    ok_json(&serde_json::json!({ "ok": true, "status": "online" }))
}

pub fn update_last_login(app: &App, req: Request) -> ApiResult<Response> {
    touch_presence(app, &req, true)
}

pub fn keep_online(app: &App, req: Request) -> ApiResult<Response> {
    touch_presence(app, &req, false)
}

/// Case-insensitive substring search over usernames, hiding anyone on
/// either side of a block with the caller. An empty query lists everyone.
pub fn search_users(app: &App, req: Request) -> ApiResult<Response> {
    let viewer_name = require_user(app, &req)?;
    let params = parse_query_params(req.uri());
    let query = get_string(&params, "query").unwrap_or_default().to_lowercase();

    let users: Users = app.repo.read(Document::Users)?;
    let viewer = users.get(&viewer_name).ok_or(ApiError::Unauthorized)?;

    let matches: Vec<&str> = users
        .values()
        .filter(|u| u.username != viewer_name)
        .filter(|u| u.username.to_lowercase().contains(&query))
        .filter(|u| is_visible(viewer, u, ContentKind::Post))
        .take(MAX_SEARCH_RESULTS)
        .map(|u| u.username.as_str())
        .collect();

    ok_json(&serde_json::json!({ "users": matches }))
}

/// Removes `username` and every trace of it from all documents.
pub fn purge_user(
    username: &str,
    users: &mut Users,
    board: &mut PostBoard,
    messages: &mut Messages,
    sessions: &mut Sessions,
    notifications: &mut Notifications,
) {
    users.remove(username);
    for other in users.values_mut() {
        other.friends.retain(|f| f != username);
        other.pending_requests.retain(|p| p != username);
        other.blocked.retain(|b| b != username);
    }

    board.posts.retain(|p| p.username != username);
    for post in &mut board.posts {
        post.likes.retain(|l| l != username);
        post.comments.retain(|c| c.user != username);
    }

    messages.retain(|m: &DirectMessage| !m.involves(username));
    sessions.retain(|_, s| s.username != username);

    notifications.remove(username);
    for queue in notifications.values_mut() {
        queue.retain(|n| n.from != username);
    }
}

pub fn delete_account(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let password = body["password"].as_str().unwrap_or_default();

    app.repo.transaction(&Document::ALL, |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        let user = users
            .get(&username)
            .ok_or_else(|| ApiError::not_found("User not found"))?;
        if !verify_password(password, &user.password) {
            return Err(ApiError::Unauthorized);
        }

        let mut board: PostBoard = tx.load(Document::Posts)?;
        let mut messages: Messages = tx.load(Document::Messages)?;
        let mut sessions: Sessions = tx.load(Document::Sessions)?;
        let mut notifications: Notifications = tx.load(Document::Notifications)?;

        purge_user(
            &username,
            &mut users,
            &mut board,
            &mut messages,
            &mut sessions,
            &mut notifications,
        );

        tx.stage(Document::Users, &users)?;
        tx.stage(Document::Posts, &board)?;
        tx.stage(Document::Messages, &messages)?;
        tx.stage(Document::Sessions, &sessions)?;
        tx.stage(Document::Notifications, &notifications)?;
        Ok(())
    })?;

    info!(%username, "account deleted");
    Ok(Response::builder()
        .status(StatusCode::OK.as_u16())
        .header("Content-Type", "application/json")
        .header("Set-Cookie", cleared_cookie())
        .body(serde_json::json!({ "success": true }).to_string().into_bytes())
        .build())
}
