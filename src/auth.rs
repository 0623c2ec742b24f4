use http::StatusCode;
use spin_sdk::http::{Request, Response};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SESSION_COOKIE;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{cookie_value, now_iso, parse_body, parse_iso, verify_password};
use crate::core::store::{Document, Transaction};
use crate::models::models::{Session, Sessions, Users};
use crate::App;

fn session_cookie(token: &str, hours: i64) -> String {
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        hours.saturating_mul(3600)
    )
}

pub(crate) fn cleared_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

fn bearer_token(req: &Request) -> Option<String> {
    let auth_header = req.header("Authorization")?.as_str()?;
    auth_header
        .strip_prefix("Bearer ")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// The session token a request carries, header first, then cookie.
pub fn request_token(req: &Request) -> Option<String> {
    bearer_token(req).or_else(|| cookie_value(req, SESSION_COOKIE))
}

fn session_expired(session: &Session, hours: i64) -> bool {
    match parse_iso(&session.created_at) {
        Some(created) => (chrono::Utc::now() - created).num_hours() >= hours,
        None => true,
    }
}

/// Resolves the request's session to a username, if the session is live and
/// its user still exists.
pub fn validate_token(app: &App, req: &Request) -> ApiResult<Option<String>> {
    let Some(token) = request_token(req) else {
        return Ok(None);
    };
    let sessions: Sessions = app.repo.read(Document::Sessions)?;
    let Some(session) = sessions.get(&token) else {
        return Ok(None);
    };
    if session_expired(session, app.config.session_hours) {
        return Ok(None);
    }
    let users: Users = app.repo.read(Document::Users)?;
    Ok(users
        .contains_key(&session.username)
        .then(|| session.username.clone()))
}

pub fn require_user(app: &App, req: &Request) -> ApiResult<String> {
    match validate_token(app, req)? {
        Some(username) => Ok(username),
        None => {
            warn!(path = req.path(), "rejected unauthenticated request");
            Err(ApiError::Unauthorized)
        }
    }
}

/// Creates a session for `username` inside a transaction holding
/// `Document::Sessions`, pruning expired ones on the way.
pub fn issue_session(tx: &mut Transaction<'_>, username: &str, hours: i64) -> ApiResult<String> {
    let mut sessions: Sessions = tx.load(Document::Sessions)?;
    sessions.retain(|_, s| !session_expired(s, hours));

    let token = Uuid::new_v4().to_string();
    sessions.insert(
        token.clone(),
        Session {
            username: username.to_string(),
            created_at: now_iso(),
        },
    );
    tx.stage(Document::Sessions, &sessions)?;
    Ok(token)
}

/// JSON response carrying a fresh session token in body and cookie.
pub fn session_response(status: StatusCode, username: &str, token: &str, hours: i64) -> ApiResult<Response> {
    let body = serde_json::json!({
        "success": true,
        "username": username,
        "token": token,
    });
    Ok(Response::builder()
        .status(status.as_u16())
        .header("Content-Type", "application/json")
        .header("Set-Cookie", session_cookie(token, hours))
        .body(body.to_string().into_bytes())
        .build())
}

pub fn login_user(app: &App, req: Request) -> ApiResult<Response> {
    let creds = parse_body(&req)?;
    let username = creds["username"].as_str().unwrap_or_default().trim();
    let password = creds["password"].as_str().unwrap_or_default();
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }

    let hours = app.config.session_hours;
    let token = app.repo.transaction(&[Document::Users, Document::Sessions], |tx| {
        let mut users: Users = tx.load(Document::Users)?;
        let user = match users.get_mut(username) {
            Some(u) if verify_password(password, &u.password) => u,
            _ => {
                warn!(%username, "failed login");
                return Err(ApiError::Unauthorized);
            }
        };

        let now = now_iso();
        user.online = true;
        user.last_seen = Some(now.clone());
        user.last_login = Some(now);
        tx.stage(Document::Users, &users)?;

        issue_session(tx, username, hours)
    })?;

    info!(%username, "logged in");
    session_response(StatusCode::OK, username, &token, hours)
}

fn end_session(app: &App, req: &Request) -> ApiResult<()> {
    let Some(token) = request_token(req) else {
        return Ok(());
    };
    app.repo.transaction(&[Document::Users, Document::Sessions], |tx| {
        let mut sessions: Sessions = tx.load(Document::Sessions)?;
        let Some(session) = sessions.remove(&token) else {
            return Ok(());
        };
        tx.stage(Document::Sessions, &sessions)?;

        let mut users: Users = tx.load(Document::Users)?;
        if let Some(user) = users.get_mut(&session.username) {
            user.online = false;
            tx.stage(Document::Users, &users)?;
        }
        info!(username = %session.username, "logged out");
        Ok(())
    })
}

pub fn logout_user(app: &App, req: Request) -> ApiResult<Response> {
    end_session(app, &req)?;

    Ok(Response::builder()
        .status(StatusCode::OK.as_u16())
        .header("Content-Type", "application/json")
        .header("Set-Cookie", cleared_cookie())
        .body(serde_json::json!({ "success": true }).to_string().into_bytes())
        .build())
}

/// Browser logout link: clears the session and sends the user to the login page.
pub fn logout_redirect(app: &App, req: Request) -> ApiResult<Response> {
    end_session(app, &req)?;

    Ok(Response::builder()
        .status(StatusCode::FOUND.as_u16())
        .header("Location", "/index.html")
        .header("Set-Cookie", cleared_cookie())
        .body(Vec::new())
        .build())
}
