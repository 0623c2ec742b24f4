use spin_sdk::http::{Request, Response};
use tracing::debug;

use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::path_segment;
use crate::core::static_server::serve_static;
use crate::{auth, blocks, friends, messages, notifications, posts, privacy, templates, users, App};

fn segment(path: &str, prefix: &str) -> ApiResult<String> {
    path_segment(path, prefix).ok_or_else(|| ApiError::bad_request("Invalid path"))
}

fn route(app: &App, req: Request) -> ApiResult<Response> {
    let method = req.method().to_string();
    let path = req.path().to_string();
    debug!(%method, %path, "request");

    match (method.as_str(), path.as_str()) {
        ("POST", "/create-account") => users::create_account(app, req),
        ("POST", "/login") => auth::login_user(app, req),
        ("POST", "/logout") => auth::logout_user(app, req),
        ("GET", "/logout") => auth::logout_redirect(app, req),
        ("GET", "/me") => users::get_me(app, req),
        ("DELETE", "/account") => users::delete_account(app, req),
        ("POST", "/complete-profile") => users::complete_profile(app, req),
        ("POST", "/edit-profile") => users::edit_profile(app, req),
        ("POST", "/update-last-login") => users::update_last_login(app, req),
        ("POST", "/keep-online") => users::keep_online(app, req),
        ("GET", "/search-users") => users::search_users(app, req),
        ("GET", p) if p.starts_with("/user/") => {
            let name = segment(p, "/user/")?;
            users::get_user_profile(app, req, &name)
        }
        ("GET", "/privacy") => privacy::get_privacy(app, req),
        ("PUT", "/privacy") => privacy::update_privacy(app, req),
        ("GET", "/friends") => friends::list_friends(app, req),
        ("DELETE", "/friends") => friends::handle_remove_friend(app, req),
        ("POST", "/friend-request") => friends::handle_friend_request(app, req),
        ("GET", "/friend-requests") => friends::list_requests(app, req),
        ("POST", "/friend-request/respond") => friends::handle_respond(app, req),
        ("GET", p) if p.starts_with("/relationship/") => {
            let name = segment(p, "/relationship/")?;
            friends::get_relationship(app, req, &name)
        }
        ("POST", "/block") => blocks::handle_block(app, req),
        ("DELETE", "/block") => blocks::handle_unblock(app, req),
        ("GET", "/blocked") => blocks::list_blocked(app, req),
        ("GET", "/posts") => posts::list_posts(app, req),
        ("POST", "/posts") => posts::create_post(app, req),
        ("DELETE", p) if p.starts_with("/posts/") => {
            let id = segment(p, "/posts/")?;
            posts::delete_post(app, req, &id)
        }
        ("POST", "/like") => posts::like_post(app, req),
        ("POST", "/comment") => posts::comment_post(app, req),
        ("GET", "/dm") => messages::get_thread(app, req),
        ("POST", "/dm") => messages::send_message(app, req),
        ("GET", "/conversations") => messages::list_conversations(app, req),
        ("GET", "/notifications") => notifications::poll_notifications(app, req),
        ("GET", p) if p.starts_with("/profile/") => {
            let name = segment(p, "/profile/")?;
            templates::render_user_profile(app, &req, &name)
        }
        ("GET", p) => serve_static(p),
        _ => Err(ApiError::not_found("No route found")),
    }
}

/// Dispatches one request and turns any error into its JSON response.
pub fn handle_request(app: &App, req: Request) -> Response {
    route(app, req).unwrap_or_else(Response::from)
}
