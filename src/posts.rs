use std::sync::OnceLock;

use http::StatusCode;
use regex::Regex;
use spin_sdk::http::{Request, Response};
use tracing::info;
use uuid::Uuid;

use crate::auth::require_user;
use crate::config::*;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{
    json_response, now_iso, ok_json, optional_image, parse_body, required_str, sanitize_text,
    today, validate_uuid,
};
use crate::core::store::Document;
use crate::models::models::{Comment, NotificationKind, Notifications, Post, PostBoard, User, Users};
use crate::notifications::notify;
use crate::visibility::{is_visible, ContentKind, ProfileField};
use crate::App;

/// Empties the board when it belongs to an earlier day. Returns whether the
/// board changed.
pub fn roll_over(board: &mut PostBoard, today: &str, daily_reset: bool) -> bool {
    if board.day == today {
        return false;
    }
    if daily_reset && !board.day.is_empty() {
        info!(previous = %board.day, dropped = board.posts.len(), "daily post reset");
        board.posts.clear();
    }
    board.day = today.to_string();
    true
}

fn url_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"']+"#).expect("Regex should compile")
    })
}

/// Reduces a message to escaped plain text and turns URLs into links.
pub fn filter_post_content(content: &str) -> String {
    let clean = sanitize_text(content);

    url_regex()
        .replace_all(&clean, |caps: &regex::Captures| {
            let url = &caps[0];
            format!(r#"<a href="{url}" target="_blank" rel="noopener noreferrer">{url}</a>"#)
        })
        .to_string()
}

/// A post as `viewer` sees it: comments from hidden users dropped, author
/// picture attached when visible, like state resolved.
fn feed_entry(viewer: &User, author: &User, users: &Users, post: &Post) -> serde_json::Value {
    let comments: Vec<&Comment> = post
        .comments
        .iter()
        .filter(|c| {
            users
                .get(&c.user)
                .map(|commenter| is_visible(viewer, commenter, ContentKind::Post))
                .unwrap_or(false)
        })
        .collect();

    let profile_pic = is_visible(viewer, author, ContentKind::ProfileField(ProfileField::ProfilePic))
        .then(|| author.profile_pic.clone())
        .flatten();

    serde_json::json!({
        "id": post.id,
        "username": post.username,
        "message": post.message,
        "image": post.image,
        "likes": post.likes,
        "like_count": post.likes.len(),
        "liked": post.likes.iter().any(|l| *l == viewer.username),
        "comments": comments,
        "created_at": post.created_at,
        "profile_pic": profile_pic,
    })
}

/// The caller's feed: every post on today's board whose author passes the
/// visibility gate, oldest first.
pub fn list_posts(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let viewer = users.get(&username).ok_or(ApiError::Unauthorized)?;

    let mut board: PostBoard = app.repo.read(Document::Posts)?;
    roll_over(&mut board, &today(), app.config.daily_reset);

    let feed: Vec<serde_json::Value> = board
        .posts
        .iter()
        .filter_map(|post| {
            let author = users.get(&post.username)?;
            is_visible(viewer, author, ContentKind::Post)
                .then(|| feed_entry(viewer, author, &users, post))
        })
        .collect();

    ok_json(&feed)
}

pub fn create_post(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;

    let message = body["message"].as_str().unwrap_or_default().trim();
    let image = optional_image(&body, MAX_IMAGE_REF_LENGTH)?;
    if message.is_empty() && image.is_none() {
        return Err(ApiError::bad_request("Message required"));
    }
    if message.chars().count() > MAX_POST_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Message too long (max {MAX_POST_LENGTH} characters)"
        )));
    }

    let post = Post {
        id: Uuid::new_v4().to_string(),
        username: username.clone(),
        message: filter_post_content(message),
        image,
        likes: Vec::new(),
        comments: Vec::new(),
        created_at: now_iso(),
    };

    let daily_reset = app.config.daily_reset;
    app.repo.update(Document::Posts, |board: &mut PostBoard| {
        roll_over(board, &today(), daily_reset);
        board.posts.push(post.clone());
        Ok(())
    })?;

    info!(%username, post_id = %post.id, "post created");
    json_response(StatusCode::CREATED, &post)
}

pub fn delete_post(app: &App, req: Request, post_id: &str) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    if !validate_uuid(post_id) {
        return Err(ApiError::bad_request("Post ID required"));
    }

    let daily_reset = app.config.daily_reset;
    app.repo.update(Document::Posts, |board: &mut PostBoard| {
        roll_over(board, &today(), daily_reset);
        let index = board
            .posts
            .iter()
            .position(|p| p.id == post_id)
            .ok_or_else(|| ApiError::not_found("Post not found"))?;
        if board.posts[index].username != username {
            return Err(ApiError::forbidden("Only the author can delete a post"));
        }
        board.posts.remove(index);
        Ok(())
    })?;

    info!(%username, %post_id, "post deleted");
    Ok(Response::builder().status(StatusCode::NO_CONTENT.as_u16()).build())
}

/// Finds a post the viewer is allowed to see; invisible posts read as missing.
fn visible_post_mut<'a>(
    board: &'a mut PostBoard,
    users: &Users,
    viewer: &User,
    post_id: &str,
) -> ApiResult<&'a mut Post> {
    let post = board
        .posts
        .iter_mut()
        .find(|p| p.id == post_id)
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    let author = users
        .get(&post.username)
        .ok_or_else(|| ApiError::not_found("Post not found"))?;
    if !is_visible(viewer, author, ContentKind::Post) {
        return Err(ApiError::not_found("Post not found"));
    }
    Ok(post)
}

/// Flips `username`'s like on `post`. Returns whether the post is now liked.
pub fn toggle_like(post: &mut Post, username: &str) -> bool {
    if let Some(index) = post.likes.iter().position(|l| l == username) {
        post.likes.remove(index);
        false
    } else {
        post.likes.push(username.to_string());
        true
    }
}

pub fn like_post(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let post_id = required_str(&body, "post_id")?;

    let daily_reset = app.config.daily_reset;
    let (liked, likes) = app.repo.transaction(
        &[Document::Users, Document::Posts, Document::Notifications],
        |tx| {
            let users: Users = tx.load(Document::Users)?;
            let viewer = users.get(&username).ok_or(ApiError::Unauthorized)?;
            let mut board: PostBoard = tx.load(Document::Posts)?;
            roll_over(&mut board, &today(), daily_reset);

            let post = visible_post_mut(&mut board, &users, viewer, post_id)?;
            let liked = toggle_like(post, &username);
            let likes = post.likes.len();
            let author = post.username.clone();
            tx.stage(Document::Posts, &board)?;

            if liked {
                let mut queues: Notifications = tx.load(Document::Notifications)?;
                notify(&mut queues, &users, &author, &username, NotificationKind::Like, Some(post_id));
                tx.stage(Document::Notifications, &queues)?;
            }
            Ok((liked, likes))
        },
    )?;

    ok_json(&serde_json::json!({ "liked": liked, "likes": likes }))
}

pub fn comment_post(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let body = parse_body(&req)?;
    let post_id = required_str(&body, "post_id")?;
    let text = required_str(&body, "text")?.to_string();
    if text.chars().count() > MAX_COMMENT_LENGTH {
        return Err(ApiError::bad_request(format!(
            "Comment too long (max {MAX_COMMENT_LENGTH} characters)"
        )));
    }

    let comment = Comment {
        user: username.clone(),
        text,
        created_at: now_iso(),
    };

    let daily_reset = app.config.daily_reset;
    app.repo.transaction(
        &[Document::Users, Document::Posts, Document::Notifications],
        |tx| {
            let users: Users = tx.load(Document::Users)?;
            let viewer = users.get(&username).ok_or(ApiError::Unauthorized)?;
            let mut board: PostBoard = tx.load(Document::Posts)?;
            roll_over(&mut board, &today(), daily_reset);

            let post = visible_post_mut(&mut board, &users, viewer, post_id)?;
            post.comments.push(comment.clone());
            let author = post.username.clone();
            tx.stage(Document::Posts, &board)?;

            let mut queues: Notifications = tx.load(Document::Notifications)?;
            notify(&mut queues, &users, &author, &username, NotificationKind::Comment, Some(post_id));
            tx.stage(Document::Notifications, &queues)?;
            Ok(())
        },
    )?;

    json_response(StatusCode::CREATED, &comment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> Post {
        Post {
            id: Uuid::new_v4().to_string(),
            username: "alice".to_string(),
            message: "hello".to_string(),
            image: None,
            likes: Vec::new(),
            comments: Vec::new(),
            created_at: now_iso(),
        }
    }

    #[test]
    fn like_twice_toggles_off() {
        let mut p = post();
        assert!(toggle_like(&mut p, "bob"));
        assert_eq!(p.likes, vec!["bob".to_string()]);
        assert!(!toggle_like(&mut p, "bob"));
        assert!(p.likes.is_empty());
    }

    #[test]
    fn likes_keep_set_semantics_across_users() {
        let mut p = post();
        toggle_like(&mut p, "bob");
        toggle_like(&mut p, "carol");
        toggle_like(&mut p, "bob");
        toggle_like(&mut p, "bob");
        assert_eq!(p.likes, vec!["carol".to_string(), "bob".to_string()]);
    }

    #[test]
    fn board_rolls_over_on_new_day() {
        let mut board = PostBoard {
            day: "2020-01-01".to_string(),
            posts: vec![post()],
        };
        assert!(roll_over(&mut board, "2020-01-02", true));
        assert!(board.posts.is_empty());
        assert_eq!(board.day, "2020-01-02");
        assert!(!roll_over(&mut board, "2020-01-02", true));
    }

    #[test]
    fn rollover_can_be_disabled() {
        let mut board = PostBoard {
            day: "2020-01-01".to_string(),
            posts: vec![post()],
        };
        roll_over(&mut board, "2020-01-02", false);
        assert_eq!(board.posts.len(), 1);
    }

    #[test]
    fn content_is_escaped_and_linkified() {
        let out = filter_post_content("<img src=x onerror=alert(1)>see https://example.com/a?b=1");
        assert!(!out.contains("<img"));
        assert!(out.contains(r#"<a href="https://example.com/a?b=1""#));
    }
}
