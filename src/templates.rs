use http::StatusCode;
use spin_sdk::http::{Request, Response};

use crate::auth::validate_token;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::static_server::asset_text;
use crate::core::store::Document;
use crate::models::models::Users;
use crate::users::profile_json;
use crate::App;

fn field_row(label: &str, value: &str) -> String {
    format!(
        r#"<div class="profile-field">
                <div class="profile-field-label">{}</div>
                <div class="profile-field-value">{}</div>
            </div>"#,
        html_escape::encode_text(label),
        html_escape::encode_text(value)
    )
}

/// Fills the profile template from the JSON profile the viewer is allowed to see.
pub fn render_profile_html(template: &str, profile: &serde_json::Value) -> String {
    let text = |key: &str| -> Option<String> {
        match &profile[key] {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };

    let rows: String = [
        ("Bio", "bio"),
        ("Age", "age"),
        ("Date of Birth", "dob"),
        ("Relationship Status", "relationship_status"),
        ("Account Created", "created_at"),
        ("Last Logged In", "last_login"),
        ("Status", "status"),
        ("Relationship", "relationship"),
    ]
    .iter()
    .filter_map(|&(label, key)| text(key).map(|value| field_row(label, &value)))
    .collect();

    let username = text("username").unwrap_or_default();
    let picture = text("profile_pic").unwrap_or_else(|| "/img/default.svg".to_string());

    template
        .replace("PROFILE_USERNAME", &html_escape::encode_text(&username))
        .replace("PROFILE_PIC", &html_escape::encode_double_quoted_attribute(&picture))
        .replace("PROFILE_FIELDS", &rows)
}

/// `GET /profile/{username}`: the server-rendered profile page.
pub fn render_user_profile(app: &App, req: &Request, username: &str) -> ApiResult<Response> {
    let Some(viewer_name) = validate_token(app, req)? else {
        return Ok(Response::builder()
            .status(StatusCode::FOUND.as_u16())
            .header("Location", "/index.html")
            .body(Vec::new())
            .build());
    };

    let users: Users = app.repo.read(Document::Users)?;
    let viewer = users.get(&viewer_name).ok_or(ApiError::Unauthorized)?;
    let target = users
        .get(username)
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let profile = profile_json(viewer, target, app.config.online_secs);
    let html = render_profile_html(&asset_text("profile.html")?, &profile);

    Ok(Response::builder()
        .status(StatusCode::OK.as_u16())
        .header("Content-Type", "text/html; charset=utf-8")
        .body(html.into_bytes())
        .build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_and_skips_hidden_fields() {
        let profile = serde_json::json!({
            "username": "bob",
            "bio": "<script>alert(1)</script>",
            "age": 30,
            "created_at": "2024-01-01T00:00:00Z",
        });
        let html = render_profile_html(
            "<h1>PROFILE_USERNAME</h1><img src=\"PROFILE_PIC\">PROFILE_FIELDS",
            &profile,
        );
        assert!(html.contains("<h1>bob</h1>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("30"));
        assert!(html.contains("/img/default.svg"));
        assert!(!html.contains("Date of Birth"));
    }
}
