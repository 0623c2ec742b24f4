use spin_sdk::http::{Request, Response};
use tracing::info;

use crate::auth::require_user;
use crate::core::errors::{ApiError, ApiResult};
use crate::core::helpers::{ok_json, parse_body};
use crate::core::store::Document;
use crate::models::models::{PrivacySettings, Users};
use crate::App;

/// Applies the boolean flags present in `patch`; unknown keys and
/// non-boolean values are rejected before anything changes.
pub fn apply_patch(settings: &mut PrivacySettings, patch: &serde_json::Value) -> ApiResult<()> {
    let object = patch
        .as_object()
        .ok_or_else(|| ApiError::bad_request("Expected a JSON object"))?;

    let mut updated = settings.clone();
    for (key, value) in object {
        let flag = value
            .as_bool()
            .ok_or_else(|| ApiError::bad_request(format!("'{key}' must be a boolean")))?;
        let slot = match key.as_str() {
            "bio" => &mut updated.bio,
            "age" => &mut updated.age,
            "dob" => &mut updated.dob,
            "relationship_status" => &mut updated.relationship_status,
            "profile_pic" => &mut updated.profile_pic,
            "last_login" => &mut updated.last_login,
            "online_status" => &mut updated.online_status,
            other => return Err(ApiError::bad_request(format!("Unknown privacy setting '{other}'"))),
        };
        *slot = flag;
    }
    *settings = updated;
    Ok(())
}

pub fn get_privacy(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let users: Users = app.repo.read(Document::Users)?;
    let me = users.get(&username).ok_or(ApiError::Unauthorized)?;
    ok_json(&me.privacy)
}

pub fn update_privacy(app: &App, req: Request) -> ApiResult<Response> {
    let username = require_user(app, &req)?;
    let patch = parse_body(&req)?;

    let settings = app.repo.update(Document::Users, |users: &mut Users| {
        let me = users.get_mut(&username).ok_or(ApiError::Unauthorized)?;
        apply_patch(&mut me.privacy, &patch)?;
        Ok(me.privacy.clone())
    })?;

    info!(%username, "privacy settings updated");
    ok_json(&settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_updates_only_named_flags() {
        let mut settings = PrivacySettings::default();
        apply_patch(&mut settings, &serde_json::json!({ "bio": false, "dob": true })).unwrap();
        assert!(!settings.bio);
        assert!(settings.dob);
        assert!(settings.age);
    }

    #[test]
    fn bad_patch_changes_nothing() {
        let mut settings = PrivacySettings::default();
        let err = apply_patch(&mut settings, &serde_json::json!({ "bio": false, "age": "no" }));
        assert!(err.is_err());
        assert_eq!(settings, PrivacySettings::default());

        assert!(apply_patch(&mut settings, &serde_json::json!({ "shoe_size": true })).is_err());
    }
}
