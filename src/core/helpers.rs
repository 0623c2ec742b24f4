use std::sync::OnceLock;

use ammonia::Builder;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use http::StatusCode;
use rand::rngs::OsRng;
use regex::Regex;
use serde::Serialize;
use spin_sdk::http::{Request, Response};
use uuid::Uuid;

use crate::config::{MAX_USERNAME_LENGTH, MIN_USERNAME_LENGTH};
use crate::core::errors::{ApiError, ApiResult};

/// Fixed-width UTC timestamps, so they also sort as strings.
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

pub fn parse_iso(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::PasswordHash;

    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

pub fn validate_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

fn username_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("Regex should compile"))
}

pub fn validate_username(username: &str) -> ApiResult<()> {
    if username.is_empty() {
        return Err(ApiError::bad_request("Username is required"));
    }
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(ApiError::bad_request(format!(
            "Username must be {MIN_USERNAME_LENGTH}-{MAX_USERNAME_LENGTH} characters"
        )));
    }
    if !username_regex().is_match(username) {
        return Err(ApiError::bad_request(
            "Username may only contain letters, digits and underscores",
        ));
    }
    Ok(())
}

/// Strips all markup, leaving plain text.
pub fn sanitize_text(text: &str) -> String {
    Builder::default()
        .tags(std::collections::HashSet::new())
        .clean(text)
        .to_string()
}

fn dob_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(0[1-9]|1[0-2])/(0[1-9]|[12]\d|3[01])/(19|20)\d{2}$")
            .expect("Regex should compile")
    })
}

/// Parses an `MM/DD/YYYY` date of birth.
pub fn parse_dob(dob: &str) -> ApiResult<NaiveDate> {
    if !dob_regex().is_match(dob) {
        return Err(ApiError::bad_request("Date must be in MM/DD/YYYY format"));
    }
    NaiveDate::parse_from_str(dob, "%m/%d/%Y")
        .map_err(|_| ApiError::bad_request("Date must be in MM/DD/YYYY format"))
}

/// Whole years between `birth` and `on`.
pub fn age_on(birth: NaiveDate, on: NaiveDate) -> u32 {
    let mut age = on.year() - birth.year();
    if (on.month(), on.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age.max(0) as u32
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> ApiResult<Response> {
    Ok(Response::builder()
        .status(status.as_u16())
        .header("Content-Type", "application/json")
        .body(serde_json::to_vec(body).map_err(|e| ApiError::Internal(e.to_string()))?)
        .build())
}

pub fn ok_json<T: Serialize>(body: &T) -> ApiResult<Response> {
    json_response(StatusCode::OK, body)
}

/// Parses the request body as a JSON object; an empty body reads as `{}`.
pub fn parse_body(req: &Request) -> ApiResult<serde_json::Value> {
    let body = req.body();
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value = serde_json::from_slice(body)?;
    if !value.is_object() {
        return Err(ApiError::bad_request("Expected a JSON object"));
    }
    Ok(value)
}

/// A required, trimmed, non-empty string field.
pub fn required_str<'a>(body: &'a serde_json::Value, field: &str) -> ApiResult<&'a str> {
    body[field]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Field '{field}' is required")))
}

/// An optional image reference: absent, or a non-empty string within limits.
pub fn optional_image(body: &serde_json::Value, max_len: usize) -> ApiResult<Option<String>> {
    match body["image"].as_str().map(str::trim) {
        None | Some("") => Ok(None),
        Some(image) if image.len() > max_len => Err(ApiError::bad_request("Image reference too long")),
        Some(image) => Ok(Some(image.to_string())),
    }
}

/// Reads one cookie value from the `Cookie` header.
pub fn cookie_value(req: &Request, name: &str) -> Option<String> {
    let header = req.header("Cookie")?.as_str()?;
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// Decodes one percent-encoded path segment after `prefix`.
pub fn path_segment(path: &str, prefix: &str) -> Option<String> {
    let raw = path.strip_prefix(prefix)?.trim_end_matches('/');
    if raw.is_empty() || raw.contains('/') {
        return None;
    }
    urlencoding::decode(raw).ok().map(|s| s.into_owned())
}
