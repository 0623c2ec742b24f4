use http::StatusCode;
use mime_guess::from_path;
use rust_embed::RustEmbed;
use spin_sdk::http::Response;

use crate::core::errors::{ApiError, ApiResult};

#[derive(RustEmbed)]
#[folder = "static"]
pub struct Assets;

pub fn serve_static(path: &str) -> ApiResult<Response> {
    let file_path = match path {
        "/" => "index.html",
        _ => path.trim_start_matches('/'),
    };

    let file = Assets::get(file_path).ok_or_else(|| ApiError::not_found("No route found"))?;

    let mime = from_path(file_path).first_or_octet_stream();

    Ok(Response::builder()
        .status(StatusCode::OK.as_u16())
        .header("Content-Type", mime.as_ref())
        .body(file.data.to_vec())
        .build())
}

/// An embedded file as UTF-8 text.
pub fn asset_text(name: &str) -> anyhow::Result<String> {
    let file = Assets::get(name).ok_or_else(|| anyhow::anyhow!("asset '{name}' not embedded"))?;
    Ok(String::from_utf8(file.data.to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_serves_index() {
        let resp = serve_static("/").unwrap();
        assert_eq!(*resp.status(), 200);
        let ctype = resp.header("content-type").and_then(|v| v.as_str()).unwrap();
        assert!(ctype.starts_with("text/html"));
    }

    #[test]
    fn scripts_get_javascript_mime() {
        let resp = serve_static("/app.js").unwrap();
        let ctype = resp.header("content-type").and_then(|v| v.as_str()).unwrap();
        assert!(ctype.contains("javascript"));
    }

    #[test]
    fn unknown_asset_is_not_found() {
        assert!(matches!(serve_static("/nope.txt"), Err(ApiError::NotFound(_))));
    }
}
