//! Bearer token extraction shared by the sync and admin routes.

use axum::http::HeaderMap;

/// Pull the bearer token out of an Authorization header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// The `X-WB-Public-Key` header, presented by instances so a hub with
/// auto-registration enabled can pin their key on first contact.
pub fn presented_public_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-WB-Public-Key")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split_whitespace().collect::<String>())
        .filter(|value| !value.is_empty())
}
