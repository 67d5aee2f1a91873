//! WebSocket upgrade authentication: opaque UI-session tokens or a static
//! API-key allow-list, compared in constant time.

use crate::config::app_config::SessionSettings;
use actix_web::HttpRequest;

/// Extract a bearer token from `?token=` or `Authorization: Bearer`.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    if let Some(token) = req.query_string().split('&').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some("token"), Some(value)) => Some(value.to_string()),
            _ => None,
        }
    }) {
        return Some(token);
    }

    req.headers()
        .get(actix_web::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Equal-length, equal-bytes constant-time comparison: XOR-fold every byte
/// so early mismatches don't short-circuit timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// UI-session tokens pass if present in the (stubbed, in-memory)
/// session-token list; otherwise compared against the configured API-key
/// list. If no auth is configured at all, every upgrade passes.
pub fn authenticate(token: Option<&str>, settings: &SessionSettings) -> bool {
    if !settings.auth_configured() {
        return true;
    }

    let Some(token) = token else { return false };
    let token_bytes = token.as_bytes();

    if settings.ui_session_tokens.iter().any(|t| constant_time_eq(t.as_bytes(), token_bytes)) {
        return true;
    }

    if !settings.api_keys.is_empty() {
        return settings.api_keys.iter().any(|k| constant_time_eq(k.as_bytes(), token_bytes));
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_auth_configured_passes_everything() {
        let settings = SessionSettings::default();
        assert!(authenticate(None, &settings));
    }

    #[test]
    fn valid_api_key_passes() {
        let settings = SessionSettings { api_keys: vec!["secret".into()], ..Default::default() };
        assert!(authenticate(Some("secret"), &settings));
        assert!(!authenticate(Some("wrong"), &settings));
        assert!(!authenticate(None, &settings));
    }

    #[test]
    fn ui_session_token_configured_without_api_keys_rejects_non_session_tokens() {
        let settings = SessionSettings { ui_session_tokens: vec!["ui-tok".into()], ..Default::default() };
        assert!(authenticate(Some("ui-tok"), &settings));
        assert!(!authenticate(Some("anything-else"), &settings));
    }
}
