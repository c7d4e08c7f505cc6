use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use std::collections::HashSet;

use crate::error::AppError;
use trading_core::TradingError;

/// API key middleware for all EA channels.
///
/// Accepts the key from:
/// 1. X-API-Key header (the EA's convention)
/// 2. Authorization: Bearer <token>
pub async fn auth_middleware(
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path();
    if path == "/" || path == "/health" || path == "/api/status" {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&headers)
        .ok_or_else(|| TradingError::Auth("Missing API key".to_string()))?;

    if !valid_api_keys().contains(api_key.as_str()) {
        tracing::warn!("Invalid API key attempted: {}", mask_api_key(&api_key));
        return Err(TradingError::Auth("Invalid API key".to_string()).into());
    }

    Ok(next.run(request).await)
}

pub(crate) fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get("X-API-Key") {
        if let Ok(key) = value.to_str() {
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
    }

    if let Some(auth) = headers.get("Authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// Valid keys from the environment; comma-separated to allow rotation.
pub(crate) fn valid_api_keys() -> HashSet<String> {
    std::env::var("EA_API_KEYS")
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Mask a key for logging (first and last 4 characters only).
pub(crate) fn mask_api_key(key: &str) -> String {
    if key.len() <= 8 {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_extraction_order() {
        let mut headers = HeaderMap::new();
        assert!(extract_api_key(&headers).is_none());

        headers.insert("Authorization", HeaderValue::from_static("Bearer token-b"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("token-b"));

        headers.insert("X-API-Key", HeaderValue::from_static("key-a"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("key-a"));
    }

    #[test]
    fn masking() {
        assert_eq!(mask_api_key("short"), "****");
        assert_eq!(mask_api_key("abcd1234efgh5678"), "abcd...5678");
    }
}
