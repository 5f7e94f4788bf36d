// crates/intake-gate-http/src/cors.rs
// ============================================================================
// Module: CORS Origin Gate
// Description: Exact-match origin allow-listing for cross-origin submits.
// Purpose: Echo an Origin header back only when it is explicitly allowed.
// Dependencies: axum
// ============================================================================

//! ## Overview
//! Lead forms submit cross-origin, often via `sendBeacon` which usually skips
//! preflight but not always. The gate echoes the caller's `Origin` in
//! `Access-Control-Allow-Origin` only on an exact allow-list match; otherwise
//! no origin header is emitted at all. Method and header advertisements are
//! static.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::header;

// ============================================================================
// SECTION: Origin Gate
// ============================================================================

/// Methods advertised to preflight requests.
pub const ALLOWED_METHODS: &str = "POST, OPTIONS";
/// Headers advertised to preflight requests.
pub const ALLOWED_HEADERS: &str = "Content-Type";

/// Returns the caller's `Origin` value when it exactly matches the allow-list.
#[must_use]
pub fn allowed_origin(headers: &HeaderMap, allow_list: &[String]) -> Option<String> {
    let origin = headers.get(header::ORIGIN)?.to_str().ok()?;
    allow_list.iter().any(|allowed| allowed == origin).then(|| origin.to_string())
}

/// Appends CORS headers to a response header map.
///
/// The origin header is emitted only for an allow-listed caller; method and
/// header advertisements are always present for preflight coverage.
pub fn append_cors_headers(target: &mut HeaderMap, origin: Option<&str>) {
    target.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    target.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    if let Some(origin) = origin
        && let Ok(value) = HeaderValue::from_str(origin)
    {
        target.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use axum::http::HeaderMap;
    use axum::http::HeaderValue;
    use axum::http::header;

    use super::allowed_origin;
    use super::append_cors_headers;

    fn headers_with_origin(origin: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ORIGIN, HeaderValue::from_str(origin).unwrap());
        headers
    }

    #[test]
    fn exact_match_is_echoed() {
        let allow = vec!["https://forms.example.com".to_string()];
        let headers = headers_with_origin("https://forms.example.com");
        assert_eq!(allowed_origin(&headers, &allow).as_deref(), Some("https://forms.example.com"));
    }

    #[test]
    fn near_misses_are_rejected() {
        let allow = vec!["https://forms.example.com".to_string()];
        for origin in [
            "https://forms.example.com.evil.com",
            "http://forms.example.com",
            "https://forms.example.com/",
        ] {
            assert!(allowed_origin(&headers_with_origin(origin), &allow).is_none());
        }
        assert!(allowed_origin(&HeaderMap::new(), &allow).is_none());
    }

    #[test]
    fn origin_header_is_omitted_when_not_allowed() {
        let mut target = HeaderMap::new();
        append_cors_headers(&mut target, None);
        assert!(target.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert!(target.get(header::ACCESS_CONTROL_ALLOW_METHODS).is_some());

        let mut target = HeaderMap::new();
        append_cors_headers(&mut target, Some("https://forms.example.com"));
        assert_eq!(
            target.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("https://forms.example.com")
        );
    }
}
