//! `Set-Cookie` value construction.
//!
//! Attributes are emitted in a fixed order: `name=value`, `Expires`,
//! `Max-age`, `Path`, `Domain`, `Secure`, `HttpOnly`. Every token is preceded
//! by a single space and terminated by `;`.
//!
//! Names, values, paths and domains are copied verbatim. Callers must strip
//! `;`, CR and LF from untrusted input themselves.

use std::fmt::Write as _;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Header name every encoded cookie is stored under.
pub const SET_COOKIE: &str = "Set-Cookie";

/// Latest instant an HTTP date can represent (9999-12-31T23:59:59Z).
const MAX_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// Cookie attributes accepted by [`encode_cookie`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub expires: Option<SystemTime>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn expires(mut self, at: SystemTime) -> Self {
        self.expires = Some(at);
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }
}

/// Build the `Set-Cookie` header value for `cookie`, computing `Max-age`
/// relative to `now`.
///
/// An expiry in the past yields a negative `Max-age`, which clients treat as
/// immediate expiry.
pub fn encode_cookie(cookie: &Cookie, now: SystemTime) -> String {
    let mut out = String::with_capacity(64);
    // Writing into a String cannot fail.
    let _ = write!(out, " {}={};", cookie.name, cookie.value);

    if let Some(expires) = cookie.expires {
        let _ = write!(out, " Expires={};", http_date(expires));
        let _ = write!(out, " Max-age={};", max_age(expires, now));
    }
    if let Some(path) = &cookie.path {
        let _ = write!(out, " Path={};", path);
    }
    if let Some(domain) = &cookie.domain {
        let _ = write!(out, " Domain={};", domain);
    }
    if cookie.secure {
        out.push_str(" Secure;");
    }
    if cookie.http_only {
        out.push_str(" HttpOnly;");
    }
    out
}

/// Whole seconds from `now` until `expires`; negative when already past.
fn max_age(expires: SystemTime, now: SystemTime) -> i64 {
    match expires.duration_since(now) {
        Ok(ahead) => i64::try_from(ahead.as_secs()).unwrap_or(i64::MAX),
        Err(behind) => -i64::try_from(behind.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

/// RFC 1123 date, clamped into the range an HTTP date can express.
fn http_date(at: SystemTime) -> String {
    let secs = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
        .min(MAX_HTTP_DATE_SECS);
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> SystemTime {
        // Tue, 14 Nov 2023 22:13:20 GMT
        UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = Cookie::new("sid", "abc123")
            .expires(t0() + Duration::from_secs(3600))
            .path("/")
            .http_only(true);

        let encoded = encode_cookie(&cookie, t0());

        assert!(encoded.starts_with(" sid=abc123;"));
        assert!(encoded.contains(" Expires=Tue, 14 Nov 2023 23:13:20 GMT;"));
        assert!(encoded.contains(" Max-age=3600;"));
        assert!(encoded.contains(" Path=/;"));
        assert!(encoded.contains(" HttpOnly;"));
        assert!(!encoded.contains("Domain="));
        assert!(!encoded.contains("Secure;"));
    }

    #[test]
    fn test_attribute_order_is_fixed() {
        let cookie = Cookie::new("a", "b")
            .http_only(true)
            .secure(true)
            .domain("example.com")
            .path("/app")
            .expires(t0());

        assert_eq!(
            encode_cookie(&cookie, t0()),
            " a=b; Expires=Tue, 14 Nov 2023 22:13:20 GMT; Max-age=0; Path=/app; Domain=example.com; Secure; HttpOnly;"
        );
    }

    #[test]
    fn test_bare_cookie() {
        assert_eq!(encode_cookie(&Cookie::new("k", ""), t0()), " k=;");
    }

    #[test]
    fn test_past_expiry_gives_negative_max_age() {
        let cookie = Cookie::new("gone", "x").expires(t0() - Duration::from_secs(60));
        let encoded = encode_cookie(&cookie, t0());
        assert!(encoded.contains(" Max-age=-60;"));
    }

    #[test]
    fn test_pre_epoch_expiry_is_clamped() {
        let cookie = Cookie::new("old", "x").expires(UNIX_EPOCH - Duration::from_secs(10));
        let encoded = encode_cookie(&cookie, t0());
        assert!(encoded.contains(" Expires=Thu, 01 Jan 1970 00:00:00 GMT;"));
    }

    #[test]
    fn test_values_are_not_escaped() {
        let encoded = encode_cookie(&Cookie::new("n", "a;b"), t0());
        assert_eq!(encoded, " n=a;b;");
    }
}
