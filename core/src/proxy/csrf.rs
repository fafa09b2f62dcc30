//! CSRF token selection for forwarded requests
//!
//! An explicit `x-csrf-token` header always wins. Otherwise the token may be
//! lifted from the `csrf_token` cookie, but only when no same-origin signal
//! on the request contradicts same-origin-ness. A cross-site form post
//! carries cookies but cannot set headers, so deriving blindly would hand it
//! a valid double-submit token.

use axum::http::{header, HeaderMap, Method};

pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_COOKIE: &str = "csrf_token";

const SEC_FETCH_SITE: &str = "sec-fetch-site";

/// Split a `Cookie` header into name/value pairs.
///
/// Values are trimmed and percent-decoded; a value that fails to decode is
/// kept raw. Pairs without `=` or with an empty name are skipped.
pub fn parse_cookie_header(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let decoded = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((name.to_string(), decoded))
        })
        .collect()
}

/// First value of cookie `name` across all `Cookie` header lines.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(parse_cookie_header)
        .find(|(n, _)| n == name)
        .map(|(_, v)| v)
}

/// True when a Referer sits under `origin`: exact match or followed by a
/// path, query or fragment.
fn referer_matches(referer: &str, origin: &str) -> bool {
    match referer.strip_prefix(origin) {
        Some(rest) => rest.is_empty() || rest.starts_with(['/', '?', '#']),
        None => false,
    }
}

/// Check the browser's same-origin signals against `current_origin`.
///
/// Absent signals are neutral. A present `Origin` or `Referer` fails when the
/// current origin is unknown.
pub fn same_origin_signals(headers: &HeaderMap, current_origin: Option<&str>) -> bool {
    let header_str = |name: &'static str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);
    let origin = current_origin.map(|o| o.trim_end_matches('/'));

    if let Some(site) = header_str(SEC_FETCH_SITE) {
        if site.eq_ignore_ascii_case("cross-site") {
            return false;
        }
    }

    if let Some(inbound) = header_str("origin") {
        match origin {
            Some(o) if inbound.trim_end_matches('/') == o => {}
            _ => return false,
        }
    }

    if let Some(referer) = header_str("referer") {
        match origin {
            Some(o) if referer_matches(referer, o) => {}
            _ => return false,
        }
    }

    true
}

/// Token lifted from the cookie, or `None` when an explicit header is present
/// or a same-origin signal objects.
pub fn derive_csrf_token(headers: &HeaderMap, current_origin: Option<&str>) -> Option<String> {
    if explicit_csrf_token(headers).is_some() {
        return None;
    }
    if !same_origin_signals(headers, current_origin) {
        return None;
    }
    cookie_value(headers, CSRF_COOKIE).filter(|v| !v.is_empty())
}

fn explicit_csrf_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_state_changing(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Token to attach to the outbound request.
pub fn csrf_token_for(method: &Method, headers: &HeaderMap, current_origin: Option<&str>) -> Option<String> {
    if let Some(explicit) = explicit_csrf_token(headers) {
        return Some(explicit);
    }
    if !is_state_changing(method) {
        return None;
    }
    let derived = derive_csrf_token(headers, current_origin);
    if derived.is_some() {
        tracing::debug!("Derived CSRF token from cookie");
    }
    derived
}

/// The origin the browser used to reach us.
///
/// A configured public origin wins; otherwise it is rebuilt from
/// `X-Forwarded-Proto`/`X-Forwarded-Host` or `Host`.
pub fn current_origin(headers: &HeaderMap, configured: Option<&str>) -> Option<String> {
    if let Some(origin) = configured.map(str::trim).filter(|o| !o.is_empty()) {
        return Some(origin.trim_end_matches('/').to_string());
    }

    let first = |name: &'static str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let host = first("x-forwarded-host").or_else(|| first("host"))?;
    let scheme = first("x-forwarded-proto").unwrap_or("http");
    Some(format!("{}://{}", scheme, host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const ORIGIN: &str = "https://app.example.ch";

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn parses_unusual_cookie_values() {
        let cookies = parse_cookie_header("a=1; csrf_token=ab%3D%3Dcd==; theme = dark ;broken; =x");
        assert_eq!(
            cookies,
            vec![
                ("a".to_string(), "1".to_string()),
                ("csrf_token".to_string(), "ab==cd==".to_string()),
                ("theme".to_string(), "dark".to_string()),
            ]
        );
    }

    #[test]
    fn keeps_undecodable_value_raw() {
        let cookies = parse_cookie_header("t=%E0%A4%A");
        assert_eq!(cookies, vec![("t".to_string(), "%E0%A4%A".to_string())]);
    }

    #[test]
    fn scans_every_cookie_line() {
        let map = headers(&[("cookie", "access_token=x"), ("cookie", "csrf_token=tok")]);
        assert_eq!(cookie_value(&map, CSRF_COOKIE).as_deref(), Some("tok"));
    }

    #[test]
    fn derives_without_any_signal() {
        let map = headers(&[("cookie", "csrf_token=tok")]);
        assert_eq!(derive_csrf_token(&map, Some(ORIGIN)).as_deref(), Some("tok"));
    }

    #[test]
    fn derives_when_all_signals_agree() {
        let map = headers(&[
            ("cookie", "csrf_token=tok"),
            ("sec-fetch-site", "same-origin"),
            ("origin", ORIGIN),
            ("referer", "https://app.example.ch/crm?tab=1"),
        ]);
        assert_eq!(derive_csrf_token(&map, Some(ORIGIN)).as_deref(), Some("tok"));
    }

    #[test]
    fn refuses_cross_site_fetch() {
        let map = headers(&[("cookie", "csrf_token=tok"), ("sec-fetch-site", "cross-site")]);
        assert_eq!(derive_csrf_token(&map, Some(ORIGIN)), None);
    }

    #[test]
    fn refuses_foreign_origin() {
        let map = headers(&[("cookie", "csrf_token=tok"), ("origin", "https://evil.example")]);
        assert_eq!(derive_csrf_token(&map, Some(ORIGIN)), None);
    }

    #[test]
    fn refuses_foreign_referer() {
        let map = headers(&[("cookie", "csrf_token=tok"), ("referer", "https://evil.example/page")]);
        assert_eq!(derive_csrf_token(&map, Some(ORIGIN)), None);

        let lookalike = headers(&[
            ("cookie", "csrf_token=tok"),
            ("referer", "https://app.example.ch.evil.example/"),
        ]);
        assert_eq!(derive_csrf_token(&lookalike, Some(ORIGIN)), None);
    }

    #[test]
    fn refuses_origin_when_own_origin_unknown() {
        let map = headers(&[("cookie", "csrf_token=tok"), ("origin", ORIGIN)]);
        assert_eq!(derive_csrf_token(&map, None), None);
    }

    #[test]
    fn explicit_header_blocks_derivation_but_is_forwarded() {
        let map = headers(&[
            ("cookie", "csrf_token=cookie-tok"),
            ("x-csrf-token", "header-tok"),
            ("sec-fetch-site", "cross-site"),
        ]);
        assert_eq!(derive_csrf_token(&map, Some(ORIGIN)), None);
        assert_eq!(csrf_token_for(&Method::POST, &map, Some(ORIGIN)).as_deref(), Some("header-tok"));
    }

    #[test]
    fn safe_methods_never_derive() {
        let map = headers(&[("cookie", "csrf_token=tok")]);
        assert_eq!(csrf_token_for(&Method::GET, &map, Some(ORIGIN)), None);
        assert_eq!(csrf_token_for(&Method::DELETE, &map, Some(ORIGIN)).as_deref(), Some("tok"));
    }

    #[test]
    fn origin_from_forwarding_headers() {
        let map = headers(&[
            ("host", "internal:3000"),
            ("x-forwarded-host", "app.example.ch"),
            ("x-forwarded-proto", "https, http"),
        ]);
        assert_eq!(current_origin(&map, None).as_deref(), Some(ORIGIN));

        let plain = headers(&[("host", "localhost:3000")]);
        assert_eq!(current_origin(&plain, None).as_deref(), Some("http://localhost:3000"));
        assert_eq!(current_origin(&plain, Some("https://app.example.ch/")).as_deref(), Some(ORIGIN));
    }
}
