//! First-party session cookies the edge layer may clear on its own.

pub const SESSION_COOKIES: [&str; 3] = ["access_token", "refresh_token", "csrf_token"];

/// Paths the backend scopes session cookies to.
pub const SESSION_COOKIE_PATHS: [&str; 2] = ["/", "/auth"];

/// `Set-Cookie` value that expires `name` on `path` immediately.
pub fn expired_cookie(name: &str, path: &str) -> String {
    format!("{}=; Path={}; Max-Age=0; SameSite=Lax; Secure", name, path)
}

/// Expiry directives for every session cookie on every scoped path.
pub fn clear_session_cookies() -> Vec<String> {
    SESSION_COOKIES
        .iter()
        .flat_map(|name| SESSION_COOKIE_PATHS.iter().map(move |path| expired_cookie(name, path)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_every_cookie_and_path() {
        let cleared = clear_session_cookies();
        assert_eq!(cleared.len(), 6);
        for name in SESSION_COOKIES {
            for path in SESSION_COOKIE_PATHS {
                assert!(cleared.contains(&expired_cookie(name, path)), "{} on {}", name, path);
            }
        }
    }

    #[test]
    fn expired_cookie_format() {
        assert_eq!(
            expired_cookie("refresh_token", "/auth"),
            "refresh_token=; Path=/auth; Max-Age=0; SameSite=Lax; Secure"
        );
    }
}
