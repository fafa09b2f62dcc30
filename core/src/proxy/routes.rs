//! Resource table: which inbound prefixes forward where, under which
//! deadline tier and error envelope.

use crate::error::EnvelopeKey;
use crate::proxy::timeouts::RouteClass;

pub const ADMIN_BOOTSTRAP_HEADER: &str = "x-admin-bootstrap-token";

#[derive(Debug, Clone, Copy)]
pub struct ResourceRoute {
    /// Inbound path prefix, e.g. `/api/crm`.
    pub prefix: &'static str,
    /// Backend path prefix that replaces `prefix`.
    pub backend_prefix: &'static str,
    pub class: RouteClass,
    pub envelope: EnvelopeKey,
    /// Inbound headers forwarded on top of the common allowlist.
    pub extra_headers: &'static [&'static str],
}

impl ResourceRoute {
    const fn standard(prefix: &'static str, backend_prefix: &'static str) -> Self {
        Self {
            prefix,
            backend_prefix,
            class: RouteClass::Standard,
            envelope: EnvelopeKey::Detail,
            extra_headers: &[],
        }
    }

    const fn long_running(prefix: &'static str, backend_prefix: &'static str) -> Self {
        Self {
            class: RouteClass::LongRunning,
            ..Self::standard(prefix, backend_prefix)
        }
    }

    /// Backend path for an inbound path under this route. `None` when the
    /// inbound path is not below `prefix` or climbs out of it through a
    /// dot segment.
    pub fn backend_path(&self, inbound_path: &str) -> Option<String> {
        let rest = inbound_path.strip_prefix(self.prefix)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        // URL parsing treats `\` like `/` for http(s) and resolves `%2e` as a dot.
        if rest.split(['/', '\\']).any(is_dot_segment) {
            return None;
        }
        Some(format!("{}{}", self.backend_prefix, rest))
    }
}

fn is_dot_segment(segment: &str) -> bool {
    match urlencoding::decode(segment) {
        Ok(decoded) => matches!(decoded.as_ref(), "." | ".."),
        Err(_) => false,
    }
}

pub const AUTH: ResourceRoute = ResourceRoute {
    envelope: EnvelopeKey::Error,
    ..ResourceRoute::standard("/api/auth", "/auth")
};

pub const LOGOUT: ResourceRoute = ResourceRoute {
    envelope: EnvelopeKey::Error,
    ..ResourceRoute::standard("/api/auth/logout", "/auth/logout")
};

pub const REGISTER: ResourceRoute = ResourceRoute {
    class: RouteClass::ColdStart,
    envelope: EnvelopeKey::Error,
    ..ResourceRoute::standard("/api/auth/register", "/auth/register")
};

pub const ADMIN: ResourceRoute = ResourceRoute {
    extra_headers: &[ADMIN_BOOTSTRAP_HEADER],
    ..ResourceRoute::standard("/api/admin", "/admin")
};

/// Routes served by the generic forwarding handler.
pub const RESOURCE_ROUTES: &[ResourceRoute] = &[
    AUTH,
    ResourceRoute::standard("/api/crm", "/crm"),
    ResourceRoute::standard("/api/activities", "/activities"),
    ResourceRoute::standard("/api/calendar", "/calendar"),
    ResourceRoute::standard("/api/content", "/content"),
    ResourceRoute::standard("/api/budget", "/budget"),
    ResourceRoute::standard("/api/user", "/user"),
    ResourceRoute::long_running("/api/reports", "/reports"),
    ResourceRoute::long_running("/api/uploads", "/uploads"),
    ResourceRoute::long_running("/api/imports", "/imports"),
    ADMIN,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_nested_paths() {
        let crm = RESOURCE_ROUTES.iter().find(|r| r.prefix == "/api/crm").unwrap();
        assert_eq!(crm.backend_path("/api/crm").as_deref(), Some("/crm"));
        assert_eq!(crm.backend_path("/api/crm/companies/42").as_deref(), Some("/crm/companies/42"));
        assert_eq!(crm.backend_path("/api/crmx"), None);
        assert_eq!(crm.backend_path("/api/other"), None);
    }

    #[test]
    fn rejects_dot_segments() {
        let crm = RESOURCE_ROUTES.iter().find(|r| r.prefix == "/api/crm").unwrap();
        for path in [
            "/api/crm/..",
            "/api/crm/../../internal/metrics",
            "/api/crm/./companies",
            "/api/crm/%2e%2e/%2e%2e/internal",
            "/api/crm/%2E%2E/internal",
            "/api/crm/.%2e/internal",
            "/api/crm/%2e/companies",
            "/api/crm\\..\\internal",
            "/api/crm/companies/..\\..\\internal",
        ] {
            assert_eq!(crm.backend_path(path), None, "{}", path);
        }

        let user = RESOURCE_ROUTES.iter().find(|r| r.prefix == "/api/user").unwrap();
        assert_eq!(user.backend_path("/api/user/../auth/register"), None);
    }

    #[test]
    fn dotted_names_are_not_dot_segments() {
        let crm = RESOURCE_ROUTES.iter().find(|r| r.prefix == "/api/crm").unwrap();
        assert_eq!(crm.backend_path("/api/crm/files/report.v2").as_deref(), Some("/crm/files/report.v2"));
        assert_eq!(crm.backend_path("/api/crm/.../x").as_deref(), Some("/crm/.../x"));
        assert_eq!(crm.backend_path("/api/crm/..x").as_deref(), Some("/crm/..x"));
    }

    #[test]
    fn prefixes_are_unique() {
        let mut prefixes: Vec<_> = RESOURCE_ROUTES.iter().map(|r| r.prefix).collect();
        prefixes.sort();
        prefixes.dedup();
        assert_eq!(prefixes.len(), RESOURCE_ROUTES.len());
    }

    #[test]
    fn only_admin_forwards_bootstrap_token() {
        for route in RESOURCE_ROUTES {
            let forwards = route.extra_headers.contains(&ADMIN_BOOTSTRAP_HEADER);
            assert_eq!(forwards, route.prefix == "/api/admin", "{}", route.prefix);
        }
    }

    #[test]
    fn uploads_are_long_running() {
        let uploads = RESOURCE_ROUTES.iter().find(|r| r.prefix == "/api/uploads").unwrap();
        assert_eq!(uploads.class, RouteClass::LongRunning);
        assert_eq!(REGISTER.class, RouteClass::ColdStart);
    }
}
