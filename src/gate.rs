//! Outbound request gating
//!
//! Every request a page issues while it is being rendered is put to
//! [`decide`] before it leaves the engine. The policy keeps rendered content
//! from reaching arbitrary hosts (SSRF, data exfiltration): only requests to
//! the configured base origin may proceed, inline `data:`/`blob:` content is
//! always allowed, and with no base origin everything else is denied.
//!
//! The decision is a pure function of its inputs so it can be called from any
//! interception callback on any thread.

use url::Url;

/// Outcome of gating a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny,
}

/// The `(scheme, host, port)` triple requests are matched against.
///
/// Scheme and host are stored lowercased. The port is the explicit port of the
/// base URL, or the scheme's known default when none is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl BaseOrigin {
    /// Derive the origin from an absolute URL string.
    ///
    /// Returns `None` when the string is not an absolute URL with a host.
    pub fn parse(base_url: &str) -> Option<Self> {
        let url = Url::parse(base_url).ok()?;
        Self::from_url(&url)
    }

    /// Derive the origin from an already parsed URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        Some(Self {
            scheme: url.scheme().to_ascii_lowercase(),
            host: host.to_ascii_lowercase(),
            port: url.port_or_known_default(),
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    fn matches(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        url.scheme().eq_ignore_ascii_case(&self.scheme)
            && host.eq_ignore_ascii_case(&self.host)
            && url.port_or_known_default() == self.port
    }
}

/// Decide whether `request_url` may leave the engine.
///
/// Policy, first match wins:
/// 1. `data:` and `blob:` URLs are allowed (inline content, no egress).
/// 2. URLs that do not parse as absolute are allowed; the engine has already
///    resolved everything it will actually fetch.
/// 3. Without a base origin every other request is denied.
/// 4. Otherwise scheme, host and port must all equal the base origin's.
pub fn decide(request_url: &str, base: Option<&BaseOrigin>) -> GateDecision {
    let trimmed = request_url.trim_start();
    if has_scheme(trimmed, "data") || has_scheme(trimmed, "blob") {
        return GateDecision::Allow;
    }

    let url = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) => return GateDecision::Allow,
    };

    match base {
        Some(origin) if origin.matches(&url) => GateDecision::Allow,
        _ => GateDecision::Deny,
    }
}

fn has_scheme(url: &str, scheme: &str) -> bool {
    url.len() > scheme.len()
        && url.as_bytes()[scheme.len()] == b':'
        && url[..scheme.len()].eq_ignore_ascii_case(scheme)
}

/// A [`decide`] call bound to one session's base origin.
///
/// Cheap to clone into interception callbacks.
#[derive(Debug, Clone, Default)]
pub struct RequestGate {
    base: Option<BaseOrigin>,
}

impl RequestGate {
    pub fn new(base: Option<BaseOrigin>) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Option<&BaseOrigin> {
        self.base.as_ref()
    }

    pub fn decide(&self, request_url: &str) -> GateDecision {
        decide(request_url, self.base.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example() -> BaseOrigin {
        BaseOrigin::parse("https://example.com:443").unwrap()
    }

    #[test]
    fn inline_schemes_always_allowed() {
        for url in [
            "data:image/png;base64,iVBORw0KGgo=",
            "DATA:text/plain,hi",
            "blob:https://evil.example/2f1c",
        ] {
            assert_eq!(decide(url, None), GateDecision::Allow, "{url}");
            assert_eq!(decide(url, Some(&example())), GateDecision::Allow, "{url}");
        }
    }

    #[test]
    fn relative_and_malformed_urls_fail_open() {
        for url in ["/img.png", "img.png", "//evil.example/x", "", "http://[::1"] {
            assert_eq!(decide(url, None), GateDecision::Allow, "{url}");
            assert_eq!(decide(url, Some(&example())), GateDecision::Allow, "{url}");
        }
    }

    #[test]
    fn same_origin_allowed() {
        let base = example();
        assert_eq!(decide("https://example.com/img.png", Some(&base)), GateDecision::Allow);
        assert_eq!(decide("HTTPS://EXAMPLE.COM/a/b?c=d", Some(&base)), GateDecision::Allow);
        assert_eq!(decide("https://example.com:443/x", Some(&base)), GateDecision::Allow);
    }

    #[test]
    fn scheme_host_or_port_mismatch_denied() {
        let base = example();
        assert_eq!(decide("http://example.com/img.png", Some(&base)), GateDecision::Deny);
        assert_eq!(decide("https://evil.example.com/x", Some(&base)), GateDecision::Deny);
        assert_eq!(decide("https://example.com:8443/x", Some(&base)), GateDecision::Deny);
        assert_eq!(decide("ftp://example.com/x", Some(&base)), GateDecision::Deny);
    }

    #[test]
    fn no_base_denies_absolute_requests() {
        for url in [
            "https://remote.example/img.png",
            "http://127.0.0.1:8080/admin",
            "http://169.254.169.254/latest/meta-data/",
            "file:///etc/passwd",
        ] {
            assert_eq!(decide(url, None), GateDecision::Deny, "{url}");
        }
    }

    #[test]
    fn non_default_base_port_must_match_exactly() {
        let base = BaseOrigin::parse("http://localhost:8080/docs/").unwrap();
        assert_eq!(base.port(), Some(8080));
        assert_eq!(decide("http://localhost:8080/style.css", Some(&base)), GateDecision::Allow);
        assert_eq!(decide("http://localhost/style.css", Some(&base)), GateDecision::Deny);
        assert_eq!(decide("http://localhost:8081/style.css", Some(&base)), GateDecision::Deny);
    }

    #[test]
    fn base_origin_requires_absolute_url_with_host() {
        assert!(BaseOrigin::parse("/relative/path").is_none());
        assert!(BaseOrigin::parse("mailto:someone@example.com").is_none());
        let origin = BaseOrigin::parse("HTTPS://Example.COM/x").unwrap();
        assert_eq!(origin.scheme(), "https");
        assert_eq!(origin.host(), "example.com");
        assert_eq!(origin.port(), Some(443));
    }

    #[test]
    fn bound_gate_matches_free_function() {
        let gate = RequestGate::new(Some(example()));
        assert_eq!(gate.decide("https://example.com/a"), GateDecision::Allow);
        assert_eq!(gate.decide("https://other.example/a"), GateDecision::Deny);
        assert_eq!(RequestGate::default().decide("https://example.com/a"), GateDecision::Deny);
    }
}
