//! Request-cookie parsing and `Set-Cookie` construction.

use std::collections::HashMap;

/// Parse a `Cookie` request header into a case-sensitive name→value map.
///
/// Pairs are split on `;`, names and values trimmed, matched double quotes
/// stripped from values. Entries with an empty name are dropped; a pair
/// without `=` yields an empty value.
pub fn parse_cookie_header(raw: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();

    for token in raw.split(';') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let (name, value) = match token.split_once('=') {
            Some((name, value)) => (name.trim(), value.trim()),
            None => (token, ""),
        };

        if name.is_empty() {
            continue;
        }

        let value = if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            &value[1..value.len() - 1]
        } else {
            value
        };

        cookies.insert(name.to_string(), value.to_string());
    }

    cookies
}

/// `SameSite` attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Builder for one `Set-Cookie` header value.
///
/// Attributes render in a fixed order: `name=value`, `Expires`, `Path`,
/// `Domain`, `Max-Age`, `SameSite`, `Secure`, `HttpOnly`. A cookie without
/// both a name and a value renders as the empty string and is not emitted.
///
/// ```
/// use gantry::cookie::{SameSite, SetCookie};
///
/// let header = SetCookie::new()
///     .name("sessionId")
///     .value("abc123")
///     .path("/")
///     .same_site(SameSite::Lax)
///     .http_only(true)
///     .to_header_value();
/// assert_eq!(header, "sessionId=abc123; Path=/; SameSite=Lax; HttpOnly");
/// ```
#[derive(Debug, Clone, Default)]
pub struct SetCookie {
    name: Option<String>,
    value: Option<String>,
    expires: Option<String>,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
    same_site: Option<SameSite>,
    secure: Option<bool>,
    http_only: Option<bool>,
}

impl SetCookie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Expiration as an HTTP date, e.g. `Fri, 31 Dec 2027 23:59:59 GMT`.
    pub fn expires(mut self, expires: impl Into<String>) -> Self {
        self.expires = Some(expires.into());
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

    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = Some(http_only);
        self
    }

    /// Render the header value; empty string when name or value is missing.
    ///
    /// `Secure` is forced for `SameSite=None` cookies.
    pub fn to_header_value(&self) -> String {
        let (name, value) = match (&self.name, &self.value) {
            (Some(name), Some(value)) if !name.is_empty() && !value.is_empty() => (name, value),
            _ => return String::new(),
        };

        let mut out = format!("{name}={value}");

        if let Some(expires) = self.expires.as_deref().filter(|s| !s.is_empty()) {
            out.push_str("; Expires=");
            out.push_str(expires);
        }

        if let Some(path) = self.path.as_deref().filter(|s| !s.is_empty()) {
            out.push_str("; Path=");
            out.push_str(path);
        }

        if let Some(domain) = self.domain.as_deref().filter(|s| !s.is_empty()) {
            out.push_str("; Domain=");
            out.push_str(domain);
        }

        if let Some(max_age) = self.max_age {
            out.push_str("; Max-Age=");
            out.push_str(&max_age.to_string());
        }

        if let Some(same_site) = self.same_site {
            out.push_str("; SameSite=");
            out.push_str(same_site.as_str());
        }

        if self.same_site == Some(SameSite::None) || self.secure == Some(true) {
            out.push_str("; Secure");
        }

        if self.http_only == Some(true) {
            out.push_str("; HttpOnly");
        }

        out
    }
}
