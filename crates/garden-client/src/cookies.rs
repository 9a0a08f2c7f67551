//! Minimal cookie jar for the `Cookie` request header.

use std::fmt;
use std::str::FromStr;

/// Ordered `name=value` pairs as sent in a `Cookie` header.
///
/// Names are unique; setting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
}

impl CookieJar {
    /// Parse a `Cookie` header value (`a=1; b=2`). Fragments without `=` are
    /// dropped.
    #[must_use]
    pub fn parse(header: &str) -> Self {
        let mut jar = Self::default();
        for fragment in header.split(';') {
            if let Some((name, value)) = split_pair(fragment) {
                jar.set(name, value);
            }
        }
        jar
    }

    /// Value of the cookie called `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Insert or overwrite a cookie.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = value,
            None => self.pairs.push((name, value)),
        }
    }

    /// Merge one `Set-Cookie` response header. Attributes after the first
    /// `;` (path, expiry, flags) are ignored.
    ///
    /// Returns whether the jar changed.
    pub fn merge_set_cookie(&mut self, set_cookie: &str) -> bool {
        let first = set_cookie.split(';').next().unwrap_or_default();
        let Some((name, value)) = split_pair(first) else {
            return false;
        };
        if self.get(name) == Some(value) {
            return false;
        }
        self.set(name, value);
        true
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the jar holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render as a `Cookie` header value.
    #[must_use]
    pub fn to_header(&self) -> String {
        self.to_string()
    }
}

fn split_pair(fragment: &str) -> Option<(&str, &str)> {
    let (name, value) = fragment.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

impl fmt::Display for CookieJar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

impl FromStr for CookieJar {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
