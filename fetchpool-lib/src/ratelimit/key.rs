use std::fmt;

use url::Url;

/// Shared fallback key for URLs without a recognizable hostname.
const UNKNOWN_HOST: &str = "unknown";

/// A type-safe, normalized hostname used to group per-host limits.
///
/// Hostnames are lowercased so that requests to the same host always share
/// one limiter, regardless of how the URL was spelled.
///
/// # Examples
///
/// ```
/// use fetchpool_lib::ratelimit::HostKey;
///
/// let key = HostKey::resolve("https://API.GitHub.com/repos/user/repo");
/// assert_eq!(key.as_str(), "api.github.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostKey(String);

impl HostKey {
    /// Derive the limiting key for a URL.
    ///
    /// Extracts the hostname and lowercases it. URLs without a hostname and
    /// unparseable URLs all map to the shared `"unknown"` key: resolution
    /// never fails the caller, malformed input is rate-limited together, and
    /// the actual fetch failure surfaces later in the per-item result.
    #[must_use]
    pub fn resolve(url: &str) -> Self {
        match Url::parse(url) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) if !host.is_empty() => HostKey(host.to_lowercase()),
                _ => HostKey(UNKNOWN_HOST.to_string()),
            },
            Err(_) => HostKey(UNKNOWN_HOST.to_string()),
        }
    }

    /// The hostname as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for HostKey {
    fn from(host: &str) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl From<String> for HostKey {
    fn from(host: String) -> Self {
        HostKey(host.to_lowercase())
    }
}

impl fmt::Display for HostKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
