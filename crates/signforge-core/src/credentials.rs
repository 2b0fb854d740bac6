//! Opaque credential holder for the generation backend.

/// An API key that cannot leak through logs or serialization.
///
/// There is no `Display`, no `Serialize`, and `Debug` prints a fixed
/// placeholder. The raw value is reachable only through [`ApiKey::expose`],
/// which the HTTP backend calls when building the authorization header.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Reveal the raw key. Call sites are limited to request construction.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

impl From<String> for ApiKey {
    fn from(key: String) -> Self {
        Self::new(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_never_shows_the_key() {
        let key = ApiKey::new("sk-secret-123");
        assert_eq!(format!("{key:?}"), "ApiKey(***)");
    }

    #[test]
    fn expose_returns_the_raw_value() {
        let key = ApiKey::new("sk-secret-123");
        assert_eq!(key.expose(), "sk-secret-123");
    }
}
