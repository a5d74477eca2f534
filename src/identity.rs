use axum::http::HeaderMap;

/// Shared identity under which anonymous downloads are recorded when the
/// deployment allows them.
pub const ANONYMOUS_IDENTITY: &str = "anonimo";

const IDENTITY_HEADER: &str = "x-user-id";

/// The auth provider lives in front of this backend; it forwards the
/// authenticated user's stable id in `x-user-id`, or nothing at all.
#[derive(Debug, Clone, Copy)]
pub struct IdentityPolicy {
    allow_anonymous: bool,
}

impl IdentityPolicy {
    pub fn new(allow_anonymous: bool) -> Self {
        Self { allow_anonymous }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Option<String> {
        let from_header = headers
            .get(IDENTITY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        match from_header {
            Some(identity) => Some(identity),
            None if self.allow_anonymous => Some(ANONYMOUS_IDENTITY.to_string()),
            None => None,
        }
    }
}
