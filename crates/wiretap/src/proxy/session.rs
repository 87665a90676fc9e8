//! Session tagging via the `/_session/{id}` path convention.
//!
//! Session IDs group otherwise-identical traffic from different agents. They
//! must be 1-128 characters drawn from `[A-Za-z0-9._-]`.

use thiserror::Error;

const MAX_SESSION_ID_LEN: usize = 128;

/// Errors from session ID validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionIdError {
    #[error("Session ID cannot be empty")]
    Empty,

    #[error("Session ID contains invalid characters: allowed are a-z, A-Z, 0-9, '.', '_', '-'")]
    InvalidChars,

    #[error("Session ID exceeds maximum length of {MAX_SESSION_ID_LEN} characters")]
    TooLong,
}

/// A validated session ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), SessionIdError> {
        if s.is_empty() {
            return Err(SessionIdError::Empty);
        }
        if s.len() > MAX_SESSION_ID_LEN {
            return Err(SessionIdError::TooLong);
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
        {
            return Err(SessionIdError::InvalidChars);
        }
        Ok(())
    }
}

impl TryFrom<&str> for SessionId {
    type Error = SessionIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::validate(value)?;
        Ok(SessionId(value.to_string()))
    }
}

impl From<SessionId> for String {
    fn from(session_id: SessionId) -> Self {
        session_id.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strip a `/_session/{id}` prefix from a request path.
///
/// Returns the session ID (if a valid prefix was present) and the path to
/// forward upstream. Runs before provider classification, so
/// `/_session/foo/v1/messages` still classifies as Anthropic. Paths with an
/// invalid ID are left untouched.
pub fn strip_session_prefix(path: &str) -> (Option<SessionId>, String) {
    let Some(rest) = path.strip_prefix("/_session/") else {
        return (None, path.to_string());
    };

    let (candidate, remainder) = match rest.find('/') {
        Some(pos) => (&rest[..pos], &rest[pos..]),
        None => (rest, ""),
    };

    match SessionId::try_from(candidate) {
        Ok(session_id) => {
            let forward = if remainder.is_empty() {
                "/".to_string()
            } else {
                remainder.to_string()
            };
            (Some(session_id), forward)
        }
        Err(_) => (None, path.to_string()),
    }
}
