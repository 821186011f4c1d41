use serde::{Deserialize, Serialize};

/// A session counts as expired this long before its real expiry.
pub const EXPIRY_BUFFER_MS: i64 = 5 * 60 * 1000;
/// A session is refreshed once it is this close to expiry.
pub const REFRESH_THRESHOLD_MS: i64 = 10 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    /// Epoch seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub user: Option<User>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

impl Session {
    /// Fills `expires_at` from `expires_in` when the provider left it out.
    pub fn stamped(mut self, now_secs: i64) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now_secs + self.expires_in);
        }
        self
    }

    fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at.map(|secs| secs.saturating_mul(1000))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn is_session_expired(session: Option<&Session>) -> bool {
    is_session_expired_at(session, now_ms())
}

pub fn is_session_expired_at(session: Option<&Session>, now_ms: i64) -> bool {
    match session.and_then(Session::expires_at_ms) {
        Some(expires_at) => now_ms >= expires_at - EXPIRY_BUFFER_MS,
        None => true,
    }
}

pub fn needs_refresh(session: Option<&Session>) -> bool {
    needs_refresh_at(session, now_ms())
}

pub fn needs_refresh_at(session: Option<&Session>, now_ms: i64) -> bool {
    match session.and_then(Session::expires_at_ms) {
        Some(expires_at) => now_ms >= expires_at - REFRESH_THRESHOLD_MS,
        None => true,
    }
}

/// Milliseconds left before the session expires, floored at zero.
pub fn time_until_expiry(session: Option<&Session>) -> i64 {
    time_until_expiry_at(session, now_ms())
}

pub fn time_until_expiry_at(session: Option<&Session>, now_ms: i64) -> i64 {
    session
        .and_then(Session::expires_at_ms)
        .map(|expires_at| (expires_at - now_ms).max(0))
        .unwrap_or(0)
}

pub fn is_valid_session(session: Option<&Session>) -> bool {
    is_valid_session_at(session, now_ms())
}

pub fn is_valid_session_at(session: Option<&Session>, now_ms: i64) -> bool {
    let Some(s) = session else {
        return false;
    };
    if s.access_token.is_empty() || s.user.is_none() || s.expires_at.is_none() {
        return false;
    }
    !is_session_expired_at(session, now_ms)
}
