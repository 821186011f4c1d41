use crate::rate_limit::RateLimitOptions;

const MINUTE_MS: u64 = 60 * 1000;

/// Named rate limit configurations used across the storefront API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPreset {
    /// Sensitive operations such as password changes.
    Strict,
    /// General API endpoints.
    Standard,
    /// Login and signup.
    Auth,
    /// Order creation.
    Order,
    Search,
}

impl RateLimitPreset {
    pub fn options(self) -> RateLimitOptions {
        let (window_ms, max_requests, message) = match self {
            RateLimitPreset::Strict => (
                15 * MINUTE_MS,
                5,
                "Too many requests. Please wait 15 minutes before trying again.",
            ),
            RateLimitPreset::Standard => (
                MINUTE_MS,
                10,
                "Too many requests. Please try again in a minute.",
            ),
            RateLimitPreset::Auth => (
                15 * MINUTE_MS,
                5,
                "Too many authentication attempts. Please wait 15 minutes.",
            ),
            RateLimitPreset::Order => (
                MINUTE_MS,
                3,
                "Too many order attempts. Please try again in a minute.",
            ),
            RateLimitPreset::Search => (
                MINUTE_MS,
                20,
                "Too many search requests. Please try again in a minute.",
            ),
        };
        RateLimitOptions::new(window_ms, max_requests).with_message(message)
    }
}

/// Options for one rate limited call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub options: RateLimitOptions,
    // key by the authenticated user instead of the client address when possible
    pub use_user_id: bool,
}

impl RateLimitPolicy {
    pub fn new(options: RateLimitOptions) -> Self {
        Self {
            options,
            use_user_id: false,
        }
    }

    pub fn per_user(mut self) -> Self {
        self.use_user_id = true;
        self
    }
}

impl From<RateLimitPreset> for RateLimitPolicy {
    fn from(preset: RateLimitPreset) -> Self {
        Self::new(preset.options())
    }
}
