use serde::{Deserialize, Serialize};

// Body returned with a 429
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct RateLimitedBody {
    pub error: String,
    #[serde(rename = "retryAfter")]
    pub retry_after: u64,
}

// Health endpoint body
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct HealthBody {
    pub status: String,
    pub timestamp: String,
    pub rate_limit_records: usize,
}
