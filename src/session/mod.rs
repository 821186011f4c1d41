//! Client-side session handling against the hosted identity provider.

mod guardian;
mod http_provider;
mod model;
mod navigator;
mod provider;
mod store;

pub use guardian::{
    AuthPhase, AuthSnapshot, CHECK_INTERVAL, CheckOutcome, GuardianConfig, SessionGuardian,
};
pub use http_provider::HttpIdentityProvider;
pub use model::{
    EXPIRY_BUFFER_MS, REFRESH_THRESHOLD_MS, Session, User, is_session_expired,
    is_session_expired_at, is_valid_session, is_valid_session_at, needs_refresh, needs_refresh_at,
    time_until_expiry, time_until_expiry_at,
};
pub use navigator::{Navigator, TracingNavigator};
pub use provider::{
    AuthEvent, AuthEventKind, AuthResponse, IdentityProvider, SignInData, SignUpData, UserResolver,
};
pub use store::{AuthState, AuthStore, JsonFileStore, MemoryStore, PersistedAuth, SessionPersistence};
