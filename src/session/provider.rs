use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::model::{Session, User};
use crate::error::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpData {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignInData {
    pub email: String,
    pub password: String,
}

/// What sign-up and sign-in hand back. Sign-up may return a user with no
/// session when the provider requires email confirmation.
#[derive(Debug, Clone, Default)]
pub struct AuthResponse {
    pub user: Option<User>,
    pub session: Option<Session>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

/// The hosted identity service. It issues sessions and announces changes to
/// them on an event channel.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    async fn refresh_session(&self) -> Result<Option<Session>, AuthError>;

    async fn sign_up(&self, data: SignUpData) -> Result<AuthResponse, AuthError>;

    async fn sign_in(&self, data: SignInData) -> Result<AuthResponse, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    async fn reset_password(&self, email: &str) -> Result<(), AuthError>;

    async fn update_password(&self, new_password: &str) -> Result<User, AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Drops the locally held session without calling the provider or
    /// emitting an event.
    fn forget_session(&self);
}

/// Maps an inbound request to the authenticated user's id, if any.
#[async_trait]
pub trait UserResolver: Send + Sync {
    async fn resolve_user_id(&self, headers: &HeaderMap) -> Option<String>;
}
