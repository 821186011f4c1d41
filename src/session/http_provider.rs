//! Identity provider client for the hosted auth REST API.
//!
//! Holds the current session in memory the way the browser client does and
//! broadcasts an [`AuthEvent`] whenever it changes.

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::sync::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::model::{Session, User};
use super::provider::{
    AuthEvent, AuthEventKind, AuthResponse, IdentityProvider, SignInData, SignUpData, UserResolver,
};
use crate::error::AuthError;
use crate::route_gate::{SESSION_COOKIE_NAMES, find_cookie};

const EVENT_CAPACITY: usize = 32;

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    redirect_to: Option<String>,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl HttpIdentityProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: impl Into<String>) -> Self {
        // add https:// if not present
        let base_url = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", base_url.trim_end_matches('/'))
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            client,
            base_url,
            api_key: api_key.into(),
            redirect_to: None,
            current: RwLock::new(None),
            events,
        }
    }

    /// Where password-reset emails send the user back to.
    pub fn with_redirect_to(mut self, url: impl Into<String>) -> Self {
        self.redirect_to = Some(url.into());
        self
    }

    /// Restores a session loaded from elsewhere without emitting an event.
    pub fn restore_session(&self, session: Option<Session>) {
        self.store(session);
    }

    /// Looks up the user behind an access token.
    pub async fn get_user(&self, access_token: &str) -> Result<User, AuthError> {
        let req = self
            .request(reqwest::Method::GET, "/auth/v1/user")
            .bearer_auth(access_token);
        send_json(req).await
    }

    fn recover_path(&self) -> String {
        match &self.redirect_to {
            Some(url) => format!("/auth/v1/recover?redirect_to={}", urlencoding::encode(url)),
            None => "/auth/v1/recover".to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("apikey", &self.api_key)
    }

    fn current(&self) -> Option<Session> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    fn store(&self, session: Option<Session>) {
        if let Ok(mut guard) = self.current.write() {
            *guard = session;
        }
    }

    fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        // no subscribers is fine
        let _ = self.events.send(AuthEvent { kind, session });
    }

    fn accept_session(&self, session: Session, kind: AuthEventKind) -> Session {
        let session = session.stamped(chrono::Utc::now().timestamp());
        self.store(Some(session.clone()));
        self.emit(kind, Some(session.clone()));
        session
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        Ok(self.current())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, AuthError> {
        let refresh_token = self
            .current()
            .map(|s| s.refresh_token)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingSession)?;

        let req = self
            .request(reqwest::Method::POST, "/auth/v1/token?grant_type=refresh_token")
            .json(&serde_json::json!({ "refresh_token": refresh_token }));
        let session: Session = send_json(req).await?;

        debug!("session refreshed");
        Ok(Some(self.accept_session(session, AuthEventKind::TokenRefreshed)))
    }

    async fn sign_up(&self, data: SignUpData) -> Result<AuthResponse, AuthError> {
        // Default display name is the email's local part.
        let name = data
            .name
            .clone()
            .unwrap_or_else(|| data.email.split('@').next().unwrap_or_default().to_string());

        let req = self
            .request(reqwest::Method::POST, "/auth/v1/signup")
            .json(&serde_json::json!({
                "email": data.email,
                "password": data.password,
                "data": { "name": name },
            }));
        let body: serde_json::Value = send_json(req).await?;

        // With email confirmation on, only the user comes back.
        if body.get("access_token").is_some() {
            let session: Session = serde_json::from_value(body).map_err(|e| {
                AuthError::Provider {
                    status: 200,
                    message: e.to_string(),
                }
            })?;
            let session = self.accept_session(session, AuthEventKind::SignedIn);
            info!("signed up with active session");
            return Ok(AuthResponse {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user: User = serde_json::from_value(body).map_err(|e| AuthError::Provider {
            status: 200,
            message: e.to_string(),
        })?;
        info!(user_id = %user.id, "signed up, awaiting confirmation");
        Ok(AuthResponse {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_in(&self, data: SignInData) -> Result<AuthResponse, AuthError> {
        let req = self
            .request(reqwest::Method::POST, "/auth/v1/token?grant_type=password")
            .json(&data);
        let session: Session = send_json(req).await?;

        let session = self.accept_session(session, AuthEventKind::SignedIn);
        info!(
            user_id = session.user.as_ref().map(|u| u.id.as_str()).unwrap_or_default(),
            "signed in"
        );
        Ok(AuthResponse {
            user: session.user.clone(),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        if let Some(session) = self.current() {
            let res = self
                .request(reqwest::Method::POST, "/auth/v1/logout")
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            if !res.status().is_success() {
                return Err(provider_error(res).await);
            }
        }

        self.store(None);
        self.emit(AuthEventKind::SignedOut, None);
        info!("signed out");
        Ok(())
    }

    async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let res = self
            .request(reqwest::Method::POST, &self.recover_path())
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(provider_error(res).await);
        }
        Ok(())
    }

    async fn update_password(&self, new_password: &str) -> Result<User, AuthError> {
        let mut session = self.current().ok_or(AuthError::MissingSession)?;

        let req = self
            .request(reqwest::Method::PUT, "/auth/v1/user")
            .bearer_auth(&session.access_token)
            .json(&serde_json::json!({ "password": new_password }));
        let user: User = send_json(req).await?;

        session.user = Some(user.clone());
        self.store(Some(session.clone()));
        self.emit(AuthEventKind::UserUpdated, Some(session));
        Ok(user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn forget_session(&self) {
        self.store(None);
    }
}

#[async_trait]
impl UserResolver for HttpIdentityProvider {
    async fn resolve_user_id(&self, headers: &HeaderMap) -> Option<String> {
        let token = bearer_token(headers).or_else(|| {
            SESSION_COOKIE_NAMES
                .iter()
                .find_map(|name| find_cookie(headers, name))
        })?;

        match self.get_user(&token).await {
            Ok(user) => Some(user.id),
            Err(e) => {
                debug!(error = %e, "could not resolve user, falling back to address");
                None
            }
        }
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, AuthError> {
    let res = req.send().await?;
    if !res.status().is_success() {
        return Err(provider_error(res).await);
    }
    Ok(res.json::<T>().await?)
}

// Pull the provider's own message out of an error body
async fn provider_error(res: reqwest::Response) -> AuthError {
    let status = res.status().as_u16();
    let body: serde_json::Value = res.json().await.unwrap_or(serde_json::Value::Null);
    AuthError::Provider {
        status,
        message: error_message(&body)
            .unwrap_or_else(|| format!("identity provider returned status {status}")),
    }
}

fn error_message(body: &serde_json::Value) -> Option<String> {
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_base_url_normalized() {
        let p = HttpIdentityProvider::new(reqwest::Client::new(), "abc.example.co/", "key");
        assert_eq!(p.url("/auth/v1/user"), "https://abc.example.co/auth/v1/user");

        let p = HttpIdentityProvider::new(reqwest::Client::new(), "http://localhost:9999", "key");
        assert_eq!(p.url("/x"), "http://localhost:9999/x");
    }

    #[test]
    fn test_error_message_precedence() {
        let body = serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid login credentials"
        });
        assert_eq!(
            error_message(&body).as_deref(),
            Some("Invalid login credentials")
        );
        let body = serde_json::json!({ "msg": "User already registered" });
        assert_eq!(error_message(&body).as_deref(), Some("User already registered"));
        assert!(error_message(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn test_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer jwt-1"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("jwt-1"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());
    }

    #[tokio::test]
    async fn test_refresh_without_session_fails() {
        let p = HttpIdentityProvider::new(reqwest::Client::new(), "http://127.0.0.1:9", "key");
        assert!(matches!(
            p.refresh_session().await,
            Err(AuthError::MissingSession)
        ));
        assert!(matches!(
            p.update_password("pw").await,
            Err(AuthError::MissingSession)
        ));
    }

    #[test]
    fn test_recover_path_carries_redirect() {
        let p = HttpIdentityProvider::new(reqwest::Client::new(), "a.example.co", "key");
        assert_eq!(p.recover_path(), "/auth/v1/recover");

        let p = p.with_redirect_to("https://shop.example.com/reset");
        assert_eq!(
            p.recover_path(),
            "/auth/v1/recover?redirect_to=https%3A%2F%2Fshop.example.com%2Freset"
        );
    }

    #[tokio::test]
    async fn test_forget_session_is_silent() {
        let p = HttpIdentityProvider::new(reqwest::Client::new(), "http://127.0.0.1:9", "key");
        let mut rx = p.subscribe();
        p.restore_session(Some(Session {
            access_token: "t".to_string(),
            refresh_token: "r".to_string(),
            token_type: "bearer".to_string(),
            expires_in: 60,
            expires_at: Some(chrono::Utc::now().timestamp() + 60),
            user: None,
        }));
        assert!(p.get_session().await.unwrap().is_some());

        p.forget_session();
        assert!(p.get_session().await.unwrap().is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sign_out_without_session_emits_event() {
        let p = HttpIdentityProvider::new(reqwest::Client::new(), "http://127.0.0.1:9", "key");
        let mut rx = p.subscribe();
        p.sign_out().await.unwrap();
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, AuthEventKind::SignedOut);
        assert!(p.get_session().await.unwrap().is_none());
    }
}
