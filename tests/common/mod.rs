#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::{Router, routing::any};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use storefront_gateway::AuthError;
use storefront_gateway::session::{
    AuthEvent, AuthEventKind, AuthResponse, IdentityProvider, Navigator, Session, SignInData,
    SignUpData, User, UserResolver,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

pub fn user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{id}@example.com")),
        user_metadata: serde_json::Value::Null,
    }
}

/// A session for `user_id` that expires `secs` from now (wall clock).
pub fn session_expiring_in(user_id: &str, secs: i64) -> Session {
    Session {
        access_token: format!("access-{user_id}-{secs}"),
        refresh_token: format!("refresh-{user_id}"),
        token_type: "bearer".to_string(),
        expires_in: secs,
        expires_at: Some(chrono::Utc::now().timestamp() + secs),
        user: Some(user(user_id)),
    }
}

pub struct MockProvider {
    pub session: Mutex<Option<Session>>,
    // what the next refresh hands back; None makes refresh fail
    pub refresh_to: Mutex<Option<Session>>,
    pub fail_get: AtomicBool,
    pub sign_in_error: Mutex<Option<String>>,
    pub get_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub events: broadcast::Sender<AuthEvent>,
}

impl MockProvider {
    pub fn new(session: Option<Session>) -> Arc<Self> {
        let (events, _) = broadcast::channel(16);
        Arc::new(Self {
            session: Mutex::new(session),
            refresh_to: Mutex::new(None),
            fail_get: AtomicBool::new(false),
            sign_in_error: Mutex::new(None),
            get_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            events,
        })
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn set_refresh_to(&self, session: Option<Session>) {
        *self.refresh_to.lock().unwrap() = session;
    }

    pub fn emit(&self, kind: AuthEventKind, session: Option<Session>) {
        let _ = self.events.send(AuthEvent { kind, session });
    }

    pub fn gets(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(AuthError::Provider {
                status: 500,
                message: "lookup failed".to_string(),
            });
        }
        Ok(self.session.lock().unwrap().clone())
    }

    async fn refresh_session(&self) -> Result<Option<Session>, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match self.refresh_to.lock().unwrap().clone() {
            Some(next) => {
                self.set_session(Some(next.clone()));
                Ok(Some(next))
            }
            None => Err(AuthError::Provider {
                status: 400,
                message: "Invalid Refresh Token".to_string(),
            }),
        }
    }

    async fn sign_up(&self, data: SignUpData) -> Result<AuthResponse, AuthError> {
        let session = session_expiring_in(&data.email, 3600);
        self.set_session(Some(session.clone()));
        Ok(AuthResponse {
            user: session.user.clone(),
            session: Some(session),
        })
    }

    async fn sign_in(&self, data: SignInData) -> Result<AuthResponse, AuthError> {
        if let Some(message) = self.sign_in_error.lock().unwrap().clone() {
            return Err(AuthError::Provider {
                status: 400,
                message,
            });
        }
        let session = session_expiring_in(&data.email, 3600);
        self.set_session(Some(session.clone()));
        Ok(AuthResponse {
            user: session.user.clone(),
            session: Some(session),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.set_session(None);
        Ok(())
    }

    async fn reset_password(&self, _email: &str) -> Result<(), AuthError> {
        Ok(())
    }

    async fn update_password(&self, _new_password: &str) -> Result<User, AuthError> {
        Err(AuthError::Provider {
            status: 422,
            message: "Password should be at least 6 characters".to_string(),
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn forget_session(&self) {
        self.set_session(None);
    }
}

#[derive(Default)]
pub struct RecordingNavigator {
    pub pushes: Mutex<Vec<String>>,
    pub refreshes: AtomicUsize,
}

impl RecordingNavigator {
    pub fn pushed(&self) -> Vec<String> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn refreshed(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl Navigator for RecordingNavigator {
    fn push(&self, path: &str) {
        self.pushes.lock().unwrap().push(path.to_string());
    }

    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Resolves the user from an `x-test-user` header.
pub struct HeaderResolver;

#[async_trait]
impl UserResolver for HeaderResolver {
    async fn resolve_user_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get("x-test-user")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Origin that echoes the method and path back.
pub async fn spawn_mock_origin() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let app = Router::new().fallback(any(|req: axum::extract::Request| async move {
        format!("{} {}", req.method(), req.uri())
    }));

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    port
}
