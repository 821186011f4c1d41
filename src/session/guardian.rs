//! Keeps a client-held session fresh.
//!
//! After [`SessionGuardian::start`] the guardian checks the provider's session
//! on a fixed period: absent sessions clear local state, expired ones are
//! purged and the user is sent to the login page, and sessions close to expiry
//! are refreshed. A second task follows the provider's auth events.
//!
//! Both tasks run under one lifecycle token. The periodic check has a child
//! token of its own so signing out can stop it while events keep flowing.
//! Background failures never reach the caller; foreground operations return
//! the provider's error as is.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::{Session, User, is_session_expired, is_valid_session, needs_refresh};
use super::navigator::Navigator;
use super::provider::{AuthEvent, AuthEventKind, IdentityProvider, SignInData, SignUpData};
use super::store::AuthStore;
use crate::error::AuthError;
use crate::metrics::SESSION_REFRESHES;

pub const CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Result of one periodic check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    NoSession,
    Expired,
    Refreshed,
    RefreshFailed,
    Fresh,
    /// The provider could not be asked.
    Failed,
}

#[derive(Debug, Clone)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub session: Option<Session>,
    pub is_loading: bool,
    pub is_authenticated: bool,
    pub phase: AuthPhase,
    /// Message of the last failed foreground operation.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GuardianConfig {
    pub check_interval: Duration,
    pub login_path: String,
    pub home_path: String,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            check_interval: CHECK_INTERVAL,
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
        }
    }
}

impl GuardianConfig {
    /// The check period actually used. Zero falls back to [`CHECK_INTERVAL`].
    pub fn period(&self) -> Duration {
        if self.check_interval.is_zero() {
            CHECK_INTERVAL
        } else {
            self.check_interval
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Loading,
    Ready,
}

struct Background {
    lifecycle: CancellationToken,
    checks: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Background {
    async fn stop(self) {
        self.lifecycle.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "session guardian task ended abnormally");
            }
        }
    }
}

pub struct SessionGuardian {
    provider: Arc<dyn IdentityProvider>,
    navigator: Arc<dyn Navigator>,
    store: AuthStore,
    config: GuardianConfig,
    lifecycle: Mutex<Lifecycle>,
    background: AsyncMutex<Option<Background>>,
}

impl SessionGuardian {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        store: AuthStore,
        config: GuardianConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            navigator,
            store,
            config,
            lifecycle: Mutex::new(Lifecycle::Uninitialized),
            background: AsyncMutex::new(None),
        })
    }

    /// Initializes from the provider and starts the background tasks.
    ///
    /// Any tasks from an earlier start are stopped and joined first, so two
    /// checks never race on the same state.
    pub async fn start(self: &Arc<Self>) {
        let mut background = self.background.lock().await;
        if let Some(previous) = background.take() {
            previous.stop().await;
        }

        // subscribe before initializing so no event slips through the gap
        let events = self.provider.subscribe();
        self.initialize().await;

        let lifecycle = CancellationToken::new();
        let checks = lifecycle.child_token();
        let handles = vec![
            self.spawn_checks(checks.clone()),
            self.spawn_event_listener(events, lifecycle.clone(), checks.clone()),
        ];
        *background = Some(Background {
            lifecycle,
            checks,
            handles,
        });

        info!(interval = ?self.config.period(), "session guardian started");
    }

    /// Stops both background tasks and waits for them to finish.
    pub async fn shutdown(&self) {
        let previous = self.background.lock().await.take();
        if let Some(previous) = previous {
            previous.stop().await;
            info!("session guardian stopped");
        }
    }

    pub async fn initialize(&self) {
        self.set_lifecycle(Lifecycle::Loading);
        self.store.set_loading(true);

        match self.provider.get_session().await {
            Ok(session) if is_valid_session(session.as_ref()) => {
                self.store.set_session(session);
            }
            Ok(_) => self.clear_local(),
            Err(e) => {
                debug!(error = %e, "session lookup failed during initialization");
                self.clear_local();
            }
        }

        self.store.set_loading(false);
        self.set_lifecycle(Lifecycle::Ready);
    }

    /// One round of the periodic check.
    pub async fn check_session(&self) -> CheckOutcome {
        let session = match self.provider.get_session().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.clear_local();
                return CheckOutcome::NoSession;
            }
            Err(e) => {
                debug!(error = %e, "session lookup failed");
                self.clear_local();
                return CheckOutcome::Failed;
            }
        };

        if is_session_expired(Some(&session)) {
            info!("session expired, signing out locally");
            // the provider would hand the same session back on the next tick
            self.provider.forget_session();
            self.store.purge();
            self.navigator.push(&self.config.login_path);
            return CheckOutcome::Expired;
        }

        if !needs_refresh(Some(&session)) {
            return CheckOutcome::Fresh;
        }

        match self.provider.refresh_session().await {
            Ok(Some(refreshed)) => {
                SESSION_REFRESHES.inc();
                self.store.set_session(Some(refreshed));
                CheckOutcome::Refreshed
            }
            Ok(None) => {
                self.clear_local();
                CheckOutcome::RefreshFailed
            }
            Err(e) => {
                // provider detail stays out of anything user-facing
                debug!(error = %e, "session refresh failed");
                self.clear_local();
                CheckOutcome::RefreshFailed
            }
        }
    }

    pub async fn sign_up(&self, data: SignUpData) -> Result<(), AuthError> {
        self.store.set_loading(true);
        self.store.set_error(None);
        let result = self.provider.sign_up(data).await;
        if let Ok(response) = &result {
            self.store.set_user(response.user.clone());
            self.store.set_session(response.session.clone());
        }
        self.store.set_loading(false);
        self.record_error(result.map(|_| ()))
    }

    pub async fn sign_in(&self, data: SignInData) -> Result<(), AuthError> {
        self.store.set_loading(true);
        self.store.set_error(None);
        let result = self.provider.sign_in(data).await;
        if let Ok(response) = &result {
            self.store.set_user(response.user.clone());
            self.store.set_session(response.session.clone());
        }
        self.store.set_loading(false);
        self.record_error(result.map(|_| ()))
    }

    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.store.set_loading(true);
        let result = self.provider.sign_out().await;
        if result.is_ok() {
            self.store.logout();
            self.stop_checks().await;
            self.navigator.push(&self.config.home_path);
        }
        self.store.set_loading(false);
        self.record_error(result)
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let result = self.provider.reset_password(email).await;
        self.record_error(result)
    }

    pub async fn update_password(&self, new_password: &str) -> Result<(), AuthError> {
        let result = self.provider.update_password(new_password).await.map(|_| ());
        self.record_error(result)
    }

    // Keeps the provider's message on the store for whoever renders it.
    fn record_error(&self, result: Result<(), AuthError>) -> Result<(), AuthError> {
        if let Err(e) = &result {
            self.store.set_error(Some(e.to_string()));
        }
        result
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        let state = self.store.snapshot();
        let lifecycle = self.lifecycle();
        let phase = match lifecycle {
            Lifecycle::Uninitialized => AuthPhase::Uninitialized,
            Lifecycle::Loading => AuthPhase::Loading,
            Lifecycle::Ready if state.is_authenticated => AuthPhase::Authenticated,
            Lifecycle::Ready => AuthPhase::Unauthenticated,
        };

        AuthSnapshot {
            user: state.user,
            session: state.session,
            is_loading: state.is_loading || lifecycle != Lifecycle::Ready,
            is_authenticated: state.is_authenticated,
            phase,
            error: state.error,
        }
    }

    /// Whether the periodic check is currently scheduled.
    pub async fn checks_running(&self) -> bool {
        self.background
            .lock()
            .await
            .as_ref()
            .is_some_and(|bg| !bg.checks.is_cancelled())
    }

    fn apply_event(&self, event: AuthEvent, checks: &CancellationToken) {
        debug!(kind = ?event.kind, "auth event");

        if event
            .session
            .as_ref()
            .is_some_and(|s| !is_valid_session(Some(s)))
        {
            self.clear_local();
            return;
        }
        self.store.set_session(event.session);

        match event.kind {
            AuthEventKind::SignedOut => {
                self.store.logout();
                checks.cancel();
                self.navigator.refresh();
            }
            AuthEventKind::SignedIn | AuthEventKind::TokenRefreshed => self.navigator.refresh(),
            AuthEventKind::UserUpdated | AuthEventKind::PasswordRecovery => {}
        }
    }

    async fn stop_checks(&self) {
        if let Some(bg) = self.background.lock().await.as_ref() {
            bg.checks.cancel();
        }
    }

    fn spawn_checks(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let guardian = Arc::clone(self);
        tokio::spawn(async move {
            let period = guardian.config.period();
            // first check one full period after start
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            biased;
                            _ = token.cancelled() => break,
                            outcome = guardian.check_session() => {
                                debug!(?outcome, "session check");
                            }
                        }
                    }
                }
            }
            debug!("session checks stopped");
        })
    }

    fn spawn_event_listener(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<AuthEvent>,
        lifecycle: CancellationToken,
        checks: CancellationToken,
    ) -> JoinHandle<()> {
        let guardian = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = lifecycle.cancelled() => break,
                    event = events.recv() => match event {
                        Ok(event) => guardian.apply_event(event, &checks),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "auth event listener lagged");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!("auth event listener stopped");
        })
    }

    fn clear_local(&self) {
        self.store.set_session(None);
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
            .lock()
            .map(|l| *l)
            .unwrap_or(Lifecycle::Uninitialized)
    }

    fn set_lifecycle(&self, next: Lifecycle) {
        if let Ok(mut l) = self.lifecycle.lock() {
            *l = next;
        }
    }
}
