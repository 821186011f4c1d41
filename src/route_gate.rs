//! Navigation gate for page requests.
//!
//! Decides from the path and the presence of a session cookie whether a page
//! request continues or is redirected. The cookie is not verified here; data
//! endpoints check identity against the provider on their own.

use axum::http::{HeaderMap, header};

pub const SESSION_COOKIE_NAMES: [&str; 2] = ["sb-access-token", "supabase-auth-token"];

const STATIC_PREFIXES: [&str; 3] = ["/_next/static", "/_next/image", "/favicon.ico"];
const IMAGE_EXTENSIONS: [&str; 6] = [".svg", ".png", ".jpg", ".jpeg", ".gif", ".webp"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Continue,
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct RouteGate {
    pub protected_prefixes: Vec<String>,
    pub auth_routes: Vec<String>,
    pub cookie_names: Vec<String>,
    pub login_path: String,
    pub home_path: String,
}

impl Default for RouteGate {
    fn default() -> Self {
        Self {
            protected_prefixes: vec![
                "/account".to_string(),
                "/checkout".to_string(),
                "/wishlist".to_string(),
            ],
            auth_routes: vec!["/login".to_string(), "/signup".to_string()],
            cookie_names: SESSION_COOKIE_NAMES.iter().map(|s| s.to_string()).collect(),
            login_path: "/login".to_string(),
            home_path: "/".to_string(),
        }
    }
}

impl RouteGate {
    // Build from comma-separated prefixes "/account,/checkout"
    pub fn with_protected(prefixes: &str) -> Self {
        let protected_prefixes: Vec<String> = prefixes
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        if protected_prefixes.is_empty() {
            return Self::default();
        }

        Self {
            protected_prefixes,
            ..Self::default()
        }
    }

    /// Whether the path is a page the gate looks at at all.
    pub fn applies_to(&self, path: &str) -> bool {
        if path.starts_with("/api/") || path == "/api" {
            return false;
        }
        if STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) {
            return false;
        }
        let lower = path.to_ascii_lowercase();
        !IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
    }

    pub fn decide(&self, path: &str, has_session: bool) -> GateDecision {
        let is_protected = self
            .protected_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()));

        if is_protected && !has_session {
            return GateDecision::Redirect(format!(
                "{}?redirect={}",
                self.login_path,
                urlencoding::encode(path)
            ));
        }

        let is_auth_route = self.auth_routes.iter().any(|r| r == path);
        if is_auth_route && has_session {
            return GateDecision::Redirect(self.home_path.clone());
        }

        GateDecision::Continue
    }

    pub fn decide_for(&self, path: &str, headers: &HeaderMap) -> GateDecision {
        self.decide(path, self.session_token(headers).is_some())
    }

    /// First non-empty session cookie, in configured order.
    pub fn session_token(&self, headers: &HeaderMap) -> Option<String> {
        self.cookie_names
            .iter()
            .find_map(|name| find_cookie(headers, name))
    }
}

pub fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, v)| k.trim() == name && !v.trim().is_empty())
        .map(|(_, v)| v.trim().to_string())
}
