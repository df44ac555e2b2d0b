//! View access control.
//!
//! [`authorize`] is the pure decision over `(session, requirement)`;
//! [`RouteGuard`] applies it to concrete paths and never hands a protected
//! view the chance to render before the decision is `Granted`.

use std::sync::Arc;

use tracing::debug;

use models::Role;

use super::session::{Session, SessionHandle};

pub const LOGIN_PATH: &str = "/login";

/// What a view demands of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    Public,
    Authenticated,
    Role(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Session still resolving; render a neutral loading state.
    PendingDecision,
    Granted,
    /// Send the visitor to the login view, remembering where they wanted to go.
    DeniedUnauthenticated { redirect_to: String },
    /// Signed in with the wrong role; send them to their own landing view.
    DeniedWrongRole { redirect_to: String },
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    pub fn redirect(&self) -> Option<&str> {
        match self {
            AccessDecision::DeniedUnauthenticated { redirect_to } | AccessDecision::DeniedWrongRole { redirect_to } => {
                Some(redirect_to)
            }
            _ => None,
        }
    }
}

/// Decide whether `session` may see a view with `requirement` at `requested_path`.
pub fn authorize(session: &Session, requirement: RouteRequirement, requested_path: &str) -> AccessDecision {
    if requirement == RouteRequirement::Public {
        return AccessDecision::Granted;
    }
    if session.is_resolving() {
        return AccessDecision::PendingDecision;
    }
    let Some(role) = session.role() else {
        return AccessDecision::DeniedUnauthenticated { redirect_to: login_redirect(requested_path) };
    };
    match requirement {
        RouteRequirement::Role(required) if required != role => {
            AccessDecision::DeniedWrongRole { redirect_to: role.landing_path().to_string() }
        }
        _ => AccessDecision::Granted,
    }
}

/// Login URL carrying the originally requested path.
pub fn login_redirect(requested_path: &str) -> String {
    format!("{LOGIN_PATH}?redirect={}", urlencoding::encode(requested_path))
}

/// Read the `redirect` parameter back out of a login URL query string.
pub fn redirect_param(query: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .find_map(|pair| pair.strip_prefix("redirect="))
        .and_then(|raw| urlencoding::decode(raw).ok())
        .map(|decoded| decoded.into_owned())
}

/// Where to go after a successful login: the remembered path when it is a
/// local absolute path, otherwise the role's landing view.
pub fn post_login_destination(redirect: Option<&str>, role: Role) -> String {
    match redirect {
        Some(path) if is_local_path(path) => path.to_string(),
        _ => role.landing_path().to_string(),
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') && !path.contains("://")
}

#[derive(Debug, Clone)]
struct RoutePattern {
    segments: Vec<String>,
    /// Also matches any deeper path (nested views).
    nested: bool,
    requirement: RouteRequirement,
}

impl RoutePattern {
    fn matches(&self, path: &[&str]) -> bool {
        if path.len() < self.segments.len() || (!self.nested && path.len() != self.segments.len()) {
            return false;
        }
        self.segments
            .iter()
            .zip(path)
            .all(|(pat, seg)| pat.starts_with(':') || pat == seg)
    }
}

/// Requirement per route pattern. Patterns use `:name` for a single
/// dynamic segment; nested patterns cover every path below them.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<RoutePattern>,
}

impl RouteTable {
    pub fn new() -> Self { Self::default() }

    pub fn route(mut self, pattern: &str, requirement: RouteRequirement) -> Self {
        self.routes.push(RoutePattern { segments: split_path(pattern), nested: false, requirement });
        self
    }

    pub fn nested(mut self, pattern: &str, requirement: RouteRequirement) -> Self {
        self.routes.push(RoutePattern { segments: split_path(pattern), nested: true, requirement });
        self
    }

    /// The marketplace's views.
    pub fn marketplace() -> Self {
        Self::new()
            .route("/", RouteRequirement::Public)
            .route("/marketplace", RouteRequirement::Public)
            .route("/services/:id", RouteRequirement::Public)
            .route(LOGIN_PATH, RouteRequirement::Public)
            .route("/signup", RouteRequirement::Public)
            .route("/book/:id", RouteRequirement::Authenticated)
            .nested("/dashboard", RouteRequirement::Role(Role::Client))
            .nested("/provider", RouteRequirement::Role(Role::Provider))
            .nested("/admin", RouteRequirement::Role(Role::Admin))
    }

    /// Most specific matching requirement; unknown paths are public (the
    /// view layer renders its not-found page, which exposes nothing).
    pub fn requirement_for(&self, path: &str) -> RouteRequirement {
        let segments = split_path(path);
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        self.routes
            .iter()
            .filter(|r| r.matches(&segments))
            .max_by_key(|r| (r.segments.len(), !r.nested))
            .map(|r| r.requirement)
            .unwrap_or(RouteRequirement::Public)
    }
}

fn split_path(path: &str) -> Vec<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

/// Result of guarding a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guarded<T> {
    Loading,
    Render(T),
    Redirect(String),
}

/// Gate between the router and protected views. Re-evaluates on every
/// call, so a logout revokes access on the next render.
#[derive(Clone)]
pub struct RouteGuard {
    session: SessionHandle,
    routes: Arc<RouteTable>,
}

impl RouteGuard {
    pub fn new(session: SessionHandle, routes: RouteTable) -> Self {
        Self { session, routes: Arc::new(routes) }
    }

    pub fn check(&self, path: &str) -> AccessDecision {
        let session = self.session.current();
        self.decide(&session, path)
    }

    fn decide(&self, session: &Session, path: &str) -> AccessDecision {
        let decision = authorize(session, self.routes.requirement_for(path), path);
        debug!(path, decision = ?decision, "route access");
        decision
    }

    /// Run `view` only when access is granted, against the same session
    /// snapshot the decision was made on.
    pub fn render<T>(&self, path: &str, view: impl FnOnce(&Session) -> T) -> Guarded<T> {
        let session = self.session.current();
        match self.decide(&session, path) {
            AccessDecision::PendingDecision => Guarded::Loading,
            AccessDecision::Granted => Guarded::Render(view(&session)),
            AccessDecision::DeniedUnauthenticated { redirect_to } | AccessDecision::DeniedWrongRole { redirect_to } => {
                Guarded::Redirect(redirect_to)
            }
        }
    }

    /// Wait out the loading phase and return the first definite decision.
    pub async fn resolve(&mut self, path: &str) -> AccessDecision {
        loop {
            let decision = self.check(path);
            if decision != AccessDecision::PendingDecision {
                return decision;
            }
            if !self.session.changed().await {
                return self.check(path);
            }
        }
    }

    /// Wait for the next session change and re-evaluate `path`.
    /// `None` once the session owner is gone.
    pub async fn next_decision(&mut self, path: &str) -> Option<AccessDecision> {
        if self.session.changed().await {
            Some(self.check(path))
        } else {
            None
        }
    }
}
