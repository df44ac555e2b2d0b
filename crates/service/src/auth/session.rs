use std::sync::Arc;

use tokio::sync::watch;

use models::{Role, User, UserId};

use crate::storage::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Process just started; nothing has been read yet.
    Uninitialized,
    /// A stored credential is being verified.
    Loading,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Loading,
    Authenticated(User),
    Anonymous,
}

/// Who is signed in. Identity and role exist exactly when the status is
/// `Authenticated`; the representation makes any other mix unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    credential: Option<Credential>,
}

impl Default for Session {
    fn default() -> Self { Self::uninitialized() }
}

impl Session {
    pub const fn uninitialized() -> Self {
        Self { state: SessionState::Uninitialized, credential: None }
    }

    pub fn loading(credential: Credential) -> Self {
        Self { state: SessionState::Loading, credential: Some(credential) }
    }

    pub fn authenticated(user: User, credential: Credential) -> Self {
        Self { state: SessionState::Authenticated(user), credential: Some(credential) }
    }

    pub const fn anonymous() -> Self {
        Self { state: SessionState::Anonymous, credential: None }
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Uninitialized => SessionStatus::Uninitialized,
            SessionState::Loading => SessionStatus::Loading,
            SessionState::Authenticated(_) => SessionStatus::Authenticated,
            SessionState::Anonymous => SessionStatus::Anonymous,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn identity(&self) -> Option<UserId> {
        self.user().map(|u| u.id)
    }

    pub fn role(&self) -> Option<Role> {
        self.user().map(|u| u.role)
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// Still waiting for the first verification to finish.
    pub fn is_resolving(&self) -> bool {
        matches!(self.state, SessionState::Uninitialized | SessionState::Loading)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated(_))
    }

    /// Identity, role and credential together, only when authenticated.
    pub fn authenticated_parts(&self) -> Option<(&User, &Credential)> {
        match (&self.state, &self.credential) {
            (SessionState::Authenticated(user), Some(cred)) => Some((user, cred)),
            _ => None,
        }
    }

    pub(crate) fn with_user(&self, user: User) -> Option<Self> {
        let credential = self.credential.clone()?;
        self.is_authenticated().then(|| Self::authenticated(user, credential))
    }
}

/// Lets observers report that the server refused a credential. The
/// implementor owns the session and decides whether it is still the active one.
pub(crate) trait CredentialExpiry: Send + Sync {
    fn expire(&self, credential: &Credential) -> bool;
}

/// Read-only view of the process session. Cloned freely; only the
/// `SessionManager` holds the writing end.
#[derive(Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<Session>,
    expiry: Option<Arc<dyn CredentialExpiry>>,
}

impl SessionHandle {
    pub(crate) fn new(rx: watch::Receiver<Session>, expiry: Option<Arc<dyn CredentialExpiry>>) -> Self {
        Self { rx, expiry }
    }

    /// The server answered 401 for `credential`. Ends the session if that
    /// credential is still the active one; returns whether it did.
    pub fn report_expired(&self, credential: &Credential) -> bool {
        self.expiry.as_ref().is_some_and(|e| e.expire(credential))
    }

    /// Snapshot for the current render.
    pub fn current(&self) -> Session {
        self.rx.borrow().clone()
    }

    /// Wait until the session changes. Returns `false` once the manager is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}
