use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use models::user::{validate_email, validate_password, validate_username};
use models::{ProfileUpdate, SignupRole, User};

use super::errors::AuthError;
use super::session::{CredentialExpiry, Session, SessionHandle};
use crate::api::{AuthGrant, LoginRequest, MarketplaceApi, SignupRequest};
use crate::errors::ErrorKind;
use crate::storage::{Credential, TokenStore};

/// Writing end of the session and the persisted credential, shared by the
/// manager and every handle it gives out.
struct SessionCore<S: TokenStore> {
    store: Arc<S>,
    tx: watch::Sender<Session>,
    initialized: AtomicBool,
}

impl<S: TokenStore> SessionCore<S> {
    fn session(&self) -> Session {
        self.tx.borrow().clone()
    }

    fn publish(&self, session: Session) {
        self.tx.send_replace(session);
    }

    fn logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored credential");
        }
        self.initialized.store(true, Ordering::SeqCst);
        let was_authenticated = self.session().is_authenticated();
        self.publish(Session::anonymous());
        if was_authenticated {
            info!("signed out");
        }
    }
}

impl<S: TokenStore> CredentialExpiry for SessionCore<S> {
    fn expire(&self, credential: &Credential) -> bool {
        let active = self.session().credential() == Some(credential);
        let stored = self.store.load().as_ref() == Some(credential);
        if !active && !stored {
            debug!("refused credential is no longer active; session kept");
            return false;
        }
        warn!("credential refused by server; signing out");
        self.logout();
        true
    }
}

/// Owner of the process session.
///
/// Every mutation of the session and of the persisted credential goes
/// through this type; other components observe it through a
/// [`SessionHandle`].
pub struct SessionManager<A: MarketplaceApi, S: TokenStore> {
    api: Arc<A>,
    core: Arc<SessionCore<S>>,
}

impl<A: MarketplaceApi, S: TokenStore + 'static> SessionManager<A, S> {
    pub fn new(api: Arc<A>, store: Arc<S>) -> Self {
        let (tx, _rx) = watch::channel(Session::uninitialized());
        Self { api, core: Arc::new(SessionCore { store, tx, initialized: AtomicBool::new(false) }) }
    }

    pub fn handle(&self) -> SessionHandle {
        let expiry: Arc<dyn CredentialExpiry> = self.core.clone();
        SessionHandle::new(self.core.tx.subscribe(), Some(expiry))
    }

    pub fn session(&self) -> Session {
        self.core.session()
    }

    fn publish(&self, session: Session) {
        self.core.publish(session);
    }

    /// Resolve the session from the stored credential.
    ///
    /// Runs at most once per manager; later calls return the current
    /// session untouched. Verification failures are silent: the credential
    /// is dropped and the session becomes anonymous.
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use models::{Role, User, UserId};
    /// use service::api::mock::MockMarketplaceApi;
    /// use service::auth::{SessionManager, SessionStatus};
    /// use service::storage::MemoryTokenStore;
    ///
    /// let api = Arc::new(MockMarketplaceApi::default());
    /// let token = api.with_account("pw1234", User { id: UserId(1), username: "ann".into(), email: "ann@x.io".into(), role: Role::Client });
    /// let mgr = SessionManager::new(api, Arc::new(MemoryTokenStore::with_credential(token)));
    /// let session = tokio_test::block_on(mgr.initialize());
    /// assert_eq!(session.status(), SessionStatus::Authenticated);
    /// assert_eq!(session.role(), Some(Role::Client));
    /// ```
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Session {
        if self.core.initialized.swap(true, Ordering::SeqCst) {
            debug!("session already initialized");
            return self.session();
        }
        self.verify_stored_credential().await
    }

    /// Explicitly re-run identity verification against the stored credential.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Session {
        self.core.initialized.store(true, Ordering::SeqCst);
        self.verify_stored_credential().await
    }

    async fn verify_stored_credential(&self) -> Session {
        let Some(credential) = self.core.store.load() else {
            debug!("no stored credential");
            self.publish(Session::anonymous());
            return self.session();
        };

        if !self.session().is_authenticated() {
            self.publish(Session::loading(credential.clone()));
        }

        let outcome = self.api.current_user(&credential).await;

        // A login or logout may have happened while we were waiting.
        if self.core.store.load().as_ref() != Some(&credential) {
            debug!("credential changed during verification; discarding result");
            return self.session();
        }

        match outcome {
            Ok(user) => {
                info!(user_id = %user.id, role = %user.role, "session restored");
                self.publish(Session::authenticated(user, credential));
            }
            Err(e) => {
                warn!(error = %e, "stored credential rejected; signing out");
                self.logout();
            }
        }
        self.session()
    }

    /// Sign in with email (or username) and password. On success the
    /// credential is persisted and the identity returned so the caller can
    /// route by role; on failure the previous session is left as it was.
    #[instrument(skip(self, secret))]
    pub async fn login(&self, email_or_username: &str, secret: &str) -> Result<User, AuthError> {
        if email_or_username.trim().is_empty() || secret.is_empty() {
            return Err(AuthError::Validation("email and password are required".into()));
        }
        let request = LoginRequest { email: email_or_username.trim().to_string(), password: secret.to_string() };
        let grant = self
            .api
            .login(&request)
            .await
            .map_err(|e| AuthError::from_api(e, "Login failed"))?;
        self.establish(grant)
    }

    /// Create an account and sign in. Only client and provider accounts can
    /// be requested.
    #[instrument(skip(self, secret))]
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        secret: &str,
        requested_role: SignupRole,
    ) -> Result<User, AuthError> {
        validate_username(username)?;
        validate_email(email)?;
        validate_password(secret)?;
        let request = SignupRequest {
            username: username.trim().to_string(),
            email: email.trim().to_string(),
            password: secret.to_string(),
            role: requested_role,
        };
        let grant = self
            .api
            .signup(&request)
            .await
            .map_err(|e| AuthError::from_api(e, "Signup failed"))?;
        self.establish(grant)
    }

    fn establish(&self, grant: AuthGrant) -> Result<User, AuthError> {
        let AuthGrant { access_token, user } = grant;
        self.core.store.save(&access_token)?;
        self.core.initialized.store(true, Ordering::SeqCst);
        info!(user_id = %user.id, role = %user.role, "signed in");
        self.publish(Session::authenticated(user.clone(), access_token));
        Ok(user)
    }

    /// Drop the credential and the session. Never touches the network and
    /// is safe to call repeatedly.
    pub fn logout(&self) {
        self.core.logout();
    }

    /// The server refused `credential`. Signs out only if it is still the
    /// active or stored credential, so a late 401 from an old session cannot
    /// end a newer one. Returns whether the session was ended.
    pub fn expire(&self, credential: &Credential) -> bool {
        self.core.expire(credential)
    }

    /// Send a partial profile update. The cached identity is replaced only
    /// with the server's answer, and only if the same session is still active.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, AuthError> {
        let credential = self
            .session()
            .authenticated_parts()
            .map(|(_, cred)| cred.clone())
            .ok_or(AuthError::NotAuthenticated)?;
        update.validate()?;

        let user = match self.api.update_profile(&credential, update).await {
            Ok(user) => user,
            Err(e) => {
                if e.kind() == ErrorKind::Authentication {
                    self.expire(&credential);
                }
                return Err(AuthError::from_api(e, "Update failed"));
            }
        };

        let replaced = self.core.tx.send_if_modified(|session| {
            if session.credential() != Some(&credential) {
                return false;
            }
            match session.with_user(user.clone()) {
                Some(next) => {
                    *session = next;
                    true
                }
                None => false,
            }
        });
        if replaced {
            info!(user_id = %user.id, "profile updated");
        } else {
            debug!("session changed during profile update; cached identity kept");
        }
        Ok(user)
    }

    /// Credential of the active session, if any.
    pub fn credential(&self) -> Option<Credential> {
        self.session().credential().cloned()
    }
}
