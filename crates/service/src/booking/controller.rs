use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use models::{Booking, BookingId, BookingStatus, CreateBooking, NewBooking, Role, StatusUpdate, User};

use super::errors::BookingError;
use super::state_machine::{allowed_transitions, validate_transition};
use crate::api::{ApiError, MarketplaceApi};
use crate::auth::{Session, SessionHandle};
use crate::errors::ErrorKind;
use crate::storage::Credential;

/// Whether `user` may see `booking` from the `scope` dashboard.
///
/// A provider listing whose rows carry no provider reference is trusted as
/// server-scoped; a reference to a different provider is not.
pub fn in_scope(user: &User, scope: Role, booking: &Booking) -> bool {
    match scope {
        Role::Client => booking.client_id == user.id,
        Role::Provider => booking.provider_ref().map_or(true, |p| p == user.id),
        Role::Admin => true,
    }
}

/// Booking collection behind one role-specific dashboard.
///
/// The cache is owned by this instance alone and only ever changes with an
/// authoritative server response. Responses landing after [`unmount`]
/// or after the session changed hands are dropped.
///
/// [`unmount`]: BookingListController::unmount
pub struct BookingListController<A: MarketplaceApi> {
    api: Arc<A>,
    session: SessionHandle,
    scope: Role,
    cache: RwLock<Vec<Booking>>,
    mounted: AtomicBool,
}

impl<A: MarketplaceApi> BookingListController<A> {
    pub fn new(api: Arc<A>, session: SessionHandle, scope: Role) -> Self {
        Self { api, session, scope, cache: RwLock::new(Vec::new()), mounted: AtomicBool::new(true) }
    }

    pub fn scope(&self) -> Role { self.scope }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// The owning view is going away; in-flight responses will be discarded.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            debug!(scope = %self.scope, "booking list unmounted");
        }
    }

    /// Snapshot of the cached collection.
    pub async fn bookings(&self) -> Vec<Booking> {
        self.cache.read().await.clone()
    }

    pub async fn booking(&self, id: BookingId) -> Option<Booking> {
        self.cache.read().await.iter().find(|b| b.id == id).cloned()
    }

    /// Authenticated session of this dashboard's role, with the credential
    /// the request will carry.
    fn active_session(&self) -> Result<(User, Credential), BookingError> {
        let session = self.session.current();
        let (user, credential) = session.authenticated_parts().ok_or(BookingError::NotAuthenticated)?;
        if user.role != self.scope {
            return Err(BookingError::NotAuthorized(format!("{} dashboard requires the {} role", self.scope, self.scope)));
        }
        Ok((user.clone(), credential.clone()))
    }

    /// Still mounted and still the same session that issued the request.
    fn may_apply(&self, credential: &Credential) -> bool {
        let current: Session = self.session.current();
        self.is_mounted() && current.credential() == Some(credential)
    }

    /// Convert a failed request, ending the session when the server refused
    /// the credential it carried.
    fn failed(&self, err: ApiError, credential: &Credential, default_message: &str) -> BookingError {
        if err.kind() == ErrorKind::Authentication && self.session.report_expired(credential) {
            warn!(error = %err, "credential refused; session ended");
        }
        BookingError::from_api(err, default_message)
    }

    /// Load the role-scoped collection. Never fails: any problem yields an
    /// empty list and leaves the cache as it was.
    #[instrument(skip(self), fields(scope = %self.scope))]
    pub async fn fetch(&self) -> Vec<Booking> {
        let (user, credential) = match self.active_session() {
            Ok(parts) => parts,
            Err(e) => {
                debug!(error = %e, "skipping booking fetch");
                return Vec::new();
            }
        };
        let listed = match self.api.list_bookings(&credential, self.scope).await {
            Ok(list) => list,
            Err(e) => {
                let e = self.failed(e, &credential, "Failed to load bookings");
                warn!(error = %e, "booking fetch failed");
                return Vec::new();
            }
        };
        let visible: Vec<Booking> = listed
            .into_iter()
            .filter(|b| in_scope(&user, self.scope, b))
            .inspect(|b| {
                if self.scope == Role::Provider && b.provider_ref().is_none() {
                    debug!(booking_id = %b.id, "admitting provider row without provider reference");
                }
            })
            .collect();
        if self.may_apply(&credential) {
            *self.cache.write().await = visible.clone();
            info!(count = visible.len(), "bookings loaded");
        } else {
            debug!("discarding booking list for a released view");
        }
        visible
    }

    /// Statuses the signed-in user may move a cached booking to. Empty for
    /// unknown bookings or when the session does not fit this dashboard.
    pub async fn available_transitions(&self, id: BookingId) -> Vec<BookingStatus> {
        let Ok((user, _)) = self.active_session() else {
            return Vec::new();
        };
        match self.booking(id).await {
            Some(b) if in_scope(&user, self.scope, &b) => allowed_transitions(b.status, self.scope).to_vec(),
            _ => Vec::new(),
        }
    }

    pub async fn apply_transition(
        &self,
        id: BookingId,
        target: BookingStatus,
        actor: Role,
    ) -> Result<Booking, BookingError> {
        self.apply_transition_with_note(id, target, actor, None).await
    }

    /// Validate `target` against the cached status and `actor`, then ask the
    /// server. Nothing is dispatched unless the transition table allows it.
    /// On success the cached entry becomes whatever the server returned.
    #[instrument(skip(self, note), fields(scope = %self.scope, booking_id = %id, target = %target))]
    pub async fn apply_transition_with_note(
        &self,
        id: BookingId,
        target: BookingStatus,
        actor: Role,
        note: Option<String>,
    ) -> Result<Booking, BookingError> {
        if !self.is_mounted() {
            return Err(BookingError::Detached);
        }
        let (user, credential) = self.active_session()?;
        if actor != user.role {
            return Err(BookingError::NotAuthorized(format!("signed in as {}, not {actor}", user.role)));
        }
        let current = self.booking(id).await.ok_or(BookingError::NotFound(id))?;
        if !in_scope(&user, self.scope, &current) {
            return Err(BookingError::NotAuthorized(format!("booking {id} belongs to another account")));
        }
        validate_transition(current.status, target, actor)?;

        let update = StatusUpdate { status: target, notes: note.filter(|n| !n.trim().is_empty()) };
        let updated = self
            .api
            .update_booking_status(&credential, self.scope, id, &update)
            .await
            .map_err(|e| self.failed(e, &credential, "Booking update failed"))?;

        if self.may_apply(&credential) {
            let mut cache = self.cache.write().await;
            if let Some(slot) = cache.iter_mut().find(|b| b.id == id) {
                *slot = updated.clone();
            }
            info!(from = %current.status, to = %updated.status, "booking status applied");
        } else {
            debug!("discarding booking update for a released view");
        }
        Ok(updated)
    }

    /// Admin only. The entry leaves the cache once the server confirms.
    #[instrument(skip(self), fields(scope = %self.scope, booking_id = %id))]
    pub async fn delete(&self, id: BookingId) -> Result<(), BookingError> {
        if !self.is_mounted() {
            return Err(BookingError::Detached);
        }
        let (user, credential) = self.active_session()?;
        if user.role != Role::Admin {
            return Err(BookingError::NotAuthorized("only admins delete bookings".into()));
        }
        if self.booking(id).await.is_none() {
            return Err(BookingError::NotFound(id));
        }
        self.api
            .delete_booking(&credential, id)
            .await
            .map_err(|e| self.failed(e, &credential, "Booking deletion failed"))?;

        if self.may_apply(&credential) {
            self.cache.write().await.retain(|b| b.id != id);
            info!("booking deleted");
        }
        Ok(())
    }

    /// Client only. Fields are checked locally first; the new booking joins
    /// the cache once the server has stored it.
    #[instrument(skip(self, draft), fields(scope = %self.scope, service_id = draft.service_id))]
    pub async fn create_booking(&self, draft: NewBooking) -> Result<Booking, BookingError> {
        if !self.is_mounted() {
            return Err(BookingError::Detached);
        }
        let (user, credential) = self.active_session()?;
        if user.role != Role::Client {
            return Err(BookingError::NotAuthorized("only clients place bookings".into()));
        }
        draft.validate(Local::now().naive_local())?;

        let request = CreateBooking { booking: draft, client_id: user.id };
        let created = self
            .api
            .create_booking(&credential, &request)
            .await
            .map_err(|e| self.failed(e, &credential, "Failed to book"))?;

        if self.may_apply(&credential) {
            self.cache.write().await.push(created.clone());
            info!(booking_id = %created.id, "booking created");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{Endpoint, MockMarketplaceApi};
    use crate::auth::{SessionManager, SessionStatus};
    use crate::storage::{MemoryTokenStore, TokenStore};
    use models::{ServiceSummary, UserId};

    const CLIENT: UserId = UserId(10);
    const OTHER_CLIENT: UserId = UserId(11);
    const PROVIDER: UserId = UserId(20);
    const ADMIN: UserId = UserId(1);

    fn user(id: UserId, role: Role) -> User {
        User { id, username: format!("u{id}"), email: format!("u{id}@x.io"), role }
    }

    fn booking(id: i64, client: UserId, status: BookingStatus) -> Booking {
        Booking {
            id: BookingId(id),
            service_id: 5,
            client_id: client,
            provider_id: None,
            service: Some(ServiceSummary { id: 5, name: Some("Gardening".into()), provider_id: Some(PROVIDER) }),
            date: "2030-01-01T10:00".into(),
            location: Some("1 Main St".into()),
            contact_phone: Some("0712345678".into()),
            notes: None,
            status,
        }
    }

    struct Fixture {
        api: Arc<MockMarketplaceApi>,
        mgr: SessionManager<MockMarketplaceApi, MemoryTokenStore>,
        store: Arc<MemoryTokenStore>,
    }

    async fn signed_in(as_user: User) -> anyhow::Result<Fixture> {
        let api = Arc::new(MockMarketplaceApi::default());
        for u in [user(CLIENT, Role::Client), user(OTHER_CLIENT, Role::Client), user(PROVIDER, Role::Provider), user(ADMIN, Role::Admin)] {
            api.with_account("secret1", u);
        }
        api.with_bookings(vec![
            booking(1, CLIENT, BookingStatus::Pending),
            booking(2, CLIENT, BookingStatus::Confirmed),
            booking(3, OTHER_CLIENT, BookingStatus::Pending),
            booking(4, CLIENT, BookingStatus::Completed),
        ]);
        let store = Arc::new(MemoryTokenStore::default());
        let mgr = SessionManager::new(api.clone(), store.clone());
        mgr.login(&as_user.email, "secret1").await?;
        Ok(Fixture { api, mgr, store })
    }

    fn controller(f: &Fixture, scope: Role) -> BookingListController<MockMarketplaceApi> {
        BookingListController::new(f.api.clone(), f.mgr.handle(), scope)
    }

    #[tokio::test]
    async fn client_sees_only_own_bookings() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let list = controller(&f, Role::Client).fetch().await;
        assert_eq!(list.iter().map(|b| b.id.0).collect::<Vec<_>>(), vec![1, 2, 4]);
        Ok(())
    }

    #[tokio::test]
    async fn admin_sees_everything() -> anyhow::Result<()> {
        let f = signed_in(user(ADMIN, Role::Admin)).await?;
        assert_eq!(controller(&f, Role::Admin).fetch().await.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_failure_is_an_empty_list() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        f.api.fail_next(Endpoint::ListBookings, ApiError::Network("reset".into()));
        assert!(c.fetch().await.is_empty());
        assert_eq!(c.bookings().await.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn fetch_for_wrong_role_sends_nothing() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let before = f.api.total_calls();
        assert!(controller(&f, Role::Admin).fetch().await.is_empty());
        assert_eq!(f.api.total_calls(), before);
        Ok(())
    }

    #[tokio::test]
    async fn dispatch_iff_table_allows() -> anyhow::Result<()> {
        let f = signed_in(user(PROVIDER, Role::Provider)).await?;
        let c = controller(&f, Role::Provider);
        c.fetch().await;
        for b in c.bookings().await {
            for target in BookingStatus::ALL {
                let status = c.booking(b.id).await.map(|b| b.status).unwrap_or(b.status);
                let calls = f.api.calls(Endpoint::UpdateBooking);
                let res = c.apply_transition(b.id, target, Role::Provider).await;
                let dispatched = f.api.calls(Endpoint::UpdateBooking) > calls;
                let allowed = allowed_transitions(status, Role::Provider).contains(&target);
                assert_eq!(dispatched, allowed, "{status} -> {target}");
                assert_eq!(res.is_ok(), allowed);
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn provider_cannot_complete_pending_booking() -> anyhow::Result<()> {
        let f = signed_in(user(PROVIDER, Role::Provider)).await?;
        let c = controller(&f, Role::Provider);
        c.fetch().await;
        let err = c.apply_transition(BookingId(1), BookingStatus::Completed, Role::Provider).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        assert_eq!(f.api.calls(Endpoint::UpdateBooking), 0);
        assert_eq!(c.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Pending));
        Ok(())
    }

    #[tokio::test]
    async fn cache_takes_server_value_not_requested_value() -> anyhow::Result<()> {
        let f = signed_in(user(PROVIDER, Role::Provider)).await?;
        let c = controller(&f, Role::Provider);
        c.fetch().await;
        f.api.override_update_status(BookingStatus::Cancelled);
        let b = c.apply_transition(BookingId(2), BookingStatus::Completed, Role::Provider).await?;
        assert_eq!(b.status, BookingStatus::Cancelled);
        assert_eq!(c.booking(BookingId(2)).await.map(|b| b.status), Some(BookingStatus::Cancelled));
        Ok(())
    }

    #[tokio::test]
    async fn failed_mutation_leaves_cache_unchanged() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        f.api.fail_next(Endpoint::UpdateBooking, ApiError::Rejected { status: 500, message: None });
        let err = c.apply_transition(BookingId(1), BookingStatus::Cancelled, Role::Client).await.unwrap_err();
        assert_eq!(err.to_string(), "Booking update failed");
        assert_eq!(err.kind(), ErrorKind::Network);
        assert_eq!(c.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Pending));
        Ok(())
    }

    #[tokio::test]
    async fn actor_must_match_session_role() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        let err = c.apply_transition(BookingId(1), BookingStatus::Confirmed, Role::Admin).await.unwrap_err();
        assert!(matches!(err, BookingError::NotAuthorized(_)));
        assert_eq!(f.api.calls(Endpoint::UpdateBooking), 0);
        Ok(())
    }

    #[tokio::test]
    async fn reschedule_note_travels_with_the_request() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        let note = Some("Could we do Friday instead?".to_string());
        c.apply_transition_with_note(BookingId(2), BookingStatus::RescheduleRequested, Role::Client, note.clone())
            .await?;
        assert_eq!(f.api.stored_booking(BookingId(2)).and_then(|b| b.notes), note);
        Ok(())
    }

    #[tokio::test]
    async fn unmounted_controller_dispatches_nothing() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        c.unmount();
        let err = c.apply_transition(BookingId(1), BookingStatus::Cancelled, Role::Client).await.unwrap_err();
        assert_eq!(err, BookingError::Detached);
        assert_eq!(f.api.calls(Endpoint::UpdateBooking), 0);
        Ok(())
    }

    #[tokio::test]
    async fn logout_between_fetch_and_mutation_blocks_dispatch() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        f.mgr.logout();
        let err = c.apply_transition(BookingId(1), BookingStatus::Cancelled, Role::Client).await.unwrap_err();
        assert_eq!(err, BookingError::NotAuthenticated);
        Ok(())
    }

    #[tokio::test]
    async fn refused_credential_on_mutation_ends_session() -> anyhow::Result<()> {
        let f = signed_in(user(PROVIDER, Role::Provider)).await?;
        let c = controller(&f, Role::Provider);
        c.fetch().await;
        if let Some(cred) = f.mgr.credential() {
            f.api.revoke(&cred);
        }
        let err = c.apply_transition(BookingId(1), BookingStatus::Confirmed, Role::Provider).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(f.mgr.session().status(), SessionStatus::Anonymous);
        assert!(f.store.load().is_none());
        assert_eq!(c.booking(BookingId(1)).await.map(|b| b.status), Some(BookingStatus::Pending));
        Ok(())
    }

    #[tokio::test]
    async fn refused_credential_on_listing_ends_session() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        f.api.fail_next(Endpoint::ListBookings, ApiError::Unauthorized { message: None });
        assert!(c.fetch().await.is_empty());
        assert_eq!(f.mgr.session().status(), SessionStatus::Anonymous);
        assert!(f.store.load().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn only_admin_deletes_and_only_after_confirmation() -> anyhow::Result<()> {
        let f = signed_in(user(ADMIN, Role::Admin)).await?;
        let c = controller(&f, Role::Admin);
        c.fetch().await;
        f.api.fail_next(Endpoint::DeleteBooking, ApiError::Network("down".into()));
        assert!(c.delete(BookingId(3)).await.is_err());
        assert!(c.booking(BookingId(3)).await.is_some());
        c.delete(BookingId(3)).await?;
        assert!(c.booking(BookingId(3)).await.is_none());
        assert!(f.api.stored_booking(BookingId(3)).is_none());
        Ok(())
    }

    #[tokio::test]
    async fn available_transitions_follow_role() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        assert_eq!(
            c.available_transitions(BookingId(1)).await,
            vec![BookingStatus::Cancelled, BookingStatus::RescheduleRequested]
        );
        assert!(c.available_transitions(BookingId(4)).await.is_empty());
        assert!(c.available_transitions(BookingId(3)).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn create_booking_validates_then_appends() -> anyhow::Result<()> {
        let f = signed_in(user(CLIENT, Role::Client)).await?;
        let c = controller(&f, Role::Client);
        c.fetch().await;
        let draft = NewBooking {
            service_id: 5,
            date: "2099-06-01T09:00".into(),
            location: "2 Oak Road".into(),
            contact_phone: "0799999999".into(),
            notes: None,
        };
        let bad = NewBooking { contact_phone: "123".into(), ..draft.clone() };
        assert!(matches!(c.create_booking(bad).await, Err(BookingError::Validation(_))));
        assert_eq!(f.api.calls(Endpoint::CreateBooking), 0);

        let created = c.create_booking(draft).await?;
        assert_eq!(created.client_id, CLIENT);
        assert_eq!(created.status, BookingStatus::Pending);
        assert_eq!(c.bookings().await.len(), 4);
        Ok(())
    }
}
