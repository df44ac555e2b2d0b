//! In-memory marketplace API for tests and doc examples.
//!
//! Behaves like a tiny authoritative server: it owns accounts, issues
//! tokens, scopes booking listings by role and counts every call so tests
//! can assert that nothing was dispatched.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use models::{Booking, BookingId, BookingStatus, CreateBooking, ProfileUpdate, Role, StatusUpdate, User, UserId};

use super::{ApiError, AuthGrant, LoginRequest, MarketplaceApi, SignupRequest};
use crate::storage::Credential;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    CurrentUser,
    Login,
    Signup,
    UpdateProfile,
    ListBookings,
    UpdateBooking,
    DeleteBooking,
    CreateBooking,
}

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, (String, User)>, // key: email -> (password, user)
    tokens: HashMap<String, UserId>,
    users: HashMap<UserId, User>,
    bookings: Vec<Booking>,
    calls: HashMap<Endpoint, usize>,
    failures: HashMap<Endpoint, ApiError>,
    status_override: Option<BookingStatus>,
    next_user_id: i64,
    next_booking_id: i64,
}

#[derive(Default)]
pub struct MockMarketplaceApi {
    state: Mutex<MockState>,
}

impl MockMarketplaceApi {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an account and return a credential already valid for it.
    pub fn with_account(&self, password: &str, user: User) -> Credential {
        let mut st = self.state();
        let token = format!("tok-{}", user.id);
        st.next_user_id = st.next_user_id.max(user.id.0);
        st.tokens.insert(token.clone(), user.id);
        st.users.insert(user.id, user.clone());
        st.accounts.insert(user.email.clone(), (password.to_string(), user));
        Credential::new(token)
    }

    pub fn with_bookings(&self, bookings: Vec<Booking>) {
        let mut st = self.state();
        st.next_booking_id = bookings.iter().map(|b| b.id.0).max().unwrap_or(0);
        st.bookings = bookings;
    }

    /// Fail the next call to `endpoint` with `err`.
    pub fn fail_next(&self, endpoint: Endpoint, err: ApiError) {
        self.state().failures.insert(endpoint, err);
    }

    /// Make status updates store `status` instead of the requested one,
    /// simulating a server that applies its own rules.
    pub fn override_update_status(&self, status: BookingStatus) {
        self.state().status_override = Some(status);
    }

    pub fn revoke(&self, credential: &Credential) {
        self.state().tokens.remove(credential.expose());
    }

    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.state().calls.get(&endpoint).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.values().sum()
    }

    /// Server-side copy of a booking.
    pub fn stored_booking(&self, id: BookingId) -> Option<Booking> {
        self.state().bookings.iter().find(|b| b.id == id).cloned()
    }

    fn enter(&self, endpoint: Endpoint) -> Result<MutexGuard<'_, MockState>, ApiError> {
        let mut st = self.state();
        *st.calls.entry(endpoint).or_insert(0) += 1;
        let scripted = st.failures.remove(&endpoint);
        match scripted {
            Some(err) => Err(err),
            None => Ok(st),
        }
    }
}

impl MockState {
    fn authenticate(&self, credential: &Credential) -> Result<User, ApiError> {
        self.tokens
            .get(credential.expose())
            .and_then(|id| self.users.get(id))
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized { message: Some("Token has expired".into()) })
    }

    fn grant(&mut self, user: &User) -> AuthGrant {
        let token = format!("tok-{}-{}", user.id, self.tokens.len());
        self.tokens.insert(token.clone(), user.id);
        AuthGrant { access_token: Credential::new(token), user: user.clone() }
    }

    fn in_scope(user: &User, scope: Role, booking: &Booking) -> bool {
        match scope {
            Role::Client => booking.client_id == user.id,
            Role::Provider => booking.provider_ref() == Some(user.id),
            Role::Admin => true,
        }
    }
}

#[async_trait]
impl MarketplaceApi for MockMarketplaceApi {
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError> {
        let st = self.enter(Endpoint::CurrentUser)?;
        st.authenticate(credential)
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, ApiError> {
        let mut st = self.enter(Endpoint::Login)?;
        let user = match st.accounts.get(&request.email) {
            Some((password, user)) if *password == request.password => user.clone(),
            _ => return Err(ApiError::Unauthorized { message: Some("Invalid email or password".into()) }),
        };
        Ok(st.grant(&user))
    }

    async fn signup(&self, request: &SignupRequest) -> Result<AuthGrant, ApiError> {
        let mut st = self.enter(Endpoint::Signup)?;
        if st.accounts.contains_key(&request.email) {
            return Err(ApiError::rejected(409, "Email already registered"));
        }
        st.next_user_id += 1;
        let user = User {
            id: UserId(st.next_user_id),
            username: request.username.clone(),
            email: request.email.clone(),
            role: request.role.into(),
        };
        st.users.insert(user.id, user.clone());
        st.accounts.insert(user.email.clone(), (request.password.clone(), user.clone()));
        Ok(st.grant(&user))
    }

    async fn update_profile(&self, credential: &Credential, update: &ProfileUpdate) -> Result<User, ApiError> {
        let mut st = self.enter(Endpoint::UpdateProfile)?;
        let mut user = st.authenticate(credential)?;
        if let Some(name) = &update.username {
            user.username = name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        st.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn list_bookings(&self, credential: &Credential, scope: Role) -> Result<Vec<Booking>, ApiError> {
        let st = self.enter(Endpoint::ListBookings)?;
        let user = st.authenticate(credential)?;
        if user.role != scope {
            return Err(ApiError::rejected(403, "Forbidden"));
        }
        Ok(st.bookings.iter().filter(|b| MockState::in_scope(&user, scope, b)).cloned().collect())
    }

    async fn update_booking_status(
        &self,
        credential: &Credential,
        scope: Role,
        id: BookingId,
        update: &StatusUpdate,
    ) -> Result<Booking, ApiError> {
        let mut st = self.enter(Endpoint::UpdateBooking)?;
        let user = st.authenticate(credential)?;
        let status = st.status_override.unwrap_or(update.status);
        let booking = st
            .bookings
            .iter_mut()
            .find(|b| b.id == id && MockState::in_scope(&user, scope, b))
            .ok_or_else(|| ApiError::rejected(404, "Booking not found"))?;
        booking.status = status;
        if update.notes.is_some() {
            booking.notes = update.notes.clone();
        }
        Ok(booking.clone())
    }

    async fn delete_booking(&self, credential: &Credential, id: BookingId) -> Result<(), ApiError> {
        let mut st = self.enter(Endpoint::DeleteBooking)?;
        let user = st.authenticate(credential)?;
        if user.role != Role::Admin {
            return Err(ApiError::rejected(403, "Admin access required"));
        }
        let before = st.bookings.len();
        st.bookings.retain(|b| b.id != id);
        if st.bookings.len() == before {
            return Err(ApiError::rejected(404, "Booking not found"));
        }
        Ok(())
    }

    async fn create_booking(&self, credential: &Credential, booking: &CreateBooking) -> Result<Booking, ApiError> {
        let mut st = self.enter(Endpoint::CreateBooking)?;
        st.authenticate(credential)?;
        st.next_booking_id += 1;
        let created = Booking {
            id: BookingId(st.next_booking_id),
            service_id: booking.booking.service_id,
            client_id: booking.client_id,
            provider_id: None,
            service: None,
            date: booking.booking.date.clone(),
            location: Some(booking.booking.location.clone()),
            contact_phone: Some(booking.booking.contact_phone.clone()),
            notes: booking.booking.notes.clone(),
            status: BookingStatus::Pending,
        };
        st.bookings.push(created.clone());
        Ok(created)
    }
}
