//! The marketplace REST API as seen by the client core.
//!
//! The persistence store behind these endpoints is a black box; this module
//! only fixes the request/response contract. `http` talks to a real server,
//! `mock` is an in-memory stand-in for tests.

pub mod errors;
pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use models::{Booking, BookingId, CreateBooking, ProfileUpdate, Role, SignupRole, StatusUpdate, User};

use crate::storage::Credential;
pub use errors::ApiError;
pub use http::HttpMarketplaceApi;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: SignupRole,
}

/// Successful login/signup: a fresh credential plus the identity it belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthGrant {
    pub access_token: Credential,
    pub user: User,
}

/// Collection endpoint for a role-scoped booking listing.
pub const fn bookings_path(scope: Role) -> &'static str {
    match scope {
        Role::Client => "/auth/my-bookings",
        Role::Provider => "/provider/bookings",
        Role::Admin => "/bookings",
    }
}

/// Item endpoint a role mutates a booking through.
pub fn booking_path(scope: Role, id: BookingId) -> String {
    format!("{}/{}", bookings_path(scope), id)
}

/// Consumed collaborator endpoints.
#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    /// Identity verification: who does this credential belong to?
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError>;
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, ApiError>;
    async fn signup(&self, request: &SignupRequest) -> Result<AuthGrant, ApiError>;
    async fn update_profile(&self, credential: &Credential, update: &ProfileUpdate) -> Result<User, ApiError>;

    async fn list_bookings(&self, credential: &Credential, scope: Role) -> Result<Vec<Booking>, ApiError>;
    /// Returns the booking as the server stored it.
    async fn update_booking_status(
        &self,
        credential: &Credential,
        scope: Role,
        id: BookingId,
        update: &StatusUpdate,
    ) -> Result<Booking, ApiError>;
    /// Admin only.
    async fn delete_booking(&self, credential: &Credential, id: BookingId) -> Result<(), ApiError>;
    async fn create_booking(&self, credential: &Credential, booking: &CreateBooking) -> Result<Booking, ApiError>;
}
