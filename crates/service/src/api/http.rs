use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use configs::ApiConfig;
use models::{Booking, BookingId, CreateBooking, ProfileUpdate, Role, StatusUpdate, User};

use super::{booking_path, bookings_path, ApiError, AuthGrant, LoginRequest, MarketplaceApi, SignupRequest};
use crate::storage::Credential;

/// Mutation endpoints answer either `{"booking": {...}}` or the bare record.
#[derive(Deserialize)]
#[serde(untagged)]
enum BookingEnvelope {
    Wrapped { booking: Booking },
    Bare(Booking),
}

impl BookingEnvelope {
    fn into_inner(self) -> Booking {
        match self {
            BookingEnvelope::Wrapped { booking } | BookingEnvelope::Bare(booking) => booking,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UserEnvelope {
    Wrapped { user: User },
    Bare(User),
}

impl UserEnvelope {
    fn into_inner(self) -> User {
        match self {
            UserEnvelope::Wrapped { user } | UserEnvelope::Bare(user) => user,
        }
    }
}

/// reqwest-backed client for the marketplace REST API.
#[derive(Clone)]
pub struct HttpMarketplaceApi {
    client: Client,
    base_url: String,
}

impl HttpMarketplaceApi {
    pub fn new(cfg: &ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(cfg.connect_timeout())
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self::with_client(client, &cfg.base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self { client, base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn dispatch(&self, req: RequestBuilder) -> Result<Vec<u8>, ApiError> {
        let resp = req.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        debug!(status = status.as_u16(), bytes = body.len(), "api response");
        if status.is_success() {
            return Ok(body.to_vec());
        }
        let message = extract_error_message(&body);
        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized { message });
        }
        Err(ApiError::Rejected { status: status.as_u16(), message })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let body = self.dispatch(req).await?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Pull a human-readable message out of an error body (`error`, `message`
/// or `msg`). Returns `None` for empty or non-JSON bodies.
pub(crate) fn extract_error_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["error", "message", "msg"]
        .iter()
        .find_map(|k| value.get(*k).and_then(|v| v.as_str()))
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceApi {
    #[instrument(skip_all)]
    async fn current_user(&self, credential: &Credential) -> Result<User, ApiError> {
        let req = self.client.get(self.url("/auth/me")).bearer_auth(credential.expose());
        self.send_json::<UserEnvelope>(req).await.map(UserEnvelope::into_inner)
    }

    #[instrument(skip_all)]
    async fn login(&self, request: &LoginRequest) -> Result<AuthGrant, ApiError> {
        let req = self.client.post(self.url("/auth/login")).json(request);
        self.send_json(req).await
    }

    #[instrument(skip_all, fields(role = ?request.role))]
    async fn signup(&self, request: &SignupRequest) -> Result<AuthGrant, ApiError> {
        let req = self.client.post(self.url("/auth/signup")).json(request);
        self.send_json(req).await
    }

    #[instrument(skip_all)]
    async fn update_profile(&self, credential: &Credential, update: &ProfileUpdate) -> Result<User, ApiError> {
        let req = self
            .client
            .patch(self.url("/auth/me"))
            .bearer_auth(credential.expose())
            .json(update);
        self.send_json::<UserEnvelope>(req).await.map(UserEnvelope::into_inner)
    }

    #[instrument(skip(self, credential))]
    async fn list_bookings(&self, credential: &Credential, scope: Role) -> Result<Vec<Booking>, ApiError> {
        let req = self
            .client
            .get(self.url(bookings_path(scope)))
            .bearer_auth(credential.expose());
        self.send_json(req).await
    }

    #[instrument(skip(self, credential, update), fields(target = %update.status))]
    async fn update_booking_status(
        &self,
        credential: &Credential,
        scope: Role,
        id: BookingId,
        update: &StatusUpdate,
    ) -> Result<Booking, ApiError> {
        let req = self
            .client
            .patch(self.url(&booking_path(scope, id)))
            .bearer_auth(credential.expose())
            .json(update);
        self.send_json::<BookingEnvelope>(req).await.map(BookingEnvelope::into_inner)
    }

    #[instrument(skip(self, credential))]
    async fn delete_booking(&self, credential: &Credential, id: BookingId) -> Result<(), ApiError> {
        let req = self
            .client
            .delete(self.url(&format!("/admin/bookings/{id}")))
            .bearer_auth(credential.expose());
        self.dispatch(req).await.map(|_| ())
    }

    #[instrument(skip_all, fields(service_id = booking.booking.service_id))]
    async fn create_booking(&self, credential: &Credential, booking: &CreateBooking) -> Result<Booking, ApiError> {
        let req = self
            .client
            .post(self.url("/bookings"))
            .bearer_auth(credential.expose())
            .json(booking);
        self.send_json::<BookingEnvelope>(req).await.map(BookingEnvelope::into_inner)
    }
}
