use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::errors::ModelError;
use crate::user::UserId;

pub const MIN_PHONE_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingId(pub i64);

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    RescheduleRequested,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
        BookingStatus::RescheduleRequested,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::RescheduleRequested => "reschedule_requested",
        }
    }

    /// `completed` and `cancelled` admit no further transition.
    pub const fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        BookingStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == wanted)
            .ok_or_else(|| ModelError::UnknownVariant { kind: "booking status", value: s.to_string() })
    }
}

/// The service a booking refers to, when the API embeds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub id: i64,
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default)]
    pub provider_id: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub service_id: i64,
    pub client_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceSummary>,
    pub date: String,
    /// Older rows may carry no location or phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: BookingStatus,
}

impl Booking {
    /// Provider owning the booked service; taken from the booking itself or
    /// from the embedded service record.
    pub fn provider_ref(&self) -> Option<UserId> {
        self.provider_id
            .or_else(|| self.service.as_ref().and_then(|s| s.provider_id))
    }
}

/// Body of a status mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: BookingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A booking the current client wants to place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub service_id: i64,
    pub date: String,
    pub location: String,
    pub contact_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewBooking {
    /// Field checks performed before the request is sent. `now` is the
    /// local wall clock; the requested date must lie after it.
    pub fn validate(&self, now: NaiveDateTime) -> Result<(), ModelError> {
        let when = parse_booking_date(&self.date)?;
        if when <= now {
            return Err(ModelError::validation("Date must be in the future"));
        }
        if self.location.trim().is_empty() {
            return Err(ModelError::validation("Location is required"));
        }
        let phone = self.contact_phone.trim();
        if phone.is_empty() {
            return Err(ModelError::validation("Phone number is required"));
        }
        if !phone.chars().all(|c| c.is_ascii_digit()) {
            return Err(ModelError::validation("Must be only digits"));
        }
        if phone.len() < MIN_PHONE_DIGITS {
            return Err(ModelError::validation(format!("Must be at least {MIN_PHONE_DIGITS} digits")));
        }
        Ok(())
    }
}

/// Wire body for booking creation: the draft plus the owning client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateBooking {
    #[serde(flatten)]
    pub booking: NewBooking,
    pub client_id: UserId,
}

const DATE_TIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Accepts `datetime-local` style inputs and plain dates (taken as midnight).
pub fn parse_booking_date(raw: &str) -> Result<NaiveDateTime, ModelError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ModelError::validation("Date is required"));
    }
    for fmt in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ModelError::validation(format!("invalid date: {raw}")))
}
