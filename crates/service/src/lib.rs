//! Client core of the LocalLink services marketplace.
//! - `auth`: session ownership, login/signup/logout and route access decisions.
//! - `booking`: the booking transition table and per-dashboard controllers.
//! - `api`: the marketplace REST collaborator (reqwest client + in-memory mock).
//! - `storage`: persisted bearer credential.

pub mod api;
pub mod auth;
pub mod booking;
pub mod errors;
pub mod runtime;
pub mod storage;
