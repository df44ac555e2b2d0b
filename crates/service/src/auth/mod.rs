//! Auth module: session state, the single writer that owns it, and the
//! route access decisions derived from it.
//!
//! - `session`: the `Session` value and read-only `SessionHandle`
//! - `service`: `SessionManager`, the only component that mutates the session
//! - `guard`: pure access decisions plus the `RouteGuard` that applies them

pub mod errors;
pub mod guard;
pub mod service;
pub mod session;

pub use errors::AuthError;
pub use guard::{authorize, AccessDecision, Guarded, RouteGuard, RouteRequirement, RouteTable};
pub use service::SessionManager;
pub use session::{Session, SessionHandle, SessionStatus};
