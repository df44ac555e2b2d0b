//! Storage abstractions for service layer
//!
//! File-backed stores for the small amount of state the client keeps on
//! disk: today that is the bearer credential.

pub mod json_map_store;
pub mod token_store;

pub use token_store::{Credential, JsonTokenStore, MemoryTokenStore, TokenStore};
