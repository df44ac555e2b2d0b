//! Shared runtime plumbing for the LocalLink workspace.

pub mod env;
pub mod utils;
