//! Domains module containing business logic organized by bounded contexts.
//!
//! - **upstream**: rate-limited, retrying access to the market-data REST API
//! - **cache**: two-tier response cache
//! - **auth**: credentials, scopes and challenges
//! - **tools**: descriptors, dispatch, batching and aggregates

pub mod auth;
pub mod cache;
pub mod tools;
pub mod upstream;
