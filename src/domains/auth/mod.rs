//! Authentication and scope checks for tool calls.
//!
//! A caller presents a [`Credential`]; the [`AuthGate`] resolves it to an
//! [`AuthContext`] (bearer introspection first, then the legacy token) and
//! verifies that the context carries the scope a tool requires. Failures
//! carry a `WWW-Authenticate` [`Challenge`].

mod challenge;
mod credential;
mod error;
mod gate;
mod introspection;
pub mod scopes;

pub use challenge::Challenge;
pub use credential::{Credential, fingerprint, parse_bearer_token};
pub use error::AuthError;
pub use gate::{AuthContext, AuthGate, AuthMethod};
pub use introspection::{
    CachingIntrospector, HttpIntrospector, IntrospectionError, StaticTokens, TokenInfo,
    TokenIntrospector, parse_scopes,
};
