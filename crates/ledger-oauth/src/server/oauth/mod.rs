//! OAuth 2.0 authorization server core.
//!
//! ## Supported Standards
//! - RFC 6749: authorization code, implicit, password, client credentials and
//!   refresh token grants
//! - RFC 6750: bearer token usage (header or `access_token` parameter)
//! - RFC 7636: PKCE (`plain` and `S256`)
//!
//! Codes and tokens live in the [`GrantStore`]; hashed copies are mirrored
//! into the audit ledger and read back on exchange and bearer validation.

pub mod authorize;
pub mod handlers;
pub mod hooks;
pub mod pkce;
pub mod store;
pub mod token;
pub mod types;

pub use authorize::{AuthorizationEngine, AuthorizeOutcome};
pub use hooks::{
    DenyPasswords, FixedOwnerIdentity, Hooks, OwnerIdentityResolver, PasswordAuthorizer,
    StaticPasswords,
};
pub use store::GrantStore;
pub use token::TokenEngine;
pub use types::{ClientInfo, OAuthRequest, TokenResponse};
