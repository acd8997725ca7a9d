//! Identity provider facade for Gatehouse.
//!
//! Gatehouse doesn't implement the OAuth2/OIDC protocol machinery itself.
//! It defines the [`IdentityProvider`] trait (login, complete_login,
//! get_user, logout) and ships two implementations:
//!
//! - [`OidcProvider`]: talks to a real authorization server
//!   (Microsoft Entra ID by default) using the authorization-code flow
//!   with PKCE.
//! - [`MemoryIdentityProvider`]: an in-process fake for tests and local
//!   development.
//!
//! Every operation works on the request's bound [`SessionData`]: flow
//! state, tokens, and user claims all live in the session.
//!
//! [`SessionData`]: gatehouse_session::SessionData

#![allow(async_fn_in_trait)]

mod claims;
mod error;
mod memory;
mod oidc;
mod provider;

pub use claims::{CallbackParams, UserClaims};
pub use error::IdentityError;
pub use memory::MemoryIdentityProvider;
pub use oidc::{OidcConfig, OidcProvider};
pub use provider::{IdentityProvider, clear_identity, current_user, keys};
