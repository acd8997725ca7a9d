//! # Gatehouse
//!
//! A session-and-authentication gateway for single-page apps.
//!
//! Every request is bound to a server-side session through an opaque,
//! signed cookie. Requests outside the public login paths need a user
//! signed in through the configured [`IdentityProvider`]; everyone else
//! is sent to `/login`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gatehouse::{Gateway, MemoryIdentityProvider};
//!
//! # async fn run() -> Result<(), gatehouse::GatehouseError> {
//! let gateway = Gateway::builder()
//!     .public_dir("public")
//!     .build(MemoryIdentityProvider::new(), "a-session-secret-of-at-least-32-bytes")?;
//! gateway.serve("127.0.0.1:8000", async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await
//! # }
//! ```

mod config;
mod error;
mod routes;
pub mod secrets;
mod server;

pub use config::{GatewayConfig, IdentityConfig, bootstrap};
pub use error::{ConfigError, GatehouseError};
pub use routes::GatewayRoutes;
pub use server::{Gateway, GatewayBuilder};

pub use gatehouse_identity::{
    CallbackParams, IdentityError, IdentityProvider, MemoryIdentityProvider, OidcConfig,
    OidcProvider, UserClaims,
};
pub use gatehouse_pipeline::{Exchange, PipelineError, SessionHandle};
pub use gatehouse_session::{SessionConfig, SessionData, SessionError, SessionId, SessionStore};
