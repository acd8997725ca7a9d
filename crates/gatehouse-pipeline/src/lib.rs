//! The per-request pipeline of the gateway.
//!
//! A request travels through an ordered list of [`Interceptor`]s and ends
//! at an [`Endpoint`]. Each interceptor gets the request's [`Exchange`]
//! and a [`Next`] it may call (or not) to continue down the chain:
//!
//! ```text
//! SessionBinding ──→ AuthGate ──→ Endpoint (routes)
//!   resolve cookie     public path? pass
//!   bind copy          user? pass, else 302 /login
//!   ...next...
//!   persist if changed
//!   Set-Cookie
//! ```
//!
//! The pipeline is framework-agnostic: it works on `http::Request<Bytes>`
//! and `http::Response<Bytes>`, and the server crate adapts its transport
//! to that.

mod binding;
mod error;
mod exchange;
mod gate;
mod interceptor;
pub mod response;
mod session_cookie;

pub use binding::SessionBinding;
pub use error::PipelineError;
pub use exchange::{Exchange, SessionHandle};
pub use gate::AuthGate;
pub use interceptor::{Endpoint, Interceptor, Next, Pipeline, PipelineBuilder};
pub use session_cookie::{CookieSigner, SessionCookie};

/// A buffered HTTP request.
pub type Request = http::Request<bytes::Bytes>;

/// A buffered HTTP response.
pub type Response = http::Response<bytes::Bytes>;
