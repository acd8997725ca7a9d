//! Server-side session storage for Gatehouse.
//!
//! This crate owns the only shared mutable state in the gateway: the map
//! from opaque session identifiers to session data.
//!
//! 1. **Identity**: unguessable 128-bit [`SessionId`]s
//! 2. **Data**: a string-keyed JSON bag ([`SessionData`]) compared by value
//! 3. **Storage**: [`SessionStore`]: resolve, persist, rotate, evict
//! 4. **Sweeping**: [`spawn_sweeper`] for a periodic eviction task
//!
//! # How it fits in the stack
//!
//! ```text
//! Pipeline Layer (above)  ← binds a private copy of the data to each request
//!     ↕
//! Session Layer (this crate)  ← owns ids, data, idle eviction
//! ```

mod error;
mod session;
mod store;
mod sweeper;

pub use error::SessionError;
pub use session::{SessionConfig, SessionData, SessionId};
pub use store::{Resolved, SessionStore};
pub use sweeper::spawn_sweeper;
