//! Binds each request to its session.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use gatehouse_session::{SessionData, SessionId, SessionStore};
use http::header::SET_COOKIE;

use crate::{Exchange, Interceptor, Next, Response, SessionCookie, SessionHandle};

/// The first interceptor in the chain.
///
/// On the way in it reads the session cookie, lets the store drop stale
/// sessions, resolves (or creates) the session and binds a private copy
/// of its data to the exchange. On the way out it writes the copy back
/// if anything changed, applies a pending rotation, and refreshes the
/// cookie.
pub struct SessionBinding {
    store: Arc<SessionStore>,
    cookie: SessionCookie,
}

impl SessionBinding {
    pub fn new(store: Arc<SessionStore>, cookie: SessionCookie) -> Self {
        Self { store, cookie }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn cookie(&self) -> &SessionCookie {
        &self.cookie
    }
}

impl Interceptor for SessionBinding {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let candidate = self.cookie.read(exchange.request().headers());

            self.store.evict_stale(self.store.config().max_age);
            let resolved = self.store.resolve(&candidate);
            if !candidate.is_empty() && resolved.is_new {
                tracing::debug!("cookie named an unknown session, started a new one");
            }

            let handle = SessionHandle::new(
                resolved.session_id,
                resolved.data.clone(),
                resolved.is_new,
            );
            let mut guard = PersistGuard {
                store: Arc::clone(&self.store),
                handle: handle.clone(),
                original: resolved.data,
                done: false,
            };
            exchange.bind_session(handle);

            let mut response = next.run(&mut *exchange).await;

            let session_id = guard.commit();
            response
                .headers_mut()
                .append(SET_COOKIE, self.cookie.set_cookie(&session_id));
            response
        })
    }
}

/// Writes the request's copy back to the store exactly once.
///
/// Normally [`commit`](Self::commit) runs after the rest of the chain
/// returns. If the request future is dropped first (client went away,
/// server shutting down), `Drop` commits instead, so a half-finished
/// login still keeps its flow state.
struct PersistGuard {
    store: Arc<SessionStore>,
    handle: SessionHandle,
    original: SessionData,
    done: bool,
}

impl PersistGuard {
    /// Returns the id the client should hold from now on.
    fn commit(&mut self) -> SessionId {
        self.done = true;
        let (session_id, data, rotate) = self.handle.take_outcome();

        if rotate {
            let rotated = self.store.rotate(&session_id, data);
            self.handle.set_session_id(rotated.clone());
            return rotated;
        }

        if data != self.original {
            self.store.persist(&session_id, data);
        }
        session_id
    }
}

impl Drop for PersistGuard {
    fn drop(&mut self) {
        if !self.done {
            let session_id = self.commit();
            tracing::debug!(%session_id, "request dropped, session persisted");
        }
    }
}
