//! Per-request state carried through the pipeline.

use std::sync::Arc;

use gatehouse_identity::UserClaims;
use gatehouse_session::{SessionData, SessionError, SessionId};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Request;

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Bound {
    session_id: SessionId,
    data: SessionData,
    rotate: bool,
}

/// The request's private copy of its session.
///
/// Handlers read and write through this handle. Nothing they do is
/// visible to other requests until [`SessionBinding`](crate::SessionBinding)
/// writes the copy back when the request finishes.
///
/// The handle is cheap to clone; clones share the same copy. The lock is
/// only ever taken for synchronous access, so never hold the closure
/// passed to [`with_mut`](Self::with_mut) across an `.await`: copy the
/// data out with [`snapshot`](Self::snapshot) and put it back with
/// [`replace`](Self::replace) instead.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Bound>>,
    is_new: bool,
}

impl SessionHandle {
    pub fn new(session_id: SessionId, data: SessionData, is_new: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Bound {
                session_id,
                data,
                rotate: false,
            })),
            is_new,
        }
    }

    /// The id this request is bound to. Changes after a rotation has been
    /// applied.
    pub fn session_id(&self) -> SessionId {
        self.inner.lock().session_id.clone()
    }

    /// `true` if the session was created for this request.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.inner.lock().data.get(key)
    }

    pub fn insert<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), SessionError> {
        self.inner.lock().data.insert(key, value)
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.lock().data.remove(key)
    }

    pub fn with<R>(&self, f: impl FnOnce(&SessionData) -> R) -> R {
        f(&self.inner.lock().data)
    }

    pub fn with_mut<R>(&self, f: impl FnOnce(&mut SessionData) -> R) -> R {
        f(&mut self.inner.lock().data)
    }

    /// A deep copy of the current data.
    pub fn snapshot(&self) -> SessionData {
        self.inner.lock().data.clone()
    }

    pub fn replace(&self, data: SessionData) {
        self.inner.lock().data = data;
    }

    /// Asks for the session to move to a fresh id once the request
    /// finishes (used on logout).
    pub fn rotate_on_completion(&self) {
        self.inner.lock().rotate = true;
    }

    pub(crate) fn take_outcome(&self) -> (SessionId, SessionData, bool) {
        let mut bound = self.inner.lock();
        let rotate = std::mem::take(&mut bound.rotate);
        (bound.session_id.clone(), bound.data.clone(), rotate)
    }

    pub(crate) fn set_session_id(&self, session_id: SessionId) {
        self.inner.lock().session_id = session_id;
    }
}

// ---------------------------------------------------------------------------
// Exchange
// ---------------------------------------------------------------------------

/// Everything the pipeline knows about one request.
#[derive(Debug)]
pub struct Exchange {
    request: Request,
    session: Option<SessionHandle>,
    user: Option<UserClaims>,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            session: None,
            user: None,
        }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn query(&self) -> &str {
        self.request.uri().query().unwrap_or_default()
    }

    /// The bound session, once [`SessionBinding`](crate::SessionBinding)
    /// has run.
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    pub fn bind_session(&mut self, handle: SessionHandle) {
        self.session = Some(handle);
    }

    /// The authenticated user, once [`AuthGate`](crate::AuthGate) has
    /// resolved one. Always `None` on public paths.
    pub fn user(&self) -> Option<&UserClaims> {
        self.user.as_ref()
    }

    pub fn set_user(&mut self, user: UserClaims) {
        self.user = Some(user);
    }
}
