//! Turns away unauthenticated requests to protected paths.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use gatehouse_identity::IdentityProvider;

use crate::{Exchange, Interceptor, Next, Response, response};

/// The second interceptor in the chain.
///
/// Paths under one of the public prefixes pass through untouched. A
/// prefix matches whole path segments: `/login` covers `/login` and
/// `/login/callback`, not `/login.html` or `/loginx`. Every
/// other request needs a signed-in user in its bound session; without
/// one it gets `302 Found` to the login path and the endpoint never runs.
/// The resolved user is attached to the exchange for the endpoint.
pub struct AuthGate<I> {
    identity: Arc<I>,
    public_prefixes: Vec<String>,
    login_path: String,
}

impl<I: IdentityProvider> AuthGate<I> {
    /// A gate with `/login`, `/signin`, and `/logout` public, redirecting
    /// to `/login`.
    pub fn new(identity: Arc<I>) -> Self {
        Self {
            identity,
            public_prefixes: vec!["/login".into(), "/signin".into(), "/logout".into()],
            login_path: "/login".into(),
        }
    }

    /// Adds another prefix that doesn't need a user.
    pub fn public_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.public_prefixes.push(prefix.into());
        self
    }

    pub fn login_path(mut self, path: impl Into<String>) -> Self {
        self.login_path = path.into();
        self
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_prefixes
            .iter()
            .any(|prefix| under_prefix(path, prefix))
    }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

impl<I: IdentityProvider> Interceptor for AuthGate<I> {
    fn handle<'a>(&'a self, exchange: &'a mut Exchange, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.is_public(exchange.path()) {
                return next.run(&mut *exchange).await;
            }

            let user = exchange
                .session()
                .and_then(|session| session.with(|data| self.identity.get_user(data)));

            match user {
                Some(user) => {
                    tracing::trace!(subject = %user.subject, path = %exchange.path(), "authenticated request");
                    exchange.set_user(user);
                    next.run(&mut *exchange).await
                }
                None => {
                    tracing::debug!(path = %exchange.path(), "no user, redirecting to login");
                    response::redirect(&self.login_path)
                }
            }
        })
    }
}
