//! The identity provider capability.
//!
//! The gateway core never speaks OAuth directly. It calls the four
//! operations of [`IdentityProvider`], each of which reads and mutates
//! the session bound to the current request. Which protocol happens
//! behind them is the implementation's business:
//! - [`OidcProvider`](crate::OidcProvider) in production
//! - [`MemoryIdentityProvider`](crate::MemoryIdentityProvider) in tests

use gatehouse_session::SessionData;

use crate::{CallbackParams, IdentityError, UserClaims};

/// Session keys owned by the identity layer.
pub mod keys {
    /// Serialized [`UserClaims`](crate::UserClaims) of the signed-in user.
    pub const USER: &str = "user";
    /// In-flight authorization-code flow (state, nonce, PKCE verifier).
    pub const FLOW: &str = "auth_flow";
    /// Token material returned by the provider.
    pub const TOKENS: &str = "tokens";
}

/// Runs the login flow against an external identity provider.
///
/// # Trait bounds
///
/// - `Send + Sync` → one provider is shared by every request task.
/// - `'static` → it lives as long as the server.
///
/// # Example
///
/// ```rust
/// use gatehouse_identity::{
///     CallbackParams, IdentityError, IdentityProvider, UserClaims,
///     clear_identity, current_user, keys,
/// };
/// use gatehouse_session::SessionData;
///
/// /// Signs everyone in as "dev". Never use outside local development.
/// struct DevProvider;
///
/// impl IdentityProvider for DevProvider {
///     async fn login(
///         &self,
///         _session: &mut SessionData,
///     ) -> Result<String, IdentityError> {
///         Ok("/signin?code=dev".into())
///     }
///
///     async fn complete_login(
///         &self,
///         session: &mut SessionData,
///         _params: &CallbackParams,
///     ) -> Result<UserClaims, IdentityError> {
///         let claims = UserClaims::new("dev");
///         session.insert(keys::USER, &claims)?;
///         Ok(claims)
///     }
///
///     fn get_user(&self, session: &SessionData) -> Option<UserClaims> {
///         current_user(session)
///     }
///
///     fn logout(&self, session: &mut SessionData) {
///         clear_identity(session);
///     }
/// }
/// ```
pub trait IdentityProvider: Send + Sync + 'static {
    /// Starts a login. Records whatever flow state the provider needs in
    /// `session` and returns the URL to send the browser to.
    ///
    /// # Errors
    /// Any error means no redirect target could be produced (served as
    /// 500).
    fn login(
        &self,
        session: &mut SessionData,
    ) -> impl Future<Output = Result<String, IdentityError>> + Send;

    /// Finishes a login from the provider's callback parameters.
    ///
    /// On success the user's claims (and any tokens) are stored in
    /// `session` and the flow state is cleared.
    ///
    /// # Errors
    /// [`IdentityError::Unauthorized`] (or any other variant) when the
    /// exchange fails. On error `session` is left exactly as it was.
    fn complete_login(
        &self,
        session: &mut SessionData,
        params: &CallbackParams,
    ) -> impl Future<Output = Result<UserClaims, IdentityError>> + Send;

    /// The signed-in user, if any. Missing, undecodable, and expired
    /// claims all count as "no user".
    fn get_user(&self, session: &SessionData) -> Option<UserClaims>;

    /// Forgets the user, tokens, and any half-finished flow.
    fn logout(&self, session: &mut SessionData);
}

/// Reads the signed-in user from `session`.
///
/// Shared by the bundled providers; custom providers can use it too.
pub fn current_user(session: &SessionData) -> Option<UserClaims> {
    match session.get::<UserClaims>(keys::USER) {
        Ok(Some(claims)) if !claims.is_expired() => Some(claims),
        Ok(Some(claims)) => {
            tracing::debug!(subject = %claims.subject, "user claims expired");
            None
        }
        Ok(None) => None,
        Err(e) => {
            tracing::debug!(error = %e, "discarding undecodable user claims");
            None
        }
    }
}

/// Removes every identity-owned key from `session`.
pub fn clear_identity(session: &mut SessionData) {
    session.remove(keys::USER);
    session.remove(keys::TOKENS);
    session.remove(keys::FLOW);
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_current_user_reads_stored_claims() {
        let mut session = SessionData::new();
        let claims = UserClaims::new("oid-1").with_name("Ada");
        session.insert(keys::USER, &claims).unwrap();

        assert_eq!(current_user(&session), Some(claims));
    }

    #[test]
    fn test_current_user_expired_returns_none() {
        let mut session = SessionData::new();
        session
            .insert(keys::USER, &UserClaims::new("oid-1").with_expiry(1))
            .unwrap();

        assert_eq!(current_user(&session), None);
    }

    #[test]
    fn test_current_user_garbage_returns_none() {
        let mut session = SessionData::new();
        session.insert_value(keys::USER, json!("not claims"));

        assert_eq!(current_user(&session), None);
    }

    #[test]
    fn test_clear_identity_keeps_unrelated_keys() {
        let mut session = SessionData::new();
        session.insert_value(keys::USER, json!({ "subject": "u" }));
        session.insert_value(keys::FLOW, json!({}));
        session.insert_value(keys::TOKENS, json!({}));
        session.insert_value("theme", json!("dark"));

        clear_identity(&mut session);

        assert_eq!(session.keys().collect::<Vec<_>>(), vec!["theme"]);
    }
}
