//! `Gateway` builder and server loop.
//!
//! This is the entry point for running the gateway. It ties the layers
//! together: transport (axum) → session binding → auth gate → routes.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use gatehouse_identity::IdentityProvider;
use gatehouse_pipeline::{AuthGate, CookieSigner, Pipeline, SessionBinding, SessionCookie, response};
use gatehouse_session::{SessionConfig, SessionStore, spawn_sweeper};
use http::StatusCode;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::routes::GatewayRoutes;
use crate::{GatehouseError, GatewayConfig};

/// Largest request body the gateway buffers. Its own routes take none.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builder for configuring a [`Gateway`].
///
/// # Example
///
/// ```rust,ignore
/// let gateway = Gateway::builder()
///     .public_dir("public")
///     .secure_cookies(true)
///     .build(OidcProvider::new(oidc)?, &session_secret)?;
/// gateway.serve("0.0.0.0:8000", shutdown_signal()).await
/// ```
pub struct GatewayBuilder {
    session_config: SessionConfig,
    public_dir: PathBuf,
    cookie_name: Option<String>,
    secure_cookies: bool,
    sweeper: bool,
}

impl GatewayBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            session_config: SessionConfig::default(),
            public_dir: PathBuf::from("public"),
            cookie_name: None,
            secure_cookies: false,
            sweeper: true,
        }
    }

    /// Applies the server-level settings from `config`.
    pub fn config(self, config: &GatewayConfig) -> Self {
        self.public_dir(&config.public_dir)
            .secure_cookies(config.secure_cookies)
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    /// Directory holding the SPA's `index.html`.
    pub fn public_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.public_dir = dir.into();
        self
    }

    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = Some(name.into());
        self
    }

    pub fn secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Whether [`Gateway::serve`] runs the periodic sweeper alongside the
    /// per-request sweep. On by default.
    pub fn sweeper(mut self, enabled: bool) -> Self {
        self.sweeper = enabled;
        self
    }

    /// Assembles the pipeline around `identity`.
    ///
    /// # Errors
    /// [`GatehouseError::Pipeline`] if the secret is too short or the
    /// cookie name is invalid.
    pub fn build<I: IdentityProvider>(
        self,
        identity: I,
        session_secret: &str,
    ) -> Result<Gateway, GatehouseError> {
        let mut cookie = SessionCookie::new(CookieSigner::new(session_secret)?)
            .with_max_age(self.session_config.max_age)
            .secure(self.secure_cookies);
        if let Some(name) = self.cookie_name {
            cookie = cookie.with_name(name)?;
        }

        let store = Arc::new(SessionStore::new(self.session_config));
        let identity = Arc::new(identity);

        let pipeline = Pipeline::builder()
            .interceptor(SessionBinding::new(Arc::clone(&store), cookie))
            .interceptor(AuthGate::new(Arc::clone(&identity)))
            .endpoint(GatewayRoutes::new(identity, self.public_dir));

        Ok(Gateway {
            router: router(Arc::new(pipeline)),
            store,
            sweeper: self.sweeper,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An assembled gateway.
pub struct Gateway {
    router: Router,
    store: Arc<SessionStore>,
    sweeper: bool,
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// The axum router, for serving elsewhere or for tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Serves until `shutdown` resolves, then drains in-flight requests.
    pub async fn serve(
        self,
        addr: &str,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), GatehouseError> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %listener.local_addr()?, "gateway listening");

        let sweeper = self.sweeper.then(|| spawn_sweeper(Arc::clone(&self.store)));

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(handle) = sweeper {
            handle.abort();
        }
        tracing::info!("gateway stopped");
        Ok(())
    }
}

/// Adapts the pipeline to axum: every request goes through the fallback
/// handler, buffered.
fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .fallback(move |request: axum::extract::Request| {
            let pipeline = Arc::clone(&pipeline);
            async move {
                let (parts, body) = request.into_parts();
                let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::debug!(error = %e, "rejected request body");
                        return response::status(StatusCode::PAYLOAD_TOO_LARGE).map(Body::from);
                    }
                };

                pipeline
                    .dispatch(http::Request::from_parts(parts, body))
                    .await
                    .map(Body::from)
            }
        })
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
}
