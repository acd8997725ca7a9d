//! The gateway's own routes.
//!
//! | Path                     | Response                                   |
//! |--------------------------|--------------------------------------------|
//! | `/login`                 | 302 to the identity provider (500 if none) |
//! | `/signin`                | 302 to `/` on success, 401 JSON otherwise  |
//! | `/logout`                | 200 JSON, identity cleared, id rotated     |
//! | `/api/hello`             | greeting                                   |
//! | `/api/protected`         | fixed message                              |
//! | `/api/me`                | the signed-in user's claims                |
//! | other `/api/*`           | 404 JSON                                   |
//! | `/login/*`, `/signin/*`, `/logout/*` | 404 JSON                       |
//! | static asset paths       | 404 (served by the static host)            |
//! | anything else            | `index.html` from the public directory     |

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use gatehouse_identity::{CallbackParams, IdentityProvider};
use gatehouse_pipeline::{Endpoint, Exchange, Response, SessionHandle, response};
use http::StatusCode;
use serde_json::json;

/// Paths the gate lets through without a user. Anything below them that
/// isn't one of the exact routes must not fall through to the SPA.
const AUTH_PATHS: [&str; 3] = ["/login", "/signin", "/logout"];

/// Prefixes that belong to the static host, never to the SPA fallback.
const ASSET_PREFIXES: [&str; 3] = ["/js/", "/css/", "/public/"];
const ASSET_FILES: [&str; 3] = ["/site.webmanifest", "/favicon.ico", "/robots.txt"];

/// The endpoint at the end of the pipeline.
pub struct GatewayRoutes<I> {
    identity: Arc<I>,
    public_dir: PathBuf,
}

impl<I: IdentityProvider> GatewayRoutes<I> {
    pub fn new(identity: Arc<I>, public_dir: impl Into<PathBuf>) -> Self {
        Self {
            identity,
            public_dir: public_dir.into(),
        }
    }

    async fn login(&self, session: &SessionHandle) -> Response {
        tracing::info!("creating login redirect");
        // Work on a copy: the lock must not be held across the provider call.
        let mut data = session.snapshot();
        match self.identity.login(&mut data).await {
            Ok(url) => {
                session.replace(data);
                response::redirect(&url)
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start login flow");
                response::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to initialize login flow",
                )
            }
        }
    }

    async fn signin(&self, session: &SessionHandle, query: &str) -> Response {
        let params = CallbackParams::from_query(query);
        let mut data = session.snapshot();

        tracing::info!("exchanging authorization code");
        match self.identity.complete_login(&mut data, &params).await {
            Ok(user) => {
                session.replace(data);
                tracing::info!(subject = %user.subject, "user signed in");
                response::redirect("/")
            }
            Err(e) => {
                tracing::info!(error = %e, "authorization code exchange failed");
                response::error(StatusCode::UNAUTHORIZED, &e.to_string())
            }
        }
    }

    fn logout(&self, session: &SessionHandle) -> Response {
        session.with_mut(|data| self.identity.logout(data));
        session.rotate_on_completion();
        response::json(StatusCode::OK, &json!({ "message": "Logged out" }))
    }

    fn api(&self, path: &str, exchange: &Exchange) -> Response {
        match path {
            "/api/hello" => response::json(StatusCode::OK, &json!({ "message": "Hello World" })),
            "/api/protected" => response::json(
                StatusCode::OK,
                &json!({ "message": "This is a protected route" }),
            ),
            "/api/me" => match exchange.user() {
                Some(user) => response::json(StatusCode::OK, user),
                None => response::error(StatusCode::UNAUTHORIZED, "Not signed in"),
            },
            _ => response::error(StatusCode::NOT_FOUND, "Not found"),
        }
    }

    async fn spa_index(&self) -> Response {
        let index = self.public_dir.join("index.html");
        match tokio::fs::read(&index).await {
            Ok(body) => response::html(body),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                response::error(StatusCode::NOT_FOUND, "index.html not found")
            }
            Err(e) => {
                tracing::error!(path = %index.display(), error = %e, "failed to read index.html");
                response::status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}

fn is_below_auth_path(path: &str) -> bool {
    AUTH_PATHS.iter().any(|auth| {
        path.strip_prefix(auth)
            .is_some_and(|rest| rest.starts_with('/'))
    })
}

fn is_asset(path: &str) -> bool {
    ASSET_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) || ASSET_FILES.contains(&path)
}

impl<I: IdentityProvider> Endpoint for GatewayRoutes<I> {
    fn call<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(session) = exchange.session().cloned() else {
                tracing::error!("no session bound; is SessionBinding installed?");
                return response::status(StatusCode::INTERNAL_SERVER_ERROR);
            };
            let path = exchange.path().to_owned();

            match path.as_str() {
                "/login" => self.login(&session).await,
                "/signin" => {
                    let query = exchange.query().to_owned();
                    self.signin(&session, &query).await
                }
                "/logout" => self.logout(&session),
                p if p == "/api" || p.starts_with("/api/") => self.api(p, exchange),
                p if is_below_auth_path(p) => response::error(StatusCode::NOT_FOUND, "Not found"),
                p if is_asset(p) => response::error(StatusCode::NOT_FOUND, "Not found"),
                _ => self.spa_index().await,
            }
        })
    }
}
