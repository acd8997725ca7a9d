//! End-to-end tests for the binding → gate → endpoint chain.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use gatehouse_identity::{CallbackParams, IdentityProvider, MemoryIdentityProvider, UserClaims};
use gatehouse_pipeline::{
    AuthGate, CookieSigner, Endpoint, Exchange, Pipeline, Request, Response, SessionBinding,
    SessionCookie, response,
};
use gatehouse_session::{SessionId, SessionStore};
use http::StatusCode;
use http::header::{COOKIE, LOCATION, SET_COOKIE};

const SECRET: &str = "an-integration-test-secret-of-32+bytes";

// =========================================================================
// Test endpoint
// =========================================================================

/// A cut-down version of the gateway routes, enough to drive a login.
struct Routes {
    identity: Arc<MemoryIdentityProvider>,
}

impl Endpoint for Routes {
    fn call<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let Some(session) = exchange.session().cloned() else {
                return response::status(StatusCode::INTERNAL_SERVER_ERROR);
            };
            match exchange.path() {
                "/login" => {
                    let mut data = session.snapshot();
                    match self.identity.login(&mut data).await {
                        Ok(url) => {
                            session.replace(data);
                            response::redirect(&url)
                        }
                        Err(_) => response::status(StatusCode::INTERNAL_SERVER_ERROR),
                    }
                }
                "/signin" => {
                    let params = CallbackParams::from_query(exchange.query());
                    let mut data = session.snapshot();
                    match self.identity.complete_login(&mut data, &params).await {
                        Ok(_) => {
                            session.replace(data);
                            response::redirect("/")
                        }
                        Err(e) => response::error(StatusCode::UNAUTHORIZED, &e.to_string()),
                    }
                }
                "/logout" => {
                    session.with_mut(|data| self.identity.logout(data));
                    session.rotate_on_completion();
                    response::status(StatusCode::OK)
                }
                "/mark/first" | "/mark/second" => {
                    // First writes "a" and finishes last; second writes "b".
                    let (key, delay) = match exchange.path() {
                        "/mark/first" => ("a", 100),
                        _ => ("b", 10),
                    };
                    session.insert(key, &true).unwrap();
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    response::status(StatusCode::OK)
                }
                "/slow" => {
                    session.insert("touched", &true).unwrap();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    response::status(StatusCode::OK)
                }
                _ => {
                    let subject = exchange.user().map(|u| u.subject.clone()).unwrap_or_default();
                    response::json(StatusCode::OK, &subject)
                }
            }
        })
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    store: Arc<SessionStore>,
    pipeline: Pipeline,
}

fn harness(identity: MemoryIdentityProvider) -> Harness {
    let store = Arc::new(SessionStore::default());
    let identity = Arc::new(identity);
    let cookie = SessionCookie::new(CookieSigner::new(SECRET).unwrap());
    let pipeline = Pipeline::builder()
        .interceptor(SessionBinding::new(Arc::clone(&store), cookie))
        .interceptor(AuthGate::new(Arc::clone(&identity)))
        .endpoint(Routes { identity });
    Harness { store, pipeline }
}

fn get(uri: &str, cookie: Option<&str>) -> Request {
    let mut builder = http::Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Bytes::new()).unwrap()
}

/// The `name=value` part of the response's `Set-Cookie`.
fn cookie_of(response: &Response) -> String {
    let value = response.headers()[SET_COOKIE].to_str().unwrap();
    value.split(';').next().unwrap().to_owned()
}

fn location(response: &Response) -> &str {
    response.headers()[LOCATION].to_str().unwrap()
}

fn state_param(url: &str) -> &str {
    url.split("state=").nth(1).unwrap()
}

/// The session id inside a `name=id.ts.sig` cookie pair.
fn session_id_of(cookie: &str) -> SessionId {
    let value = cookie.split_once('=').unwrap().1;
    SessionId::parse(value.split('.').next().unwrap()).unwrap()
}

/// Runs the full login for `code` and returns the signed-in cookie.
async fn sign_in(h: &Harness, code: &str) -> String {
    let login = h.pipeline.dispatch(get("/login", None)).await;
    let cookie = cookie_of(&login);
    let state = state_param(location(&login)).to_owned();

    let signin = h
        .pipeline
        .dispatch(get(&format!("/signin?code={code}&state={state}"), Some(&cookie)))
        .await;
    assert_eq!(signin.status(), StatusCode::FOUND);
    cookie_of(&signin)
}

// =========================================================================
// Scenarios
// =========================================================================

#[tokio::test]
async fn test_protected_without_cookie_redirects_and_sets_cookie() {
    let h = harness(MemoryIdentityProvider::new());

    let response = h.pipeline.dispatch(get("/api/hello", None)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert!(response.headers().contains_key(SET_COOKIE));
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn test_full_login_then_protected_request_sees_user() {
    let h = harness(MemoryIdentityProvider::new().with_code("c1", UserClaims::new("alice")));

    let cookie = sign_in(&h, "c1").await;
    let response = h.pipeline.dispatch(get("/api/me", Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body().as_ref(), br#""alice""#);
}

#[tokio::test]
async fn test_signin_with_wrong_state_is_unauthorized_and_keeps_flow() {
    let h = harness(MemoryIdentityProvider::new().with_code("c1", UserClaims::new("alice")));
    let login = h.pipeline.dispatch(get("/login", None)).await;
    let cookie = cookie_of(&login);
    let before = h.store.get(&session_id_of(&cookie)).unwrap();

    let response = h
        .pipeline
        .dispatch(get("/signin?code=c1&state=forged", Some(&cookie)))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.store.get(&session_id_of(&cookie)).unwrap(), before);
}

#[tokio::test]
async fn test_logout_rotates_id_and_old_cookie_is_signed_out() {
    let h = harness(MemoryIdentityProvider::new().with_code("c1", UserClaims::new("alice")));
    let cookie = sign_in(&h, "c1").await;

    let logout = h.pipeline.dispatch(get("/logout", Some(&cookie))).await;
    let rotated = cookie_of(&logout);

    assert_eq!(logout.status(), StatusCode::OK);
    assert_ne!(session_id_of(&rotated), session_id_of(&cookie));
    assert!(!h.store.contains(&session_id_of(&cookie)));

    let replay = h.pipeline.dispatch(get("/api/me", Some(&cookie))).await;
    assert_eq!(replay.status(), StatusCode::FOUND);
    let fresh = h.pipeline.dispatch(get("/api/me", Some(&rotated))).await;
    assert_eq!(fresh.status(), StatusCode::FOUND);
}

#[tokio::test(start_paused = true)]
async fn test_login_in_flight_during_logout_does_not_restore_old_session() {
    let h = harness(
        MemoryIdentityProvider::new()
            .with_code("c1", UserClaims::new("alice"))
            .with_latency(Duration::from_millis(100)),
    );
    let cookie = sign_in(&h, "c1").await;

    // /login holds a copy of the signed-in session while the provider call
    // is pending; /logout rotates the id underneath it.
    let (login, logout) = tokio::join!(
        h.pipeline.dispatch(get("/login", Some(&cookie))),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.pipeline.dispatch(get("/logout", Some(&cookie))).await
        },
    );

    assert_eq!(login.status(), StatusCode::FOUND);
    assert_eq!(logout.status(), StatusCode::OK);
    let old = session_id_of(&cookie);
    assert!(!h.store.contains(&old));
    assert!(h.store.is_retired(&old));

    let replay = h.pipeline.dispatch(get("/api/protected", Some(&cookie))).await;
    assert_eq!(replay.status(), StatusCode::FOUND);
    assert_eq!(location(&replay), "/login");
    assert!(!h.store.contains(&old));
}

#[tokio::test]
async fn test_two_clients_never_see_each_other() {
    let h = harness(
        MemoryIdentityProvider::new()
            .with_code("a", UserClaims::new("alice"))
            .with_code("b", UserClaims::new("bob")),
    );

    let (alice, bob) = tokio::join!(sign_in(&h, "a"), sign_in(&h, "b"));
    let (for_alice, for_bob) = tokio::join!(
        h.pipeline.dispatch(get("/api/me", Some(&alice))),
        h.pipeline.dispatch(get("/api/me", Some(&bob))),
    );

    assert_eq!(for_alice.body().as_ref(), br#""alice""#);
    assert_eq!(for_bob.body().as_ref(), br#""bob""#);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_same_session_last_write_wins() {
    let h = harness(MemoryIdentityProvider::new().with_code("c1", UserClaims::new("alice")));
    let cookie = sign_in(&h, "c1").await;

    let (first, second) = tokio::join!(
        h.pipeline.dispatch(get("/mark/first", Some(&cookie))),
        h.pipeline.dispatch(get("/mark/second", Some(&cookie))),
    );

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    let stored = h.store.get(&session_id_of(&cookie)).unwrap();
    // Not a merge: the later write replaced the earlier one wholesale.
    assert_eq!(stored.get::<bool>("a").unwrap(), Some(true));
    assert_eq!(stored.get::<bool>("b").unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_request_still_persists_session() {
    let h = harness(MemoryIdentityProvider::new().with_code("c1", UserClaims::new("alice")));
    let cookie = sign_in(&h, "c1").await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        h.pipeline.dispatch(get("/slow", Some(&cookie))),
    )
    .await;

    assert!(outcome.is_err());
    let stored = h.store.get(&session_id_of(&cookie)).unwrap();
    assert_eq!(stored.get::<bool>("touched").unwrap(), Some(true));
}

#[tokio::test(start_paused = true)]
async fn test_request_after_max_age_sweeps_idle_session() {
    let h = harness(MemoryIdentityProvider::new().with_code("c1", UserClaims::new("alice")));
    let cookie = sign_in(&h, "c1").await;
    let idle = session_id_of(&cookie);
    let config = h.store.config().clone();

    tokio::time::advance(config.max_age + config.sweep_interval + Duration::from_secs(1)).await;
    let response = h.pipeline.dispatch(get("/api/me", Some(&cookie))).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(!h.store.contains(&idle));
    assert_ne!(session_id_of(&cookie_of(&response)), idle);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_login_completes_with_latency() {
    let h = harness(
        MemoryIdentityProvider::new()
            .with_code("c1", UserClaims::new("alice"))
            .with_latency(Duration::from_millis(250)),
    );

    let cookie = sign_in(&h, "c1").await;

    let response = h.pipeline.dispatch(get("/api/me", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
}
