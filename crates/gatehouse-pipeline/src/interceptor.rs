//! The interceptor chain.
//!
//! # Why boxed futures?
//!
//! Interceptors are stored as `Arc<dyn Interceptor>` so the chain can be
//! assembled at startup from whatever the server needs. Trait objects
//! can't have `async fn` methods, so each method returns a
//! [`BoxFuture`] instead; implementations just wrap an `async move`
//! block in `Box::pin`.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::{Exchange, Request, Response};

/// A step in the pipeline.
///
/// An interceptor may inspect or modify the exchange, call
/// [`Next::run`] to continue, and inspect or modify the response on the
/// way back out. Returning without calling `next` short-circuits the rest
/// of the chain.
pub trait Interceptor: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        exchange: &'a mut Exchange,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

/// The end of the chain: produces the response for a request that made
/// it through every interceptor.
pub trait Endpoint: Send + Sync + 'static {
    fn call<'a>(&'a self, exchange: &'a mut Exchange) -> BoxFuture<'a, Response>;
}

/// The rest of the chain after the current interceptor.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Interceptor>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    /// Runs the remaining interceptors and the endpoint.
    ///
    /// Takes the exchange by a shorter borrow than `'a`, so the caller
    /// gets it back once the returned future completes.
    pub fn run<'b>(self, exchange: &'b mut Exchange) -> BoxFuture<'b, Response>
    where
        'a: 'b,
    {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(
                exchange,
                Next {
                    chain: rest,
                    endpoint: self.endpoint,
                },
            ),
            None => self.endpoint.call(exchange),
        }
    }
}

/// An assembled chain: interceptors in order, then the endpoint.
pub struct Pipeline {
    interceptors: Vec<Arc<dyn Interceptor>>,
    endpoint: Arc<dyn Endpoint>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Runs one request through the chain.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut exchange = Exchange::new(request);
        self.dispatch_exchange(&mut exchange).await
    }

    /// Like [`dispatch`](Self::dispatch), but leaves the exchange with
    /// the caller so it can be inspected afterwards.
    pub async fn dispatch_exchange(&self, exchange: &mut Exchange) -> Response {
        Next {
            chain: &self.interceptors,
            endpoint: self.endpoint.as_ref(),
        }
        .run(exchange)
        .await
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

/// Builds a [`Pipeline`]. Interceptors run in the order they are added.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = Pipeline::builder()
///     .interceptor(SessionBinding::new(store, cookie))
///     .interceptor(AuthGate::new(identity.clone()))
///     .endpoint(routes);
/// ```
pub struct PipelineBuilder {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new(),
        }
    }

    pub fn interceptor(mut self, interceptor: impl Interceptor) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Finishes the chain with `endpoint`.
    pub fn endpoint(self, endpoint: impl Endpoint) -> Pipeline {
        Pipeline {
            interceptors: self.interceptors,
            endpoint: Arc::new(endpoint),
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
