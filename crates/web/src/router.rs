//! Method-aware route table and the dispatch sequence around it.
//!
//! A [`Router`] owns one [`Trie`] per HTTP method plus the handler chain
//! bound to each terminal node. It is assembled through [`RouterBuilder`],
//! frozen by `build`, and then shared read-only across all worker threads;
//! it implements [`Dispatcher`] so a connection can hand it each parsed
//! request.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arbor_http::handler::Dispatcher;
use arbor_http::protocol::Context;
use http::{Method, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::aspect::{Aspect, Hook};
use crate::trie::{NodeId, Trie};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type HandlerFn = dyn Fn(&mut Context) -> Result<(), BoxError> + Send + Sync;
type ExceptionFn = dyn Fn(&mut Context, &BoxError) + Send + Sync;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("invalid route pattern: {reason}")]
    InvalidPattern { reason: String },

    #[error("route `{pattern}` is already registered")]
    ConflictingRoute { pattern: String },

    #[error("invalid regex segment: {0}")]
    InvalidRegex(#[from] regex::Error),
}

impl RouterError {
    pub(crate) fn invalid_pattern(reason: impl Into<String>) -> Self {
        Self::InvalidPattern { reason: reason.into() }
    }

    pub(crate) fn conflicting_route(pattern: impl Into<String>) -> Self {
        Self::ConflictingRoute { pattern: pattern.into() }
    }
}

struct Route {
    handler: Box<HandlerFn>,
    before: Vec<Aspect>,
    after: Vec<Aspect>,
}

#[derive(Default)]
struct MethodTable {
    trie: Trie,
    routes: HashMap<NodeId, Route>,
}

pub struct RouterBuilder {
    tables: HashMap<Method, MethodTable>,
    /// `(method, pattern)` pairs for the startup listing. Internal routes
    /// are bound but not listed.
    listing: Vec<(Method, String)>,
    exception_handler: Arc<ExceptionFn>,
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("routes", &self.listing).finish()
    }
}

impl Default for RouterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self { tables: HashMap::new(), listing: Vec::new(), exception_handler: Arc::new(default_exception_handler) }
    }

    /// Binds `handler` (and its aspects) to `pattern` for `method`.
    pub fn route(
        mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
        aspects: Vec<Aspect>,
    ) -> Result<Self, RouterError> {
        self.bind(method.clone(), pattern, handler, aspects)?;
        self.listing.push((method, pattern.to_owned()));
        Ok(self)
    }

    /// Same binding as [`route`](Self::route) but left out of the startup
    /// listing. Meant for health checks and other plumbing endpoints.
    pub fn route_internal(
        mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
        aspects: Vec<Aspect>,
    ) -> Result<Self, RouterError> {
        self.bind(method, pattern, handler, aspects)?;
        Ok(self)
    }

    fn bind(
        &mut self,
        method: Method,
        pattern: &str,
        handler: impl Fn(&mut Context) -> Result<(), BoxError> + Send + Sync + 'static,
        aspects: Vec<Aspect>,
    ) -> Result<(), RouterError> {
        let table = self.tables.entry(method).or_default();
        let node = table.trie.add(pattern)?;

        let (before, after): (Vec<_>, Vec<_>) = aspects.into_iter().partition(|a| a.hook() == Hook::Before);
        table.routes.insert(node, Route { handler: Box::new(handler), before, after });
        Ok(())
    }

    /// Replaces the process-wide fallback invoked when a before-aspect or a
    /// handler returns an error.
    pub fn exception_handler(mut self, f: impl Fn(&mut Context, &BoxError) + Send + Sync + 'static) -> Self {
        self.exception_handler = Arc::new(f);
        self
    }

    pub fn build(self) -> Router {
        Router { tables: self.tables, listing: self.listing, exception_handler: self.exception_handler }
    }
}

/// The default fallback: answer 400 with the error's display text.
fn default_exception_handler(ctx: &mut Context, error: &BoxError) {
    ctx.response_mut().headers_mut().set("content-type", mime::TEXT_PLAIN.to_string());
    ctx.write(StatusCode::BAD_REQUEST, error.to_string());
}

pub struct Router {
    tables: HashMap<Method, MethodTable>,
    listing: Vec<(Method, String)>,
    exception_handler: Arc<ExceptionFn>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// The listed routes, in registration order.
    pub fn listing(&self) -> &[(Method, String)] {
        &self.listing
    }

    fn lookup(&self, ctx: &mut Context) -> Option<&Route> {
        let table = self.tables.get(ctx.method())?;
        let matched = table.trie.find(ctx.path())?;
        ctx.set_path_params(matched.params, matched.tail);
        table.routes.get(&matched.node)
    }

    /// Clears any partial output, then lets the exception handler produce
    /// the failure response.
    fn recover(&self, ctx: &mut Context, error: BoxError) {
        warn!(cause = %error, path = ctx.path(), "handler failed");
        ctx.clear_response();
        (self.exception_handler)(ctx, &error);
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").field("routes", &self.listing).finish()
    }
}

impl Dispatcher for Router {
    fn dispatch(&self, ctx: &mut Context) {
        let Some(route) = self.lookup(ctx) else {
            debug!(method = %ctx.method(), path = ctx.path(), "no route matched");
            ctx.response_mut().headers_mut().set("content-type", mime::TEXT_PLAIN.to_string());
            ctx.write(StatusCode::NOT_FOUND, "Not Found");
            return;
        };

        let mut failure: Option<BoxError> = None;

        for aspect in &route.before {
            if ctx.response_written() && !aspect.is_mandatory() {
                continue;
            }
            if let Err(e) = aspect.invoke(ctx) {
                failure = Some(e);
                break;
            }
        }

        if failure.is_none() && !ctx.response_written() {
            failure = (route.handler)(ctx).err();
        }

        if let Some(e) = failure {
            self.recover(ctx, e);
        }

        // after-aspects run exactly once, no matter what happened above
        for aspect in &route.after {
            if let Err(e) = aspect.invoke(ctx) {
                self.recover(ctx, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_http::protocol::{HeaderContainer, RequestHead};
    use http::Version;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context_for(method: Method, target: &str) -> Context {
        let mut ctx = Context::new();
        ctx.apply_head(RequestHead::new(method, target.to_owned(), Version::HTTP_11, HeaderContainer::new()));
        ctx
    }

    fn body_of(ctx: &Context) -> String {
        String::from_utf8(ctx.response().body().to_vec()).unwrap()
    }

    #[test]
    fn dispatch_routes_to_the_matching_handler() {
        let router = Router::builder()
            .route(
                Method::GET,
                "/sum/{int}/{int}",
                |ctx| {
                    let a: i64 = ctx.path_param(0).unwrap();
                    let b: i64 = ctx.path_param(1).unwrap();
                    ctx.write(StatusCode::OK, (a + b).to_string());
                    Ok(())
                },
                vec![],
            )
            .unwrap()
            .build();

        let mut ctx = context_for(Method::GET, "/sum/3/4");
        router.dispatch(&mut ctx);
        assert_eq!(ctx.response().status(), Some(StatusCode::OK));
        assert_eq!(body_of(&ctx), "7");
    }

    #[test]
    fn misses_answer_404() {
        let router =
            Router::builder().route(Method::GET, "/here", |_| Ok(()), vec![]).unwrap().build();

        let mut ctx = context_for(Method::GET, "/elsewhere");
        router.dispatch(&mut ctx);
        assert_eq!(ctx.response().status(), Some(StatusCode::NOT_FOUND));

        // registered path, unregistered method
        let mut ctx = context_for(Method::POST, "/here");
        router.dispatch(&mut ctx);
        assert_eq!(ctx.response().status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn aspects_run_in_registration_order_around_the_handler() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let log = |tag: &'static str| {
            let order = Arc::clone(&order);
            move |_: &mut Context| {
                order.lock().unwrap().push(tag);
                Ok(())
            }
        };

        let handler_order = Arc::clone(&order);
        let router = Router::builder()
            .route(
                Method::GET,
                "/",
                move |ctx| {
                    handler_order.lock().unwrap().push("handler");
                    ctx.write(StatusCode::OK, "done");
                    Ok(())
                },
                vec![
                    Aspect::before("b1", log("b1")),
                    Aspect::after("a1", log("a1")),
                    Aspect::before("b2", log("b2")),
                    Aspect::after("a2", log("a2")),
                ],
            )
            .unwrap()
            .build();

        let mut ctx = context_for(Method::GET, "/");
        router.dispatch(&mut ctx);
        assert_eq!(*order.lock().unwrap(), vec!["b1", "b2", "handler", "a1", "a2"]);
    }

    #[test]
    fn default_before_aspects_skip_once_response_is_written() {
        let skipped = Arc::new(AtomicUsize::new(0));
        let ran = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&skipped);
        let r = Arc::clone(&ran);
        let router = Router::builder()
            .route(
                Method::GET,
                "/",
                |_| Ok(()),
                vec![
                    Aspect::before("gate", |ctx| {
                        ctx.write(StatusCode::FORBIDDEN, "denied");
                        Ok(())
                    }),
                    Aspect::before("skipped", move |_| {
                        s.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                    Aspect::mandatory_before("always", move |_| {
                        r.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ],
            )
            .unwrap()
            .build();

        let mut ctx = context_for(Method::GET, "/");
        router.dispatch(&mut ctx);
        assert_eq!(ctx.response().status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(body_of(&ctx), "denied");
        assert_eq!(skipped.load(Ordering::SeqCst), 0);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_error_clears_partial_output_and_reaches_exception_handler() {
        let router = Router::builder()
            .route(
                Method::GET,
                "/",
                |ctx| {
                    ctx.response_mut().append_body(b"partial");
                    Err("boom".into())
                },
                vec![],
            )
            .unwrap()
            .build();

        let mut ctx = context_for(Method::GET, "/");
        router.dispatch(&mut ctx);
        assert_eq!(ctx.response().status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(body_of(&ctx), "boom");
    }

    #[test]
    fn after_aspects_run_even_when_a_before_aspect_fails() {
        let after_ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&after_ran);

        let router = Router::builder()
            .route(
                Method::GET,
                "/",
                |_| Ok(()),
                vec![
                    Aspect::mandatory_before("fails", |_| Err("before failed".into())),
                    Aspect::after("cleanup", move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }),
                ],
            )
            .unwrap()
            .build();

        let mut ctx = context_for(Method::GET, "/");
        router.dispatch(&mut ctx);
        assert_eq!(after_ran.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.response().status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(body_of(&ctx), "before failed");
    }

    #[test]
    fn custom_exception_handler_replaces_the_default() {
        let router = Router::builder()
            .route(Method::GET, "/", |_| Err("oops".into()), vec![])
            .unwrap()
            .exception_handler(|ctx, error| {
                ctx.write(StatusCode::INTERNAL_SERVER_ERROR, format!("caught: {error}"));
            })
            .build();

        let mut ctx = context_for(Method::GET, "/");
        router.dispatch(&mut ctx);
        assert_eq!(ctx.response().status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(body_of(&ctx), "caught: oops");
    }

    #[test]
    fn internal_routes_are_dispatchable_but_unlisted() {
        let router = Router::builder()
            .route(Method::GET, "/visible", |ctx| {
                ctx.write(StatusCode::OK, "v");
                Ok(())
            }, vec![])
            .unwrap()
            .route_internal(Method::GET, "/health", |ctx| {
                ctx.write(StatusCode::OK, "ok");
                Ok(())
            }, vec![])
            .unwrap()
            .build();

        assert_eq!(router.listing(), &[(Method::GET, "/visible".to_owned())]);

        let mut ctx = context_for(Method::GET, "/health");
        router.dispatch(&mut ctx);
        assert_eq!(body_of(&ctx), "ok");
    }
}
