//! Middleware layer.
//!
//! A middleware receives `(request, response, env)`, may mutate either
//! object, and reports whether the chain should go on. Routes are chains too:
//! the route handler is simply the last link.
//!
//! # How middleware is stored
//!
//! The router keeps middleware of *different* concrete types in one `Vec`,
//! so each one is erased behind `Arc<dyn Middleware>`:
//!
//! ```text
//! Cors::default()                          ← concrete type
//!        ↓ router.with(cors)
//! Arc::new(cors) as BoxedMiddleware        ← shared, type-erased
//!        ↓ at request time
//! mw.call(&mut req, &mut res, &env)        ← one vtable dispatch
//!        ↓
//! Pin<Box<dyn Future<Output = Result<Flow, Error>>>>
//! ```
//!
//! # Ordering
//!
//! [`run`] awaits each middleware to completion before starting the next,
//! strictly in registration order. It stops at the first [`Flow::Halt`], the
//! first error, or as soon as the response has been sent.
//!
//! # Writing one
//!
//! ```rust,no_run
//! use corral::middleware::{self, Flow};
//! use corral::{Error, Router};
//!
//! let app = Router::new().post(
//!     "/echo",
//!     middleware::from_fn(|req, res, _env| Box::pin(async move {
//!         req.parse_body(None).await?;
//!         let body = req.body().value().cloned().unwrap_or_default();
//!         res.send(body);
//!         Ok::<_, Error>(Flow::Next)
//!     })),
//! );
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::env::Env;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

pub mod cors;
pub mod jwt;
pub mod validate;

pub use cors::{Cors, cors};
pub use jwt::{ParseJwt, parse_jwt};
pub use validate::{
    Subkey, Validate, Validator, validate, validate_body, validate_headers, validate_params,
    validate_query,
};

// ── Contract ──────────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future borrowing its inputs for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the chain does after a middleware returns.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// Keep going.
    Next,
    /// The response is final; skip everything that remains.
    Halt,
}

/// One link of a middleware chain.
///
/// Errors are not caught by the chain; they propagate to whoever called
/// [`run`] (the router maps them to `500`).
pub trait Middleware: Send + Sync + 'static {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        env: &'a Env,
    ) -> BoxFuture<'a, Result<Flow, Error>>;
}

/// A middleware shared between every route that uses it.
pub type BoxedMiddleware = Arc<dyn Middleware>;

// ── Closures ──────────────────────────────────────────────────────────────────

/// Wraps an async closure as a [`Middleware`].
///
/// The closure returns a boxed future borrowing its arguments, which is the
/// only shape Rust lets a closure express over borrowed `&mut` inputs:
/// `|req, res, env| Box::pin(async move { … })`.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, &'a Env) -> BoxFuture<'a, Result<Flow, Error>>
        + Send
        + Sync
        + 'static,
{
    FromFn(f)
}

/// See [`from_fn`].
pub struct FromFn<F>(F);

impl<F> Middleware for FromFn<F>
where
    F: for<'a> Fn(&'a mut Request, &'a mut Response, &'a Env) -> BoxFuture<'a, Result<Flow, Error>>
        + Send
        + Sync
        + 'static,
{
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        env: &'a Env,
    ) -> BoxFuture<'a, Result<Flow, Error>> {
        (self.0)(req, res, env)
    }
}

// ── Execution ─────────────────────────────────────────────────────────────────

/// Runs `chain` in order against one request.
///
/// Returns [`Flow::Halt`] if any link halted or sent the response,
/// [`Flow::Next`] if the whole chain ran through.
pub async fn run(
    chain: &[BoxedMiddleware],
    req: &mut Request,
    res: &mut Response,
    env: &Env,
) -> Result<Flow, Error> {
    for mw in chain {
        if mw.call(req, res, env).await? == Flow::Halt || res.has_sent() {
            return Ok(Flow::Halt);
        }
    }
    Ok(Flow::Next)
}
