//! CORS header injection and lazy preflight registration.
//!
//! Every invocation merges the configured headers into the response. The
//! first invocation on a router (with `attach_options` on) also gives every
//! route that lacks one an `OPTIONS` handler answering `200`, so browsers'
//! preflight requests succeed. See [`Router::attach_preflight`](crate::Router::attach_preflight).

use crate::env::Env;
use crate::error::Error;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::request::Request;
use crate::response::Response;

/// The permissive header set used when none is configured.
pub const DEFAULT_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "*"),
    ("Content-Type", "application/json;charset=UTF-8"),
];

/// CORS middleware.
#[derive(Clone, Debug)]
pub struct Cors {
    attach_options: bool,
    headers: Vec<(String, String)>,
}

/// CORS middleware with the default headers and preflight registration on.
pub fn cors() -> Cors {
    Cors::default()
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            attach_options: true,
            headers: DEFAULT_HEADERS
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        }
    }
}

impl Cors {
    /// Whether to register `OPTIONS` handlers on first use. Default `true`.
    pub fn attach_options(mut self, attach: bool) -> Self {
        self.attach_options = attach;
        self
    }

    /// Replaces the whole header set.
    pub fn headers<K, V>(mut self, headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers = headers.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }
}

impl Middleware for Cors {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        _env: &'a Env,
    ) -> BoxFuture<'a, Result<Flow, Error>> {
        res.set_all(self.headers.iter().cloned());

        if self.attach_options && !req.router().loaded_cors() {
            req.router().attach_preflight();
        }

        Box::pin(async { Ok(Flow::Next) })
    }
}

/// The `OPTIONS` handler registered for preflight: `200`, body `ok`.
pub(crate) struct Preflight;

impl Middleware for Preflight {
    fn call<'a>(
        &'a self,
        _req: &'a mut Request,
        res: &'a mut Response,
        _env: &'a Env,
    ) -> BoxFuture<'a, Result<Flow, Error>> {
        res.send_status(200);
        Box::pin(async { Ok(Flow::Next) })
    }
}
