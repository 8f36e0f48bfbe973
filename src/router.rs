//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup, plus the ordered list of
//! registered routes that middleware may inspect. Build it once at startup
//! and share it behind an `Arc`.
//!
//! # Runtime registration
//!
//! The table sits behind a `RwLock` because CORS middleware adds `OPTIONS`
//! routes lazily, on first use, while requests are in flight on other
//! threads. [`Router::attach_preflight`] re-checks the `loaded_cors` flag under
//! the write lock, so the registration happens exactly once however many
//! requests race for it. Lookups take the read lock only long enough to clone
//! the matched chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body as HttpBody;
use matchit::Router as MatchitRouter;
use tracing::{debug, error, warn};

use crate::env::Env;
use crate::error::BoxError;
use crate::method::Method;
use crate::middleware::cors::Preflight;
use crate::middleware::{self, BoxedMiddleware, Middleware};
use crate::request::Request;
use crate::response::Response;

/// Normalizes a URL pathname before it is matched.
pub type PathTidy = fn(&str) -> String;

/// Default [`PathTidy`]: collapses repeated slashes, guarantees a leading
/// slash and drops a trailing one (`//a//b/` → `/a/b`, `` → `/`).
pub fn tidy_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

// ── Route ─────────────────────────────────────────────────────────────────────

/// A registered route: every method × path pair maps to the same chain.
#[derive(Clone)]
pub struct Route {
    methods: Vec<Method>,
    paths: Vec<String>,
    chain: Vec<BoxedMiddleware>,
}

impl Route {
    pub fn methods(&self) -> &[Method] { &self.methods }
    pub fn paths(&self) -> &[String] { &self.paths }

    pub fn handles(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("paths", &self.paths)
            .field("chain", &self.chain.len())
            .finish()
    }
}

#[derive(Clone)]
struct Entry {
    index: usize,
    pattern: String,
}

#[derive(Default)]
struct Table {
    routes: Vec<Route>,
    trees: HashMap<Method, MatchitRouter<Entry>>,
    loaded_cors: bool,
}

impl Table {
    /// Appends `route` and indexes every method × path pair.
    ///
    /// The route is kept even if some pair collides with an earlier one; the
    /// earlier registration keeps answering for that pair. The first
    /// collision is reported.
    fn insert(&mut self, route: Route) -> Result<(), matchit::InsertError> {
        let index = self.routes.len();
        let mut outcome = Ok(());
        for method in &route.methods {
            let tree = self.trees.entry(*method).or_default();
            for path in &route.paths {
                let entry = Entry { index, pattern: path.clone() };
                if let Err(e) = tree.insert(path.as_str(), entry) {
                    if outcome.is_ok() {
                        outcome = Err(e);
                    }
                }
            }
        }
        self.routes.push(route);
        outcome
    }

    fn insert_options(&mut self, path: &str, handler: BoxedMiddleware) {
        let route = Route {
            methods: vec![Method::Options],
            paths: vec![path.to_owned()],
            chain: vec![handler],
        };
        if let Err(e) = self.insert(route) {
            debug!(path, error = %e, "OPTIONS route shadowed by an earlier registration");
        }
    }
}

struct Found {
    chain: Vec<BoxedMiddleware>,
    pattern: String,
    params: HashMap<String, Option<String>>,
}

// ── Router ────────────────────────────────────────────────────────────────────

/// The application router.
///
/// Builder methods take and return `self` so registrations chain naturally.
/// Middleware added with [`with`](Router::with) runs, in order, before the
/// chain of every matched route.
///
/// ```rust
/// use corral::middleware::{self, Flow};
/// use corral::{Error, Method, Router};
///
/// let app = Router::new()
///     .with(middleware::cors())
///     .get("/users/{id}", middleware::from_fn(|req, res, _env| Box::pin(async move {
///         let id = req.param("id").unwrap_or("unknown").to_owned();
///         res.send(id);
///         Ok::<_, Error>(Flow::Next)
///     })));
///
/// assert_eq!(app.routes().len(), 1);
/// assert!(app.routes()[0].handles(Method::Get));
/// ```
pub struct Router {
    middleware: Vec<BoxedMiddleware>,
    table: RwLock<Table>,
    path_tidy: PathTidy,
}

impl Router {
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
            table: RwLock::new(Table::default()),
            path_tidy: tidy_path,
        }
    }

    /// Appends router-wide middleware.
    pub fn with(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(Arc::new(mw));
        self
    }

    /// Replaces the pathname normalizer (default [`tidy_path`]).
    pub fn path_tidy(mut self, tidy: PathTidy) -> Self {
        self.path_tidy = tidy;
        self
    }

    /// Registers a single handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path is not a valid pattern or is already registered
    /// for `method`.
    pub fn on(self, method: Method, path: &str, handler: impl Middleware) -> Self {
        self.route(&[method], &[path], vec![Arc::new(handler)])
    }

    pub fn get(self, path: &str, handler: impl Middleware) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Middleware) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Middleware) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Middleware) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Registers a chain (route middleware, then the handler) for every
    /// method × path pair.
    ///
    /// # Panics
    ///
    /// Same conditions as [`on`](Router::on).
    pub fn route(mut self, methods: &[Method], paths: &[&str], chain: Vec<BoxedMiddleware>) -> Self {
        let route = Route {
            methods: methods.to_vec(),
            paths: paths.iter().map(|p| (*p).to_owned()).collect(),
            chain,
        };
        self.table
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(route)
            .unwrap_or_else(|e| panic!("invalid route {paths:?}: {e}"));
        self
    }

    // ── Runtime API ───────────────────────────────────────────────────────────

    /// Registers an `OPTIONS` handler on a live router.
    ///
    /// A path that already answers `OPTIONS` keeps its earlier handler.
    pub fn options(&self, path: &str, handler: impl Middleware) {
        self.write().insert_options(path, Arc::new(handler));
    }

    /// Snapshot of the registered routes, in registration order.
    pub fn routes(&self) -> Vec<Route> {
        self.read().routes.clone()
    }

    /// Whether CORS preflight routes have been attached.
    pub fn loaded_cors(&self) -> bool {
        self.read().loaded_cors
    }

    /// Gives every path of every route that does not handle `OPTIONS` an
    /// `OPTIONS` handler answering `200`, then sets `loaded_cors`.
    ///
    /// Runs at most once per router. Safe to call at build time to avoid the
    /// lazy registration on first request.
    pub fn attach_preflight(&self) {
        let mut table = self.write();
        if table.loaded_cors {
            return;
        }

        let paths: Vec<String> = table
            .routes
            .iter()
            .filter(|route| !route.handles(Method::Options))
            .flat_map(|route| route.paths.iter().cloned())
            .collect();

        let preflight: BoxedMiddleware = Arc::new(Preflight);
        for path in &paths {
            table.insert_options(path, Arc::clone(&preflight));
        }

        table.loaded_cors = true;
        debug!(count = paths.len(), "attached CORS preflight routes");
    }

    fn read(&self) -> RwLockReadGuard<'_, Table> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Table> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, method: Method, path: &str) -> Option<Found> {
        let table = self.read();
        let matched = table.trees.get(&method)?.at(path).ok()?;
        let route = table.routes.get(matched.value.index)?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), Some(v.to_owned())))
            .collect();
        Some(Found {
            chain: route.chain.clone(),
            pattern: matched.value.pattern.clone(),
            params,
        })
    }

    // ── Dispatch ──────────────────────────────────────────────────────────────

    /// Routes one request and produces one response.
    ///
    /// Never fails: unparsable URLs answer `400`, unknown methods `405`,
    /// unmatched paths `404`, and a chain error `500` with the error message
    /// as body.
    pub async fn handle<B>(self: &Arc<Self>, req: http::Request<B>, env: &Env) -> http::Response<Full<Bytes>>
    where
        B: HttpBody + Send + Unpin + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
    {
        let mut res = Response::new();
        match Request::new(req, Arc::clone(self), self.path_tidy) {
            Ok(mut req) => self.dispatch(&mut req, &mut res, env).await,
            Err(e) => {
                warn!(error = %e, "rejecting request");
                res.send_status(400);
            }
        }
        finish(&res)
    }

    async fn dispatch(&self, req: &mut Request, res: &mut Response, env: &Env) {
        let method = match req.method().parse::<Method>() {
            Ok(method) => method,
            Err(e) => {
                debug!(error = %e, "method not allowed");
                res.send_status(405);
                return;
            }
        };

        let Some(found) = self.lookup(method, req.path()) else {
            res.send_status(404);
            return;
        };
        req.route_path = found.pattern;
        req.params = found.params;

        let chain: Vec<BoxedMiddleware> = self.middleware.iter().cloned().chain(found.chain).collect();
        if let Err(e) = middleware::run(&chain, req, res, env).await {
            error!(request = %req, error = %e, "middleware chain failed");
            *res = Response::new();
            res.status(500).send(e.to_string());
        }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

fn finish(res: &Response) -> http::Response<Full<Bytes>> {
    res.to_http().unwrap_or_else(|e| {
        error!(error = %e, "failed to materialize response");
        let mut fallback = http::Response::new(Full::new(Bytes::from_static(b"500 Fail")));
        *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}
