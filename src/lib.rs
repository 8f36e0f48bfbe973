//! # corral
//!
//! A request context, a response builder, and an ordered middleware chain
//! that mutates both before a handler runs.
//!
//! ## The contract
//!
//! Every inbound request becomes one [`Request`] and one [`Response`]. They
//! travel together, by `&mut`, through the middleware chain in registration
//! order. Each middleware may mutate either one, then either lets the chain
//! continue or halts it. The last link is the handler. What is left in the
//! [`Response`] is turned into an `http::Response`.
//!
//! What corral brings to that chain:
//!
//! - **Body parsing**: [`Request::parse_body`] dispatches on the content-type
//!   (JSON, form, text, raw fallback)
//! - **CORS**: [`middleware::cors`] injects headers and registers preflight
//!   `OPTIONS` routes once per router
//! - **JWT bodies**: [`middleware::parse_jwt`] decodes the payload segment
//!   into the request body (no signature check)
//! - **Validation**: [`middleware::validate`] and friends turn a failed
//!   check into a `400`
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use corral::middleware::{self, Flow};
//! use corral::{Error, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let app = Router::new()
//!         .with(middleware::cors())
//!         .post("/users", middleware::from_fn(|req, res, _env| Box::pin(async move {
//!             req.parse_body(None).await?;
//!             let user = req.body().value().cloned().unwrap_or_default();
//!             res.status(201).send(user);
//!             Ok::<_, Error>(Flow::Next)
//!         })));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```
//!
//! ## Concurrency
//!
//! A single request's chain runs strictly sequentially. Many requests run in
//! parallel on the tokio runtime and share the [`Router`]; the only state they
//! mutate there is the route table during preflight registration, which is
//! lock-guarded and idempotent.

mod env;
mod error;
mod method;
mod request;
mod response;
mod router;
mod server;
mod source;

pub mod middleware;

pub use env::{DEBUG_FLAG, Env};
pub use error::{BoxError, Error};
pub use method::Method;
pub use request::{Body, Request, Text};
pub use response::{ContentType, Payload, Response};
pub use router::{PathTidy, Route, Router, tidy_path};
pub use server::Server;
pub use source::Source;
