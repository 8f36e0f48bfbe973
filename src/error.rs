//! Unified error type.

/// Boxed error produced by a [`Source`](crate::Source) body read.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by corral's fallible operations.
///
/// Validation failures are not errors: they become a `400` [`Response`](crate::Response)
/// and halt the chain. Everything here propagates to whoever drove the
/// middleware chain; [`Router::handle`](crate::Router::handle) turns it into a `500`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Body decoding ─────────────────────────────────────────────────────────
    #[error("Invalid JSON body")]
    InvalidJson(#[source] BoxError),

    #[error("Invalid multi-part encoded body")]
    InvalidForm(#[source] BoxError),

    #[error("Invalid text body")]
    InvalidText(#[source] BoxError),

    #[error("Invalid raw text body")]
    InvalidRawText(#[source] BoxError),

    #[error("request body has already been parsed")]
    BodyConsumed,

    #[error("Invalid JWT payload: {0}")]
    InvalidJwt(String),

    // ── Response configuration ────────────────────────────────────────────────
    #[error("Shorthand type \"{0}\" is not recognised and does not look like a valid mime type")]
    UnknownType(String),

    #[error("Data is not allowed with send_status(code) - use status(code).send(data) instead")]
    DataNotAllowed,

    #[error("unknown http method `{0}`")]
    UnknownMethod(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("form encoding: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),

    #[error("http: {0}")]
    Http(#[from] http::Error),
}
