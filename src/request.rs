//! Incoming request context.
//!
//! One [`Request`] is built per inbound request and handed, mutably, down the
//! middleware chain. Path, host, query and headers are normalized up front.
//! The body stays unread until something asks for it.
//!
//! # Body states
//!
//! ```text
//! Body::Unparsed ──parse_body()──▶ Body::Parsed(value)
//! Text::Pending  ──text() / raw fallback──▶ Text::Resolved(string)
//! ```
//!
//! Both transitions are one-way. The platform stream is read at most once:
//! a second `parse_body`, or any read that would need the drained stream, is
//! rejected with [`Error::BodyConsumed`]. Raw text already resolved is reused.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::router::{PathTidy, Router};
use crate::source::Source;

/// Request body, before and after [`Request::parse_body`].
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// Still in the platform stream; only the extractors can reach it.
    Unparsed,
    /// Decoded application data.
    Parsed(Value),
}

impl Body {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Unparsed => None,
            Self::Parsed(value) => Some(value),
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed(_))
    }
}

/// Raw request text.
#[derive(Clone, Debug, PartialEq)]
pub enum Text {
    Pending,
    Resolved(String),
}

/// An incoming HTTP request, normalized.
pub struct Request {
    method: String,
    url: String,
    path: String,
    hostname: String,
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    pub(crate) route_path: String,
    pub(crate) params: HashMap<String, Option<String>>,
    body: Body,
    text: Text,
    router: Arc<Router>,
    source: Box<dyn Source>,
    drained: bool,
}

impl Request {
    /// Normalizes `source`.
    ///
    /// `path` is the URL pathname run through `path_tidy`; `route_path` and
    /// `params` start empty and are filled in by the router on match.
    pub fn new(source: impl Source, router: Arc<Router>, path_tidy: PathTidy) -> Result<Self, Error> {
        let url = source.url();
        let parsed = Url::parse(&url)?;

        // Last value wins, as with URLSearchParams → object.
        let query = parsed.query_pairs().into_owned().collect();
        let headers = source.header_entries().into_iter().collect();

        Ok(Self {
            method: source.method().to_owned(),
            path: path_tidy(parsed.path()),
            hostname: parsed.host_str().unwrap_or_default().to_owned(),
            query,
            headers,
            route_path: String::new(),
            params: HashMap::new(),
            body: Body::Unparsed,
            text: Text::Pending,
            router,
            source: Box::new(source),
            drained: false,
            url,
        })
    }

    pub fn method(&self) -> &str { &self.method }
    pub fn url(&self) -> &str { &self.url }
    pub fn path(&self) -> &str { &self.path }
    pub fn hostname(&self) -> &str { &self.hostname }
    pub fn router(&self) -> &Arc<Router> { &self.router }

    pub fn query(&self) -> &HashMap<String, String> { &self.query }
    pub fn query_mut(&mut self) -> &mut HashMap<String, String> { &mut self.query }

    /// Headers keyed by lowercase name.
    pub fn headers(&self) -> &HashMap<String, String> { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HashMap<String, String> { &mut self.headers }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// The route pattern that matched, e.g. `/users/{id}`. Empty before routing.
    pub fn route_path(&self) -> &str { &self.route_path }

    pub fn params(&self) -> &HashMap<String, Option<String>> { &self.params }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Option::as_deref)
    }

    pub fn body(&self) -> &Body { &self.body }

    /// Replaces the body with decoded data (used by body-producing middleware).
    pub fn set_body(&mut self, value: Value) {
        self.body = Body::Parsed(value);
    }

    pub fn raw_text(&self) -> &Text { &self.text }

    /// The raw body as a string, reading it from the platform if needed.
    ///
    /// Fails with [`Error::BodyConsumed`] when the stream was already drained
    /// by a decoding branch of [`parse_body`](Request::parse_body).
    pub async fn text(&mut self) -> Result<String, Error> {
        if let Text::Resolved(text) = &self.text {
            return Ok(text.clone());
        }
        let text = self.drain()?.text().await.map_err(Error::InvalidText)?;
        self.text = Text::Resolved(text.clone());
        Ok(text)
    }

    /// Hands out the source for its one and only read.
    fn drain(&mut self) -> Result<&mut (dyn Source + 'static), Error> {
        if self.drained {
            return Err(Error::BodyConsumed);
        }
        self.drained = true;
        Ok(self.source.as_mut())
    }

    /// Parses the body according to `force_type`, or the `content-type` header.
    ///
    /// | type token | result |
    /// |---|---|
    /// | `json`, `application/json` | parsed JSON |
    /// | `formData`, `multipart/form-data`, `application/x-www-form-urlencoded` | object of fields, last value wins |
    /// | `text`, `text/plain` | JSON string of the raw text |
    /// | anything else | `text` holds the raw string, body becomes `{}` |
    ///
    /// Parameters after the MIME essence (`; charset=…`) are ignored. Matching
    /// is case-sensitive.
    ///
    /// In the fallback branch a failed read still leaves `text` as `""` and
    /// the body as `{}` before the error is returned.
    pub async fn parse_body(&mut self, force_type: Option<&str>) -> Result<(), Error> {
        if self.body.is_parsed() {
            return Err(Error::BodyConsumed);
        }

        let declared = force_type
            .filter(|t| !t.is_empty())
            .or_else(|| self.headers.get("content-type").map(String::as_str))
            .unwrap_or_default()
            .to_owned();

        match mime_essence(&declared) {
            "json" | "application/json" => {
                let value = self.drain()?.json().await.map_err(|e| {
                    debug!(error = %e, "failed to decode request body as JSON");
                    Error::InvalidJson(e)
                })?;
                self.body = Body::Parsed(value);
            }
            "formData" | "multipart/form-data" | "application/x-www-form-urlencoded" => {
                let fields = self.drain()?.form_data().await.map_err(|e| {
                    debug!(error = %e, "failed to decode multi-part body");
                    Error::InvalidForm(e)
                })?;
                let object: Map<String, Value> = fields
                    .into_iter()
                    .map(|(name, value)| (name, Value::String(value)))
                    .collect();
                self.body = Body::Parsed(Value::Object(object));
            }
            "text" | "text/plain" => {
                let text = match &self.text {
                    Text::Resolved(text) => text.clone(),
                    Text::Pending => self.drain()?.text().await.map_err(|e| {
                        debug!(error = %e, "failed to decode plain-text body");
                        Error::InvalidText(e)
                    })?,
                };
                self.body = Body::Parsed(Value::String(text));
            }
            _ => {
                debug!(content_type = %declared, "empty body payload, assuming raw payload");
                let raw = match &self.text {
                    Text::Resolved(text) => Ok(text.clone()),
                    Text::Pending => match self.drain() {
                        Ok(source) => source.text().await.map_err(Error::InvalidRawText),
                        Err(e) => Err(e),
                    },
                };
                self.body = Body::Parsed(Value::Object(Map::new()));
                match raw {
                    Ok(text) => self.text = Text::Resolved(text),
                    Err(e) => {
                        debug!(error = %e, "failed to decode body as raw text");
                        self.text = Text::Resolved(String::new());
                        return Err(e);
                    }
                }
            }
        }
        Ok(())
    }
}

/// `"application/json; charset=utf-8"` → `"application/json"`.
fn mime_essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// `"<METHOD> <path>"`, for logs.
impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("path", &self.path)
            .field("route_path", &self.route_path)
            .field("body", &self.body)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}
