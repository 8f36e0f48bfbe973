//! Outgoing response builder.
//!
//! A [`Response`] is created empty for every request and handed, mutably,
//! down the middleware chain. Middleware and handlers accumulate status,
//! headers and body on it; the router turns it into an `http::Response` with
//! [`Response::to_http`] once the chain is done.
//!
//! ```rust
//! use corral::Response;
//!
//! let mut res = Response::new();
//! res.set("location", "/users/42").status(201).send(r#"{"id":42}"#);
//! assert_eq!(res.code(), Some(201));
//! assert!(res.has_sent());
//! ```

use bytes::Bytes;
use http_body_util::Full;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::Error;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Shorthands accepted by [`Response::content_type`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html, // text/html
    Json, // application/json
    Text, // text/plain
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Json => "application/json",
            Self::Text => "text/plain",
        }
    }

    pub fn from_shorthand(shorthand: &str) -> Option<Self> {
        match shorthand {
            "html" => Some(Self::Html),
            "json" => Some(Self::Json),
            "text" => Some(Self::Text),
            _      => None,
        }
    }
}

// ── Payload ───────────────────────────────────────────────────────────────────

/// A response body.
///
/// Text, bytes and form collections go out untouched. Anything else is
/// JSON-encoded on the way in: `Payload::from(json!({"a":1}))` is the text
/// `{"a":1}`, while `Payload::from(json!("hi"))` stays `hi`.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Text(String),
    /// Binary or pre-encoded content (streams, multipart bodies).
    Bytes(Bytes),
    /// URL-encoded parameter collection.
    Form(Vec<(String, String)>),
}

impl Payload {
    /// The content-type the platform applies when none was set explicitly.
    fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Self::Text(_)  => Some("text/plain;charset=UTF-8"),
            Self::Bytes(_) => None,
            Self::Form(_)  => Some("application/x-www-form-urlencoded;charset=UTF-8"),
        }
    }

    fn encode(&self) -> Result<Bytes, Error> {
        Ok(match self {
            Self::Text(text)   => Bytes::from(text.clone()),
            Self::Bytes(bytes) => bytes.clone(),
            Self::Form(pairs)  => Bytes::from(serde_urlencoded::to_string(pairs)?),
        })
    }

    /// Log-friendly rendering: long text is cut to 50 chars plus `…`.
    fn preview(&self) -> String {
        match self {
            Self::Text(text) if text.chars().count() > 30 => {
                let mut cut: String = text.chars().take(50).collect();
                cut.push('…');
                cut
            }
            Self::Text(text)   => text.clone(),
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Self::Form(pairs)  => format!("{pairs:?}"),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self { Self::Text(text.to_owned()) }
}

impl From<String> for Payload {
    fn from(text: String) -> Self { Self::Text(text) }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self { Self::Bytes(bytes) }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self { Self::Bytes(Bytes::from(bytes)) }
}

impl From<Vec<(String, String)>> for Payload {
    fn from(pairs: Vec<(String, String)>) -> Self { Self::Form(pairs) }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Text(other.to_string()),
        }
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// Chainable response builder.
///
/// Every mutator returns `&mut Self`. Nothing stops mutation after
/// [`has_sent`](Response::has_sent) turns true, but the chain runner stops
/// calling middleware at that point.
#[derive(Clone, Debug, Default)]
pub struct Response {
    body: Option<Payload>,
    code: Option<u16>,
    headers: Vec<(String, String)>,
    has_sent: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` until something writes a body. An empty string counts as written.
    pub fn body(&self) -> Option<&Payload> { self.body.as_ref() }

    /// `None` until a status is chosen.
    pub fn code(&self) -> Option<u16> { self.code }

    pub fn headers(&self) -> &[(String, String)] { &self.headers }

    /// Exact-name header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    pub fn has_sent(&self) -> bool { self.has_sent }

    /// Sets one header, replacing a previous value of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let (name, value) = (name.into(), value.into());
        match self.headers.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Merges every pair into the headers.
    pub fn set_all<K, V>(&mut self, headers: impl IntoIterator<Item = (K, V)>) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.set(name, value);
        }
        self
    }

    /// Sets `Content-Type` from a shorthand (`html`, `json`, `text`) or a MIME type.
    pub fn content_type(&mut self, shorthand_or_mime: &str) -> Result<&mut Self, Error> {
        if let Some(known) = ContentType::from_shorthand(shorthand_or_mime) {
            return Ok(self.set("Content-Type", known.as_str()));
        }
        if !shorthand_or_mime.contains('/') {
            return Err(Error::UnknownType(shorthand_or_mime.to_owned()));
        }
        Ok(self.set("Content-Type", shorthand_or_mime))
    }

    /// Writes the body and marks the response sent. Status defaults to `200`.
    pub fn send(&mut self, data: impl Into<Payload>) -> &mut Self {
        self.write(data);
        self.has_sent = true;
        self
    }

    /// Like [`send`](Response::send) but leaves the response open.
    pub fn write(&mut self, data: impl Into<Payload>) -> &mut Self {
        if self.code.is_none() {
            self.code = Some(200);
        }
        self.body = Some(data.into());
        self
    }

    /// Serializes `data` and sends it. JSON strings go out unquoted.
    pub fn send_json<T: Serialize + ?Sized>(&mut self, data: &T) -> Result<&mut Self, Error> {
        let value = serde_json::to_value(data)?;
        Ok(self.send(value))
    }

    /// Marks the response sent.
    pub fn end(&mut self) -> &mut Self {
        self.has_sent = true;
        self
    }

    /// Sends `data`, then marks the response sent.
    pub fn end_with(&mut self, data: impl Into<Payload>) -> &mut Self {
        self.send(data)
    }

    /// Sets the status code.
    ///
    /// If no body has been written yet, a default one is filled in: `"ok"`
    /// for 2xx, `"<code> Fail"` otherwise.
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.code = Some(code);
        if self.body.is_none() {
            let default = if (200..=299).contains(&code) {
                "ok".to_owned()
            } else {
                format!("{code} Fail")
            };
            self.body = Some(Payload::Text(default));
        }
        self
    }

    /// Sets the status and ends the response.
    pub fn send_status(&mut self, code: u16) -> &mut Self {
        self.status(code).end()
    }

    /// Long form of [`send_status`](Response::send_status).
    ///
    /// Passing `data` is refused; write `status(code).send(data)` instead.
    pub fn try_send_status(
        &mut self,
        code: u16,
        data: Option<Payload>,
        end: bool,
    ) -> Result<&mut Self, Error> {
        if data.is_some() {
            return Err(Error::DataNotAllowed);
        }
        self.status(code);
        if end {
            self.end();
        }
        Ok(self)
    }

    /// Materializes the platform response. `self` is left untouched.
    ///
    /// An unset status lets the platform default (`200`) apply. Logs the
    /// outgoing status, headers and a body preview.
    pub fn to_http(&self) -> Result<http::Response<Full<Bytes>>, Error> {
        let status = self.code.unwrap_or(200);

        info!(
            status,
            headers = ?self.headers,
            body = %self.body.as_ref().map(Payload::preview).unwrap_or_default(),
            "response"
        );

        let mut builder = http::Response::builder().status(status);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let has_content_type = self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
        let body = match &self.body {
            Some(payload) => {
                if let (false, Some(default)) = (has_content_type, payload.default_content_type()) {
                    builder = builder.header(http::header::CONTENT_TYPE, default);
                }
                payload.encode()?
            }
            None => Bytes::new(),
        };

        Ok(builder.body(Full::new(body))?)
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::json;

    use super::*;

    async fn body_of(res: http::Response<Full<Bytes>>) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn status_fills_default_body() {
        let mut res = Response::new();
        res.status(201).end();
        assert_eq!(res.code(), Some(201));
        assert_eq!(res.body(), Some(&Payload::Text("ok".into())));
        assert!(res.has_sent());

        let mut res = Response::new();
        res.status(404).end();
        assert_eq!(res.body(), Some(&Payload::Text("404 Fail".into())));
    }

    #[test]
    fn status_never_overwrites_a_body() {
        let mut res = Response::new();
        res.write("").status(500);
        assert_eq!(res.body(), Some(&Payload::Text(String::new())));
        assert_eq!(res.code(), Some(500));

        let mut res = Response::new();
        res.status(404).send("custom");
        assert_eq!(res.body(), Some(&Payload::Text("custom".into())));
        assert_eq!(res.code(), Some(404));
    }

    #[test]
    fn send_defaults_to_200_and_keeps_strings() {
        let mut res = Response::new();
        res.send("hi");
        assert_eq!(res.code(), Some(200));
        assert_eq!(res.body(), Some(&Payload::Text("hi".into())));
        assert!(res.has_sent());
    }

    #[test]
    fn send_encodes_json_values() {
        let mut res = Response::new();
        res.send(json!({"a": 1}));
        assert_eq!(res.body(), Some(&Payload::Text(r#"{"a":1}"#.into())));

        let mut res = Response::new();
        res.send(json!("plain"));
        assert_eq!(res.body(), Some(&Payload::Text("plain".into())));
    }

    #[test]
    fn send_json_serializes() {
        #[derive(Serialize)]
        struct User {
            id: u32,
        }

        let mut res = Response::new();
        res.send_json(&User { id: 7 }).unwrap();
        assert_eq!(res.body(), Some(&Payload::Text(r#"{"id":7}"#.into())));

        let mut res = Response::new();
        res.send_json("already text").unwrap();
        assert_eq!(res.body(), Some(&Payload::Text("already text".into())));
    }

    #[test]
    fn write_leaves_the_response_open() {
        let mut res = Response::new();
        res.write(Bytes::from_static(b"\x00\x01"));
        assert!(!res.has_sent());
        assert_eq!(res.body(), Some(&Payload::Bytes(Bytes::from_static(b"\x00\x01"))));
        res.end_with("final");
        assert!(res.has_sent());
        assert_eq!(res.body(), Some(&Payload::Text("final".into())));
    }

    #[test]
    fn set_replaces_and_merges() {
        let mut res = Response::new();
        res.set("X-One", "1")
            .set_all([("X-Two", "2"), ("X-One", "uno")]);
        assert_eq!(res.headers(), &[
            ("X-One".to_owned(), "uno".to_owned()),
            ("X-Two".to_owned(), "2".to_owned()),
        ]);
    }

    #[test]
    fn content_type_shorthands_and_mimes() {
        let mut res = Response::new();
        res.content_type("html").unwrap();
        assert_eq!(res.header("Content-Type"), Some("text/html"));
        res.content_type("json").unwrap();
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        res.content_type("text").unwrap();
        assert_eq!(res.header("Content-Type"), Some("text/plain"));
        res.content_type("image/png").unwrap();
        assert_eq!(res.header("Content-Type"), Some("image/png"));

        let err = res.content_type("yaml").unwrap_err();
        assert!(matches!(err, Error::UnknownType(ref t) if t == "yaml"));
    }

    #[test]
    fn send_status_refuses_data() {
        let mut res = Response::new();
        let err = res.try_send_status(200, Some(json!({"x": 1}).into()), true).unwrap_err();
        assert!(err.to_string().starts_with("Data is not allowed"));
        assert!(!res.has_sent());

        res.try_send_status(200, None, true).unwrap();
        assert!(res.has_sent());
        assert_eq!(res.code(), Some(200));

        let mut res = Response::new();
        res.try_send_status(204, None, false).unwrap();
        assert!(!res.has_sent());
    }

    #[tokio::test]
    async fn to_http_materializes_without_mutating() {
        let mut res = Response::new();
        res.set("x-req", "7").status(202).send("accepted");
        let snapshot = res.clone();

        let http = res.to_http().unwrap();
        assert_eq!(http.status(), 202);
        assert_eq!(http.headers()["x-req"], "7");
        assert_eq!(http.headers()["content-type"], "text/plain;charset=UTF-8");
        assert_eq!(body_of(http).await, "accepted");
        assert_eq!(res.body(), snapshot.body());
        assert_eq!(res.code(), snapshot.code());
    }

    #[tokio::test]
    async fn to_http_defaults() {
        let http = Response::new().to_http().unwrap();
        assert_eq!(http.status(), 200);
        assert!(http.headers().get("content-type").is_none());
        assert_eq!(body_of(http).await, "");
    }

    #[tokio::test]
    async fn form_payload_is_urlencoded() {
        let mut res = Response::new();
        res.content_type("application/x-www-form-urlencoded").unwrap();
        res.send(vec![("q".to_owned(), "a b".to_owned()), ("n".to_owned(), "1".to_owned())]);
        let http = res.to_http().unwrap();
        assert_eq!(http.headers()["content-type"], "application/x-www-form-urlencoded");
        assert_eq!(body_of(http).await, "q=a+b&n=1");
    }

    #[test]
    fn form_encoding_errors_are_not_request_decode_errors() {
        // A bare sequence is not a list of pairs.
        let err: Error = serde_urlencoded::to_string(vec![1u8]).unwrap_err().into();
        assert!(matches!(err, Error::FormEncode(_)));
        assert!(err.to_string().starts_with("form encoding: "));
    }

    #[test]
    fn invalid_header_fails_materialization() {
        let mut res = Response::new();
        res.set("bad header", "x").send("x");
        assert!(matches!(res.to_http(), Err(Error::Http(_))));
    }

    #[test]
    fn preview_truncates_long_text() {
        let long = "x".repeat(80);
        let preview = Payload::Text(long).preview();
        assert_eq!(preview.chars().count(), 51);
        assert!(preview.ends_with('…'));

        assert_eq!(Payload::Text("short".into()).preview(), "short");
        assert_eq!(Payload::Bytes(Bytes::from_static(b"abc")).preview(), "<3 bytes>");
    }
}
