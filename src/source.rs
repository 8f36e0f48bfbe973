//! The platform request seen through the handful of capabilities corral uses.
//!
//! A [`Request`](crate::Request) never copies the platform object's surface.
//! It owns a `Box<dyn Source>` and reaches the body only through the
//! extractors below. The body is a one-shot stream: once any extractor has
//! run, later reads see an exhausted body.

use bytes::Bytes;
use futures_util::{future, stream};
use http_body_util::BodyExt;
use hyper::body::Body as HttpBody;
use serde_json::Value;

use crate::error::BoxError;
use crate::middleware::BoxFuture;

/// Capabilities consumed from the platform-native request.
///
/// Implement the four required methods; `text`, `json` and `form_data` are
/// derived from [`bytes`](Source::bytes) and the `content-type` header.
pub trait Source: Send + 'static {
    fn method(&self) -> &str;

    /// Absolute request URL.
    fn url(&self) -> String;

    /// Header pairs with lowercase names, one entry per distinct name.
    fn header_entries(&self) -> Vec<(String, String)>;

    /// Reads the whole body. Only the first call sees the payload.
    fn bytes(&mut self) -> BoxFuture<'_, Result<Bytes, BoxError>>;

    fn text(&mut self) -> BoxFuture<'_, Result<String, BoxError>> {
        Box::pin(async move {
            let bytes = self.bytes().await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        })
    }

    fn json(&mut self) -> BoxFuture<'_, Result<Value, BoxError>> {
        Box::pin(async move {
            let bytes = self.bytes().await?;
            let value: Value = serde_json::from_slice(&bytes)?;
            Ok(value)
        })
    }

    /// Form fields in wire order.
    ///
    /// `multipart/form-data` when the `content-type` carries a boundary,
    /// `application/x-www-form-urlencoded` otherwise.
    fn form_data(&mut self) -> BoxFuture<'_, Result<Vec<(String, String)>, BoxError>> {
        Box::pin(async move {
            let content_type = self
                .header_entries()
                .into_iter()
                .find(|(name, _)| name == "content-type")
                .map(|(_, value)| value)
                .unwrap_or_default();
            let bytes = self.bytes().await?;

            match multer::parse_boundary(&content_type) {
                Ok(boundary) => multipart_fields(bytes, boundary).await,
                Err(_) => {
                    let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)?;
                    Ok(fields)
                }
            }
        })
    }
}

async fn multipart_fields(bytes: Bytes, boundary: String) -> Result<Vec<(String, String)>, BoxError> {
    // multer wants a stream; the body is already buffered.
    let body = stream::once(future::ready(Ok::<_, std::io::Error>(bytes)));
    let mut multipart = multer::Multipart::new(body, boundary);

    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else { continue };
        fields.push((name, field.text().await?));
    }
    Ok(fields)
}

// ── http::Request ─────────────────────────────────────────────────────────────

/// Any `http::Request` whose body hyper can collect: `hyper::body::Incoming`
/// from the server, `http_body_util::Full<Bytes>` in tests.
impl<B> Source for http::Request<B>
where
    B: HttpBody + Send + Unpin + 'static,
    B::Data: Send,
    B::Error: Into<BoxError>,
{
    fn method(&self) -> &str {
        http::Request::method(self).as_str()
    }

    /// Origin-form targets are resolved against the `Host` header.
    fn url(&self) -> String {
        let uri = self.uri();
        if uri.scheme().is_some() {
            return uri.to_string();
        }

        let host = self
            .headers()
            .get(http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");
        let target = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("http://{host}{target}")
    }

    /// Repeated headers collapse into one comma-joined value.
    fn header_entries(&self) -> Vec<(String, String)> {
        let headers = self.headers();
        headers
            .keys()
            .map(|name| {
                let value = headers
                    .get_all(name)
                    .iter()
                    .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                    .collect::<Vec<_>>()
                    .join(", ");
                (name.as_str().to_owned(), value)
            })
            .collect()
    }

    fn bytes(&mut self) -> BoxFuture<'_, Result<Bytes, BoxError>> {
        Box::pin(async move {
            let collected = self
                .body_mut()
                .collect()
                .await
                .map_err(Into::<BoxError>::into)?;
            Ok(collected.to_bytes())
        })
    }
}
