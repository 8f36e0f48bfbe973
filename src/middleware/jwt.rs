//! JWT payload extraction.
//!
//! When a request carries a JWT as its body, the payload segment is decoded
//! into `req.body`. The signature is **not** checked: this is a body parser,
//! not authentication.

use std::sync::Arc;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde_json::Value;

use crate::env::Env;
use crate::error::Error;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::request::Request;
use crate::response::Response;

/// Standard alphabet, padding optional.
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

type Predicate = dyn Fn(&Request, &Response) -> bool + Send + Sync;

/// JWT body-parsing middleware.
#[derive(Clone)]
pub struct ParseJwt {
    is_jwt: Arc<Predicate>,
}

/// JWT parsing for requests with `content-type: application/jwt`.
pub fn parse_jwt() -> ParseJwt {
    ParseJwt::default()
}

impl Default for ParseJwt {
    fn default() -> Self {
        Self {
            is_jwt: Arc::new(|req: &Request, _res: &Response| {
                req.headers().get("content-type").is_some_and(|t| t == "application/jwt")
            }),
        }
    }
}

impl ParseJwt {
    /// Replaces the detection predicate.
    pub fn is_jwt<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request, &Response) -> bool + Send + Sync + 'static,
    {
        self.is_jwt = Arc::new(predicate);
        self
    }
}

impl Middleware for ParseJwt {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        _env: &'a Env,
    ) -> BoxFuture<'a, Result<Flow, Error>> {
        let matched = (self.is_jwt)(req, res);
        Box::pin(async move {
            if matched {
                let token = req.text().await?;
                req.set_body(decode_payload(&token)?);
            }
            Ok(Flow::Next)
        })
    }
}

/// Decodes the claims of `header.payload.signature`.
pub fn decode_payload(token: &str) -> Result<Value, Error> {
    let segment = token
        .trim()
        .split('.')
        .nth(1)
        .ok_or_else(|| Error::InvalidJwt("missing payload segment".to_owned()))?;
    let standard = segment.replace('-', "+").replace('_', "/");
    let raw = FORGIVING
        .decode(standard)
        .map_err(|e| Error::InvalidJwt(e.to_string()))?;
    serde_json::from_slice(&raw).map_err(|e| Error::InvalidJwt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::middleware::tests::request;
    use crate::request::{Body, Text};
    use crate::router::Router;

    #[tokio::test]
    async fn decodes_payload_into_body() {
        let router = Arc::new(Router::new());
        let mut req = request(&router, "/", &[("content-type", "application/jwt")], "header.eyJhIjoxfQ.sig");
        let mut res = Response::new();

        let flow = parse_jwt().call(&mut req, &mut res, &Env::new()).await.unwrap();
        assert_eq!(flow, Flow::Next);
        assert_eq!(req.body(), &Body::Parsed(json!({"a": 1})));
        assert_eq!(req.raw_text(), &Text::Resolved("header.eyJhIjoxfQ.sig".to_owned()));
    }

    #[tokio::test]
    async fn other_content_types_pass_through() {
        let router = Arc::new(Router::new());
        let mut req = request(&router, "/", &[("content-type", "application/json")], "header.eyJhIjoxfQ.sig");

        parse_jwt().call(&mut req, &mut Response::new(), &Env::new()).await.unwrap();
        assert_eq!(req.body(), &Body::Unparsed);
        assert_eq!(req.raw_text(), &Text::Pending);
    }

    #[tokio::test]
    async fn custom_predicate() {
        let router = Arc::new(Router::new());
        let mut req = request(&router, "/", &[("x-token-body", "1")], "h.eyJzdWIiOiJib2IifQ.s");
        let mw = parse_jwt().is_jwt(|req: &Request, _res: &Response| req.header("x-token-body").is_some());

        mw.call(&mut req, &mut Response::new(), &Env::new()).await.unwrap();
        assert_eq!(req.body(), &Body::Parsed(json!({"sub": "bob"})));
    }

    #[tokio::test]
    async fn malformed_token_is_an_error() {
        let router = Arc::new(Router::new());
        let mut req = request(&router, "/", &[("content-type", "application/jwt")], "no-dots-here");

        let err = parse_jwt().call(&mut req, &mut Response::new(), &Env::new()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidJwt(_)));
    }

    #[test]
    fn decodes_url_safe_alphabet_with_and_without_padding() {
        // {"k":"~~~?"} encodes with '-' and '_' in the url-safe alphabet.
        assert_eq!(decode_payload("h.eyJrIjoifn5-PyJ9.s").unwrap(), json!({"k": "~~~?"}));
        assert_eq!(decode_payload("h.eyJhIjoxfQ==.s").unwrap(), json!({"a": 1}));
        assert!(decode_payload("h.!!!.s").is_err());
        assert!(decode_payload("h.bm90IGpzb24.s").is_err());
    }
}
