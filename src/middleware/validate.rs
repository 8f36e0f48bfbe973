//! Schema validation of one part of the request.
//!
//! The validation engine itself lives elsewhere; corral only needs a
//! [`Validator`] that says "fine" or hands back a failure value. A failure is
//! not an error: it becomes a `400` whose body is the failure value, and the
//! chain halts.

use serde_json::{Map, Value};

use crate::env::Env;
use crate::error::Error;
use crate::middleware::{BoxFuture, Flow, Middleware};
use crate::request::{Body, Request};
use crate::response::Response;

/// An external validator.
///
/// Implemented for any `Fn(&Value) -> Result<(), Value>`.
pub trait Validator: Send + Sync + 'static {
    /// `Err` carries whatever the engine reports, passed through to the client.
    fn validate(&self, data: &Value) -> Result<(), Value>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> Result<(), Value> + Send + Sync + 'static,
{
    fn validate(&self, data: &Value) -> Result<(), Value> {
        self(data)
    }
}

/// The part of the request a validator looks at.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Subkey {
    Body,
    Query,
    Params,
    Headers,
}

impl Subkey {
    /// JSON view of the selected part. An unparsed body is `null`.
    fn extract(self, req: &Request) -> Value {
        match self {
            Self::Body => match req.body() {
                Body::Parsed(value) => value.clone(),
                Body::Unparsed => Value::Null,
            },
            Self::Query => strings(req.query().iter()),
            Self::Headers => strings(req.headers().iter()),
            Self::Params => Value::Object(
                req.params()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone().map_or(Value::Null, Value::String)))
                    .collect(),
            ),
        }
    }
}

fn strings<'a>(pairs: impl Iterator<Item = (&'a String, &'a String)>) -> Value {
    let object: Map<String, Value> = pairs
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    Value::Object(object)
}

/// Validation middleware; see [`validate`].
pub struct Validate {
    subkey: Subkey,
    validator: Box<dyn Validator>,
}

/// Runs `validator` against `req[subkey]`.
pub fn validate(subkey: Subkey, validator: impl Validator) -> Validate {
    Validate { subkey, validator: Box::new(validator) }
}

pub fn validate_body(validator: impl Validator) -> Validate {
    validate(Subkey::Body, validator)
}

pub fn validate_query(validator: impl Validator) -> Validate {
    validate(Subkey::Query, validator)
}

pub fn validate_params(validator: impl Validator) -> Validate {
    validate(Subkey::Params, validator)
}

pub fn validate_headers(validator: impl Validator) -> Validate {
    validate(Subkey::Headers, validator)
}

impl Middleware for Validate {
    fn call<'a>(
        &'a self,
        req: &'a mut Request,
        res: &'a mut Response,
        _env: &'a Env,
    ) -> BoxFuture<'a, Result<Flow, Error>> {
        let data = self.subkey.extract(req);
        let flow = match self.validator.validate(&data) {
            Ok(()) => Flow::Next,
            Err(failure) => {
                res.status(400).send(failure);
                Flow::Halt
            }
        };
        Box::pin(async move { Ok(flow) })
    }
}
