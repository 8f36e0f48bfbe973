//! Minimal corral demo: CORS, JWT bodies, validation and body parsing.
//!
//! Run with:
//!   CORRAL_DEBUG=1 cargo run --example basic
//!
//! Try:
//!   curl -i -X OPTIONS http://localhost:3000/users
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users \
//!        -H 'content-type: application/jwt' \
//!        -d 'x.eyJuYW1lIjoiYm9iIn0.sig'
//!   curl http://localhost:3000/users/42?fields=name

use std::sync::Arc;

use corral::middleware::{self, Flow};
use corral::{Env, Error, Method, Router, Server};
use serde_json::{Value, json};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let env = Env::from_process();
    tracing_subscriber::fmt()
        .with_max_level(if env.debug() { Level::DEBUG } else { Level::INFO })
        .init();

    let app = Router::new()
        .with(middleware::cors())
        .with(middleware::parse_jwt())
        .route(&[Method::Post], &["/users"], vec![
            Arc::new(middleware::from_fn(|req, _res, _env| Box::pin(async move {
                // A JWT body was already decoded by parse_jwt.
                if !req.body().is_parsed() {
                    req.parse_body(None).await?;
                }
                Ok::<_, Error>(Flow::Next)
            }))),
            Arc::new(middleware::validate_body(require_name)),
            Arc::new(middleware::from_fn(|req, res, _env| Box::pin(async move {
                let name = req.body().value().and_then(|b| b.get("name")).cloned();
                res.status(201).send(json!({"id": 99, "name": name}));
                Ok::<_, Error>(Flow::Next)
            }))),
        ])
        .get("/users/{id}", middleware::from_fn(|req, res, _env| Box::pin(async move {
            let id = req.param("id").unwrap_or("unknown").to_owned();
            let fields = req.query().get("fields").cloned();
            res.send(json!({"id": id, "fields": fields}));
            Ok::<_, Error>(Flow::Next)
        })))
        .delete("/users/{id}", middleware::from_fn(|_req, res, _env| Box::pin(async move {
            res.send_status(204);
            Ok::<_, Error>(Flow::Next)
        })));

    Server::bind("0.0.0.0:3000")?
        .with_env(env)
        .serve(app)
        .await
}

fn require_name(body: &Value) -> Result<(), Value> {
    match body.get("name") {
        Some(Value::String(name)) if !name.is_empty() => Ok(()),
        _ => Err(json!({"error": "name is required"})),
    }
}
