//! End-to-end: CORS, JWT bodies and validation in front of a handler.

use std::sync::Arc;

use bytes::Bytes;
use corral::middleware::{self, BoxedMiddleware, Flow};
use corral::{Env, Error, Method, Router};
use http_body_util::{BodyExt, Full};
use serde_json::{Value, json};

fn require_name(body: &Value) -> Result<(), Value> {
    match body.get("name") {
        Some(Value::String(_)) => Ok(()),
        _ => Err(json!({"error": "name is required"})),
    }
}

fn app() -> Arc<Router> {
    let chain: Vec<BoxedMiddleware> = vec![
        Arc::new(middleware::from_fn(|req, _res, _env| {
            Box::pin(async move {
                if !req.body().is_parsed() {
                    req.parse_body(None).await?;
                }
                Ok::<_, Error>(Flow::Next)
            })
        })),
        Arc::new(middleware::validate_body(require_name)),
        Arc::new(middleware::from_fn(|req, res, env| {
            Box::pin(async move {
                let name = req.body().value().and_then(|b| b.get("name")).cloned();
                let tenant = env.get("TENANT").map(str::to_owned);
                res.status(201).send(json!({"name": name, "tenant": tenant}));
                Ok::<_, Error>(Flow::Next)
            })
        })),
    ];

    Arc::new(
        Router::new()
            .with(middleware::cors())
            .with(middleware::parse_jwt())
            .route(&[Method::Post], &["/users"], chain),
    )
}

fn post(content_type: &str, body: &'static str) -> http::Request<Full<Bytes>> {
    http::Request::builder()
        .method("POST")
        .uri("http://api.test/users")
        .header("content-type", content_type)
        .body(Full::new(Bytes::from_static(body.as_bytes())))
        .unwrap()
}

async fn json_body(res: http::Response<Full<Bytes>>) -> Value {
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn json_body_reaches_the_handler() {
    let app = app();
    let env = Env::new().with("TENANT", "acme");

    let res = app.handle(post("application/json", r#"{"name":"alice"}"#), &env).await;
    assert_eq!(res.status(), 201);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.headers()["content-type"], "application/json;charset=UTF-8");
    assert_eq!(json_body(res).await, json!({"name": "alice", "tenant": "acme"}));
}

#[tokio::test]
async fn jwt_body_is_decoded_before_validation() {
    let app = app();
    // payload: {"name":"bob"}
    let res = app.handle(post("application/jwt", "h.eyJuYW1lIjoiYm9iIn0.s"), &Env::new()).await;
    assert_eq!(res.status(), 201);
    assert_eq!(json_body(res).await, json!({"name": "bob", "tenant": null}));
}

#[tokio::test]
async fn validation_failure_short_circuits() {
    let app = app();
    let res = app.handle(post("application/x-www-form-urlencoded", "nick=al"), &Env::new()).await;
    assert_eq!(res.status(), 400);
    assert_eq!(json_body(res).await, json!({"error": "name is required"}));
}

#[tokio::test]
async fn malformed_bodies_become_500() {
    let app = app();

    let res = app.handle(post("application/json", "{"), &Env::new()).await;
    assert_eq!(res.status(), 500);

    let res = app.handle(post("application/jwt", "not-a-token"), &Env::new()).await;
    assert_eq!(res.status(), 500);
}

#[tokio::test]
async fn preflight_is_registered_lazily() {
    let app = app();
    let options = || {
        http::Request::builder()
            .method("OPTIONS")
            .uri("/users")
            .body(Full::new(Bytes::new()))
            .unwrap()
    };

    let res = app.handle(options(), &Env::new()).await;
    assert_eq!(res.status(), 404);
    assert!(!app.loaded_cors());

    app.handle(post("application/json", r#"{"name":"x"}"#), &Env::new()).await;
    assert!(app.loaded_cors());
    let routes = app.routes().len();

    let res = app.handle(options(), &Env::new()).await;
    assert_eq!(res.status(), 200);
    assert_eq!(app.routes().len(), routes);
}

#[tokio::test]
async fn concurrent_first_requests_register_once() {
    let app = app();
    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let app = Arc::clone(&app);
        tasks.spawn(async move {
            app.handle(post("application/json", r#"{"name":"x"}"#), &Env::new()).await.status()
        });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), 201);
    }

    let options: Vec<_> = app
        .routes()
        .into_iter()
        .filter(|r| r.handles(Method::Options))
        .collect();
    assert_eq!(options.len(), 1);
}
