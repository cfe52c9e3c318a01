use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{auth, posts};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api",
            Router::new()
                .merge(auth::router())
                .merge(posts::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "5000".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Sends a body verbatim, with whatever content type (if any) the caller gives.
    async fn send_raw(
        app: &Router,
        uri: &str,
        token: Option<&str>,
        content_type: Option<&str>,
        body: &str,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(Method::POST).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(content_type) = content_type {
            req = req.header(header::CONTENT_TYPE, content_type);
        }
        let res = app.clone().oneshot(req.body(Body::from(body.to_string())).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn register(app: &Router, name: &str, email: &str) -> String {
        let (status, body) = send(
            app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({ "name": name, "email": email, "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::in_memory());
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn alice_scenario() {
        let app = build_app(AppState::in_memory());
        register(&app, "Alice", "alice@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth",
            None,
            Some(json!({ "email": "alice@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (_, me) = send(&app, Method::GET, "/api/auth", Some(token.as_str()), None).await;
        assert_eq!(me["name"], "Alice");
        assert!(me.get("password_hash").is_none());
        let alice_id = me["id"].clone();

        let (status, post) = send(
            &app,
            Method::POST,
            "/api/posts",
            Some(token.as_str()),
            Some(json!({ "text": "hello" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(post["likes"], json!([]));
        assert_eq!(post["name"], "Alice");
        let like_uri = format!("/api/posts/like/{}", post["id"].as_str().unwrap());

        let (_, likes) = send(&app, Method::PUT, &like_uri, Some(token.as_str()), None).await;
        assert_eq!(likes, json!([{ "user": alice_id }]));
        let (_, likes) = send(&app, Method::PUT, &like_uri, Some(token.as_str()), None).await;
        assert_eq!(likes, json!([]));
    }

    #[tokio::test]
    async fn register_errors() {
        let app = build_app(AppState::in_memory());
        register(&app, "Alice", "alice@example.com").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({ "name": "Alice", "email": "alice@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["msg"], "user already exists");

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/users",
            None,
            Some(json!({ "name": "", "email": "x", "password": "1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = build_app(AppState::in_memory());
        let (status, body) = send(&app, Method::GET, "/api/posts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["msg"], "No token, authorization denied");

        let (status, _) = send(&app, Method::GET, "/api/posts", Some("garbage"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/auth",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "secret1" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["msg"], "Invalid credentials");
    }

    #[tokio::test]
    async fn ownership_and_lookup_errors() {
        let app = build_app(AppState::in_memory());
        let alice = register(&app, "Alice", "alice@example.com").await;
        let bob = register(&app, "Bob", "bob@example.com").await;

        let (_, post) = send(
            &app,
            Method::POST,
            "/api/posts",
            Some(alice.as_str()),
            Some(json!({ "text": "hello" })),
        )
        .await;
        let post_uri = format!("/api/posts/{}", post["id"].as_str().unwrap());

        let (status, body) = send(&app, Method::DELETE, &post_uri, Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["msg"], "user not authorized");
        let (status, _) = send(&app, Method::GET, &post_uri, Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::GET, "/api/posts/not-an-id", Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let unlike_uri = format!("/api/posts/unlike/{}", post["id"].as_str().unwrap());
        let (status, body) = send(&app, Method::PUT, &unlike_uri, Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["msg"], "post has not yet been liked");

        let (status, body) = send(&app, Method::DELETE, &post_uri, Some(alice.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["msg"], "post removed");
        let (status, body) = send(&app, Method::GET, &post_uri, Some(alice.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["msg"], "post not found");
    }

    #[tokio::test]
    async fn comment_lifecycle() {
        let app = build_app(AppState::in_memory());
        let alice = register(&app, "Alice", "alice@example.com").await;
        let bob = register(&app, "Bob", "bob@example.com").await;

        let (_, post) = send(
            &app,
            Method::POST,
            "/api/posts",
            Some(alice.as_str()),
            Some(json!({ "text": "hello" })),
        )
        .await;
        let post_id = post["id"].as_str().unwrap().to_string();
        let comment_uri = format!("/api/posts/comment/{post_id}");

        let (status, _) = send(
            &app,
            Method::POST,
            &comment_uri,
            Some(bob.as_str()),
            Some(json!({ "text": "" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        send(&app, Method::POST, &comment_uri, Some(bob.as_str()), Some(json!({ "text": "first" }))).await;
        let (_, comments) = send(
            &app,
            Method::POST,
            &comment_uri,
            Some(alice.as_str()),
            Some(json!({ "text": "second" })),
        )
        .await;
        assert_eq!(comments[0]["text"], "second");
        assert_eq!(comments[1]["name"], "Bob");
        let bobs = comments[1]["id"].as_str().unwrap().to_string();

        let like_uri = format!("/api/posts/likecomment/{post_id}/{bobs}");
        let (status, comments) = send(&app, Method::PUT, &like_uri, Some(alice.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(comments[1]["comment_likes"].as_array().unwrap().len(), 1);

        let delete_uri = format!("/api/posts/comment/{post_id}/{bobs}");
        let (status, _) = send(&app, Method::DELETE, &delete_uri, Some(alice.as_str()), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, comments) = send(&app, Method::DELETE, &delete_uri, Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(comments.as_array().unwrap().len(), 1);
        assert_eq!(comments[0]["text"], "second");

        let (status, body) = send(&app, Method::DELETE, &delete_uri, Some(bob.as_str()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["msg"], "comment does not exist");
    }

    #[tokio::test]
    async fn malformed_bodies_are_validation_errors() {
        let app = build_app(AppState::in_memory());
        let token = register(&app, "Alice", "alice@example.com").await;
        let (_, post) = send(
            &app,
            Method::POST,
            "/api/posts",
            Some(token.as_str()),
            Some(json!({ "text": "hello" })),
        )
        .await;
        let comment_uri = format!("/api/posts/comment/{}", post["id"].as_str().unwrap());

        let json = Some("application/json");
        let cases = [
            ("/api/posts", None, r#"{"text":"hello"}"#),
            ("/api/posts", json, ""),
            ("/api/posts", json, r#"{"text":5}"#),
            ("/api/posts", Some("text/plain"), r#"{"text":"hello"}"#),
            (comment_uri.as_str(), None, ""),
            (comment_uri.as_str(), json, r#"{"text":["a"]}"#),
        ];
        for (uri, content_type, body) in cases {
            let (status, res) = send_raw(&app, uri, Some(token.as_str()), content_type, body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri} {content_type:?} {body}");
            assert_eq!(res, json!({ "errors": [{ "msg": "Invalid request body" }] }));
        }

        for uri in ["/api/users", "/api/auth"] {
            let (status, res) = send_raw(
                &app,
                uri,
                None,
                json,
                r#"{"name":"Bob","email":"bob@example.com","password":123456}"#,
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(res["errors"][0]["msg"], "Invalid request body");
            assert!(res["errors"][0].get("param").is_none());
        }

        // an empty object still reaches field validation
        let (status, res) = send_raw(&app, "/api/users", None, json, "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(res["errors"].as_array().unwrap().len(), 3);
    }
}
