mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use serde_json::{json, Value};

fn with_cookie(mut req: Request<Body>, pair: &str) -> Request<Body> {
    req.headers_mut()
        .insert(header::COOKIE, pair.parse().unwrap());
    req
}

#[tokio::test]
async fn test_sign_up_sets_cross_site_cookie() {
    let app = app().await;
    let res = app
        .send(json_post(
            "/api/auth/sign-up/email",
            json!({"name": "Ada", "email": "Ada@Example.com", "password": "password123"}),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with("todo.session_token="));
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("SameSite=None"));
    assert!(set_cookie.contains("Path=/"));
    assert!(set_cookie.contains("Max-Age=604800"));

    let body = body_json(res).await;
    assert_eq!(body["user"]["email"], "ada@example.com");
    assert_eq!(body["user"]["emailVerified"], false);
    assert!(body["token"].as_str().unwrap().len() >= 32);
    assert!(body.get("redirect").is_none());
}

#[tokio::test]
async fn test_sign_up_validation() {
    let app = app().await;
    app.sign_up("Ada", "ada@example.com", "password123").await;

    let cases = [
        (
            json!({"name": "Bob", "email": "ada@example.com", "password": "password123"}),
            StatusCode::UNPROCESSABLE_ENTITY,
            "USER_ALREADY_EXISTS",
        ),
        (
            json!({"name": "Bob", "email": "bob@example.com", "password": "short"}),
            StatusCode::BAD_REQUEST,
            "PASSWORD_TOO_SHORT",
        ),
        (
            json!({"name": "Bob", "email": "not-an-email", "password": "password123"}),
            StatusCode::BAD_REQUEST,
            "INVALID_EMAIL",
        ),
        (
            json!({"name": "  ", "email": "bob@example.com", "password": "password123"}),
            StatusCode::BAD_REQUEST,
            "NAME_REQUIRED",
        ),
    ];

    for (body, status, code) in cases {
        let res = app.send(json_post("/api/auth/sign-up/email", body)).await;
        assert_eq!(res.status(), status);
        assert_eq!(body_json(res).await["code"], code);
    }
}

#[tokio::test]
async fn test_sign_in() {
    let app = app().await;
    app.sign_up("Ada", "ada@example.com", "password123").await;

    let res = app
        .send(json_post(
            "/api/auth/sign-in/email",
            json!({"email": "ada@example.com", "password": "wrong-password"}),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(res).await["code"], "INVALID_EMAIL_OR_PASSWORD");

    let res = app
        .send(json_post(
            "/api/auth/sign-in/email",
            json!({"email": "nobody@example.com", "password": "password123"}),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = app
        .send(json_post(
            "/api/auth/sign-in/email",
            json!({"email": "ADA@example.com", "password": "password123"}),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = body_json(res).await;
    assert_eq!(body["redirect"], false);
    assert_eq!(body["user"]["name"], "Ada");
}

#[tokio::test]
async fn test_remember_me_off_gives_browser_session_cookie() {
    let app = app().await;
    app.sign_up("Ada", "ada@example.com", "password123").await;

    let res = app
        .send(json_post(
            "/api/auth/sign-in/email",
            json!({"email": "ada@example.com", "password": "password123", "rememberMe": false}),
        ))
        .await;
    let set_cookie = res.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(set_cookie.starts_with("todo.session_token="));
    assert!(!set_cookie.contains("Max-Age"));
    let pair = session_cookie_pair(&res).unwrap();

    // Re-issuing the cookie keeps it a browser-session cookie
    let res = app.send(with_cookie(get("/api/auth/get-session"), &pair)).await;
    let reissued = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(reissued.starts_with("todo.session_token="));
    assert!(!reissued.contains("Max-Age"));
    assert_eq!(body_json(res).await["session"]["rememberMe"], false);
}

#[tokio::test]
async fn test_remembered_session_cookie_stays_persistent() {
    let app = app().await;
    let res = app
        .send(json_post(
            "/api/auth/sign-up/email",
            json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}),
        ))
        .await;
    let pair = session_cookie_pair(&res).unwrap();

    let res = app.send(with_cookie(get("/api/auth/get-session"), &pair)).await;
    let reissued = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(reissued.contains("Max-Age=604800"));
    assert_eq!(body_json(res).await["session"]["rememberMe"], true);
}

#[tokio::test]
async fn test_malformed_auth_bodies_get_error_body() {
    let app = app().await;

    let missing_name = json_post(
        "/api/auth/sign-up/email",
        json!({"email": "a@b.co", "password": "password123"}),
    );
    let not_json = Request::builder()
        .method("POST")
        .uri("/api/auth/sign-in/email")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let no_content_type = Request::builder()
        .method("POST")
        .uri("/api/auth/sign-in/email")
        .body(Body::from(r#"{"email":"a@b.co","password":"password123"}"#))
        .unwrap();

    for req in [missing_name, not_json, no_content_type] {
        let res = app.send(req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("application/json"));
        let body = body_json(res).await;
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    let body = body_json(
        app.send(json_post(
            "/api/auth/sign-up/email",
            json!({"email": "a@b.co", "password": "password123"}),
        ))
        .await,
    )
    .await;
    assert!(body["message"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn test_get_session_with_cookie_and_bearer() {
    let app = app().await;

    let res = app.send(get("/api/auth/get-session")).await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await, Value::Null);

    let res = app
        .send(json_post(
            "/api/auth/sign-up/email",
            json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}),
        ))
        .await;
    let pair = session_cookie_pair(&res).unwrap();
    let token = body_json(res).await["token"].as_str().unwrap().to_string();

    // Signed cookie
    let res = app.send(with_cookie(get("/api/auth/get-session"), &pair)).await;
    let view = body_json(res).await;
    assert_eq!(view["user"]["email"], "ada@example.com");
    assert_eq!(view["session"]["token"], token.as_str());

    // The raw token is not a valid signed cookie
    let forged = format!("todo.session_token={token}");
    let res = app.send(with_cookie(get("/api/auth/get-session"), &forged)).await;
    assert_eq!(body_json(res).await, Value::Null);

    // Bearer header
    let res = app.send(with_bearer(get("/api/auth/get-session"), &token)).await;
    assert_eq!(body_json(res).await["user"]["name"], "Ada");
}

#[tokio::test]
async fn test_sign_out_invalidates_session() {
    let app = app().await;
    let res = app
        .send(json_post(
            "/api/auth/sign-up/email",
            json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}),
        ))
        .await;
    let pair = session_cookie_pair(&res).unwrap();
    let token = body_json(res).await["token"].as_str().unwrap().to_string();

    let res = app
        .send(with_cookie(json_post("/api/auth/sign-out", json!({})), &pair))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cleared = res.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cleared.starts_with("todo.session_token="));
    assert_eq!(body_json(res).await, json!({"success": true}));

    let res = app.send(with_bearer(get("/api/auth/get-session"), &token)).await;
    assert_eq!(body_json(res).await, Value::Null);

    let res = app.send(with_bearer(get("/trpc/privateData"), &token)).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Signing out twice is fine
    let res = app
        .send(with_bearer(json_post("/api/auth/sign-out", json!({})), &token))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let app = app().await;
    let token = app.sign_up("Ada", "ada@example.com", "password123").await;

    sqlx::query("UPDATE sessions SET expires_at = '2000-01-01T00:00:00.000000Z' WHERE token = ?")
        .bind(&token)
        .execute(&app.state.pool)
        .await
        .unwrap();

    let res = app.send(with_bearer(get("/api/auth/get-session"), &token)).await;
    assert_eq!(body_json(res).await, Value::Null);

    let res = app.send(with_bearer(get("/trpc/privateData"), &token)).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
        .fetch_one(&app.state.pool)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn test_untrusted_origin_is_rejected() {
    let app = app().await;

    let mut req = json_post(
        "/api/auth/sign-up/email",
        json!({"name": "Eve", "email": "eve@example.com", "password": "password123"}),
    );
    req.headers_mut()
        .insert(header::ORIGIN, "http://evil.example".parse().unwrap());
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(res).await["code"], "INVALID_ORIGIN");

    let mut req = json_post(
        "/api/auth/sign-up/email",
        json!({"name": "Ada", "email": "ada@example.com", "password": "password123"}),
    );
    req.headers_mut()
        .insert(header::ORIGIN, WEB_ORIGIN.parse().unwrap());
    let res = app.send(req).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_auth_path() {
    let app = app().await;
    let res = app.send(get("/api/auth/callback/google")).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(res).await["code"], "NOT_FOUND");
}
