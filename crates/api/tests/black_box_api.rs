use std::collections::HashMap;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use xadmin_api::config::AppConfig;

const ADMIN_USERNAME: &str = "admin";
const ADMIN_PASSWORD: &str = "Admin12345";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(jwt_secret: &str) -> Self {
        // Same router as prod over the in-memory store, bound to an ephemeral port.
        let vars: HashMap<&str, String> = HashMap::from([
            ("XADMIN_SECRET_KEY", jwt_secret.to_string()),
            ("XADMIN_BCRYPT_COST", "4".to_string()),
            ("XADMIN_ADMIN_USERNAME", ADMIN_USERNAME.to_string()),
            ("XADMIN_ADMIN_PASSWORD", ADMIN_PASSWORD.to_string()),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).cloned()).expect("valid test config");
        let app = xadmin_api::app::build_app(&config)
            .await
            .expect("failed to build app");

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(jwt_secret: &str, subject: &str, uid: Option<&str>, lifetime: ChronoDuration) -> String {
    let now = Utc::now();
    let mut claims = json!({
        "sub": subject,
        "iat": now.timestamp(),
        "exp": (now + lifetime).timestamp(),
    });
    if let Some(uid) = uid {
        claims["uid"] = json!(uid);
    }

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn login(client: &reqwest::Client, srv: &TestServer, username: &str, password: &str) -> Value {
    let res = client
        .post(srv.url("/api/auth/login/basic"))
        .json(&json!({ "username": username, "password": password }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK, "login failed for {username}");
    let body: Value = res.json().await.unwrap();
    body["data"].clone()
}

async fn admin_token(client: &reqwest::Client, srv: &TestServer) -> String {
    login(client, srv, ADMIN_USERNAME, ADMIN_PASSWORD).await["access_token"]
        .as_str()
        .unwrap()
        .to_string()
}

async fn post_ok(client: &reqwest::Client, srv: &TestServer, token: &str, path: &str, body: Value) -> Value {
    let res = client
        .post(srv.url(path))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = res.status();
    let body: Value = res.json().await.unwrap();
    assert_eq!(status, StatusCode::OK, "POST {path} failed: {body}");
    body["data"].clone()
}

/// Create a user whose only grant is `GET /api/system/user` via a role.
async fn user_with_list_grant(client: &reqwest::Client, srv: &TestServer, admin: &str) -> Value {
    let menu = post_ok(
        client,
        srv,
        admin,
        "/api/system/menu",
        json!({
            "name": "user-list",
            "path": "/api/system/user",
            "method": "GET",
            "permission": "system:user:list",
            "menu_type": "permission",
        }),
    )
    .await;
    let role = post_ok(
        client,
        srv,
        admin,
        "/api/system/role",
        json!({ "name": "Viewer", "code": "viewer", "menu_ids": [menu["id"]] }),
    )
    .await;
    post_ok(
        client,
        srv,
        admin,
        "/api/system/user",
        json!({ "username": "viewer", "password": "Viewer123", "role_ids": [role["id"]] }),
    )
    .await
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn("test-secret").await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let res = client.get(srv.url("/api/system/user")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthenticated");

    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn tokens_for_unknown_users_or_other_secrets_are_rejected() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let ghost = mint_jwt(jwt_secret, "ghost", None, ChronoDuration::minutes(10));
    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(ghost)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let admin_id = login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let unbound = mint_jwt(jwt_secret, ADMIN_USERNAME, None, ChronoDuration::minutes(10));
    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(unbound)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = mint_jwt("other-secret", ADMIN_USERNAME, Some(&admin_id), ChronoDuration::minutes(10));
    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(forged)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let expired = mint_jwt(jwt_secret, ADMIN_USERNAME, Some(&admin_id), ChronoDuration::minutes(-5));
    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(expired)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn superuser_token_reaches_every_admin_route() {
    let jwt_secret = "test-secret";
    let srv = TestServer::spawn(jwt_secret).await;
    let client = reqwest::Client::new();

    let admin_id = login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await["user"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let token = mint_jwt(jwt_secret, ADMIN_USERNAME, Some(&admin_id), ChronoDuration::minutes(10));
    for path in [
        "/api/system/user",
        "/api/system/role",
        "/api/system/menu/tree",
        "/api/system/dept",
        "/api/system/permission",
        "/api/settings/config",
        "/api/system/logs/login",
    ] {
        let res = client.get(srv.url(path)).bearer_auth(&token).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK, "GET {path}");
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["code"], 1000);
    }
}

#[tokio::test]
async fn login_issues_tokens_that_grant_access() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let data = login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    assert_eq!(data["token_type"], "bearer");
    assert_eq!(data["user"]["username"], ADMIN_USERNAME);
    assert!(data["user"].get("password_hash").is_none());

    let token = data["access_token"].as_str().unwrap();
    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["is_superuser"], true);
    assert_eq!(body["data"]["grant"]["basis"], "superuser");
    assert!(body["data"]["last_login"].is_string());

    let res = client
        .post(srv.url("/api/auth/login/basic"))
        .json(&json!({ "username": ADMIN_USERNAME, "password": "wrong-Password1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_tokens_renew_but_never_authorize_requests() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let data = login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    let refresh = data["refresh_token"].as_str().unwrap().to_string();
    let access = data["access_token"].as_str().unwrap().to_string();

    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(&refresh)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/api/auth/refresh"))
        .json(&json!({ "refresh_token": refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["data"]["access_token"].is_string());

    let res = client
        .post(srv.url("/api/auth/refresh"))
        .json(&json!({ "refresh_token": access }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_without_grants_is_forbidden_but_keeps_whitelisted_routes() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();
    let admin = admin_token(&client, &srv).await;

    post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/user",
        json!({ "username": "nobody", "password": "Nobody123" }),
    )
    .await;
    let token = login(&client, &srv, "nobody", "Nobody123").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = client
        .get(srv.url("/api/system/userinfo"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["grant"]["basis"], "whitelist");
    assert_eq!(body["data"]["grant"]["all_fields"], true);

    let res = client
        .post(srv.url("/api/auth/logout"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn role_grant_covers_method_and_search_columns_alias() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();
    let admin = admin_token(&client, &srv).await;

    let viewer = user_with_list_grant(&client, &srv, &admin).await;
    let token = login(&client, &srv, "viewer", "Viewer123").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/api/system/user/search-columns"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .delete(srv.url(&format!("/api/system/user/{}", viewer["id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn removing_roles_revokes_access_immediately() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();
    let admin = admin_token(&client, &srv).await;

    let viewer = user_with_list_grant(&client, &srv, &admin).await;
    let token = login(&client, &srv, "viewer", "Viewer123").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .put(srv.url(&format!("/api/system/user/{}/roles", viewer["id"].as_str().unwrap())))
        .bearer_auth(&admin)
        .json(&json!({ "role_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn explain_reports_the_decision_for_the_caller() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();
    let admin = admin_token(&client, &srv).await;

    let viewer = user_with_list_grant(&client, &srv, &admin).await;
    let token = login(&client, &srv, "viewer", "Viewer123").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .get(srv.url("/api/system/permission/explain"))
        .query(&[("path", "/api/system/role"), ("method", "DELETE")])
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["granted"], false);

    // Explaining someone else requires staff.
    let other = viewer["id"].as_str().unwrap();
    let res = client
        .get(srv.url("/api/system/permission/explain"))
        .query(&[("path", "/api/system/user"), ("user_id", other)])
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["granted"], true);
    assert_eq!(body["data"]["basis"], "permission");
}

#[tokio::test]
async fn registration_enforces_password_strength() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/auth/register"))
        .json(&json!({ "username": "newbie", "password": "short1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "weak_password");
    assert!(body["data"].as_array().unwrap().len() >= 2);

    let res = client
        .post(srv.url("/api/auth/register"))
        .json(&json!({ "username": "newbie", "password": "Newbie123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["data"]["access_token"].is_string());
}

#[tokio::test]
async fn self_deletion_is_refused() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let data = login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    let token = data["access_token"].as_str().unwrap();
    let id = data["user"]["id"].as_str().unwrap();

    let res = client
        .delete(srv.url(&format!("/api/system/user/{id}")))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reused_username_does_not_inherit_a_deleted_accounts_tokens() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();
    let admin = admin_token(&client, &srv).await;

    let bob = post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/user",
        json!({ "username": "bob", "password": "Bobby1234" }),
    )
    .await;
    let stale = login(&client, &srv, "bob", "Bobby1234").await;
    let stale_access = stale["access_token"].as_str().unwrap().to_string();
    let stale_refresh = stale["refresh_token"].as_str().unwrap().to_string();

    let res = client
        .delete(srv.url(&format!("/api/system/user/{}", bob["id"].as_str().unwrap())))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/user",
        json!({ "username": "bob", "password": "NewBob1234", "is_superuser": true }),
    )
    .await;

    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth(&stale_access)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/api/auth/refresh"))
        .json(&json!({ "refresh_token": stale_refresh }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let fresh = login(&client, &srv, "bob", "NewBob1234").await;
    let res = client
        .get(srv.url("/api/system/user"))
        .bearer_auth(fresh["access_token"].as_str().unwrap())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn user_managers_cannot_touch_superuser_accounts() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();
    let admin_login = login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    let admin = admin_login["access_token"].as_str().unwrap().to_string();
    let admin_id = admin_login["user"]["id"].as_str().unwrap().to_string();

    let menu = post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/menu",
        json!({
            "name": "user-manage",
            "path": "/api/system/user",
            "method": "*",
            "permission": "system:user:manage",
            "menu_type": "permission",
        }),
    )
    .await;
    let role = post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/role",
        json!({ "name": "User manager", "code": "user-manager", "menu_ids": [menu["id"]] }),
    )
    .await;
    post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/user",
        json!({ "username": "operator", "password": "Operator123", "role_ids": [role["id"]] }),
    )
    .await;
    let plain = post_ok(
        &client,
        &srv,
        &admin,
        "/api/system/user",
        json!({ "username": "plain", "password": "Plain1234" }),
    )
    .await;
    let operator = login(&client, &srv, "operator", "Operator123").await["access_token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = client
        .post(srv.url(&format!("/api/system/user/{admin_id}/reset-password")))
        .bearer_auth(&operator)
        .json(&json!({ "password": "Hijacked123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .delete(srv.url(&format!("/api/system/user/{admin_id}")))
        .bearer_auth(&operator)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url("/api/system/user/batch-delete"))
        .bearer_auth(&operator)
        .json(&json!({ "ids": [plain["id"], admin_id] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = client
        .post(srv.url(&format!("/api/system/user/{}/reset-password", plain["id"].as_str().unwrap())))
        .bearer_auth(&operator)
        .json(&json!({ "password": "Changed123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    login(&client, &srv, ADMIN_USERNAME, ADMIN_PASSWORD).await;
    login(&client, &srv, "plain", "Changed123").await;
}

#[tokio::test]
async fn login_attempts_are_kept_in_the_login_log() {
    let srv = TestServer::spawn("test-secret").await;
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/api/auth/login/basic"))
        .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
        .header("user-agent", "login-log-test")
        .json(&json!({ "username": "intruder", "password": "Guess12345" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let admin = admin_token(&client, &srv).await;

    let res = client
        .get(srv.url("/api/system/logs/login?succeeded=false"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["total"], 1);
    let failed = &body["data"]["results"][0];
    assert_eq!(failed["username"], "intruder");
    assert_eq!(failed["succeeded"], false);
    assert_eq!(failed["ip_address"], "203.0.113.9");
    assert_eq!(failed["user_agent"], "login-log-test");
    assert!(failed["user_id"].is_null());

    let res = client
        .get(srv.url("/api/system/logs/login?succeeded=true&search=admin"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let succeeded = &body["data"]["results"][0];
    assert_eq!(succeeded["username"], ADMIN_USERNAME);
    assert!(succeeded["user_id"].is_string());
    assert_eq!(succeeded["ip_address"], "127.0.0.1");
}
