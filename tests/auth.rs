#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use kanjou_board::repo::inmem::InMemRepo;
use kanjou_board::routes::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    std::env::set_var("ADMIN_EMAIL", "jin@namisapo.com");
    // sha256("counselor123")
    std::env::set_var(
        "ADMIN_PASSWORD_SHA256",
        "5efd3d99ffa5347945cb96ce0cfc994d55d76a10ed702336aae44f7919db98a2",
    );
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("KANJOU_DATA_DIR", tmp.path().to_str().unwrap());
}

macro_rules! app {
    () => {{
        let repo = InMemRepo::new();
        test::init_service(
            App::new()
                .app_data(actix_web::web::Data::new(AppState {
                    repo: Arc::new(repo),
                    rate_limiter: None,
                }))
                .configure(config),
        )
        .await
    }};
}

#[actix_web::test]
#[serial]
async fn test_admin_login_issues_admin_token() {
    setup_env();
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/admin/login")
        .set_json(&json!({"email": "jin@namisapo.com", "password": "counselor123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    assert!(token.len() > 10);

    // the issued token opens the admin console
    let req = test::TestRequest::get()
        .uri("/api/v1/admin/users")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    // the moderation profile was provisioned on login
    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let me: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(me["role"], "admin");
    assert_eq!(me["profile"]["is_admin"], true);
    assert_eq!(me["profile"]["display_name"], "管理者");
}

#[actix_web::test]
#[serial]
async fn test_admin_login_rejects_bad_credentials() {
    setup_env();
    let app = app!();

    for (email, password) in [
        ("jin@namisapo.com", "wrong-password"),
        ("someone@else.com", "counselor123"),
    ] {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/admin/login")
            .set_json(&json!({"email": email, "password": password}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    // a failed login provisions nothing
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/admin/login")
        .set_json(&json!({"email": "jin@namisapo.com", "password": "counselor123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let token = serde_json::from_slice::<serde_json::Value>(&test::read_body(resp).await).unwrap()
        ["token"]
        .as_str()
        .unwrap()
        .to_string();
    let req = test::TestRequest::get()
        .uri("/api/v1/admin/users")
        .insert_header(("Authorization", format!("Bearer {token}")))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let users: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    // only the admin profile itself exists
    assert_eq!(users.as_array().unwrap().len(), 1);
    assert_eq!(users[0]["id"], "admin:jin@namisapo.com");
}

#[actix_web::test]
#[serial]
async fn test_admin_login_unconfigured_is_rejected() {
    setup_env();
    std::env::remove_var("ADMIN_EMAIL");
    std::env::remove_var("ADMIN_PASSWORD_SHA256");
    let app = app!();

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/admin/login")
        .set_json(&json!({"email": "jin@namisapo.com", "password": "counselor123"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
