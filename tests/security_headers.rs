#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use kanjou_board::repo::inmem::InMemRepo;
use kanjou_board::{config, AppState, SecurityHeaders};
use std::sync::Arc;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("KANJOU_DATA_DIR", tmp.path().to_str().unwrap());
}

#[actix_web::test]
#[serial_test::serial]
async fn test_security_headers_present() {
    setup_env();
    std::env::remove_var("ENABLE_HSTS");
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState { repo: Arc::new(repo), rate_limiter: None }))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/diaries").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert!(headers.get("content-security-policy").is_some());
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
}

#[actix_web::test]
#[serial_test::serial]
async fn test_hsts_enabled_via_builder() {
    setup_env();
    let repo = InMemRepo::new();
    let sec = SecurityHeaders::from_env().with_hsts(true);
    let app = test::init_service(
        App::new()
            .wrap(sec)
            .app_data(actix_web::web::Data::new(AppState { repo: Arc::new(repo), rate_limiter: None }))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/diaries").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert!(
        resp.headers().get("strict-transport-security").is_some(),
        "HSTS header missing"
    );
}

#[actix_web::test]
#[serial_test::serial]
async fn test_env_var_enables_hsts() {
    setup_env();
    std::env::set_var("ENABLE_HSTS", "1");
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(AppState { repo: Arc::new(repo), rate_limiter: None }))
            .configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/diaries").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_some());
    std::env::remove_var("ENABLE_HSTS");
}
