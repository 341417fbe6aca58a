#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use kanjou_board::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use kanjou_board::repo::inmem::InMemRepo;
use kanjou_board::routes::{config, AppState};
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("KANJOU_DATA_DIR", tmp.path().to_str().unwrap());
}

fn tight_limiter() -> RateLimiterFacade {
    RateLimiterFacade::new(
        InMemoryRateLimiter::new(true),
        RateLimitConfig {
            entry_limit: 1,
            entry_window: Duration::from_secs(60),
            comment_limit: 1,
            comment_window: Duration::from_secs(60),
        },
    )
}

#[actix_web::test]
#[serial]
async fn test_entry_creation_is_rate_limited() {
    setup_env();
    let repo = InMemRepo::new();
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(AppState {
                repo: Arc::new(repo),
                rate_limiter: Some(tight_limiter()),
            }))
            .configure(config),
    )
    .await;

    let post = || {
        test::TestRequest::post()
            .uri("/api/v1/diaries")
            .peer_addr("9.9.9.9:40000".parse().unwrap())
            .set_json(&json!({"content": "連投テスト"}))
            .to_request()
    };

    let resp = test::call_service(&app, post()).await;
    assert_eq!(resp.status(), 201);

    // second post within the window from the same address is refused
    let resp = test::call_service(&app, post()).await;
    assert_eq!(resp.status(), 429);

    // the refused write must not have touched the board
    let req = test::TestRequest::get().uri("/api/v1/diaries").to_request();
    let resp = test::call_service(&app, req).await;
    let board: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(board.as_array().unwrap().len(), 1);

    // reads and comments use their own budgets
    let entry_id = board[0]["id"].as_str().unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/comments")
        .peer_addr("9.9.9.9:40000".parse().unwrap())
        .set_json(&json!({"diary_id": entry_id, "content": "コメントは別枠"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
}
