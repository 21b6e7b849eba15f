//! Health routes and the JSON error contract over HTTP.

mod common;

use actix_web::http::StatusCode;
use actix_web::{test, web, App, HttpResponse};
use backend::db::require_sessions;
use backend::{routes, AppError, AppState, ServiceInfo};
use backend_test_support::assert_error_body;
use serde_json::Value;

async fn missing_politician() -> Result<HttpResponse, AppError> {
    Err(AppError::not_found("politician", 42))
}

async fn exploding() -> Result<HttpResponse, AppError> {
    Err(AppError::internal())
}

async fn create_duplicate(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let sessions = require_sessions(&state)?;
    sessions
        .with_transaction(|s| {
            Box::pin(async move {
                common::insert_politician(s, "Twice").await?;
                common::insert_politician(s, "Twice").await
            })
        })
        .await?;
    Ok(HttpResponse::Created().finish())
}

fn test_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/test/missing", web::get().to(missing_politician))
        .route("/test/explode", web::get().to(exploding))
        .route("/test/duplicate", web::post().to(create_duplicate));
}

#[actix_web::test]
async fn liveness_and_banner() {
    let state = AppState::without_storage(ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("Sauce Bottle"));
}

#[actix_web::test]
async fn storage_checks_without_storage_are_503() {
    let state = AppState::without_storage(ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(routes::configure),
    )
    .await;

    for uri in ["/health/db", "/health/db/detailed", "/health/db/migrations"] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["healthy"], false);
        assert_eq!(body["notes"][0], "storage not configured");
    }
}

#[actix_web::test]
async fn storage_checks_follow_pool_state() {
    let (_db, provider) = common::migrated_provider(2).await;
    let state = AppState::new(provider.clone(), ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health/db").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["storage_connected"], true);
    assert_eq!(body["engine"], "sqlite");

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/health/db/detailed").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["row_counts"]["politicians"], 0);
    assert_eq!(body["migrations"]["pending_count"], 0);

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/health/db/migrations").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    state.shutdown().await;
    let resp = test::call_service(&app, test::TestRequest::get().uri("/health/db").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["healthy"], false);
    assert_eq!(body["status"], "unavailable");
}

#[actix_web::test]
async fn not_found_body_carries_details() {
    let state = AppState::without_storage(ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(test_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/test/missing").to_request()).await;
    let status = resp.status();
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    let bytes = test::read_body(resp).await;
    let body = assert_error_body(status, &bytes, "NOT_FOUND", StatusCode::NOT_FOUND);
    let details = body.details.unwrap();
    assert_eq!(details["resourceId"], 42);
    assert_eq!(details["resourceType"], "politician");
}

#[actix_web::test]
async fn internal_body_has_no_details() {
    let state = AppState::without_storage(ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(test_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/test/explode").to_request()).await;
    let status = resp.status();
    let bytes = test::read_body(resp).await;
    let body = assert_error_body(status, &bytes, "INTERNAL", StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.details.is_none());
}

#[actix_web::test]
async fn storage_conflict_maps_to_409() {
    let (_db, provider) = common::migrated_provider(2).await;
    let state = AppState::new(provider.clone(), ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(test_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::post().uri("/test/duplicate").to_request()).await;
    let status = resp.status();
    let bytes = test::read_body(resp).await;
    let body = assert_error_body(status, &bytes, "CONFLICT", StatusCode::CONFLICT);
    let details = body.details.unwrap();
    assert_eq!(details["resourceType"], "politicians");
    assert_eq!(details["conflictingField"], "name");
    assert_eq!(common::count_politicians(&provider).await, 0);
}

#[actix_web::test]
async fn missing_storage_in_handler_is_503() {
    let state = AppState::without_storage(ServiceInfo::for_tests());
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .configure(test_routes),
    )
    .await;

    let resp = test::call_service(&app, test::TestRequest::post().uri("/test/duplicate").to_request()).await;
    let status = resp.status();
    let bytes = test::read_body(resp).await;
    assert_error_body(status, &bytes, "STORAGE_UNAVAILABLE", StatusCode::SERVICE_UNAVAILABLE);
}
