use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::health::{HealthReport, HealthStatus};
use crate::state::app_state::AppState;

/// Healthy and degraded reports are served with 200, unavailable with 503.
/// The body is the report either way.
fn respond(report: HealthReport) -> HttpResponse {
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    };
    HttpResponse::build(status).json(report)
}

async fn liveness(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(respond(state.health.liveness()))
}

async fn connectivity(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(respond(state.health.connectivity().await))
}

async fn detailed(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(respond(state.health.detailed().await))
}

async fn migrations(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    Ok(respond(state.health.migrations().await))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(liveness))
        .route("/db", web::get().to(connectivity))
        .route("/db/detailed", web::get().to(detailed))
        .route("/db/migrations", web::get().to(migrations));
}
