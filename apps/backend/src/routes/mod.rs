use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::health::DEFAULT_SERVICE_NAME;

pub mod health;

pub async fn root() -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Welcome to {DEFAULT_SERVICE_NAME}"),
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Register every route. `main.rs` and the HTTP tests share this.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(root));
    cfg.service(web::scope("/health").configure(health::configure_routes));
}
