use actix_web::{web, App, HttpServer};
use backend::infra::state::build_state;
use backend::middleware::cors::cors_middleware;
use backend::middleware::request_log::RequestLog;
use backend::routes;
use db_infra::{DbConfig, RuntimeEnv};
use tracing::{error, info};

mod telemetry;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let environment = std::env::var("ENVIRONMENT")
        .ok()
        .and_then(|raw| raw.parse::<RuntimeEnv>().ok())
        .unwrap_or(RuntimeEnv::Development);
    telemetry::init_tracing(environment.as_str());

    let host = std::env::var("BACKEND_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = match std::env::var("BACKEND_PORT") {
        Ok(raw) => match raw.parse::<u16>() {
            Ok(port) => port,
            Err(_) => {
                error!(value = %raw, "BACKEND_PORT must be a valid port number");
                std::process::exit(1);
            }
        },
        Err(_) => DEFAULT_PORT,
    };

    let db_config = match DbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid database configuration");
            std::process::exit(1);
        }
    };
    info!(
        env = %db_config.env,
        db_kind = ?db_config.kind(),
        url = %db_config.sanitized_url(),
        pool_size = db_config.pool_size,
        "startup=configured"
    );

    let app_state = match build_state().with_db(db_config).build().await {
        Ok(state) => state,
        Err(e) => {
            error!(kind = %e.kind(), message = %e, "failed to build application state");
            std::process::exit(1);
        }
    };

    let data = web::Data::new(app_state);
    let shutdown_state = data.clone();

    info!(%host, port, "startup=listening");
    HttpServer::new(move || {
        App::new()
            .wrap(cors_middleware())
            .wrap(RequestLog)
            .app_data(data.clone())
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .run()
    .await?;

    shutdown_state.shutdown().await;
    info!("shutdown=complete");
    Ok(())
}
