pub mod cors;
pub mod request_log;

pub use cors::cors_middleware;
pub use request_log::RequestLog;
