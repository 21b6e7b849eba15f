use std::future::{ready, Ready};
use std::time::Instant;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::StatusCode;
use actix_web::Error as ActixError;
use futures_util::future::LocalBoxFuture;
use tracing::{error, info, warn, Level};

/// Emits one `request_completed` event per request. The level follows the
/// status class: 5xx is an error, 4xx a warning, everything else info.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLog;

/// What is captured before the request is handed on.
#[derive(Debug)]
struct RequestLine {
    method: String,
    path: String,
    client: String,
    started: Instant,
}

impl RequestLine {
    fn capture(req: &ServiceRequest) -> Self {
        let client = req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_owned)
            .unwrap_or_else(|| "unknown".into());
        Self {
            method: req.method().as_str().to_owned(),
            path: req.path().to_owned(),
            client,
            started: Instant::now(),
        }
    }

    fn finish(self, status: StatusCode) {
        let code = status.as_u16();
        let duration_ms = self.started.elapsed().as_millis() as u64;
        let (method, path, client) = (&self.method, &self.path, &self.client);
        let level = level_for(status);
        if level == Level::ERROR {
            error!(http.method = %method, url.path = %path, http.status_code = code, duration_ms, client.addr = %client, "request_completed");
        } else if level == Level::WARN {
            warn!(http.method = %method, url.path = %path, http.status_code = code, duration_ms, client.addr = %client, "request_completed");
        } else {
            info!(http.method = %method, url.path = %path, http.status_code = code, duration_ms, client.addr = %client, "request_completed");
        }
    }
}

fn level_for(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestLog
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type InitError = ();
    type Transform = RequestLogService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, inner: S) -> Self::Future {
        ready(Ok(RequestLogService { inner }))
    }
}

pub struct RequestLogService<S> {
    inner: S,
}

impl<S, B> Service<ServiceRequest> for RequestLogService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = ActixError>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = ActixError;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(inner);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let line = RequestLine::capture(&req);
        let pending = self.inner.call(req);

        Box::pin(async move {
            let outcome = pending.await;
            line.finish(match &outcome {
                Ok(res) => res.status(),
                Err(err) => err.as_response_error().status_code(),
            });
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use actix_web::test::{call_service, init_service, TestRequest};
    use actix_web::{web, App, HttpResponse};

    use super::*;

    #[test]
    fn level_follows_status_class() {
        assert_eq!(level_for(StatusCode::OK), Level::INFO);
        assert_eq!(level_for(StatusCode::NOT_FOUND), Level::WARN);
        assert_eq!(level_for(StatusCode::SERVICE_UNAVAILABLE), Level::ERROR);
    }

    #[actix_web::test]
    async fn passes_responses_through() {
        let app = init_service(
            App::new()
                .wrap(RequestLog)
                .route("/teapot", web::get().to(|| async { HttpResponse::ImATeapot().finish() })),
        )
        .await;
        let res = call_service(&app, TestRequest::get().uri("/teapot").to_request()).await;
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
    }
}
