use crate::state::{AppState, RequestSample};
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    time::Instant,
};

/// Records every finished request in [`AppState`]: route, status, latency and
/// declared upload size.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        // Route patterns keep /static/{path} and friends to a single entry
        let route = req
            .match_pattern()
            .unwrap_or_else(|| req.uri().path().to_string());
        let endpoint = format!("{} {}", req.method(), route);
        let bytes_in = declared_length(&req);
        let app_state = req.app_data::<web::Data<AppState>>().cloned();

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;

            if let Some(app_state) = app_state {
                let status = match &result {
                    Ok(response) => response.status(),
                    Err(e) => e.as_response_error().status_code(),
                };
                app_state.record_request(&RequestSample {
                    endpoint,
                    status,
                    duration_ms: start_time.elapsed().as_millis() as u64,
                    bytes_in,
                });
            }

            result
        })
    }
}

/// Body size from `Content-Length`; chunked uploads count as zero.
fn declared_length(req: &ServiceRequest) -> u64 {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::test_support::FakeLoader;
    use actix_web::{test, App, HttpResponse};
    use std::sync::Arc;

    fn state() -> AppState {
        AppState::with_loader(AppConfig::default(), Arc::new(FakeLoader::with_segments(&[])), None).unwrap()
    }

    #[actix_web::test]
    async fn test_requests_are_counted_per_route() {
        let state = state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route("/static/{path}", web::get().to(HttpResponse::NotFound)),
        )
        .await;

        for uri in ["/static/a.js", "/static/b.css"] {
            test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        }

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.error_count, 2);
        assert_eq!(metrics.endpoint_metrics["GET /static/{path}"].request_count, 2);
    }

    #[actix_web::test]
    async fn test_upload_sizes_and_handler_errors_are_recorded() {
        let state = state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .wrap(MetricsMiddleware)
                .route(
                    "/api/transcribe",
                    web::post().to(|| async {
                        Err::<HttpResponse, _>(crate::error::AppError::Internal("Transcription failed: bad codec".into()))
                    }),
                ),
        )
        .await;

        let request = test::TestRequest::post()
            .uri("/api/transcribe")
            .set_payload(vec![0u8; 2048])
            .to_request();
        test::call_service(&app, request).await;

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.error_count, 1);
        let transcribe = &metrics.endpoint_metrics["POST /api/transcribe"];
        assert_eq!(transcribe.bytes_received, 2048);
        assert_eq!(transcribe.error_count, 1);
    }
}
