use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = &state.config;
    let loaded_models = state.transcriber.models().loaded_models().await;

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": error_rate(metrics.error_count, metrics.request_count),
            "active_transcriptions": metrics.active_transcriptions
        },
        "memory": get_memory_info(),
        "models": {
            "whisper": {
                "default": config.models.whisper_model,
                "compute_type": config.models.compute_type,
                "loaded": loaded_models
            },
            "local_llm": {
                "url": config.local_llm.base_url,
                "model": config.local_llm.model
            },
            "hosted_llm": {
                "model": config.hosted_llm.model,
                "configured": config.hosted_llm.api_key.is_some()
            }
        }
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let mut endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "max_duration_ms": metric.max_duration_ms,
                "total_duration_ms": metric.total_duration_ms,
                "bytes_received": metric.bytes_received
            })
        })
        .collect();
    endpoint_stats.sort_by(|a, b| a["endpoint"].as_str().cmp(&b["endpoint"].as_str()));

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": error_rate(metrics.error_count, metrics.request_count),
            "active_transcriptions": metrics.active_transcriptions,
            "completed_transcriptions": metrics.completed_transcriptions,
            "requests_per_second": if uptime_seconds > 0 {
                metrics.request_count as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "endpoints": endpoint_stats,
        "memory": get_memory_info()
    }))
}

fn error_rate(errors: u64, requests: u64) -> f64 {
    if requests > 0 {
        errors as f64 / requests as f64
    } else {
        0.0
    }
}

fn get_memory_info() -> serde_json::Value {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) {
            let field_bytes = |name: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map(|kb| kb * 1024)
                    .unwrap_or(0)
            };

            return json!({
                "resident_memory_bytes": field_bytes("VmRSS:"),
                "virtual_memory_bytes": field_bytes("VmSize:"),
                "available": true
            });
        }
    }

    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": format!("Memory info not available for pid {}", process::id())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::test_support::FakeLoader;
    use crate::transcription::SpeechModel;
    use actix_web::{test, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_health_reports_loaded_models() {
        let state = AppState::with_loader(AppConfig::default(), Arc::new(FakeLoader::with_segments(&[])), None).unwrap();
        state.transcriber.models().get(SpeechModel::Base).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/health").to_request()).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["models"]["whisper"]["default"], "tiny.en");
        assert_eq!(body["models"]["whisper"]["loaded"], json!(["base"]));
        assert_eq!(body["models"]["hosted_llm"]["configured"], false);
    }

    #[actix_web::test]
    async fn test_detailed_metrics_lists_endpoints() {
        let state = AppState::with_loader(AppConfig::default(), Arc::new(FakeLoader::with_segments(&[])), None).unwrap();
        state.record_request(&crate::state::RequestSample {
            endpoint: "POST /api/process".to_string(),
            status: actix_web::http::StatusCode::OK,
            duration_ms: 1200,
            bytes_in: 32_000,
        });

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/metrics", web::get().to(detailed_metrics)),
        )
        .await;
        let body: serde_json::Value =
            test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/metrics").to_request()).await;

        assert_eq!(body["overall"]["total_requests"], 1);
        assert_eq!(body["endpoints"][0]["endpoint"], "POST /api/process");
        assert_eq!(body["endpoints"][0]["max_duration_ms"], 1200);
        assert_eq!(body["endpoints"][0]["bytes_received"], 32_000);
    }
}
