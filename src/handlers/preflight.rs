//! Readiness report for the recording page.
//!
//! Pings the local LLM and loads (or reuses) the requested recognition model
//! so the first real request doesn't pay the download cost. Failures are
//! reported in the body; the endpoint itself always answers 200.

use crate::state::AppState;
use crate::transcription::SpeechModel;
use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

const MIC_DETAIL: &str = "Mic availability is checked in-browser by the frontend.";

#[derive(Debug, Deserialize)]
pub struct PreflightQuery {
    pub whisper_model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PreflightReport {
    pub timestamp_utc: String,
    pub mic: CheckResult,
    pub ollama: CheckResult,
    pub whisper: WhisperCheck,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    /// `None` when the server cannot tell
    pub ok: Option<bool>,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct WhisperCheck {
    pub ok: bool,
    pub detail: String,
    pub model: SpeechModel,
}

pub async fn preflight(state: web::Data<AppState>, query: web::Query<PreflightQuery>) -> HttpResponse {
    let model = SpeechModel::resolve(query.whisper_model.as_deref(), state.config.models.whisper_model);

    let (ollama, whisper) = tokio::join!(state.local_llm.ping(), state.transcriber.models().get(model));

    let ollama = match ollama {
        Ok(()) => CheckResult {
            ok: Some(true),
            detail: "reachable".to_string(),
        },
        Err(e) => {
            tracing::warn!(url = state.local_llm.base_url(), error = %e, "Local LLM ping failed");
            CheckResult {
                ok: Some(false),
                detail: e.to_string(),
            }
        }
    };

    let whisper = match whisper {
        Ok(_) => WhisperCheck {
            ok: true,
            detail: "loaded".to_string(),
            model,
        },
        Err(e) => {
            tracing::warn!(model = %model, error = %e, "Speech model not ready");
            WhisperCheck {
                ok: false,
                detail: e.to_string(),
                model,
            }
        }
    };

    HttpResponse::Ok().json(PreflightReport {
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        mic: CheckResult {
            ok: None,
            detail: MIC_DETAIL.to_string(),
        },
        ollama,
        whisper,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_app, test_state, FakeLoader};
    use actix_web::test;
    use serde_json::Value;

    #[actix_web::test]
    async fn test_preflight_reports_each_check() {
        let app = test_app!(test_state(FakeLoader::with_segments(&[])));

        let request = test::TestRequest::get().uri("/api/preflight?whisper_model=base").to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;

        assert!(body["mic"]["ok"].is_null());
        assert_eq!(body["mic"]["detail"], MIC_DETAIL);
        assert_eq!(body["ollama"]["ok"], false);
        assert!(!body["ollama"]["detail"].as_str().unwrap().is_empty());
        assert_eq!(body["whisper"]["ok"], true);
        assert_eq!(body["whisper"]["detail"], "loaded");
        assert_eq!(body["whisper"]["model"], "base");
        assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp_utc"].as_str().unwrap()).is_ok());
    }

    #[actix_web::test]
    async fn test_preflight_model_failure_is_reported() {
        let app = test_app!(test_state(FakeLoader::with_segments(&[]).failing_first_loads(1)));

        let request = test::TestRequest::get().uri("/api/preflight?whisper_model=nope").to_request();
        let body: Value = test::call_and_read_body_json(&app, request).await;

        assert_eq!(body["whisper"]["ok"], false);
        assert_eq!(body["whisper"]["model"], "tiny.en");
        assert!(body["whisper"]["detail"].as_str().unwrap().contains("weights unavailable"));
    }
}
