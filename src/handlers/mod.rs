pub mod frontend;
pub mod notes;
pub mod preflight;
pub mod upload;

use crate::health;
use actix_web::web;

/// Register every route the server exposes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Text bodies are small; the summarize extractor buffers them before parsing
    cfg.app_data(web::FormConfig::default().limit(upload::MAX_TEXT_FIELD_BYTES))
        .app_data(web::PayloadConfig::new(2 * upload::MAX_TEXT_FIELD_BYTES))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(health::health_check))
                .route("/metrics", web::get().to(health::detailed_metrics))
                .route("/transcribe", web::post().to(notes::transcribe))
                .route("/summarize", web::post().to(notes::summarize))
                .route("/process", web::post().to(notes::process))
                .route("/preflight", web::get().to(preflight::preflight)),
        )
        .route("/health", web::get().to(health::health_check))
        .route("/", web::get().to(frontend::index))
        .route("/static/{path:.*}", web::get().to(frontend::static_file));
}
