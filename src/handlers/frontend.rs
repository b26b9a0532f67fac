//! Serves the recording page and its static assets from the frontend directory.

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use std::path::{Component, Path, PathBuf};

pub async fn index(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    serve(&state.config.frontend.dir.join("index.html")).await
}

pub async fn static_file(state: web::Data<AppState>, path: web::Path<String>) -> AppResult<HttpResponse> {
    let relative = safe_relative_path(&path)
        .ok_or_else(|| AppError::NotFound(format!("No such asset: {}", path.as_str())))?;
    serve(&state.config.frontend.dir.join(relative)).await
}

/// Reject anything that could step outside the frontend directory.
fn safe_relative_path(raw: &str) -> Option<PathBuf> {
    let path = Path::new(raw);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

async fn serve(path: &Path) -> AppResult<HttpResponse> {
    let is_file = tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false);
    if !is_file {
        return Err(AppError::NotFound(format!("No such asset: {}", path.display())));
    }

    let body = tokio::fs::read(path).await?;
    Ok(HttpResponse::Ok().content_type(content_type_for(path)).body(body))
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
