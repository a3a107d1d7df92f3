// src/handlers.rs
use crate::services::DownloadSource;
use crate::{AppState, errors::EditorError, models::*};
use actix_web::http::header;
use actix_web::{HttpRequest, HttpResponse, ResponseError, web};
use uuid::Uuid;

const DEFAULT_ACTIONS_LIMIT: usize = 100;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/upload", web::post().to(upload_image))
            .route("/process", web::post().to(process_image))
            .route("/download", web::post().to(download_image))
            .route("/results/{request_id}", web::get().to(get_result))
            .route("/stats", web::get().to(processing_stats))
            .route("/actions", web::get().to(recent_actions))
            .route("/actions/{image_id}", web::get().to(image_actions)),
    );
}

/// JSON extractor config: malformed or oversized bodies become validation errors.
pub fn json_config(limit: usize) -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(limit)
        .error_handler(|err, _req| {
            EditorError::Validation(format!("Invalid request body: {}", err)).into()
        })
}

fn client_info(req: &HttpRequest) -> ClientInfo {
    ClientInfo {
        user_agent: req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ip_address: req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string),
    }
}

pub async fn health_check(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "message": "AI Image Editor API is running",
        "version": env!("CARGO_PKG_VERSION"),
        "ai_configured": data.orchestrator.is_ai_configured()
    }))
}

pub async fn upload_image(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<ImagePayload>,
) -> Result<HttpResponse, EditorError> {
    let client = client_info(&req);
    let image = body.into_inner().image.unwrap_or_default();

    let receipt = data.orchestrator.upload(&image, &client).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Image uploaded successfully",
        "image_id": receipt.image_id,
        "metadata": {
            "width": receipt.metadata.width,
            "height": receipt.metadata.height,
            "format": receipt.metadata.format,
            "mode": receipt.metadata.mode
        }
    })))
}

pub async fn process_image(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<ProcessPayload>,
) -> HttpResponse {
    let client = client_info(&req);
    let request = body.into_inner().into_edit_request();

    let result = data.orchestrator.process(request, &client).await;

    match result.outcome {
        Ok(edit) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "processed_image": edit.processed_image,
            "message": "Object removal completed using mask-based approach",
            "processing_time": result.processing_time,
            "request_id": result.request_id,
            "ai_analysis": edit.analysis,
            "mask_generated": true,
            "coordinates_processed": edit.coordinates_processed
        })),
        Err(e) => HttpResponse::build(e.status_code()).json(serde_json::json!({
            "success": false,
            "error": e.to_string(),
            "request_id": result.request_id,
            "processing_time": result.processing_time
        })),
    }
}

pub async fn download_image(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<DownloadPayload>,
) -> Result<HttpResponse, EditorError> {
    let client = client_info(&req);
    let payload = body.into_inner();

    let source = match (payload.request_id, payload.image) {
        (Some(request_id), _) => DownloadSource::Stored(request_id),
        (None, Some(image)) => DownloadSource::Image(image),
        (None, None) => {
            return Err(EditorError::Validation("No image data provided".to_string()));
        }
    };

    let file = data.orchestrator.prepare_download(source, &client).await?;

    Ok(HttpResponse::Ok()
        .content_type("image/png")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file.filename),
        ))
        .insert_header(("X-Download-Id", file.download_id.to_string()))
        .body(file.bytes))
}

pub async fn get_result(
    path: web::Path<Uuid>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, EditorError> {
    let request_id = path.into_inner();

    let stored = data
        .orchestrator
        .get_result(&request_id)
        .await?
        .ok_or_else(|| EditorError::NotFound(format!("No result for request {}", request_id)))?;

    Ok(HttpResponse::Ok().json(&stored))
}

pub async fn processing_stats(data: web::Data<AppState>) -> Result<HttpResponse, EditorError> {
    let stats = data.orchestrator.stats().await?;
    Ok(HttpResponse::Ok().json(&stats))
}

pub async fn recent_actions(
    data: web::Data<AppState>,
    query: web::Query<ActionsQuery>,
) -> Result<HttpResponse, EditorError> {
    let limit = query.limit.unwrap_or(DEFAULT_ACTIONS_LIMIT);
    let actions = data.orchestrator.actions().recent(limit).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "actions": actions,
        "count": actions.len()
    })))
}

pub async fn image_actions(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, EditorError> {
    let image_id = path.into_inner();
    let actions = data.orchestrator.actions().query_by_image(&image_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "image_id": image_id,
        "actions": actions,
        "count": actions.len()
    })))
}
