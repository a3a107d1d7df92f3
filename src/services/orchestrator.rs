// src/services/orchestrator.rs
use crate::errors::EditorError;
use crate::models::*;
use crate::services::action_log::ActionLog;
use crate::services::image_codec::{ImageCodec, bytes_to_data_uri, to_data_uri};
use crate::services::inpainting_client::{EditedImageRef, InpaintInput, InpaintingClient};
use crate::services::mask_generator::{MaskGenerator, MaskSource};
use crate::services::result_store::{DEFAULT_RECENT_KEYS, ResultStore};
use chrono::Utc;
use log::{debug, error, info, warn};
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

const PROCESSING_METHOD: &str = "mask_based_removal";

/// Lifecycle of one edit request. Failures can happen in any non-terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Validated,
    MaskBuilt,
    AwaitingExternal,
    Completed,
}

impl Stage {
    fn operation(self) -> &'static str {
        match self {
            Stage::Received => "Input validation",
            Stage::Validated => "Image decoding and mask creation",
            Stage::MaskBuilt => "Inpainting request preparation",
            Stage::AwaitingExternal => "AI object removal",
            Stage::Completed => "Result handling",
        }
    }
}

/// Where a download's pixels come from.
#[derive(Debug, Clone)]
pub enum DownloadSource {
    Image(String),
    Stored(Uuid),
}

#[derive(Debug, Clone)]
pub struct DownloadFile {
    pub download_id: Uuid,
    pub filename: String,
    pub bytes: Vec<u8>,
}

pub struct ProcessingOrchestrator {
    codec: ImageCodec,
    masks: MaskGenerator,
    client: Arc<dyn InpaintingClient>,
    results: Arc<dyn ResultStore>,
    actions: Arc<ActionLog>,
    http: Client,
    timeout: Option<Duration>,
}

impl ProcessingOrchestrator {
    pub fn new(
        codec: ImageCodec,
        client: Arc<dyn InpaintingClient>,
        results: Arc<dyn ResultStore>,
        actions: Arc<ActionLog>,
        http: Client,
    ) -> Self {
        Self {
            codec,
            masks: MaskGenerator::new(),
            client,
            results,
            actions,
            http,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn actions(&self) -> &ActionLog {
        &self.actions
    }

    pub fn is_ai_configured(&self) -> bool {
        self.client.is_configured()
    }

    pub async fn upload(
        &self,
        image: &str,
        client: &ClientInfo,
    ) -> Result<UploadReceipt, EditorError> {
        if image.trim().is_empty() {
            warn!("Upload attempt without image data from {:?}", client.ip_address);
            return Err(EditorError::Validation("No image data provided".to_string()));
        }

        let decoded = self.codec.decode(image).inspect_err(|e| {
            error!("Error in Image upload validation: {}", e);
        })?;
        let metadata = self.codec.metadata(&decoded);
        let image_id = Uuid::new_v4();

        self.record(
            ImageAction::new(ActionType::Upload, image_id.to_string(), client)
                .with_metadata("width", metadata.width)
                .with_metadata("height", metadata.height)
                .with_metadata("format", metadata.format.clone())
                .with_metadata("mode", metadata.mode.clone())
                .with_metadata("file_size", metadata.file_size),
        )
        .await;
        info!(
            "Image uploaded - ID: {}, Size: {} bytes",
            image_id, metadata.file_size
        );

        Ok(UploadReceipt { image_id, metadata })
    }

    /// Runs one edit end to end. Never returns early: every outcome, including
    /// validation failures, comes back as a [`ProcessingResult`] carrying the
    /// request id and elapsed time.
    pub async fn process(&self, request: EditRequest, client: &ClientInfo) -> ProcessingResult {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let mut stage = Stage::Received;

        let outcome = self.run(request_id, &request, &mut stage).await;
        let processing_time = started.elapsed().as_secs_f64();

        let outcome = match outcome {
            Ok((processing_request, edit)) => {
                self.complete(&processing_request, &edit, processing_time, client)
                    .await;
                Ok(edit)
            }
            Err(e) => {
                self.fail(request_id, &request, stage, &e, processing_time, client)
                    .await;
                Err(e)
            }
        };

        ProcessingResult {
            request_id,
            processing_time,
            outcome,
        }
    }

    async fn run(
        &self,
        request_id: Uuid,
        request: &EditRequest,
        stage: &mut Stage,
    ) -> Result<(ProcessingRequest, CompletedEdit), EditorError> {
        validate(request)?;
        *stage = Stage::Validated;

        let decoded = self.codec.decode(&request.image)?;
        let processing_request = ProcessingRequest {
            id: request_id,
            image_data: request.image.clone(),
            coordinates: request.coordinates.clone(),
            regions: request.regions.clone(),
            description: request.prompt.clone().unwrap_or_default(),
            timestamp: Utc::now(),
            metadata: self.codec.metadata(&decoded),
        };

        let source = MaskSource::select(&request.regions, &request.coordinates);
        let mask = self.masks.build(decoded.dimensions(), source);
        let mask_uri = to_data_uri(&self.codec.encode(&mask)?);
        *stage = Stage::MaskBuilt;
        debug!("Request {} mask built from {}", request_id, source.describe());

        let input = InpaintInput {
            image: to_data_uri(&request.image),
            mask: mask_uri,
            prompt: request.prompt.clone(),
            params: request.params,
        };

        info!(
            "Starting object removal for request {} with {} using {}",
            request_id,
            self.client.model(),
            source.describe()
        );
        *stage = Stage::AwaitingExternal;
        let edited = self.call_external(input).await?;

        let bytes = self.fetch_edited(edited).await?;
        let (width, height) = self.codec.dimensions_of(&bytes).map_err(|e| {
            EditorError::ExternalService(format!("Unrecognized image in model output: {}", e))
        })?;
        *stage = Stage::Completed;

        let edit = CompletedEdit {
            processed_image: bytes_to_data_uri(&bytes),
            analysis: format!(
                "Successfully removed object using mask-based approach - Generated binary mask from {} - Processed image: {}x{}",
                source.describe(),
                width,
                height
            ),
            mask_source: source.describe(),
            output_dimensions: (width, height),
            coordinates_processed: match source {
                MaskSource::Regions(regions) => regions.len(),
                MaskSource::Polygon(points) => points.len(),
            },
        };

        Ok((processing_request, edit))
    }

    async fn call_external(&self, input: InpaintInput) -> Result<EditedImageRef, EditorError> {
        let call = self.client.inpaint(input);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                EditorError::ExternalService(format!(
                    "Inpainting call timed out after {}s",
                    limit.as_secs_f64()
                ))
            })?,
            None => call.await,
        }
    }

    /// Raw bytes of the edited image, downloading it first when the model
    /// answered with a URL.
    async fn fetch_edited(&self, edited: EditedImageRef) -> Result<Vec<u8>, EditorError> {
        match edited {
            EditedImageRef::Url(url) => {
                let limit = self.codec.max_bytes();
                let download_error = |e: reqwest::Error| {
                    EditorError::ExternalService(format!(
                        "Failed to download processed image: {}",
                        e
                    ))
                };
                let too_large = |size: u64| {
                    EditorError::ExternalService(format!(
                        "Processed image of {} bytes exceeds the {} byte limit",
                        size, limit
                    ))
                };

                let mut response = self.http.get(&url).send().await.map_err(download_error)?;

                if !response.status().is_success() {
                    return Err(EditorError::ExternalService(format!(
                        "Failed to download processed image: HTTP {}",
                        response.status()
                    )));
                }
                if let Some(length) = response.content_length().filter(|l| *l > limit as u64) {
                    return Err(too_large(length));
                }

                let mut body = Vec::new();
                while let Some(chunk) = response.chunk().await.map_err(download_error)? {
                    if body.len() + chunk.len() > limit {
                        return Err(too_large((body.len() + chunk.len()) as u64));
                    }
                    body.extend_from_slice(&chunk);
                }
                Ok(body)
            }
            EditedImageRef::Inline(text) => self.codec.decode_bytes(&text).map_err(|e| {
                EditorError::ExternalService(format!("Unreadable inline image in model output: {}", e))
            }),
        }
    }

    async fn complete(
        &self,
        processing_request: &ProcessingRequest,
        edit: &CompletedEdit,
        processing_time: f64,
        client: &ClientInfo,
    ) {
        let request_id = processing_request.id;
        let stored = StoredResult {
            request_id,
            original: processing_request.image_data.clone(),
            processed: edit.processed_image.clone(),
            metadata: processing_request.metadata.clone(),
            analysis: edit.analysis.clone(),
            mask_source: edit.mask_source.clone(),
            processing_method: PROCESSING_METHOD.to_string(),
            stored_at: Utc::now(),
        };

        // The caller already holds the image, so a storage failure does not
        // fail the edit.
        if let Err(e) = self.results.put(request_id, stored).await {
            error!("Error in Result storage for request {}: {}", request_id, e);
        }

        self.record(
            ImageAction::new(ActionType::Process, request_id.to_string(), client)
                .with_coordinates(&processing_request.coordinates)
                .with_description(Some(processing_request.description.as_str()))
                .with_metadata("success", true)
                .with_metadata("requested_at", processing_request.timestamp.to_rfc3339())
                .with_metadata("processing_time", processing_time)
                .with_metadata("coordinates_count", processing_request.coordinates.len())
                .with_metadata("regions_count", processing_request.regions.len())
                .with_metadata("mask_source", edit.mask_source.clone())
                .with_metadata("processing_method", PROCESSING_METHOD),
        )
        .await;

        info!(
            "Mask-based object removal completed for request {} in {:.2}s",
            request_id, processing_time
        );
    }

    async fn fail(
        &self,
        request_id: Uuid,
        request: &EditRequest,
        stage: Stage,
        err: &EditorError,
        processing_time: f64,
        client: &ClientInfo,
    ) {
        if stage == Stage::Received {
            warn!("Rejected request {}: {}", request_id, err);
            return;
        }

        error!(
            "Error in {} for request {}: {}",
            stage.operation(),
            request_id,
            err
        );

        self.record(
            ImageAction::new(ActionType::Process, request_id.to_string(), client)
                .with_coordinates(&request.coordinates)
                .with_description(request.prompt.as_deref())
                .with_metadata("success", false)
                .with_metadata("processing_time", processing_time)
                .with_metadata("error_message", err.to_string())
                .with_metadata("coordinates_count", request.coordinates.len())
                .with_metadata("regions_count", request.regions.len()),
        )
        .await;
    }

    pub async fn prepare_download(
        &self,
        source: DownloadSource,
        client: &ClientInfo,
    ) -> Result<DownloadFile, EditorError> {
        let (text, image_id) = match source {
            DownloadSource::Image(text) => {
                if text.trim().is_empty() {
                    return Err(EditorError::Validation("No image data provided".to_string()));
                }
                (text, None)
            }
            DownloadSource::Stored(request_id) => {
                let stored = self.results.get(&request_id).await?.ok_or_else(|| {
                    EditorError::NotFound(format!("No result stored for request {}", request_id))
                })?;
                (stored.processed, Some(request_id))
            }
        };

        let decoded = self.codec.decode(&text).inspect_err(|e| {
            error!("Error in Image download preparation: {}", e);
        })?;
        let bytes = self.codec.encode_png(&decoded.image)?;

        let download_id = Uuid::new_v4();
        let filename = format!("edited_image_{}.png", &download_id.simple().to_string()[..8]);

        self.record(
            ImageAction::new(
                ActionType::Download,
                image_id.unwrap_or(download_id).to_string(),
                client,
            )
            .with_metadata("download_id", download_id.to_string())
            .with_metadata("filename", filename.clone())
            .with_metadata("file_size", bytes.len()),
        )
        .await;
        info!("Image prepared for download - ID: {}", download_id);

        Ok(DownloadFile {
            download_id,
            filename,
            bytes,
        })
    }

    pub async fn get_result(&self, request_id: &Uuid) -> Result<Option<StoredResult>, EditorError> {
        self.results.get(request_id).await
    }

    pub async fn stats(&self) -> Result<ResultStats, EditorError> {
        self.results.stats(DEFAULT_RECENT_KEYS).await
    }

    async fn record(&self, action: ImageAction) {
        if let Err(e) = self.actions.append(&action).await {
            error!("Error in Action log write: {}", e);
        }
    }
}

fn validate(request: &EditRequest) -> Result<(), EditorError> {
    if request.image.trim().is_empty() {
        return Err(EditorError::Validation("No image data provided".to_string()));
    }
    if request.regions.is_empty() && request.coordinates.len() < 3 {
        return Err(EditorError::Validation(
            "Provide regions or at least 3 coordinate points".to_string(),
        ));
    }
    Ok(())
}
