// src/models.rs
use crate::errors::EditorError;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub const DEFAULT_INFERENCE_STEPS: u32 = 50;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

/// One polygon vertex in image pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned rectangle, top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub mode: String,
    pub file_size: usize,
    pub upload_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub seed: Option<i64>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            num_inference_steps: DEFAULT_INFERENCE_STEPS,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            seed: None,
        }
    }
}

/// A typed edit request, produced by the schema layer before any core logic runs.
#[derive(Debug, Clone, Default)]
pub struct EditRequest {
    pub image: String,
    pub coordinates: Vec<Coordinate>,
    pub regions: Vec<Region>,
    pub prompt: Option<String>,
    pub params: GenerationParams,
}

/// One edit attempt once the source image has been decoded.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub id: Uuid,
    pub image_data: String,
    pub coordinates: Vec<Coordinate>,
    pub regions: Vec<Region>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: ImageMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedEdit {
    pub processed_image: String,
    pub analysis: String,
    pub mask_source: String,
    pub output_dimensions: (u32, u32),
    pub coordinates_processed: usize,
}

/// Outcome of one [`ProcessingRequest`]. `outcome` holds either the edit or the
/// error that ended the request, never both.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub request_id: Uuid,
    pub processing_time: f64,
    pub outcome: Result<CompletedEdit, EditorError>,
}

impl ProcessingResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Upload,
    Process,
    Download,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAction {
    pub id: Uuid,
    pub action_type: ActionType,
    pub image_id: String,
    pub coordinates: Option<Vec<Coordinate>>,
    pub description: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ImageAction {
    pub fn new(action_type: ActionType, image_id: impl Into<String>, client: &ClientInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            action_type,
            image_id: image_id.into(),
            coordinates: None,
            description: None,
            user_agent: client.user_agent.clone(),
            ip_address: client.ip_address.clone(),
            timestamp: Utc::now(),
            metadata: Map::new(),
        }
    }

    pub fn with_coordinates(mut self, coordinates: &[Coordinate]) -> Self {
        if !coordinates.is_empty() {
            self.coordinates = Some(coordinates.to_vec());
        }
        self
    }

    pub fn with_description(mut self, description: Option<&str>) -> Self {
        self.description = description.filter(|d| !d.is_empty()).map(str::to_string);
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// Bundle retained by the result store for a completed edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResult {
    pub request_id: Uuid,
    pub original: String,
    pub processed: String,
    pub metadata: ImageMetadata,
    pub analysis: String,
    pub mask_source: String,
    pub processing_method: String,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultStats {
    pub total_processed: usize,
    pub recent_requests: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub image_id: Uuid,
    pub metadata: ImageMetadata,
}

// Request bodies accepted by the HTTP surface.

#[derive(Debug, Deserialize)]
pub struct ImagePayload {
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadPayload {
    pub image: Option<String>,
    pub request_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessPayload {
    pub image: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Vec<Coordinate>>,
    #[serde(default, deserialize_with = "lenient_regions")]
    pub regions: Option<Vec<Region>>,
    pub prompt: Option<String>,
    pub description: Option<String>,
    pub num_inference_steps: Option<u32>,
    pub guidance_scale: Option<f32>,
    #[serde(default, deserialize_with = "lenient_seed")]
    pub seed: Option<i64>,
}

impl ProcessPayload {
    pub fn into_edit_request(self) -> EditRequest {
        let prompt = self
            .prompt
            .filter(|p| !p.is_empty())
            .or(self.description)
            .filter(|p| !p.is_empty());

        EditRequest {
            image: self.image.unwrap_or_default(),
            coordinates: self.coordinates.unwrap_or_default(),
            regions: self.regions.unwrap_or_default(),
            prompt,
            params: GenerationParams {
                num_inference_steps: self
                    .num_inference_steps
                    .unwrap_or(DEFAULT_INFERENCE_STEPS),
                guidance_scale: self.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE),
                seed: self.seed,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ActionsQuery {
    pub limit: Option<usize>,
}

/// Accepts a seed as a number, a numeric string, or one of `null`/`""`/`"null"`.
/// Anything unparsable is treated as "no seed".
fn lenient_seed<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        _ => None,
    })
}

/// Accepts region fields as numbers or numeric strings, truncating toward zero.
/// A region that still does not fit (missing field, non-numeric, negative size)
/// is dropped on its own with a warning instead of failing the whole request.
fn lenient_regions<'de, D>(deserializer: D) -> Result<Option<Vec<Region>>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => return Ok(None),
        Some(other) => {
            warn!("Ignoring regions value that is not a list: {}", other);
            return Ok(Some(Vec::new()));
        }
    };

    Ok(Some(
        items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| {
                let region = region_from_value(item);
                if region.is_none() {
                    warn!("Skipping malformed region {}: {}", i, item);
                }
                region
            })
            .collect(),
    ))
}

fn region_from_value(item: &Value) -> Option<Region> {
    let field = |name: &str| item.get(name).and_then(truncated_int);
    Some(Region {
        x: i32::try_from(field("x")?).ok()?,
        y: i32::try_from(field("y")?).ok()?,
        width: u32::try_from(field("width")?).ok()?,
        height: u32::try_from(field("height")?).ok()?,
    })
}

fn truncated_int(value: &Value) -> Option<i64> {
    let from_float = |f: f64| f.is_finite().then(|| f.trunc() as i64);
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(from_float)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(from_float))
        }
        _ => None,
    }
}
