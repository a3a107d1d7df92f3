//! Shared fixtures for the service and handler tests.
//!
//! Provides solid-color test images, canned [`InpaintingClient`] fakes, and a
//! fully wired [`ProcessingOrchestrator`] backed by a temp-dir action log.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::errors::EditorError;
use crate::services::image_codec::{ImageCodec, to_data_uri};
use crate::services::inpainting_client::{EditedImageRef, InpaintInput, InpaintingClient};
use crate::services::{ActionLog, InMemoryResultStore, ProcessingOrchestrator};

pub const TEST_MAX_BYTES: usize = 10 * 1024 * 1024;

/// Solid-color image as a PNG data URI.
pub fn solid_image(width: u32, height: u32, color: [u8; 3]) -> String {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    to_data_uri(&ImageCodec::new(TEST_MAX_BYTES).encode(&image).unwrap())
}

pub fn red_image(width: u32, height: u32) -> String {
    solid_image(width, height, [255, 0, 0])
}

/// Answers every call with a fixed image reference and remembers the last input.
pub struct CannedClient {
    output: EditedImageRef,
    pub last_input: Mutex<Option<InpaintInput>>,
}

impl CannedClient {
    pub fn new(output: EditedImageRef) -> Self {
        Self {
            output,
            last_input: Mutex::new(None),
        }
    }

    /// Returns a blue image of the given size inline.
    pub fn blue(width: u32, height: u32) -> Self {
        Self::new(EditedImageRef::Inline(solid_image(width, height, [0, 0, 255])))
    }

    pub fn last_mask(&self) -> RgbImage {
        let input = self.last_input.lock().unwrap();
        let mask = &input.as_ref().expect("client was never called").mask;
        ImageCodec::new(TEST_MAX_BYTES).decode(mask).unwrap().image
    }
}

#[async_trait]
impl InpaintingClient for CannedClient {
    async fn inpaint(&self, input: InpaintInput) -> Result<EditedImageRef, EditorError> {
        *self.last_input.lock().unwrap() = Some(input);
        Ok(self.output.clone())
    }

    fn model(&self) -> &str {
        "canned"
    }
}

pub struct FailingClient;

#[async_trait]
impl InpaintingClient for FailingClient {
    async fn inpaint(&self, _input: InpaintInput) -> Result<EditedImageRef, EditorError> {
        Err(EditorError::ExternalService("model exploded".to_string()))
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Never answers within any reasonable timeout.
pub struct StalledClient;

#[async_trait]
impl InpaintingClient for StalledClient {
    async fn inpaint(&self, _input: InpaintInput) -> Result<EditedImageRef, EditorError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(EditorError::ExternalService("unreachable".to_string()))
    }

    fn model(&self) -> &str {
        "stalled"
    }
}

pub struct Harness {
    pub orchestrator: ProcessingOrchestrator,
    pub results: Arc<InMemoryResultStore>,
    pub actions: Arc<ActionLog>,
    // Keeps the action log directory alive for the test's duration.
    pub _dir: TempDir,
}

pub async fn harness(client: Arc<dyn InpaintingClient>) -> Harness {
    harness_with_limit(client, TEST_MAX_BYTES).await
}

pub async fn harness_with_limit(client: Arc<dyn InpaintingClient>, max_bytes: usize) -> Harness {
    let dir = TempDir::new().unwrap();
    let actions = Arc::new(
        ActionLog::open(dir.path().join("image_actions.jsonl"), 1000)
            .await
            .unwrap(),
    );
    let results = Arc::new(InMemoryResultStore::default());
    let http = reqwest::Client::builder().no_proxy().build().unwrap();
    let orchestrator = ProcessingOrchestrator::new(
        ImageCodec::new(max_bytes),
        client,
        results.clone(),
        actions.clone(),
        http,
    );

    Harness {
        orchestrator,
        results,
        actions,
        _dir: dir,
    }
}

/// Serves `body` once over plain HTTP on a loopback port and returns its URL.
pub async fn serve_once(body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }

        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        // The client may hang up early once it sees an oversized length.
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(&body).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{}/output.png", addr)
}
