// src/services/mod.rs
pub mod action_log;
pub mod image_codec;
pub mod inpainting_client;
pub mod mask_generator;
pub mod orchestrator;
pub mod result_store;

pub use action_log::ActionLog;
pub use image_codec::ImageCodec;
pub use inpainting_client::{InpaintingClient, ReplicateClient};
pub use mask_generator::MaskGenerator;
pub use orchestrator::{DownloadSource, ProcessingOrchestrator};
pub use result_store::{EvictionPolicy, InMemoryResultStore, RedisResultStore, ResultStore};
