// SpatialBench - Annotation Core Library
// Record store, video locator and batch downloader shared by the CLI and the web layer.

pub mod constants;
pub mod error;
pub mod config;
pub mod records;
pub mod video;
pub mod download;

pub use config::{AppConfig, HubConfig};
pub use error::{AnnotatorError, Result};
