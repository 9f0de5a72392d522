//! # rankcast Common Library
//!
//! Score-distribution rank engine shared by the rankcast services:
//! - Distribution data model (buckets, categories, keys)
//! - Payload normalization, CSV tables and upload schema validation
//! - Rank/percentile computation
//! - Distribution cache, backing stores and read-through repository
//! - Ingestion gate and prediction service
//! - Configuration loading

pub mod cache;
pub mod config;
pub mod delimited;
pub mod error;
pub mod ingest;
pub mod model;
pub mod normalize;
pub mod predict;
pub mod rank;
pub mod repository;
pub mod store;
pub mod validate;

pub use cache::{CacheEntry, DistributionCache, Invalidate};
pub use error::{Error, Result};
pub use ingest::{IngestReceipt, IngestionGate};
pub use model::{Bucket, Category, Distribution, DistributionKey, MatchedDataset};
pub use predict::{PredictionResult, PredictionService};
pub use repository::DistributionRepository;
pub use store::DistributionStore;
