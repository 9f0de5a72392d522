//! HTTP API handlers for rankcast-rp

pub mod admin;
pub mod buildinfo;
pub mod error;
pub mod health;
pub mod predict;

pub use admin::admin_routes;
pub use buildinfo::get_build_info;
pub use error::ApiError;
pub use health::health_routes;
pub use predict::predict_routes;
