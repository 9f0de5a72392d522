//! GET /api/buildinfo

use axum::response::Json;
use serde::Serialize;
use std::fmt;

/// Identification stamped in by `build.rs`
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub commit: &'static str,
    pub built_at: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub const CURRENT: BuildInfo = BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("RANKCAST_COMMIT"),
        built_at: env!("RANKCAST_BUILT_AT"),
        profile: env!("RANKCAST_PROFILE"),
    };
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "v{} [{}] built {} ({})",
            self.version, self.commit, self.built_at, self.profile
        )
    }
}

pub async fn get_build_info() -> Json<BuildInfo> {
    Json(BuildInfo::CURRENT)
}
