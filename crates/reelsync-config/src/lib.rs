// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Where downloaded media lands on disk. Audio and video sources are kept in
/// separate subdirectories of the download root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub download_root: PathBuf,
    pub audio_dir: String,
    pub video_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            download_root: PathBuf::from("downloads"),
            audio_dir: "audio".to_string(),
            video_dir: "video".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub max_concurrent_downloads: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 4,
        }
    }
}

/// Preferences applied to newly created sources. Values are kept as raw strings
/// here and validated into the closed domain enums by the application layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDefaultsConfig {
    pub resolution: String,
    pub vcodec: String,
    pub acodec: String,
    pub prefer_60fps: bool,
    pub prefer_hdr: bool,
    pub fallback: String,
}

impl Default for SourceDefaultsConfig {
    fn default() -> Self {
        Self {
            resolution: "1080p".to_string(),
            vcodec: "VP9".to_string(),
            acodec: "OPUS".to_string(),
            prefer_60fps: true,
            prefer_hdr: false,
            fallback: "next_best_hd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub telemetry: TelemetryConfig,
    pub scheduler: SchedulerConfig,
    pub source_defaults: SourceDefaultsConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: REELSYNC_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("REELSYNC_").split("__"));

    let config: AppConfig = figment.extract()?;
    info!(
        target: "config",
        download_root = %config.storage.download_root.display(),
        "configuration loaded"
    );
    Ok(config)
}
