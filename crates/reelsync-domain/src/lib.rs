// SPDX-License-Identifier: GPL-3.0-or-later
pub mod metadata;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub use metadata::{format_duration, MediaMetadata, MetadataField, MetadataSchema, YOUTUBE_SCHEMA};

// ============================================================================
// Value Objects & IDs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaId(pub Uuid);

impl MediaId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MediaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MediaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Source preferences that cannot be mapped onto the closed enumerations.
/// Always fatal for the source being configured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("unknown source type: {0}")]
    UnknownSourceType(String),

    #[error("unknown source resolution: {0}")]
    UnknownResolution(String),

    #[error("unknown video codec: {0}")]
    UnknownVideoCodec(String),

    #[error("unknown audio codec: {0}")]
    UnknownAudioCodec(String),

    #[error("unknown fallback policy: {0}")]
    UnknownFallbackPolicy(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("media {0} is already downloaded")]
    AlreadyDownloaded(MediaId),
}

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    YoutubeChannel,
    YoutubePlaylist,
}

impl SourceType {
    pub fn source_url(&self, key: &str) -> String {
        match self {
            Self::YoutubeChannel => format!("https://www.youtube.com/c/{}", key),
            Self::YoutubePlaylist => format!("https://www.youtube.com/playlist?list={}", key),
        }
    }

    pub fn media_url(&self, key: &str) -> String {
        match self {
            Self::YoutubeChannel | Self::YoutubePlaylist => {
                format!("https://www.youtube.com/watch?v={}", key)
            }
        }
    }

    pub fn metadata_schema(&self) -> &'static MetadataSchema {
        match self {
            Self::YoutubeChannel | Self::YoutubePlaylist => &YOUTUBE_SCHEMA,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::YoutubeChannel => write!(f, "youtube_channel"),
            Self::YoutubePlaylist => write!(f, "youtube_playlist"),
        }
    }
}

impl FromStr for SourceType {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube_channel" | "channel" | "c" => Ok(Self::YoutubeChannel),
            "youtube_playlist" | "playlist" | "p" => Ok(Self::YoutubePlaylist),
            _ => Err(ConfigurationError::UnknownSourceType(s.to_string())),
        }
    }
}

/// Target resolution for a source, or audio only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceResolution {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "4320p")]
    P4320,
    #[serde(rename = "audio")]
    Audio,
}

impl SourceResolution {
    /// Lowest height that counts as HD.
    pub const HD_HEIGHT: u32 = 720;

    /// Pixel height of the target, 0 for audio only.
    pub fn height(&self) -> u32 {
        match self {
            Self::P360 => 360,
            Self::P480 => 480,
            Self::P720 => 720,
            Self::P1080 => 1080,
            Self::P1440 => 1440,
            Self::P2160 => 2160,
            Self::P4320 => 4320,
            Self::Audio => 0,
        }
    }

    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P480 => "480p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::P1440 => "1440p",
            Self::P2160 => "2160p",
            Self::P4320 => "4320p",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for SourceResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceResolution {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "360p" => Ok(Self::P360),
            "480p" => Ok(Self::P480),
            "720p" => Ok(Self::P720),
            "1080p" => Ok(Self::P1080),
            "1440p" => Ok(Self::P1440),
            "2160p" => Ok(Self::P2160),
            "4320p" => Ok(Self::P4320),
            "audio" => Ok(Self::Audio),
            _ => Err(ConfigurationError::UnknownResolution(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoCodec {
    Avc1,
    Vp9,
}

impl VideoCodec {
    /// Most preferred first.
    pub const PRIORITY: [VideoCodec; 2] = [VideoCodec::Vp9, VideoCodec::Avc1];

    /// Position in [`Self::PRIORITY`], lower is better.
    pub fn priority_rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avc1 => "AVC1",
            Self::Vp9 => "VP9",
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVC1" => Ok(Self::Avc1),
            "VP9" => Ok(Self::Vp9),
            _ => Err(ConfigurationError::UnknownVideoCodec(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AudioCodec {
    Mp4a,
    Opus,
}

impl AudioCodec {
    /// Most preferred first.
    pub const PRIORITY: [AudioCodec; 2] = [AudioCodec::Opus, AudioCodec::Mp4a];

    pub fn priority_rank(&self) -> usize {
        Self::PRIORITY
            .iter()
            .position(|c| c == self)
            .unwrap_or(Self::PRIORITY.len())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp4a => "MP4A",
            Self::Opus => "OPUS",
        }
    }

    /// Container extension used when this codec is downloaded on its own.
    pub fn audio_extension(&self) -> &'static str {
        match self {
            Self::Mp4a => "m4a",
            Self::Opus => "ogg",
        }
    }
}

impl std::fmt::Display for AudioCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioCodec {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MP4A" => Ok(Self::Mp4a),
            "OPUS" => Ok(Self::Opus),
            _ => Err(ConfigurationError::UnknownAudioCodec(s.to_string())),
        }
    }
}

/// What to do when no format matches the source preferences exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    Fail,
    NextBest,
    NextBestHd,
}

impl FallbackPolicy {
    pub fn can_fallback(&self) -> bool {
        !matches!(self, Self::Fail)
    }
}

impl std::fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::NextBest => write!(f, "next_best"),
            Self::NextBestHd => write!(f, "next_best_hd"),
        }
    }
}

impl FromStr for FallbackPolicy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fail" | "f" => Ok(Self::Fail),
            "next_best" | "n" => Ok(Self::NextBest),
            "next_best_hd" | "next_best_at_least_hd" | "h" => Ok(Self::NextBestHd),
            _ => Err(ConfigurationError::UnknownFallbackPolicy(s.to_string())),
        }
    }
}

/// How often a source is re-indexed, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSchedule {
    EveryHour,
    Every2Hours,
    Every3Hours,
    Every4Hours,
    Every5Hours,
    Every6Hours,
    Every12Hours,
    Every24Hours,
}

impl IndexSchedule {
    pub fn as_secs(&self) -> u64 {
        let hours = match self {
            Self::EveryHour => 1,
            Self::Every2Hours => 2,
            Self::Every3Hours => 3,
            Self::Every4Hours => 4,
            Self::Every5Hours => 5,
            Self::Every6Hours => 6,
            Self::Every12Hours => 12,
            Self::Every24Hours => 24,
        };
        hours * 60 * 60
    }
}

impl Default for IndexSchedule {
    fn default() -> Self {
        Self::Every6Hours
    }
}

/// Download lifecycle label shown for a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Unknown,
    Scheduled,
    Downloading,
    Downloaded,
    Error,
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Downloading => write!(f, "downloading"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ============================================================================
// Source Preferences
// ============================================================================

/// Quality and codec preferences declared for a source.
///
/// When `resolution` is [`SourceResolution::Audio`] the video codec and the
/// frame rate / HDR flags are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePreferences {
    pub resolution: SourceResolution,
    pub vcodec: VideoCodec,
    pub acodec: AudioCodec,
    pub prefer_60fps: bool,
    pub prefer_hdr: bool,
    pub fallback: FallbackPolicy,
}

impl Default for SourcePreferences {
    fn default() -> Self {
        Self {
            resolution: SourceResolution::P1080,
            vcodec: VideoCodec::Vp9,
            acodec: AudioCodec::Opus,
            prefer_60fps: true,
            prefer_hdr: false,
            fallback: FallbackPolicy::NextBestHd,
        }
    }
}

impl SourcePreferences {
    /// Build preferences from raw, user-supplied values.
    pub fn from_raw(
        resolution: &str,
        vcodec: &str,
        acodec: &str,
        prefer_60fps: bool,
        prefer_hdr: bool,
        fallback: &str,
    ) -> Result<Self, ConfigurationError> {
        Ok(Self {
            resolution: resolution.parse()?,
            vcodec: vcodec.parse()?,
            acodec: acodec.parse()?,
            prefer_60fps,
            prefer_hdr,
            fallback: fallback.parse()?,
        })
    }

    pub fn is_audio(&self) -> bool {
        self.resolution.is_audio()
    }

    pub fn is_video(&self) -> bool {
        !self.is_audio()
    }

    pub fn target_height(&self) -> u32 {
        self.resolution.height()
    }

    pub fn can_fallback(&self) -> bool {
        self.fallback.can_fallback()
    }

    /// Output container. Video always lands in mkv, audio picks a container
    /// that can actually hold the requested codec.
    pub fn extension(&self) -> &'static str {
        if self.is_audio() {
            self.acodec.audio_extension()
        } else {
            "mkv"
        }
    }

    pub fn format_summary(&self) -> String {
        let vc = if self.is_audio() {
            "none"
        } else {
            self.vcodec.as_str()
        };
        let fps = if self.is_video() && self.prefer_60fps {
            " 60FPS"
        } else {
            ""
        };
        let hdr = if self.is_video() && self.prefer_hdr {
            " HDR"
        } else {
            ""
        };
        format!(
            "{} (video:{}, audio:{}){}{}",
            self.resolution, vc, self.acodec, fps, hdr
        )
    }
}

// ============================================================================
// Entities
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub source_type: SourceType,
    pub key: String,
    pub name: String,
    pub directory: String,
    pub preferences: SourcePreferences,
    pub index_schedule: IndexSchedule,
    pub delete_old_media: bool,
    pub days_to_keep: u16,
    pub has_failed: bool,
    pub last_crawl: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn new(
        source_type: SourceType,
        key: impl Into<String>,
        name: impl Into<String>,
        directory: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SourceId::new(),
            source_type,
            key: key.into(),
            name: name.into(),
            directory: directory.into(),
            preferences: SourcePreferences::default(),
            index_schedule: IndexSchedule::default(),
            delete_old_media: false,
            days_to_keep: 14,
            has_failed: false,
            last_crawl: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_preferences(mut self, preferences: SourcePreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn is_audio(&self) -> bool {
        self.preferences.is_audio()
    }

    pub fn url(&self) -> String {
        self.source_type.source_url(&self.key)
    }

    pub fn extension(&self) -> &'static str {
        self.preferences.extension()
    }

    /// When the next indexing pass is due. A source never crawled is due
    /// from the moment it was created.
    pub fn next_index_due(&self) -> DateTime<Utc> {
        match self.last_crawl {
            Some(last) => last + chrono::Duration::seconds(self.index_schedule.as_secs() as i64),
            None => self.created_at,
        }
    }

    pub fn is_index_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_index_due()
    }
}

/// Attributes of the format that was actually downloaded. Recorded once.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DownloadedAttributes {
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub container: Option<String>,
    pub fps: Option<u32>,
    pub hdr: bool,
    pub filesize: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub source_id: SourceId,
    pub key: String,
    pub published: Option<DateTime<Utc>>,
    /// Raw upstream metadata, JSON encoded.
    pub metadata: Option<String>,
    pub can_download: bool,
    pub media_file: Option<PathBuf>,
    pub downloaded: bool,
    pub download: Option<DownloadedAttributes>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Media {
    pub fn new(source_id: SourceId, key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MediaId::new(),
            source_id,
            key: key.into(),
            published: None,
            metadata: None,
            can_download: false,
            media_file: None,
            downloaded: false,
            download: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn metadata_view(&self, source_type: SourceType) -> MediaMetadata {
        MediaMetadata::parse(self.metadata.as_deref(), source_type.metadata_schema())
    }

    /// Replace the stored metadata. Allowed at any time, including after the
    /// media has been downloaded.
    pub fn refresh_metadata(&mut self, source_type: SourceType, metadata: String) {
        self.metadata = Some(metadata);
        self.published = self
            .metadata_view(source_type)
            .upload_date()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
        self.updated_at = Utc::now();
    }

    /// Record the completed download. Fails if a download was already recorded.
    pub fn mark_downloaded(
        &mut self,
        attributes: DownloadedAttributes,
        media_file: PathBuf,
    ) -> Result<(), DomainError> {
        if self.downloaded {
            return Err(DomainError::AlreadyDownloaded(self.id));
        }
        self.downloaded = true;
        self.download = Some(attributes);
        self.media_file = Some(media_file);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn url(&self, source_type: SourceType) -> String {
        source_type.media_url(&self.key)
    }

    /// Display name: the upstream title, or the item key when the title is blank.
    pub fn name(&self, source_type: SourceType) -> String {
        let title = self.metadata_view(source_type).title();
        if title.is_empty() {
            self.key.clone()
        } else {
            title
        }
    }
}

// ============================================================================
// Domain Validation
// ============================================================================

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

pub trait Validate {
    fn validate(&self) -> Result<(), Vec<ValidationError>>;
}

impl Validate for Source {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.key.trim().is_empty() {
            errors.push(ValidationError {
                field: "key",
                message: "key cannot be empty".into(),
            });
        }
        if self.name.trim().is_empty() {
            errors.push(ValidationError {
                field: "name",
                message: "name cannot be empty".into(),
            });
        }
        if self.directory.trim().is_empty() {
            errors.push(ValidationError {
                field: "directory",
                message: "directory cannot be empty".into(),
            });
        } else if self.directory.contains(['/', '\\']) || self.directory.trim() == ".." {
            errors.push(ValidationError {
                field: "directory",
                message: "directory must be a single path component".into(),
            });
        }
        if self.delete_old_media && self.days_to_keep == 0 {
            errors.push(ValidationError {
                field: "days_to_keep",
                message: "days to keep must be >= 1 when deleting old media".into(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for Media {
    fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.key.trim().is_empty() {
            errors.push(ValidationError {
                field: "key",
                message: "key cannot be empty".into(),
            });
        }
        if self.downloaded && self.download.is_none() {
            errors.push(ValidationError {
                field: "download",
                message: "downloaded media must record its download attributes".into(),
            });
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

// ============================================================================
// Domain Events (lightweight scaffolding)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<TPayload> {
    pub name: &'static str,
    pub occurred_at: DateTime<Utc>,
    pub payload: TPayload,
}

impl<TPayload> DomainEvent<TPayload> {
    pub fn new(name: &'static str, payload: TPayload) -> Self {
        Self {
            name,
            occurred_at: Utc::now(),
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCreatedPayload {
    pub media_id: MediaId,
    pub source_id: SourceId,
    pub key: String,
}

pub type MediaCreated = DomainEvent<MediaCreatedPayload>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaDownloadedPayload {
    pub media_id: MediaId,
    pub source_id: SourceId,
    pub path: String,
}

pub type MediaDownloaded = DomainEvent<MediaDownloadedPayload>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDeletedPayload {
    pub source_id: SourceId,
    pub media_removed: usize,
}

pub type SourceDeleted = DomainEvent<SourceDeletedPayload>;

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_heights_and_parsing() {
        assert_eq!(SourceResolution::P1080.height(), 1080);
        assert_eq!(SourceResolution::Audio.height(), 0);
        assert_eq!("720P".parse::<SourceResolution>(), Ok(SourceResolution::P720));
        assert_eq!("audio".parse::<SourceResolution>(), Ok(SourceResolution::Audio));
        assert!(matches!(
            "999p".parse::<SourceResolution>(),
            Err(ConfigurationError::UnknownResolution(_))
        ));
    }

    #[test]
    fn codec_priority_ladders() {
        assert!(VideoCodec::Vp9.priority_rank() < VideoCodec::Avc1.priority_rank());
        assert!(AudioCodec::Opus.priority_rank() < AudioCodec::Mp4a.priority_rank());
    }

    #[test]
    fn fallback_policy_accepts_aliases() {
        assert_eq!("fail".parse::<FallbackPolicy>(), Ok(FallbackPolicy::Fail));
        assert_eq!("next-best".parse::<FallbackPolicy>(), Ok(FallbackPolicy::NextBest));
        assert_eq!(
            "next-best-at-least-hd".parse::<FallbackPolicy>(),
            Ok(FallbackPolicy::NextBestHd)
        );
        assert_eq!("h".parse::<FallbackPolicy>(), Ok(FallbackPolicy::NextBestHd));
        assert!("sometimes".parse::<FallbackPolicy>().is_err());
        assert!(!FallbackPolicy::Fail.can_fallback());
        assert!(FallbackPolicy::NextBest.can_fallback());
    }

    #[test]
    fn unknown_audio_codec_is_configuration_error() {
        let err = SourcePreferences::from_raw("audio", "VP9", "FLAC", false, false, "fail")
            .unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownAudioCodec("FLAC".into()));
        assert_eq!(err.to_string(), "unknown audio codec: FLAC");
    }

    #[test]
    fn extension_follows_audio_codec() {
        let mut prefs = SourcePreferences {
            resolution: SourceResolution::Audio,
            acodec: AudioCodec::Mp4a,
            ..Default::default()
        };
        assert_eq!(prefs.extension(), "m4a");
        prefs.acodec = AudioCodec::Opus;
        assert_eq!(prefs.extension(), "ogg");
        prefs.resolution = SourceResolution::P720;
        assert_eq!(prefs.extension(), "mkv");
    }

    #[test]
    fn format_summary_reflects_preferences() {
        let prefs = SourcePreferences::default();
        assert_eq!(prefs.format_summary(), "1080p (video:VP9, audio:OPUS) 60FPS");

        let audio = SourcePreferences {
            resolution: SourceResolution::Audio,
            prefer_hdr: true,
            ..Default::default()
        };
        assert_eq!(audio.format_summary(), "audio (video:none, audio:OPUS)");
    }

    #[test]
    fn source_urls() {
        let channel = Source::new(SourceType::YoutubeChannel, "somechannel", "Some", "some");
        assert_eq!(channel.url(), "https://www.youtube.com/c/somechannel");
        let playlist = Source::new(SourceType::YoutubePlaylist, "PL123", "List", "list");
        assert_eq!(playlist.url(), "https://www.youtube.com/playlist?list=PL123");
        let media = Media::new(playlist.id, "abc");
        assert_eq!(
            media.url(playlist.source_type),
            "https://www.youtube.com/watch?v=abc"
        );
    }

    #[test]
    fn source_validation() {
        let mut source = Source::new(SourceType::YoutubeChannel, " ", "", "a/b");
        source.delete_old_media = true;
        source.days_to_keep = 0;
        let errs = source.validate().unwrap_err();
        let fields: Vec<_> = errs.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["key", "name", "directory", "days_to_keep"]);

        let ok = Source::new(SourceType::YoutubeChannel, "key", "Name", "name");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn download_attributes_are_recorded_once() {
        let mut media = Media::new(SourceId::new(), "abc");
        let attrs = DownloadedAttributes {
            audio_codec: Some("opus".into()),
            video_codec: Some("vp9".into()),
            container: Some("mkv".into()),
            fps: Some(60),
            hdr: false,
            filesize: Some(1024),
        };
        media
            .mark_downloaded(attrs.clone(), PathBuf::from("/tmp/a.mkv"))
            .unwrap();
        assert!(media.downloaded);
        assert!(media.validate().is_ok());

        let second = DownloadedAttributes {
            fps: Some(30),
            ..attrs.clone()
        };
        let err = media
            .mark_downloaded(second, PathBuf::from("/tmp/b.mkv"))
            .unwrap_err();
        assert_eq!(err, DomainError::AlreadyDownloaded(media.id));
        assert_eq!(media.download, Some(attrs));
        assert_eq!(media.media_file, Some(PathBuf::from("/tmp/a.mkv")));
    }

    #[test]
    fn refresh_metadata_sets_published() {
        let mut media = Media::new(SourceId::new(), "abc");
        media.refresh_metadata(
            SourceType::YoutubeChannel,
            r#"{"id": "abc", "upload_date": "20230405", "title": "T"}"#.to_string(),
        );
        let published = media.published.expect("published date");
        assert_eq!(published.to_rfc3339(), "2023-04-05T00:00:00+00:00");
        assert_eq!(media.metadata_view(SourceType::YoutubeChannel).title(), "T");
        assert_eq!(media.name(SourceType::YoutubeChannel), "T");

        let untitled = Media::new(SourceId::new(), "xyz");
        assert_eq!(untitled.name(SourceType::YoutubeChannel), "xyz");
    }

    #[test]
    fn media_created_event() {
        let payload = MediaCreatedPayload {
            media_id: MediaId::new(),
            source_id: SourceId::new(),
            key: "abc".into(),
        };
        let event: MediaCreated = DomainEvent::new("media.created", payload);
        assert_eq!(event.name, "media.created");
        assert_eq!(event.payload.key, "abc");
    }

    #[test]
    fn index_due_follows_schedule() {
        let mut source = Source::new(SourceType::YoutubeChannel, "chan", "Chan", "chan");
        assert_eq!(source.next_index_due(), source.created_at);
        assert!(source.is_index_due(source.created_at));

        let crawled = source.created_at + chrono::Duration::minutes(5);
        source.last_crawl = Some(crawled);
        source.index_schedule = IndexSchedule::Every2Hours;
        assert_eq!(source.next_index_due(), crawled + chrono::Duration::hours(2));
        assert!(!source.is_index_due(crawled + chrono::Duration::hours(1)));
        assert!(source.is_index_due(crawled + chrono::Duration::hours(2)));
    }
}
