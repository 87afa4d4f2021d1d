// SPDX-License-Identifier: GPL-3.0-or-later

//! Download format strings, filenames and on-disk placement.

use lazy_static::lazy_static;
use regex::Regex;
use reelsync_config::StorageConfig;
use reelsync_domain::{Media, Source};
use serde::Serialize;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

use crate::matcher::{FormatSelection, SelectedStreams};

const MAX_NAME_CHARS: usize = 80;
const MAX_KEY_CHARS: usize = 20;

lazy_static! {
    static ref SLUG_STRIP_REGEX: Regex = Regex::new(r"[^\w\s-]").expect("valid slug strip regex");
    static ref SLUG_DASH_REGEX: Regex = Regex::new(r"[-\s]+").expect("valid slug dash regex");
}

/// Lowercase ASCII slug: accents are folded, punctuation dropped, runs of
/// whitespace and dashes collapsed to a single dash.
pub fn slugify(value: &str) -> String {
    let ascii: String = value.nfkd().filter(char::is_ascii).collect();
    let lowered = ascii.to_lowercase();
    let stripped = SLUG_STRIP_REGEX.replace_all(&lowered, "");
    SLUG_DASH_REGEX
        .replace_all(&stripped, "-")
        .trim_matches(|c| c == '-' || c == '_')
        .to_string()
}

impl FormatSelection {
    /// Format identifier understood by the download tool: a single code, or
    /// `video+audio` for separate streams.
    pub fn format_string(&self) -> String {
        match &self.streams {
            SelectedStreams::Single(format) => format.code.clone(),
            SelectedStreams::Pair { video, audio } => format!("{}+{}", video.code, audio.code),
        }
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            format_string: self.format_string(),
            stream_codes: self.stream_codes(),
            matched_exactly: self.matched_exactly(),
        }
    }
}

/// Externally consumable description of a selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSummary {
    pub format_string: String,
    pub stream_codes: Vec<String>,
    pub matched_exactly: bool,
}

/// Storage locations, passed in from configuration.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    download_root: PathBuf,
    audio_dir: String,
    video_dir: String,
}

impl StorageLayout {
    pub fn new(
        download_root: impl Into<PathBuf>,
        audio_dir: impl Into<String>,
        video_dir: impl Into<String>,
    ) -> Self {
        Self {
            download_root: download_root.into(),
            audio_dir: audio_dir.into(),
            video_dir: video_dir.into(),
        }
    }

    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Directory a source downloads into, split by audio and video sources.
    pub fn directory_path(&self, source: &Source) -> PathBuf {
        let kind_dir = if source.is_audio() {
            &self.audio_dir
        } else {
            &self.video_dir
        };
        self.download_root.join(kind_dir).join(&source.directory)
    }
}

impl From<&StorageConfig> for StorageLayout {
    fn from(config: &StorageConfig) -> Self {
        Self::new(
            config.download_root.clone(),
            config.audio_dir.clone(),
            config.video_dir.clone(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct FilenameSynthesizer {
    layout: StorageLayout,
}

impl FilenameSynthesizer {
    pub fn new(layout: StorageLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// `{date}_{source}_{title}_{key}_{tags}.{ext}`, or the name of the file
    /// already stored for the media item.
    pub fn filename(&self, source: &Source, media: &Media) -> String {
        if let Some(name) = media
            .media_file
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
        {
            return name;
        }

        let date = media
            .metadata_view(source.source_type)
            .upload_date()
            .unwrap_or_else(|| media.created_at.date_naive());
        let source_name = slugify(&source.name).replace('_', "-");
        let name = match slugify(&media.name(source.source_type).replace(['&', '+'], "and")) {
            slug if slug.is_empty() => slugify(&media.key),
            slug => slug,
        };
        let name: String = name
            .replace('_', "-")
            .chars()
            .take(MAX_NAME_CHARS)
            .collect();
        let key: String = media
            .key
            .trim()
            .replace(['_', '/', '\\'], "-")
            .chars()
            .take(MAX_KEY_CHARS)
            .collect();

        format!(
            "{}_{}_{}_{}_{}.{}",
            date.format("%Y-%m-%d"),
            source_name,
            name,
            key,
            format_tags(source),
            source.extension()
        )
    }

    pub fn file_path(&self, source: &Source, media: &Media) -> PathBuf {
        self.layout
            .directory_path(source)
            .join(self.filename(source, media))
    }
}

fn format_tags(source: &Source) -> String {
    let prefs = &source.preferences;
    let mut tags = Vec::new();
    if prefs.is_audio() {
        tags.push(prefs.acodec.as_str().to_ascii_lowercase());
    } else {
        tags.push(prefs.resolution.as_str().to_string());
        tags.push(prefs.vcodec.as_str().to_ascii_lowercase());
        tags.push(prefs.acodec.as_str().to_ascii_lowercase());
        if prefs.prefer_60fps {
            tags.push("60fps".to_string());
        }
        if prefs.prefer_hdr {
            tags.push("hdr".to_string());
        }
    }
    tags.join("-")
}
