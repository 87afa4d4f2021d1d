// SPDX-License-Identifier: GPL-3.0-or-later

//! Normalization of raw upstream format descriptors.
//!
//! Upstream metadata describes each available encoding as a loosely typed JSON
//! object. [`parse_format`] turns one of those into a [`FormatRecord`]. Fields
//! that are missing or malformed degrade to an explicit unknown value instead
//! of failing; only descriptors without an id or without any stream are
//! rejected.

use lazy_static::lazy_static;
use regex::Regex;
use reelsync_domain::{AudioCodec, VideoCodec};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatParseError {
    #[error("format descriptor is not an object")]
    NotAnObject,

    #[error("format descriptor has no format id")]
    MissingFormatId,

    #[error("format {0} carries neither audio nor video")]
    NoStreams(String),
}

pub type FormatParseResult<T> = Result<T, FormatParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    VideoOnly,
    AudioOnly,
    Combined,
}

/// A codec as reported upstream: either one of the codecs sources can ask
/// for, or something else that is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CodecValue<T> {
    Known(T),
    Unknown(String),
}

impl<T: Copy> CodecValue<T> {
    pub fn known(&self) -> Option<T> {
        match self {
            Self::Known(codec) => Some(*codec),
            Self::Unknown(_) => None,
        }
    }
}

/// Normalized view of one upstream format descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatRecord {
    pub code: String,
    pub kind: StreamKind,
    /// Pixel height, 0 for audio-only or when unknown.
    pub height: u32,
    /// `None` when the format has no video stream.
    pub vcodec: Option<CodecValue<VideoCodec>>,
    /// `None` when the format has no audio stream.
    pub acodec: Option<CodecValue<AudioCodec>>,
    pub fps: Option<u32>,
    pub hdr: bool,
    pub container: Option<String>,
    /// Approximate total bitrate in kbit/s.
    pub bitrate: Option<f64>,
}

impl FormatRecord {
    pub fn video_codec(&self) -> Option<VideoCodec> {
        self.vcodec.as_ref().and_then(CodecValue::known)
    }

    pub fn audio_codec(&self) -> Option<AudioCodec> {
        self.acodec.as_ref().and_then(CodecValue::known)
    }

    pub fn has_video(&self) -> bool {
        matches!(self.kind, StreamKind::VideoOnly | StreamKind::Combined)
    }

    pub fn has_audio(&self) -> bool {
        matches!(self.kind, StreamKind::AudioOnly | StreamKind::Combined)
    }

    pub fn is_60fps(&self) -> bool {
        self.fps.map(|fps| fps >= 60).unwrap_or(false)
    }
}

impl std::fmt::Display for FormatRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)
    }
}

lazy_static! {
    static ref DIMENSIONS_REGEX: Regex =
        Regex::new(r"^\s*\d+\s*x\s*(?P<height>\d+)\s*$").expect("valid dimensions regex");
    static ref HEIGHT_LABEL_REGEX: Regex =
        Regex::new(r"(?i)^\s*(?P<height>\d{3,4})p").expect("valid height label regex");
}

/// Parse a single raw format descriptor.
pub fn parse_format(raw: &Value) -> FormatParseResult<FormatRecord> {
    let obj = raw.as_object().ok_or(FormatParseError::NotAnObject)?;

    let code = match obj.get("format_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(FormatParseError::MissingFormatId),
    };

    let height = parse_height(raw);
    let vcodec = match text_field(raw, "vcodec") {
        Some(raw_codec) => parse_video_codec(&raw_codec),
        // No codec reported but a picture height: a video stream we cannot name.
        None if !obj.contains_key("vcodec") && height > 0 => {
            Some(CodecValue::Unknown("unknown".to_string()))
        }
        None => None,
    };
    let acodec = text_field(raw, "acodec").and_then(|c| parse_audio_codec(&c));

    let kind = match (&vcodec, &acodec) {
        (Some(_), Some(_)) => StreamKind::Combined,
        (Some(_), None) => StreamKind::VideoOnly,
        (None, Some(_)) => StreamKind::AudioOnly,
        (None, None) => return Err(FormatParseError::NoStreams(code)),
    };

    let height = if vcodec.is_some() { height } else { 0 };

    Ok(FormatRecord {
        code,
        kind,
        height,
        vcodec,
        acodec,
        fps: number_field(raw, "fps")
            .filter(|fps| *fps > 0.0)
            .map(|fps| fps.round() as u32),
        hdr: parse_hdr(raw),
        container: text_field(raw, "ext").map(|ext| ext.to_ascii_lowercase()),
        bitrate: number_field(raw, "tbr")
            .or_else(|| number_field(raw, "abr"))
            .filter(|tbr| *tbr > 0.0),
    })
}

/// Parse every descriptor, dropping the ones that cannot be normalized and
/// any repeated format code.
pub fn parse_formats(raw: &[Value]) -> Vec<FormatRecord> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    for descriptor in raw {
        match parse_format(descriptor) {
            Ok(record) => {
                if seen.insert(record.code.clone()) {
                    out.push(record);
                } else {
                    debug!(target: "formats", code = %record.code, "duplicate format code ignored");
                }
            }
            Err(e) => {
                debug!(target: "formats", error = %e, "format descriptor skipped");
            }
        }
    }
    out
}

pub fn format_by_code<'a>(formats: &'a [FormatRecord], code: &str) -> Option<&'a FormatRecord> {
    formats.iter().find(|f| f.code == code)
}

fn text_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number_field(raw: &Value, key: &str) -> Option<f64> {
    match raw.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_height(raw: &Value) -> u32 {
    if let Some(height) = number_field(raw, "height").filter(|h| *h > 0.0) {
        return height as u32;
    }
    ["resolution", "format_note"]
        .iter()
        .filter_map(|key| text_field(raw, key))
        .find_map(|label| {
            DIMENSIONS_REGEX
                .captures(&label)
                .or_else(|| HEIGHT_LABEL_REGEX.captures(&label))
                .and_then(|c| c.name("height"))
                .and_then(|m| m.as_str().parse().ok())
        })
        .unwrap_or(0)
}

fn parse_video_codec(raw: &str) -> Option<CodecValue<VideoCodec>> {
    let lower = raw.to_ascii_lowercase();
    if lower == "none" {
        None
    } else if lower.starts_with("avc1") || lower.starts_with("h264") {
        Some(CodecValue::Known(VideoCodec::Avc1))
    } else if lower.starts_with("vp9") || lower.starts_with("vp09") {
        Some(CodecValue::Known(VideoCodec::Vp9))
    } else {
        Some(CodecValue::Unknown(raw.to_string()))
    }
}

fn parse_audio_codec(raw: &str) -> Option<CodecValue<AudioCodec>> {
    let lower = raw.to_ascii_lowercase();
    if lower == "none" {
        None
    } else if lower.starts_with("mp4a") || lower.starts_with("aac") {
        Some(CodecValue::Known(AudioCodec::Mp4a))
    } else if lower.starts_with("opus") {
        Some(CodecValue::Known(AudioCodec::Opus))
    } else {
        Some(CodecValue::Unknown(raw.to_string()))
    }
}

fn parse_hdr(raw: &Value) -> bool {
    if let Some(range) = text_field(raw, "dynamic_range") {
        let range = range.to_ascii_uppercase();
        return range.starts_with("HDR") || range == "HLG";
    }
    text_field(raw, "format")
        .map(|f| f.to_ascii_uppercase().contains("HDR"))
        .unwrap_or(false)
}
