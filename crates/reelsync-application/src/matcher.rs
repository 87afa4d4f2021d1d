// SPDX-License-Identifier: GPL-3.0-or-later

//! Format matching against source preferences.
//!
//! [`FormatMatcher`] selects the best combined, audio-only and video-only
//! format for a media item, and [`FormatMatcher::resolve_format`] turns those
//! into the final download decision:
//!
//! - audio sources download the best audio stream;
//! - video sources prefer an exact combined format, then an exact video+audio
//!   pair, and only then fall back (see [`crate::fallback`]), keeping whichever
//!   of the relaxed combined format or relaxed pair needed the least relaxation.
//!
//! Every selection is a pure function of the preferences and the format set.
//! Ties are broken on content only (ending with the format code), so the input
//! order never changes the outcome.

use reelsync_domain::{AudioCodec, SourcePreferences, VideoCodec};
use std::cmp::Reverse;
use tracing::debug;

use crate::fallback::{FallbackResolver, MatchTier};
use crate::format_parser::{FormatRecord, StreamKind};

/// Which selection is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    Combined,
    Video,
    Audio,
}

/// Outcome of a single selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatMatch {
    /// Criteria the selected format satisfied, e.g. `1080p-vp9-opus-60fps`.
    pub criteria: String,
    pub tier: Option<MatchTier>,
    pub format: Option<FormatRecord>,
}

impl FormatMatch {
    pub fn none() -> Self {
        Self {
            criteria: "none".to_string(),
            tier: None,
            format: None,
        }
    }

    pub fn found(criteria: String, tier: MatchTier, format: FormatRecord) -> Self {
        Self {
            criteria,
            tier: Some(tier),
            format: Some(format),
        }
    }

    pub fn is_found(&self) -> bool {
        self.format.is_some()
    }

    pub fn matched_exactly(&self) -> bool {
        self.tier == Some(MatchTier::Exact)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectedStreams {
    Single(FormatRecord),
    Pair {
        video: FormatRecord,
        audio: FormatRecord,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatSelection {
    pub streams: SelectedStreams,
    /// Worst tier among the selected streams.
    pub tier: MatchTier,
}

impl FormatSelection {
    pub fn matched_exactly(&self) -> bool {
        self.tier == MatchTier::Exact
    }

    pub fn stream_codes(&self) -> Vec<String> {
        match &self.streams {
            SelectedStreams::Single(format) => vec![format.code.clone()],
            SelectedStreams::Pair { video, audio } => {
                vec![video.code.clone(), audio.code.clone()]
            }
        }
    }
}

/// Final download decision for a media item.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatResolution {
    Selected(FormatSelection),
    Undownloadable,
}

impl FormatResolution {
    pub fn is_downloadable(&self) -> bool {
        matches!(self, Self::Selected(_))
    }

    pub fn selection(&self) -> Option<&FormatSelection> {
        match self {
            Self::Selected(selection) => Some(selection),
            Self::Undownloadable => None,
        }
    }
}

/// Sort key for candidates within a tier; the smallest key wins.
///
/// (distance to target height, higher height first, preferred-codec misses,
/// fps miss, HDR miss, higher bitrate first, video codec rank, audio codec
/// rank, format code)
type RankKey<'a> = (
    u32,
    Reverse<u32>,
    u8,
    u8,
    u8,
    Reverse<u64>,
    usize,
    usize,
    (u8, u64, &'a str),
);

pub struct FormatMatcher<'a> {
    preferences: &'a SourcePreferences,
    formats: &'a [FormatRecord],
}

impl<'a> FormatMatcher<'a> {
    pub fn new(preferences: &'a SourcePreferences, formats: &'a [FormatRecord]) -> Self {
        Self {
            preferences,
            formats,
        }
    }

    pub fn preferences(&self) -> &'a SourcePreferences {
        self.preferences
    }

    pub fn formats(&self) -> &'a [FormatRecord] {
        self.formats
    }

    /// Best combined audio+video format, falling back if allowed.
    pub fn best_combined(&self) -> FormatMatch {
        self.best(StreamRole::Combined)
    }

    /// Best audio stream, falling back if allowed. Audio sources use combined
    /// formats as a source of audio when no audio-only stream exists.
    pub fn best_audio(&self) -> FormatMatch {
        self.best(StreamRole::Audio)
    }

    /// Best video-only stream, falling back if allowed.
    pub fn best_video(&self) -> FormatMatch {
        self.best(StreamRole::Video)
    }

    pub fn resolve_format(&self) -> FormatResolution {
        let resolution = if self.preferences.is_audio() {
            single(&self.best_audio())
                .map(FormatResolution::Selected)
                .unwrap_or(FormatResolution::Undownloadable)
        } else {
            self.resolve_video()
        };

        match &resolution {
            FormatResolution::Selected(selection) => debug!(
                target: "matching",
                codes = ?selection.stream_codes(),
                tier = ?selection.tier,
                "format resolved"
            ),
            FormatResolution::Undownloadable => debug!(
                target: "matching",
                summary = %self.preferences.format_summary(),
                formats = self.formats.len(),
                "no viable format"
            ),
        }
        resolution
    }

    fn resolve_video(&self) -> FormatResolution {
        if let Some(selection) = single(&self.exact(StreamRole::Combined)) {
            return FormatResolution::Selected(selection);
        }
        let video = self.exact(StreamRole::Video);
        let audio = self.exact(StreamRole::Audio);
        if let Some(selection) = pair(&video, &audio) {
            return FormatResolution::Selected(selection);
        }
        if !self.preferences.can_fallback() {
            return FormatResolution::Undownloadable;
        }

        let resolver = FallbackResolver::new(self);
        let combined = resolver.resolve(StreamRole::Combined);
        let video = if video.is_found() {
            video
        } else {
            resolver.resolve(StreamRole::Video)
        };
        let audio = if audio.is_found() {
            audio
        } else {
            resolver.resolve(StreamRole::Audio)
        };

        let selection = match (single(&combined), pair(&video, &audio)) {
            (Some(combined), Some(pair)) if pair.tier < combined.tier => Some(pair),
            (Some(combined), _) => Some(combined),
            (None, pair) => pair,
        };
        selection
            .map(FormatResolution::Selected)
            .unwrap_or(FormatResolution::Undownloadable)
    }

    fn best(&self, role: StreamRole) -> FormatMatch {
        let exact = self.exact(role);
        if exact.is_found() {
            return exact;
        }
        debug!(
            target: "matching",
            ?role,
            criteria = %MatchTier::Exact.describe(role, self.preferences),
            "no exact match"
        );
        FallbackResolver::new(self).resolve(role)
    }

    fn exact(&self, role: StreamRole) -> FormatMatch {
        match self.pick(role, MatchTier::Exact, None) {
            Some(format) => FormatMatch::found(
                MatchTier::Exact.describe(role, self.preferences),
                MatchTier::Exact,
                format.clone(),
            ),
            None => FormatMatch::none(),
        }
    }

    /// Best candidate for `role` admitted by `tier`, optionally requiring a
    /// minimum height.
    pub(crate) fn pick(
        &self,
        role: StreamRole,
        tier: MatchTier,
        min_height: Option<u32>,
    ) -> Option<&'a FormatRecord> {
        let kind = self.candidate_kind(role)?;
        self.formats
            .iter()
            .filter(|f| f.kind == kind)
            .filter(|f| tier.admits(role, self.preferences, f))
            .filter(|f| min_height.map_or(true, |min| f.height >= min))
            .min_by_key(|f| self.rank(role, tier, *f))
    }

    fn candidate_kind(&self, role: StreamRole) -> Option<StreamKind> {
        match role {
            StreamRole::Combined => Some(StreamKind::Combined),
            StreamRole::Video => Some(StreamKind::VideoOnly),
            StreamRole::Audio => {
                if self.formats.iter().any(|f| f.kind == StreamKind::AudioOnly) {
                    Some(StreamKind::AudioOnly)
                } else if self.preferences.is_audio() {
                    Some(StreamKind::Combined)
                } else {
                    None
                }
            }
        }
    }

    fn rank(&self, role: StreamRole, tier: MatchTier, f: &'a FormatRecord) -> RankKey<'a> {
        let prefs = self.preferences;
        let (distance, height) = match tier {
            MatchTier::ClosestResolution => (0, f.height),
            MatchTier::AnyFormat => (f.height.abs_diff(prefs.target_height()), f.height),
            _ => (0, 0),
        };

        let vcodec_miss = u8::from(f.video_codec() != Some(prefs.vcodec));
        let acodec_miss = u8::from(f.audio_codec() != Some(prefs.acodec));
        let video_rank = f
            .video_codec()
            .map(|c| c.priority_rank())
            .unwrap_or(VideoCodec::PRIORITY.len());
        let audio_rank = f
            .audio_codec()
            .map(|c| c.priority_rank())
            .unwrap_or(AudioCodec::PRIORITY.len());

        let (codec_miss, fps_miss, hdr_miss, bitrate, video_rank, audio_rank) = match role {
            StreamRole::Audio => (
                0,
                0,
                0,
                f.bitrate.map(|b| (b * 1000.0) as u64).unwrap_or(0),
                0,
                audio_rank,
            ),
            StreamRole::Video => (
                vcodec_miss,
                u8::from(f.is_60fps() != prefs.prefer_60fps),
                u8::from(f.hdr != prefs.prefer_hdr),
                0,
                video_rank,
                0,
            ),
            StreamRole::Combined => (
                vcodec_miss + acodec_miss,
                u8::from(f.is_60fps() != prefs.prefer_60fps),
                u8::from(f.hdr != prefs.prefer_hdr),
                0,
                video_rank,
                audio_rank,
            ),
        };

        (
            distance,
            Reverse(height),
            codec_miss,
            fps_miss,
            hdr_miss,
            Reverse(bitrate),
            video_rank,
            audio_rank,
            code_order(&f.code),
        )
    }
}

/// Numeric codes sort numerically and before non-numeric ones.
fn code_order(code: &str) -> (u8, u64, &str) {
    match code.parse::<u64>() {
        Ok(n) => (0, n, code),
        Err(_) => (1, 0, code),
    }
}

fn single(m: &FormatMatch) -> Option<FormatSelection> {
    Some(FormatSelection {
        streams: SelectedStreams::Single(m.format.clone()?),
        tier: m.tier?,
    })
}

fn pair(video: &FormatMatch, audio: &FormatMatch) -> Option<FormatSelection> {
    let tier = video.tier?.max(audio.tier?);
    Some(FormatSelection {
        streams: SelectedStreams::Pair {
            video: video.format.clone()?,
            audio: audio.format.clone()?,
        },
        tier,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format_parser::CodecValue;
    use reelsync_domain::{FallbackPolicy, SourceResolution};

    fn combined(code: &str, height: u32, v: VideoCodec, a: AudioCodec) -> FormatRecord {
        FormatRecord {
            code: code.to_string(),
            kind: StreamKind::Combined,
            height,
            vcodec: Some(CodecValue::Known(v)),
            acodec: Some(CodecValue::Known(a)),
            fps: Some(30),
            hdr: false,
            container: Some("mp4".into()),
            bitrate: None,
        }
    }

    fn video(code: &str, height: u32, v: VideoCodec, fps: u32, hdr: bool) -> FormatRecord {
        FormatRecord {
            code: code.to_string(),
            kind: StreamKind::VideoOnly,
            height,
            vcodec: Some(CodecValue::Known(v)),
            acodec: None,
            fps: Some(fps),
            hdr,
            container: Some("webm".into()),
            bitrate: None,
        }
    }

    fn audio(code: &str, a: AudioCodec, bitrate: Option<f64>) -> FormatRecord {
        FormatRecord {
            code: code.to_string(),
            kind: StreamKind::AudioOnly,
            height: 0,
            vcodec: None,
            acodec: Some(CodecValue::Known(a)),
            fps: None,
            hdr: false,
            container: Some("webm".into()),
            bitrate,
        }
    }

    fn prefs(fallback: FallbackPolicy) -> SourcePreferences {
        SourcePreferences {
            resolution: SourceResolution::P1080,
            vcodec: VideoCodec::Vp9,
            acodec: AudioCodec::Opus,
            prefer_60fps: false,
            prefer_hdr: false,
            fallback,
        }
    }

    #[test]
    fn exact_combined_wins_and_reports_criteria() {
        let p = prefs(FallbackPolicy::Fail);
        let formats = vec![
            combined("18", 360, VideoCodec::Avc1, AudioCodec::Mp4a),
            combined("900", 1080, VideoCodec::Vp9, AudioCodec::Opus),
        ];
        let m = FormatMatcher::new(&p, &formats).best_combined();
        assert!(m.matched_exactly());
        assert_eq!(m.criteria, "1080p-vp9-opus");
        assert_eq!(m.format.unwrap().code, "900");
    }

    #[test]
    fn combined_ties_break_on_format_code() {
        let p = prefs(FallbackPolicy::Fail);
        let formats = vec![
            combined("95", 1080, VideoCodec::Vp9, AudioCodec::Opus),
            combined("100", 1080, VideoCodec::Vp9, AudioCodec::Opus),
            combined("96", 1080, VideoCodec::Vp9, AudioCodec::Opus),
        ];
        let m = FormatMatcher::new(&p, &formats).best_combined();
        assert_eq!(m.format.unwrap().code, "95");
    }

    #[test]
    fn prefers_60fps_then_hdr_among_exact_video() {
        let mut p = prefs(FallbackPolicy::Fail);
        p.prefer_60fps = true;
        p.prefer_hdr = true;
        let formats = vec![
            video("1", 1080, VideoCodec::Vp9, 30, true),
            video("2", 1080, VideoCodec::Vp9, 60, false),
            video("3", 1080, VideoCodec::Vp9, 60, true),
        ];
        let m = FormatMatcher::new(&p, &formats).best_video();
        assert!(m.matched_exactly());
        assert_eq!(m.format.unwrap().code, "3");
        assert_eq!(m.criteria, "1080p-vp9-60fps-hdr");
    }

    #[test]
    fn without_60fps_preference_standard_frame_rate_wins() {
        let p = prefs(FallbackPolicy::Fail);
        let formats = vec![
            video("299", 1080, VideoCodec::Vp9, 60, false),
            video("248", 1080, VideoCodec::Vp9, 30, false),
        ];
        let m = FormatMatcher::new(&p, &formats).best_video();
        assert_eq!(m.format.unwrap().code, "248");
    }

    #[test]
    fn audio_prefers_higher_bitrate_then_codec_ladder() {
        let p = prefs(FallbackPolicy::Fail);
        let formats = vec![
            audio("249", AudioCodec::Opus, Some(50.0)),
            audio("251", AudioCodec::Opus, Some(160.0)),
            audio("250", AudioCodec::Opus, None),
        ];
        let m = FormatMatcher::new(&p, &formats).best_audio();
        assert_eq!(m.format.unwrap().code, "251");

        let relaxed = SourcePreferences {
            acodec: AudioCodec::Mp4a,
            fallback: FallbackPolicy::NextBest,
            ..p
        };
        let formats = vec![
            audio("600", AudioCodec::Opus, None),
            audio("601", AudioCodec::Opus, None),
        ];
        let m = FormatMatcher::new(&relaxed, &formats).best_audio();
        assert_eq!(m.tier, Some(MatchTier::AnyCodec));
        assert_eq!(m.format.unwrap().code, "600");
    }

    #[test]
    fn video_source_does_not_use_combined_as_audio() {
        let p = prefs(FallbackPolicy::NextBest);
        let formats = vec![combined("18", 360, VideoCodec::Avc1, AudioCodec::Mp4a)];
        let m = FormatMatcher::new(&p, &formats).best_audio();
        assert!(!m.is_found());
    }

    #[test]
    fn audio_source_uses_combined_as_proxy() {
        let p = SourcePreferences {
            resolution: SourceResolution::Audio,
            ..prefs(FallbackPolicy::Fail)
        };
        let formats = vec![
            combined("18", 360, VideoCodec::Avc1, AudioCodec::Mp4a),
            combined("43", 360, VideoCodec::Vp9, AudioCodec::Opus),
            video("137", 1080, VideoCodec::Avc1, 30, false),
        ];
        let resolution = FormatMatcher::new(&p, &formats).resolve_format();
        let selection = resolution.selection().expect("audio selected");
        assert_eq!(selection.stream_codes(), vec!["43".to_string()]);
        assert!(selection.matched_exactly());
    }

    #[test]
    fn exact_pair_beats_fallback_combined() {
        let p = prefs(FallbackPolicy::NextBest);
        let formats = vec![
            combined("18", 360, VideoCodec::Avc1, AudioCodec::Mp4a),
            video("248", 1080, VideoCodec::Vp9, 30, false),
            audio("251", AudioCodec::Opus, Some(160.0)),
        ];
        let resolution = FormatMatcher::new(&p, &formats).resolve_format();
        let selection = resolution.selection().unwrap();
        assert!(selection.matched_exactly());
        assert_eq!(selection.stream_codes(), vec!["248", "251"]);
    }

    #[test]
    fn relaxed_pair_beats_more_relaxed_combined() {
        let p = prefs(FallbackPolicy::NextBest);
        let formats = vec![
            combined("18", 360, VideoCodec::Avc1, AudioCodec::Mp4a),
            video("137", 1080, VideoCodec::Avc1, 30, false),
            audio("140", AudioCodec::Mp4a, Some(128.0)),
        ];
        let selection = FormatMatcher::new(&p, &formats)
            .resolve_format()
            .selection()
            .cloned()
            .unwrap();
        assert_eq!(selection.tier, MatchTier::AnyCodec);
        assert_eq!(selection.stream_codes(), vec!["137", "140"]);
        assert!(!selection.matched_exactly());
    }

    #[test]
    fn combined_kept_on_equal_relaxation() {
        let p = prefs(FallbackPolicy::NextBest);
        let formats = vec![
            combined("22", 720, VideoCodec::Avc1, AudioCodec::Mp4a),
            video("247", 720, VideoCodec::Vp9, 30, false),
            audio("251", AudioCodec::Opus, None),
        ];
        let selection = FormatMatcher::new(&p, &formats)
            .resolve_format()
            .selection()
            .cloned()
            .unwrap();
        assert_eq!(selection.tier, MatchTier::ClosestResolution);
        assert_eq!(selection.stream_codes(), vec!["22"]);
    }

    #[test]
    fn closest_resolution_is_highest_at_or_below_target() {
        let p = prefs(FallbackPolicy::NextBest);
        let formats = vec![
            video("1", 480, VideoCodec::Vp9, 30, false),
            video("2", 720, VideoCodec::Avc1, 30, false),
            video("3", 1440, VideoCodec::Vp9, 30, false),
        ];
        let m = FormatMatcher::new(&p, &formats).best_video();
        assert_eq!(m.tier, Some(MatchTier::ClosestResolution));
        assert_eq!(m.format.unwrap().code, "2");
    }

    #[test]
    fn any_format_takes_nearest_height_above_target() {
        let p = prefs(FallbackPolicy::NextBest);
        let formats = vec![
            video("a", 4320, VideoCodec::Vp9, 30, false),
            video("b", 1440, VideoCodec::Avc1, 30, false),
        ];
        let m = FormatMatcher::new(&p, &formats).best_video();
        assert_eq!(m.tier, Some(MatchTier::AnyFormat));
        assert_eq!(m.format.unwrap().code, "b");
    }

    #[test]
    fn any_codec_tier_uses_codec_ladder() {
        let p = SourcePreferences {
            vcodec: VideoCodec::Avc1,
            ..prefs(FallbackPolicy::NextBest)
        };
        let mut unknown = video("394", 1080, VideoCodec::Vp9, 30, false);
        unknown.vcodec = Some(CodecValue::Unknown("av01".into()));
        let formats = vec![unknown, video("248", 1080, VideoCodec::Vp9, 30, false)];
        let m = FormatMatcher::new(&p, &formats).best_video();
        assert_eq!(m.tier, Some(MatchTier::AnyCodec));
        assert_eq!(m.format.unwrap().code, "248");
    }
}
