// SPDX-License-Identifier: GPL-3.0-or-later

//! Fallback ladder applied when no format matches the source preferences exactly.
//!
//! Constraints are relaxed in a fixed order, stopping at the first tier that
//! admits a candidate:
//! 1. drop the 60fps / HDR requirement, keep resolution and codecs
//! 2. drop the codec requirement, keep resolution
//! 3. drop the resolution requirement, take the closest height at or below target
//! 4. take anything of the right stream kind
//!
//! Audio has no resolution, so its ladder is just "any codec". Under
//! [`FallbackPolicy::NextBestHd`] every relaxed tier additionally rejects
//! video-bearing candidates below [`SourceResolution::HD_HEIGHT`].

use reelsync_domain::{FallbackPolicy, SourcePreferences, SourceResolution};
use tracing::debug;

use crate::format_parser::FormatRecord;
use crate::matcher::{FormatMatch, FormatMatcher, StreamRole};

/// How far the preferences had to be relaxed to find a format. Ordered from
/// best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    Exact,
    IgnoreFrameRateAndHdr,
    AnyCodec,
    ClosestResolution,
    AnyFormat,
}

const VIDEO_LADDER: [MatchTier; 4] = [
    MatchTier::IgnoreFrameRateAndHdr,
    MatchTier::AnyCodec,
    MatchTier::ClosestResolution,
    MatchTier::AnyFormat,
];

const AUDIO_LADDER: [MatchTier; 1] = [MatchTier::AnyCodec];

impl MatchTier {
    /// Relaxed tiers to try, in order, for a stream role.
    pub fn ladder(role: StreamRole) -> &'static [MatchTier] {
        match role {
            StreamRole::Audio => &AUDIO_LADDER,
            StreamRole::Combined | StreamRole::Video => &VIDEO_LADDER,
        }
    }

    /// Whether `format` satisfies this tier's constraints.
    pub fn admits(
        &self,
        role: StreamRole,
        prefs: &SourcePreferences,
        format: &FormatRecord,
    ) -> bool {
        let target = prefs.target_height();
        let at_target = role == StreamRole::Audio || format.height == target;
        match self {
            Self::Exact => {
                at_target
                    && codecs_match(role, prefs, format)
                    && frame_rate_and_hdr_satisfied(role, prefs, format)
            }
            Self::IgnoreFrameRateAndHdr => at_target && codecs_match(role, prefs, format),
            Self::AnyCodec => at_target,
            Self::ClosestResolution => {
                role == StreamRole::Audio || (format.height > 0 && format.height <= target)
            }
            Self::AnyFormat => true,
        }
    }

    /// Short description of the criteria a tier matched on, e.g. `1080p-vp9-opus-60fps`.
    pub fn describe(&self, role: StreamRole, prefs: &SourcePreferences) -> String {
        let resolution = prefs.resolution.as_str().to_string();
        let vcodec = prefs.vcodec.as_str().to_ascii_lowercase();
        let acodec = prefs.acodec.as_str().to_ascii_lowercase();
        let mut parts: Vec<String> = match (self, role) {
            (Self::AnyFormat, _) => return "any".to_string(),
            (Self::Exact | Self::IgnoreFrameRateAndHdr, StreamRole::Audio) => vec![acodec],
            (Self::Exact | Self::IgnoreFrameRateAndHdr, StreamRole::Video) => {
                vec![resolution, vcodec]
            }
            (Self::Exact | Self::IgnoreFrameRateAndHdr, StreamRole::Combined) => {
                vec![resolution, vcodec, acodec]
            }
            (Self::AnyCodec, StreamRole::Audio) => vec!["any-codec".to_string()],
            (Self::AnyCodec, _) => vec![resolution, "any-codec".to_string()],
            (Self::ClosestResolution, _) => vec![format!("<={}", resolution), "any-codec".to_string()],
        };
        if *self == Self::Exact && role != StreamRole::Audio {
            if prefs.prefer_60fps {
                parts.push("60fps".to_string());
            }
            if prefs.prefer_hdr {
                parts.push("hdr".to_string());
            }
        }
        parts.join("-")
    }
}

fn codecs_match(role: StreamRole, prefs: &SourcePreferences, format: &FormatRecord) -> bool {
    let video_ok = format.video_codec() == Some(prefs.vcodec);
    let audio_ok = format.audio_codec() == Some(prefs.acodec);
    match role {
        StreamRole::Combined => video_ok && audio_ok,
        StreamRole::Video => video_ok,
        StreamRole::Audio => audio_ok,
    }
}

fn frame_rate_and_hdr_satisfied(
    role: StreamRole,
    prefs: &SourcePreferences,
    format: &FormatRecord,
) -> bool {
    if role == StreamRole::Audio {
        return true;
    }
    (!prefs.prefer_60fps || format.is_60fps()) && (!prefs.prefer_hdr || format.hdr)
}

/// Walks the relaxation ladder for a matcher whose exact pass came up empty.
pub struct FallbackResolver<'m, 'a> {
    matcher: &'m FormatMatcher<'a>,
}

impl<'m, 'a> FallbackResolver<'m, 'a> {
    pub fn new(matcher: &'m FormatMatcher<'a>) -> Self {
        Self { matcher }
    }

    /// Minimum acceptable height for relaxed candidates of `role`, if any.
    pub fn height_floor(&self, role: StreamRole) -> Option<u32> {
        let prefs = self.matcher.preferences();
        match (prefs.fallback, role) {
            (FallbackPolicy::NextBestHd, StreamRole::Combined | StreamRole::Video) => {
                Some(SourceResolution::HD_HEIGHT)
            }
            _ => None,
        }
    }

    pub fn resolve(&self, role: StreamRole) -> FormatMatch {
        let prefs = self.matcher.preferences();
        if !prefs.can_fallback() {
            debug!(target: "fallback", ?role, "fallback disabled for source");
            return FormatMatch::none();
        }

        let floor = self.height_floor(role);
        for tier in MatchTier::ladder(role) {
            if let Some(format) = self.matcher.pick(role, *tier, floor) {
                debug!(
                    target: "fallback",
                    ?role,
                    ?tier,
                    code = %format.code,
                    height = format.height,
                    "fallback candidate selected"
                );
                return FormatMatch::found(tier.describe(role, prefs), *tier, format.clone());
            }
            debug!(target: "fallback", ?role, ?tier, "no candidate in tier");
        }

        debug!(target: "fallback", ?role, ?floor, "fallback ladder exhausted");
        FormatMatch::none()
    }
}
