use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use utoipa::ToSchema;

pub const DEFAULT_CRF: u8 = 30;
pub const DEFAULT_PRESET: Preset = Preset::Slow;
pub const DEFAULT_WIDTH: u32 = 854;
pub const DEFAULT_FPS: f64 = 24.0;
pub const DEFAULT_AUDIO_BITRATE: &str = "96k";
pub const DEFAULT_VIDEO_CODEC: VideoCodec = VideoCodec::Libx264;
pub const DEFAULT_AUDIO_CODEC: AudioCodec = AudioCodec::Aac;

const CRF_RANGE: (i64, i64) = (0, 51);
const WIDTH_RANGE: (i64, i64) = (240, 3840);
const FPS_RANGE: (f64, f64) = (1.0, 120.0);

static AUDIO_BITRATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+k$").expect("audio bitrate pattern is valid"));

/// Form fields consulted by the sanitizer. Anything else is ignored.
pub const OPTION_FIELDS: [&str; 7] = [
    "crf",
    "preset",
    "width",
    "fps",
    "audioBitrate",
    "videoCodec",
    "audioCodec",
];

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(Preset {
    Ultrafast => "ultrafast",
    Superfast => "superfast",
    Veryfast => "veryfast",
    Faster => "faster",
    Fast => "fast",
    Medium => "medium",
    Slow => "slow",
    Slower => "slower",
    Veryslow => "veryslow",
});

string_enum!(VideoCodec {
    Libx264 => "libx264",
    Libx265 => "libx265",
});

string_enum!(AudioCodec {
    Aac => "aac",
    Libopus => "libopus",
});

/// Validated but possibly partial options taken from the request form.
/// Absent fields fall back to the defaults in [`EncodingProfile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompressionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crf: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<Preset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<VideoCodec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<AudioCodec>,
}

impl CompressionOptions {
    /// Keeps each recognized field only if it parses and is in range.
    /// Never fails: rejected values are dropped silently.
    pub fn sanitize(raw: &HashMap<String, String>) -> Self {
        let field = |key: &str| raw.get(key).map(|v| v.trim());

        Self {
            crf: field("crf")
                .and_then(|v| parse_integer(v, CRF_RANGE))
                .and_then(|v| u8::try_from(v).ok()),
            preset: field("preset").and_then(|v| v.parse().ok()),
            width: field("width")
                .and_then(|v| parse_integer(v, WIDTH_RANGE))
                .and_then(|v| u32::try_from(v).ok()),
            fps: field("fps").and_then(|v| parse_number(v, FPS_RANGE)),
            audio_bitrate: field("audioBitrate")
                .filter(|v| AUDIO_BITRATE_RE.is_match(v))
                .map(str::to_string),
            video_codec: field("videoCodec").and_then(|v| v.parse().ok()),
            audio_codec: field("audioCodec").and_then(|v| v.parse().ok()),
        }
    }

    pub fn resolve(&self) -> EncodingProfile {
        EncodingProfile {
            crf: self.crf.unwrap_or(DEFAULT_CRF),
            preset: self.preset.unwrap_or(DEFAULT_PRESET),
            width: self.width.unwrap_or(DEFAULT_WIDTH),
            fps: self.fps.unwrap_or(DEFAULT_FPS),
            audio_bitrate: self
                .audio_bitrate
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_BITRATE.to_string()),
            video_codec: self.video_codec.unwrap_or(DEFAULT_VIDEO_CODEC),
            audio_codec: self.audio_codec.unwrap_or(DEFAULT_AUDIO_CODEC),
        }
    }
}

/// Fully resolved encoder settings for one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingProfile {
    pub crf: u8,
    pub preset: Preset,
    pub width: u32,
    pub fps: f64,
    pub audio_bitrate: String,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        CompressionOptions::default().resolve()
    }
}

// Integral numbers only ("30" or "30.0"), within the inclusive range.
fn parse_integer(raw: &str, (min, max): (i64, i64)) -> Option<i64> {
    let value = parse_finite(raw)?;
    if value.fract() != 0.0 {
        return None;
    }
    let value = value as i64;
    (min..=max).contains(&value).then_some(value)
}

fn parse_number(raw: &str, (min, max): (f64, f64)) -> Option<f64> {
    let value = parse_finite(raw)?;
    (min..=max).contains(&value).then_some(value)
}

fn parse_finite(raw: &str) -> Option<f64> {
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}
