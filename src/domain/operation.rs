//! The operation tagged union. The validator is the only producer of
//! [`Operation`] values outside of tests; everything downstream (command
//! builder) pattern-matches on a closed set of variants instead of
//! dispatching on a string `type` field.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleAlgorithm {
    Lanczos,
    Bicubic,
    Bilinear,
    Neighbor,
    Area,
    FastBilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailMode {
    Single,
    Multiple,
    Best,
    Sprite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcatMode {
    Demuxer,
    Filter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamFormat {
    Hls,
    Dash,
}

/// Canonicalized width/height, already validated as even or `Auto`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Dimension {
    Pixels(u32),
    Auto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeParams {
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub preset: Option<String>,
    pub crf: Option<u8>,
    pub allow_lossless: bool,
    pub video_bitrate_bps: Option<u64>,
    pub audio_bitrate_bps: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<u32>,
    pub profile: Option<String>,
    pub level: Option<String>,
    pub tune: Option<String>,
    pub pixel_format: Option<String>,
    pub hardware_acceleration: Option<String>,
    pub gop_size: Option<u32>,
    pub b_frames: Option<u8>,
    pub two_pass: bool,
    /// Output container, when specified inline on the operation rather than
    /// via job-level options; used for the codec/container compatibility
    /// check in the validator.
    pub container_format: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrimParams {
    pub start_seconds: Option<f64>,
    pub end_seconds: Option<f64>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleParams {
    pub width: Dimension,
    pub height: Dimension,
    pub algorithm: ScaleAlgorithm,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CropParams {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotateDegrees {
    Deg90,
    Deg180,
    Deg270,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkParams {
    pub image_uri: String,
    pub position: WatermarkPosition,
    pub opacity: f32,
    pub scale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub name: String,
    pub brightness: Option<f32>,
    pub contrast: Option<f32>,
    pub saturation: Option<f32>,
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParams {
    pub volume_linear: Option<f32>,
    pub volume_db: Option<f32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleParams {
    pub subtitle_uri: String,
    pub burn_in: bool,
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailParams {
    pub mode: ThumbnailMode,
    pub count: u32,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConcatParams {
    pub inputs: Vec<String>,
    pub mode: ConcatMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamVariant {
    pub bitrate_bps: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    pub format: StreamFormat,
    pub variants: Vec<StreamVariant>,
}

/// A single validated, canonical operation. The `type` discriminant lives
/// implicitly in the enum tag; the validator is the sole producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    Transcode(TranscodeParams),
    Trim(TrimParams),
    Watermark(WatermarkParams),
    Filter(FilterParams),
    Scale(ScaleParams),
    Crop(CropParams),
    Rotate(RotateDegrees),
    Flip(FlipAxis),
    Audio(AudioParams),
    Subtitle(SubtitleParams),
    Thumbnail(ThumbnailParams),
    Concat(ConcatParams),
    Stream(StreamParams),
}

impl Operation {
    pub fn type_name(&self) -> &'static str {
        match self {
            Operation::Transcode(_) => "transcode",
            Operation::Trim(_) => "trim",
            Operation::Watermark(_) => "watermark",
            Operation::Filter(_) => "filter",
            Operation::Scale(_) => "scale",
            Operation::Crop(_) => "crop",
            Operation::Rotate(_) => "rotate",
            Operation::Flip(_) => "flip",
            Operation::Audio(_) => "audio",
            Operation::Subtitle(_) => "subtitle",
            Operation::Thumbnail(_) => "thumbnail",
            Operation::Concat(_) => "concat",
            Operation::Stream(_) => "stream",
        }
    }

    pub fn is_concat(&self) -> bool {
        matches!(self, Operation::Concat(_))
    }
}

/// The raw, untrusted wire shape the validator consumes. Unknown keys are
/// rejected by the validator, not by serde, so this mirrors the JSON object
/// loosely via a generic map rather than a typed struct per operation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOperation {
    #[serde(rename = "type")]
    pub op_type: String,
    #[serde(flatten)]
    pub params: serde_json::Map<String, serde_json::Value>,
}
