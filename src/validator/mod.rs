//! Operation Validator: turns an untrusted declarative operation list into
//! the canonical, closed-variant form the rest of the pipeline trusts. Runs
//! synchronously on the submit path before anything touches the Job Store.

pub mod params;
pub mod path_security;
pub mod rules;
pub mod webhook;

use serde_json::Value;
use tracing::warn;

use crate::domain::operation::{
    AudioParams, ConcatMode, ConcatParams, CropParams, Dimension, FilterParams, FlipAxis,
    Operation, RawOperation, RotateDegrees, ScaleAlgorithm, ScaleParams, StreamFormat,
    StreamParams, StreamVariant, SubtitleParams, ThumbnailMode, ThumbnailParams, TranscodeParams,
    TrimParams, WatermarkParams, WatermarkPosition,
};
use crate::error::{Error, Result};
use params::ParamReader;
use rules::*;

/// Knobs the validator needs from configuration; see `config` module for
/// where these are populated.
#[derive(Debug, Clone)]
pub struct ValidatorLimits {
    pub max_operations_per_job: usize,
}

impl Default for ValidatorLimits {
    fn default() -> Self {
        ValidatorLimits {
            max_operations_per_job: MAX_OPERATIONS_PER_JOB_DEFAULT,
        }
    }
}

/// Validate and canonicalize a raw operations list. An empty list is valid
/// and canonicalizes to a single default `transcode` operation (§4.2).
pub fn validate_operations(
    raw: Vec<RawOperation>,
    limits: &ValidatorLimits,
) -> Result<Vec<Operation>> {
    if raw.len() > limits.max_operations_per_job {
        return Err(Error::validation(format!(
            "operations list exceeds the maximum of {} entries",
            limits.max_operations_per_job
        )));
    }

    if raw.is_empty() {
        return Ok(vec![Operation::Transcode(TranscodeParams::default())]);
    }

    let mut canonical = Vec::with_capacity(raw.len());
    for (index, op) in raw.into_iter().enumerate() {
        if !OPERATION_TYPE_REGEX.is_match(&op.op_type) {
            return Err(Error::validation(format!(
                "operation[{index}].type '{}' is not a recognized identifier",
                op.op_type
            ))
            .with_field("type"));
        }
        canonical.push(validate_one(&op.op_type, op.params, index)?);
    }

    validate_concat_exclusivity(&canonical)?;
    validate_codec_container_compatibility(&canonical)?;
    validate_aggregate_resource_limits(&canonical)?;

    Ok(canonical)
}

fn validate_one(
    op_type: &str,
    params: serde_json::Map<String, Value>,
    index: usize,
) -> Result<Operation> {
    let op = match op_type {
        "transcode" => Operation::Transcode(validate_transcode(&params)?),
        "trim" => Operation::Trim(validate_trim(&params)?),
        "watermark" => Operation::Watermark(validate_watermark(&params)?),
        "filter" => Operation::Filter(validate_filter(&params)?),
        "scale" => Operation::Scale(validate_scale(&params)?),
        "crop" => Operation::Crop(validate_crop(&params)?),
        "rotate" => Operation::Rotate(validate_rotate(&params)?),
        "flip" => Operation::Flip(validate_flip(&params)?),
        "audio" => Operation::Audio(validate_audio(&params)?),
        "subtitle" => Operation::Subtitle(validate_subtitle(&params)?),
        "thumbnail" => Operation::Thumbnail(validate_thumbnail(&params)?),
        "concat" => Operation::Concat(validate_concat(&params)?),
        "stream" => Operation::Stream(validate_stream(&params)?),
        other => {
            return Err(Error::validation(format!(
                "operation[{index}] has unrecognized type '{other}'"
            ))
            .with_field("type"));
        }
    };
    Ok(op)
}

fn validate_transcode(params: &serde_json::Map<String, Value>) -> Result<TranscodeParams> {
    let mut r = ParamReader::new(params, "transcode");
    let video_codec = r.str("video_codec")?;
    let audio_codec = r.str("audio_codec")?;
    let preset = r.str("preset")?;
    let crf = r.u64("crf")?;
    let allow_lossless = r.bool("allow_lossless")?;
    let video_bitrate = r.str("video_bitrate")?;
    let audio_bitrate = r.str("audio_bitrate")?;
    let width = r.u64("width")?;
    let height = r.u64("height")?;
    let fps = r.u64("fps")?;
    let profile = r.str("profile")?;
    let level = r.str("level")?;
    let tune = r.str("tune")?;
    let pixel_format = r.str("pixel_format")?;
    let hardware_acceleration = r.str("hardware_acceleration")?;
    let gop_size = r.u64("gop_size")?;
    let b_frames = r.u64("b_frames")?;
    let two_pass = r.bool("two_pass")?;
    let format = r.str("format")?;
    r.finish()?;

    if let Some(ref codec) = video_codec {
        if !ALLOWED_VIDEO_CODECS.contains(codec.as_str()) {
            return Err(Error::validation(format!("unsupported video_codec '{codec}'")).with_field("video_codec"));
        }
    }
    if let Some(ref codec) = audio_codec {
        if !ALLOWED_AUDIO_CODECS.contains(codec.as_str()) {
            return Err(Error::validation(format!("unsupported audio_codec '{codec}'")).with_field("audio_codec"));
        }
    }
    if let Some(ref p) = preset {
        if !ALLOWED_PRESETS.contains(p.as_str()) {
            return Err(Error::validation(format!("unsupported preset '{p}'")).with_field("preset"));
        }
    }
    if let Some(ref hw) = hardware_acceleration {
        if !ALLOWED_HARDWARE_ACCEL.contains(hw.as_str()) {
            return Err(Error::validation(format!("unsupported hardware_acceleration '{hw}'")).with_field("hardware_acceleration"));
        }
    }
    if let Some(ref pf) = pixel_format {
        if !ALLOWED_PIXEL_FORMATS.contains(pf.as_str()) {
            return Err(Error::validation(format!("unsupported pixel_format '{pf}'")).with_field("pixel_format"));
        }
    }
    let crf = match crf {
        Some(c) => {
            if c > 51 {
                return Err(Error::validation("crf must be between 0 and 51").with_field("crf"));
            }
            if c < 5 && !allow_lossless {
                return Err(Error::validation(
                    "crf below 5 requires allow_lossless=true",
                )
                .with_field("crf"));
            }
            Some(c as u8)
        }
        None => None,
    };
    let video_bitrate_bps = match video_bitrate.as_deref() {
        None => None,
        Some(s) => Some(
            parse_bitrate(s)
                .ok_or_else(|| Error::validation("video_bitrate out of the 100k-50M range").with_field("video_bitrate"))?,
        ),
    };
    let audio_bitrate_bps = match audio_bitrate.as_deref() {
        None => None,
        Some(s) => Some(
            parse_bitrate(s)
                .ok_or_else(|| Error::validation("audio_bitrate out of the 100k-50M range").with_field("audio_bitrate"))?,
        ),
    };
    if let Some(w) = width {
        validate_dimension(w, 32, 7680, "width")?;
    }
    if let Some(h) = height {
        validate_dimension(h, 32, 4320, "height")?;
    }
    if let (Some(w), Some(h)) = (width, height) {
        if w.saturating_mul(h) > 8_000_000 {
            return Err(Error::validation("total pixel count exceeds the 8K limit").with_field("width"));
        }
        if w >= 3840 || h >= 2160 {
            warn!(width = w, height = h, "job requests 4K+ resolution");
        }
    }
    if let Some(f) = fps {
        if !(1..=120).contains(&f) {
            return Err(Error::validation("fps must be between 1 and 120").with_field("fps"));
        }
    }
    if let Some(g) = gop_size {
        if !(1..=600).contains(&g) {
            return Err(Error::validation("gop_size must be between 1 and 600").with_field("gop_size"));
        }
    }
    if let Some(b) = b_frames {
        if b > 16 {
            return Err(Error::validation("b_frames must be between 0 and 16").with_field("b_frames"));
        }
    }
    if let Some(ref fmt) = format {
        if !ALLOWED_CONTAINERS.contains(fmt.as_str()) {
            return Err(Error::validation(format!("unsupported output format '{fmt}'")).with_field("format"));
        }
    }

    Ok(TranscodeParams {
        video_codec,
        audio_codec,
        preset,
        crf,
        allow_lossless,
        video_bitrate_bps,
        audio_bitrate_bps,
        width: width.map(|w| w as u32),
        height: height.map(|h| h as u32),
        fps: fps.map(|f| f as u32),
        profile,
        level,
        tune,
        pixel_format,
        hardware_acceleration,
        gop_size: gop_size.map(|g| g as u32),
        b_frames: b_frames.map(|b| b as u8),
        two_pass,
        container_format: format,
    })
}

fn validate_dimension(value: u64, min: u64, max: u64, field: &'static str) -> Result<()> {
    if value % 2 != 0 {
        return Err(Error::validation(format!("{field} must be even")).with_field(field));
    }
    if !(min..=max).contains(&value) {
        return Err(Error::validation(format!("{field} must be between {min} and {max}")).with_field(field));
    }
    Ok(())
}

fn validate_trim(params: &serde_json::Map<String, Value>) -> Result<TrimParams> {
    let mut r = ParamReader::new(params, "trim");
    let start = r.str("start")?;
    let end = r.str("end")?;
    let duration = r.str("duration")?;
    r.finish()?;

    let parse = |field: &'static str, value: &Option<String>| -> Result<Option<f64>> {
        match value {
            None => Ok(None),
            Some(s) => parse_time_string(s)
                .map(Some)
                .ok_or_else(|| Error::validation(format!("{field} is not a valid time string")).with_field(field)),
        }
    };
    let start_seconds = parse("start", &start)?;
    let end_seconds = parse("end", &end)?;
    let duration_seconds = parse("duration", &duration)?;

    if start_seconds.is_some() && end_seconds.is_none() && duration_seconds.is_none() {
        return Err(Error::validation(
            "trim.start requires trim.end or trim.duration",
        )
        .with_field("start"));
    }

    Ok(TrimParams {
        start_seconds,
        end_seconds,
        duration_seconds,
    })
}

fn validate_scale(params: &serde_json::Map<String, Value>) -> Result<ScaleParams> {
    let mut r = ParamReader::new(params, "scale");
    let width = r.str("width")?;
    let height = r.str("height")?;
    let algorithm = r.str("algorithm")?;
    r.finish()?;

    let parse_dim = |field: &'static str, v: Option<String>| -> Result<Dimension> {
        match v.as_deref() {
            None => Ok(Dimension::Auto),
            Some("auto") | Some("-1") => Ok(Dimension::Auto),
            Some(other) => {
                let n: u64 = other
                    .parse()
                    .map_err(|_| Error::validation(format!("{field} must be even, 'auto', or -1")).with_field(field))?;
                validate_dimension(n, 2, 7680, field)?;
                Ok(Dimension::Pixels(n as u32))
            }
        }
    };

    let algorithm = match algorithm.as_deref() {
        None => ScaleAlgorithm::Lanczos,
        Some(a) if ALLOWED_SCALE_ALGORITHMS.contains(a) => match a {
            "lanczos" => ScaleAlgorithm::Lanczos,
            "bicubic" => ScaleAlgorithm::Bicubic,
            "bilinear" => ScaleAlgorithm::Bilinear,
            "neighbor" => ScaleAlgorithm::Neighbor,
            "area" => ScaleAlgorithm::Area,
            _ => ScaleAlgorithm::FastBilinear,
        },
        Some(a) => return Err(Error::validation(format!("unsupported scale algorithm '{a}'")).with_field("algorithm")),
    };

    Ok(ScaleParams {
        width: parse_dim("width", width)?,
        height: parse_dim("height", height)?,
        algorithm,
    })
}

fn validate_crop(params: &serde_json::Map<String, Value>) -> Result<CropParams> {
    let mut r = ParamReader::new(params, "crop");
    let width = r.u64("width")?.ok_or_else(|| Error::validation("crop.width is required").with_field("width"))?;
    let height = r.u64("height")?.ok_or_else(|| Error::validation("crop.height is required").with_field("height"))?;
    let x = r.u64("x")?.unwrap_or(0);
    let y = r.u64("y")?.unwrap_or(0);
    r.finish()?;
    Ok(CropParams {
        width: width as u32,
        height: height as u32,
        x: x as u32,
        y: y as u32,
    })
}

fn validate_rotate(params: &serde_json::Map<String, Value>) -> Result<RotateDegrees> {
    let mut r = ParamReader::new(params, "rotate");
    let degrees = r.u64("degrees")?.ok_or_else(|| Error::validation("rotate.degrees is required").with_field("degrees"))?;
    r.finish()?;
    match degrees {
        90 => Ok(RotateDegrees::Deg90),
        180 => Ok(RotateDegrees::Deg180),
        270 => Ok(RotateDegrees::Deg270),
        _ => Err(Error::validation("rotate.degrees must be 90, 180, or 270").with_field("degrees")),
    }
}

fn validate_flip(params: &serde_json::Map<String, Value>) -> Result<FlipAxis> {
    let mut r = ParamReader::new(params, "flip");
    let axis = r.str("axis")?.ok_or_else(|| Error::validation("flip.axis is required").with_field("axis"))?;
    r.finish()?;
    match axis.as_str() {
        "horizontal" => Ok(FlipAxis::Horizontal),
        "vertical" => Ok(FlipAxis::Vertical),
        other => Err(Error::validation(format!("unsupported flip axis '{other}'")).with_field("axis")),
    }
}

fn validate_watermark(params: &serde_json::Map<String, Value>) -> Result<WatermarkParams> {
    let mut r = ParamReader::new(params, "watermark");
    let image_uri = r.str("image")?.ok_or_else(|| Error::validation("watermark.image is required").with_field("image"))?;
    let position = r.str("position")?;
    let opacity = r.f64("opacity")?;
    let scale = r.f64("scale")?;
    r.finish()?;

    crate::validator::path_security::reject_traversal(&image_uri)?;

    let position = match position.as_deref() {
        None | Some("bottom-right") => WatermarkPosition::BottomRight,
        Some("top-left") => WatermarkPosition::TopLeft,
        Some("top-right") => WatermarkPosition::TopRight,
        Some("bottom-left") => WatermarkPosition::BottomLeft,
        Some("center") => WatermarkPosition::Center,
        Some(other) => {
            return Err(Error::validation(format!("unsupported watermark position '{other}'")).with_field("position"));
        }
    };
    let opacity = opacity.unwrap_or(0.8);
    if !(0.0..=1.0).contains(&opacity) {
        return Err(Error::validation("watermark.opacity must be between 0 and 1").with_field("opacity"));
    }
    let scale = scale.unwrap_or(0.1);
    if !(0.0..=1.0).contains(&scale) {
        return Err(Error::validation("watermark.scale must be between 0 and 1").with_field("scale"));
    }

    Ok(WatermarkParams {
        image_uri,
        position,
        opacity: opacity as f32,
        scale: scale as f32,
    })
}

fn validate_filter(params: &serde_json::Map<String, Value>) -> Result<FilterParams> {
    let mut r = ParamReader::new(params, "filter");
    let name = r.str("name")?.ok_or_else(|| Error::validation("filter.name is required").with_field("name"))?;
    let brightness = r.f64("brightness")?;
    let contrast = r.f64("contrast")?;
    let saturation = r.f64("saturation")?;
    let speed = r.f64("speed")?;
    r.finish()?;

    if !ALLOWED_FILTER_NAMES.contains(name.as_str()) {
        return Err(Error::validation(format!("unsupported filter '{name}'")).with_field("name"));
    }
    if let Some(b) = brightness {
        if !(-1.0..=1.0).contains(&b) {
            return Err(Error::validation("filter.brightness must be between -1 and 1").with_field("brightness"));
        }
    }
    if let Some(c) = contrast {
        if !(0.0..=4.0).contains(&c) {
            return Err(Error::validation("filter.contrast must be between 0 and 4").with_field("contrast"));
        }
    }
    if let Some(s) = saturation {
        if !(0.0..=3.0).contains(&s) {
            return Err(Error::validation("filter.saturation must be between 0 and 3").with_field("saturation"));
        }
    }
    if let Some(s) = speed {
        if !(0.25..=4.0).contains(&s) {
            return Err(Error::validation("filter.speed must be between 0.25 and 4").with_field("speed"));
        }
    }

    Ok(FilterParams {
        name,
        brightness: brightness.map(|v| v as f32),
        contrast: contrast.map(|v| v as f32),
        saturation: saturation.map(|v| v as f32),
        speed: speed.map(|v| v as f32),
    })
}

fn validate_audio(params: &serde_json::Map<String, Value>) -> Result<AudioParams> {
    let mut r = ParamReader::new(params, "audio");
    let volume = r.str("volume")?;
    let sample_rate = r.u64("sample_rate")?;
    let channels = r.u64("channels")?;
    r.finish()?;

    static VOLUME_DB_REGEX: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"^-?\d+(\.\d+)?dB$").unwrap());

    let (volume_linear, volume_db) = match volume.as_deref() {
        None => (None, None),
        Some(v) if VOLUME_DB_REGEX.is_match(v) => {
            let db: f32 = v.trim_end_matches("dB").parse().unwrap();
            (None, Some(db))
        }
        Some(v) => {
            let linear: f32 = v
                .parse()
                .map_err(|_| Error::validation("audio.volume must be a number or '<n>dB'").with_field("volume"))?;
            if !(0.0..=10.0).contains(&linear) {
                return Err(Error::validation("audio.volume must be between 0 and 10").with_field("volume"));
            }
            (Some(linear), None)
        }
    };

    if let Some(sr) = sample_rate {
        if !ALLOWED_SAMPLE_RATES.contains(&(sr as u32)) {
            return Err(Error::validation("unsupported audio.sample_rate").with_field("sample_rate"));
        }
    }
    if let Some(ch) = channels {
        if !ALLOWED_CHANNELS.contains(&(ch as u8)) {
            return Err(Error::validation("unsupported audio.channels").with_field("channels"));
        }
    }

    Ok(AudioParams {
        volume_linear,
        volume_db,
        sample_rate: sample_rate.map(|v| v as u32),
        channels: channels.map(|v| v as u8),
    })
}

fn validate_subtitle(params: &serde_json::Map<String, Value>) -> Result<SubtitleParams> {
    let mut r = ParamReader::new(params, "subtitle");
    let subtitle_uri = r
        .str("subtitle")?
        .ok_or_else(|| Error::validation("subtitle.subtitle is required").with_field("subtitle"))?;
    let burn_in = r.bool("burn_in")?;
    let language = r.str("language")?;
    r.finish()?;
    crate::validator::path_security::reject_traversal(&subtitle_uri)?;
    Ok(SubtitleParams {
        subtitle_uri,
        burn_in,
        language,
    })
}

fn validate_thumbnail(params: &serde_json::Map<String, Value>) -> Result<ThumbnailParams> {
    let mut r = ParamReader::new(params, "thumbnail");
    let mode = r.str("mode")?;
    let count = r.u64("count")?.unwrap_or(1);
    let width = r.u64("width")?;
    let height = r.u64("height")?;
    let quality = r.u64("quality")?;
    r.finish()?;

    let mode = match mode.as_deref() {
        None | Some("single") => ThumbnailMode::Single,
        Some("multiple") => ThumbnailMode::Multiple,
        Some("best") => ThumbnailMode::Best,
        Some("sprite") => ThumbnailMode::Sprite,
        Some(other) => return Err(Error::validation(format!("unsupported thumbnail mode '{other}'")).with_field("mode")),
    };
    if !(1..=1000).contains(&count) {
        return Err(Error::validation("thumbnail.count must be between 1 and 1000").with_field("count"));
    }
    if let Some(q) = quality {
        if q > 100 {
            return Err(Error::validation("thumbnail.quality must be between 0 and 100").with_field("quality"));
        }
    }

    Ok(ThumbnailParams {
        mode,
        count: count as u32,
        width: width.map(|v| v as u32),
        height: height.map(|v| v as u32),
        quality: quality.map(|v| v as u8),
    })
}

fn validate_concat(params: &serde_json::Map<String, Value>) -> Result<ConcatParams> {
    let mut r = ParamReader::new(params, "concat");
    let inputs = r
        .array("inputs")?
        .ok_or_else(|| Error::validation("concat.inputs is required").with_field("inputs"))?;
    let mode = r.str("mode")?;
    r.finish()?;

    if !(2..=100).contains(&inputs.len()) {
        return Err(Error::validation("concat.inputs must have between 2 and 100 entries").with_field("inputs"));
    }
    let mut resolved = Vec::with_capacity(inputs.len());
    for value in inputs {
        let s = value
            .as_str()
            .ok_or_else(|| Error::validation("concat.inputs entries must be strings").with_field("inputs"))?;
        crate::validator::path_security::reject_traversal(s)?;
        resolved.push(s.to_string());
    }
    let mode = match mode.as_deref() {
        None | Some("demuxer") => ConcatMode::Demuxer,
        Some("filter") => ConcatMode::Filter,
        Some(other) => return Err(Error::validation(format!("unsupported concat mode '{other}'")).with_field("mode")),
    };

    Ok(ConcatParams {
        inputs: resolved,
        mode,
    })
}

fn validate_stream(params: &serde_json::Map<String, Value>) -> Result<StreamParams> {
    let mut r = ParamReader::new(params, "stream");
    let format = r
        .str("format")?
        .ok_or_else(|| Error::validation("stream.format is required").with_field("format"))?;
    let variants = r
        .array("variants")?
        .ok_or_else(|| Error::validation("stream.variants is required").with_field("variants"))?;
    r.finish()?;

    let format = match format.as_str() {
        "hls" => StreamFormat::Hls,
        "dash" => StreamFormat::Dash,
        other => return Err(Error::validation(format!("unsupported stream format '{other}'")).with_field("format")),
    };
    if variants.len() > 10 {
        return Err(Error::validation("stream.variants supports at most 10 entries").with_field("variants"));
    }
    let mut resolved = Vec::with_capacity(variants.len());
    for v in variants {
        let obj = v
            .as_object()
            .ok_or_else(|| Error::validation("stream.variants entries must be objects").with_field("variants"))?;
        let bitrate_str = obj
            .get("bitrate")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("stream variant.bitrate is required").with_field("variants"))?;
        let bitrate_bps = parse_bitrate(bitrate_str)
            .ok_or_else(|| Error::validation("stream variant.bitrate out of range").with_field("variants"))?;
        if bitrate_bps > 50_000_000 {
            return Err(Error::validation("stream variant bitrate exceeds 50 Mbps").with_field("variants"));
        }
        let width = obj.get("width").and_then(Value::as_u64).map(|v| v as u32);
        let height = obj.get("height").and_then(Value::as_u64).map(|v| v as u32);
        resolved.push(StreamVariant {
            bitrate_bps,
            width,
            height,
        });
    }

    Ok(StreamParams {
        format,
        variants: resolved,
    })
}

fn validate_concat_exclusivity(ops: &[Operation]) -> Result<()> {
    let has_concat = ops.iter().any(Operation::is_concat);
    if has_concat && ops.len() > 1 {
        return Err(Error::validation(
            "concat must be the only operation in a job",
        )
        .with_field("type"));
    }
    Ok(())
}

fn validate_codec_container_compatibility(ops: &[Operation]) -> Result<()> {
    for op in ops {
        if let Operation::Transcode(t) = op {
            let Some(ref container) = t.container_format else {
                continue;
            };
            if let Some((videos, audios)) = codec_container_compatibility(container) {
                if let Some(ref vc) = t.video_codec {
                    if !videos.contains(&vc.as_str()) {
                        return Err(Error::validation(format!(
                            "video_codec '{vc}' is not compatible with container '{container}'"
                        ))
                        .with_field("video_codec"));
                    }
                }
                if let Some(ref ac) = t.audio_codec {
                    if !audios.contains(&ac.as_str()) {
                        return Err(Error::validation(format!(
                            "audio_codec '{ac}' is not compatible with container '{container}'"
                        ))
                        .with_field("audio_codec"));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Top-level entry point for the submit path: canonicalize operations and,
/// if present, screen the webhook URL. Storage URI / backend-registration
/// checks are the Storage Abstraction's responsibility (§4.1) and are run
/// separately by the submit glue that owns the backend registry.
pub fn validate_job_submission(
    raw_operations: Vec<RawOperation>,
    webhook_url: Option<&str>,
    limits: &ValidatorLimits,
) -> Result<Vec<Operation>> {
    let canonical = validate_operations(raw_operations, limits)?;
    if let Some(url) = webhook_url {
        webhook::validate_webhook_url(url)?;
    }
    Ok(canonical)
}

fn validate_aggregate_resource_limits(ops: &[Operation]) -> Result<()> {
    for op in ops {
        if let Operation::Stream(s) = op {
            for variant in &s.variants {
                if variant.bitrate_bps > 50_000_000 {
                    return Err(Error::validation("aggregate variant bitrate exceeds 50 Mbps").with_field("variants"));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(op_type: &str, params: serde_json::Value) -> RawOperation {
        RawOperation {
            op_type: op_type.to_string(),
            params: params.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn empty_operations_default_to_transcode() {
        let ops = validate_operations(vec![], &ValidatorLimits::default()).unwrap();
        assert_eq!(ops.len(), 1);
        assert!(matches!(ops[0], Operation::Transcode(_)));
    }

    #[test]
    fn rejects_incompatible_codec_container() {
        let ops = vec![raw(
            "transcode",
            json!({"video_codec": "h264", "format": "webm"}),
        )];
        let err = validate_operations(ops, &ValidatorLimits::default()).unwrap_err();
        assert_eq!(err.kind(), crate::error::Kind::ValidationError);
    }

    #[test]
    fn rejects_unknown_parameter_key() {
        let ops = vec![raw("transcode", json!({"bogus_key": "x"}))];
        assert!(validate_operations(ops, &ValidatorLimits::default()).is_err());
    }

    #[test]
    fn crf_below_five_requires_allow_lossless() {
        let without = vec![raw("transcode", json!({"crf": 0}))];
        assert!(validate_operations(without, &ValidatorLimits::default()).is_err());

        let with = vec![raw("transcode", json!({"crf": 0, "allow_lossless": true}))];
        assert!(validate_operations(with, &ValidatorLimits::default()).is_ok());

        let high = vec![raw("transcode", json!({"crf": 51}))];
        assert!(validate_operations(high, &ValidatorLimits::default()).is_ok());
    }

    #[test]
    fn width_must_be_even_and_in_range() {
        assert!(validate_operations(vec![raw("transcode", json!({"width": 31}))], &ValidatorLimits::default()).is_err());
        assert!(validate_operations(vec![raw("transcode", json!({"width": 32}))], &ValidatorLimits::default()).is_ok());
        assert!(validate_operations(vec![raw("transcode", json!({"width": 7680}))], &ValidatorLimits::default()).is_ok());
        assert!(validate_operations(vec![raw("transcode", json!({"width": 7682}))], &ValidatorLimits::default()).is_err());
    }

    #[test]
    fn operations_over_the_limit_are_rejected() {
        let limits = ValidatorLimits {
            max_operations_per_job: 2,
        };
        let ops = vec![
            raw("scale", json!({})),
            raw("scale", json!({})),
            raw("scale", json!({})),
        ];
        assert!(validate_operations(ops, &limits).is_err());
    }

    #[test]
    fn concat_must_be_exclusive() {
        let ops = vec![
            raw("concat", json!({"inputs": ["a.mp4", "b.mp4"]})),
            raw("scale", json!({"width": 640})),
        ];
        assert!(validate_operations(ops, &ValidatorLimits::default()).is_err());
    }
}
