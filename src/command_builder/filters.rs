//! Per-operation filter-graph fragments. Video and audio fragments from
//! every operation are accumulated separately and comma-joined into a
//! single `-vf`/`-af` pair by the caller (§4.3); watermark's overlay filter
//! is assembled here too but the second `-i` it requires is wired up by the
//! caller, which owns the input index bookkeeping.

use crate::domain::operation::{
    FlipAxis, Operation, RotateDegrees, ScaleAlgorithm, WatermarkPosition,
};

pub fn scale_algorithm_name(algorithm: ScaleAlgorithm) -> &'static str {
    match algorithm {
        ScaleAlgorithm::Lanczos => "lanczos",
        ScaleAlgorithm::Bicubic => "bicubic",
        ScaleAlgorithm::Bilinear => "bilinear",
        ScaleAlgorithm::Neighbor => "neighbor",
        ScaleAlgorithm::Area => "area",
        ScaleAlgorithm::FastBilinear => "fast_bilinear",
    }
}

fn dimension_token(dim: &crate::domain::operation::Dimension) -> String {
    match dim {
        crate::domain::operation::Dimension::Pixels(n) => n.to_string(),
        crate::domain::operation::Dimension::Auto => "-1".to_string(),
    }
}

fn watermark_overlay_position(position: WatermarkPosition) -> &'static str {
    match position {
        WatermarkPosition::TopLeft => "10:10",
        WatermarkPosition::TopRight => "main_w-overlay_w-10:10",
        WatermarkPosition::BottomLeft => "10:main_h-overlay_h-10",
        WatermarkPosition::BottomRight => "main_w-overlay_w-10:main_h-overlay_h-10",
        WatermarkPosition::Center => "(main_w-overlay_w)/2:(main_h-overlay_h)/2",
    }
}

/// Expand a speed multiplier outside the tool's native 0.5..2 `atempo`
/// range into a chain of `atempo` stages, each within range.
fn atempo_chain(speed: f32) -> Vec<String> {
    let mut remaining = speed as f64;
    let mut stages = Vec::new();
    if remaining <= 0.0 {
        return stages;
    }
    while remaining > 2.0 {
        stages.push("atempo=2.0".to_string());
        remaining /= 2.0;
    }
    while remaining < 0.5 {
        stages.push("atempo=0.5".to_string());
        remaining /= 0.5;
    }
    stages.push(format!("atempo={remaining:.4}"));
    stages
}

/// Builds the comma-joined `-vf` chain (without watermark overlay) and the
/// comma-joined `-af` chain for every non-transcode, non-trim operation in
/// declaration order.
pub fn build_filter_chains(operations: &[Operation]) -> (Vec<String>, Vec<String>) {
    let mut video = Vec::new();
    let mut audio = Vec::new();

    for op in operations {
        match op {
            Operation::Scale(p) => {
                video.push(format!(
                    "scale={}:{}:flags={}",
                    dimension_token(&p.width),
                    dimension_token(&p.height),
                    scale_algorithm_name(p.algorithm)
                ));
            }
            Operation::Crop(p) => {
                video.push(format!("crop={}:{}:{}:{}", p.width, p.height, p.x, p.y));
            }
            Operation::Rotate(degrees) => {
                let expr = match degrees {
                    RotateDegrees::Deg90 => "transpose=1",
                    RotateDegrees::Deg180 => "transpose=1,transpose=1",
                    RotateDegrees::Deg270 => "transpose=2",
                };
                video.push(expr.to_string());
            }
            Operation::Flip(axis) => {
                video.push(
                    match axis {
                        FlipAxis::Horizontal => "hflip",
                        FlipAxis::Vertical => "vflip",
                    }
                    .to_string(),
                );
            }
            Operation::Filter(p) => {
                if let Some(b) = p.brightness {
                    video.push(format!("eq=brightness={b}"));
                }
                if let Some(c) = p.contrast {
                    video.push(format!("eq=contrast={c}"));
                }
                if let Some(s) = p.saturation {
                    video.push(format!("eq=saturation={s}"));
                }
                match p.name.as_str() {
                    "grayscale" => video.push("hue=s=0".to_string()),
                    "sepia" => video.push(
                        "colorchannelmixer=.393:.769:.189:0:.349:.686:.168:0:.272:.534:.131"
                            .to_string(),
                    ),
                    "vignette" => video.push("vignette".to_string()),
                    "sharpen" => video.push("unsharp=5:5:1.0:5:5:0.0".to_string()),
                    "denoise" => video.push("hqdn3d".to_string()),
                    "deinterlace" => video.push("yadif".to_string()),
                    _ => {}
                }
                if let Some(speed) = p.speed {
                    if speed > 2.0 || speed < 0.5 {
                        video.push(format!("setpts={:.6}*PTS", 1.0 / speed as f64));
                        audio.extend(atempo_chain(speed));
                    } else {
                        video.push(format!("setpts={:.6}*PTS", 1.0 / speed as f64));
                        audio.push(format!("atempo={speed:.4}"));
                    }
                }
            }
            Operation::Audio(p) => {
                if let Some(db) = p.volume_db {
                    audio.push(format!("volume={db}dB"));
                } else if let Some(linear) = p.volume_linear {
                    audio.push(format!("volume={linear}"));
                }
            }
            _ => {}
        }
    }

    (video, audio)
}

pub fn watermark_filter_complex(position: WatermarkPosition, opacity: f32) -> String {
    format!(
        "[1:v]format=rgba,colorchannelmixer=aa={opacity}[wm];[0:v][wm]overlay={}",
        watermark_overlay_position(position)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_chain_splits_extreme_speeds() {
        let stages = atempo_chain(4.0);
        assert_eq!(stages, vec!["atempo=2.0".to_string(), "atempo=2.0000".to_string()]);
    }

    #[test]
    fn watermark_position_tokens_are_stable() {
        assert_eq!(
            watermark_overlay_position(WatermarkPosition::Center),
            "(main_w-overlay_w)/2:(main_h-overlay_h)/2"
        );
    }
}
