//! Command Builder (C3): consumes the canonical operation list and job
//! options, emits an argument vector for the external tool. Never
//! constructs a shell string; arguments are always a `Vec<String>` handed
//! directly to `Command::new(...).args(...)`.

pub mod container;
pub mod filters;

use std::collections::HashSet;
use std::path::Path;

use crate::domain::job::JobOptions;
use crate::domain::operation::Operation;
use crate::error::{Error, Result};
use crate::validator::rules::sanitize_metadata_value;

/// Encoder names discovered once per worker at startup (§4.5). Read-only
/// after construction.
#[derive(Debug, Clone, Default)]
pub struct HardwareCapabilities {
    pub available_encoders: HashSet<String>,
}

impl HardwareCapabilities {
    pub fn supports(&self, encoder: &str) -> bool {
        self.available_encoders.contains(encoder)
    }

    /// Preference order: vendor-specific accelerators, then software.
    /// Returns the concrete encoder name to pass to `-c:v`.
    pub fn select_video_encoder(&self, codec: &str, hw_pref: Option<&str>) -> String {
        if hw_pref == Some("none") {
            return software_encoder(codec).to_string();
        }
        let candidates: &[(&str, &str)] = match codec {
            "h264" | "libx264" => &[
                ("nvenc", "h264_nvenc"),
                ("qsv", "h264_qsv"),
                ("vaapi", "h264_vaapi"),
                ("videotoolbox", "h264_videotoolbox"),
                ("amf", "h264_amf"),
            ],
            "h265" | "hevc" | "libx265" => &[
                ("nvenc", "hevc_nvenc"),
                ("qsv", "hevc_qsv"),
                ("vaapi", "hevc_vaapi"),
                ("videotoolbox", "hevc_videotoolbox"),
                ("amf", "hevc_amf"),
            ],
            "av1" => &[("nvenc", "av1_nvenc"), ("qsv", "av1_qsv"), ("amf", "av1_amf")],
            _ => &[],
        };
        if let Some(pref) = hw_pref {
            if let Some((_, enc)) = candidates.iter().find(|(vendor, _)| *vendor == pref) {
                if self.supports(enc) {
                    return enc.to_string();
                }
            }
        } else {
            for (_, enc) in candidates {
                if self.supports(enc) {
                    return enc.to_string();
                }
            }
        }
        software_encoder(codec).to_string()
    }
}

fn software_encoder(codec: &str) -> &'static str {
    match codec {
        "h264" => "libx264",
        "h265" | "hevc" => "libx265",
        "vp8" => "libvpx",
        "vp9" => "libvpx-vp9",
        "av1" => "libsvtav1",
        "copy" => "copy",
        other if other.starts_with("lib") => "libx264",
        _ => "libx264",
    }
}

/// Which pass of a two-pass encode a call to [`build_args`] is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStage {
    First { log_prefix_path: String },
    Second { log_prefix_path: String },
}

pub fn build_args(
    operations: &[Operation],
    options: &JobOptions,
    input: &Path,
    output: &Path,
    hw_caps: &HardwareCapabilities,
    pass: Option<PassStage>,
) -> Result<Vec<String>> {
    if let Some(Operation::Concat(concat)) = operations.iter().find(|o| o.is_concat()) {
        if operations.len() != 1 {
            return Err(Error::internal(
                "concat must be the only operation (validator should have rejected this)",
            ));
        }
        return Ok(build_concat_args(concat, options, output));
    }

    let mut args: Vec<String> = vec!["-y".to_string(), "-nostdin".to_string()];

    let transcode = operations.iter().find_map(|op| match op {
        Operation::Transcode(t) => Some(t),
        _ => None,
    });

    for op in operations {
        if let Operation::Trim(trim) = op {
            if let Some(start) = trim.start_seconds {
                args.push("-ss".to_string());
                args.push(format!("{start:.3}"));
            }
            if let Some(duration) = trim.duration_seconds {
                args.push("-t".to_string());
                args.push(format!("{duration:.3}"));
            } else if let Some(end) = trim.end_seconds {
                args.push("-to".to_string());
                args.push(format!("{end:.3}"));
            }
        }
    }

    args.push("-i".to_string());
    args.push(input.to_string_lossy().into_owned());

    let watermark = operations.iter().find_map(|op| match op {
        Operation::Watermark(w) => Some(w),
        _ => None,
    });
    if let Some(w) = watermark {
        args.push("-i".to_string());
        args.push(w.image_uri.clone());
    }

    let (mut video_filters, mut audio_filters) = filters::build_filter_chains(operations);

    if let Some(w) = watermark {
        // Watermark's overlay is a filter_complex graph referencing input
        // index 1; it supersedes a plain -vf chain for the video stream.
        args.push("-filter_complex".to_string());
        args.push(filters::watermark_filter_complex(w.position, w.opacity));
    } else if !video_filters.is_empty() {
        args.push("-vf".to_string());
        args.push(video_filters.join(","));
        video_filters.clear();
    }

    if !audio_filters.is_empty() {
        args.push("-af".to_string());
        args.push(audio_filters.join(","));
        audio_filters.clear();
    }

    if let Some(t) = transcode {
        apply_transcode_args(&mut args, t, hw_caps);
    }

    for op in operations {
        if let Operation::Audio(a) = op {
            if let Some(rate) = a.sample_rate {
                args.push("-ar".to_string());
                args.push(rate.to_string());
            }
            if let Some(channels) = a.channels {
                args.push("-ac".to_string());
                args.push(channels.to_string());
            }
        }
        if let Operation::Subtitle(s) = op {
            if s.burn_in {
                video_filters.push(format!("subtitles={}", s.subtitle_uri));
            } else {
                args.push("-i".to_string());
                args.push(s.subtitle_uri.clone());
                args.push("-c:s".to_string());
                args.push("mov_text".to_string());
            }
        }
    }

    for (key, value) in &options.metadata {
        args.push("-metadata".to_string());
        args.push(format!("{key}={}", sanitize_metadata_value(value)));
    }

    let output_container = options
        .container_format
        .clone()
        .or_else(|| transcode.and_then(|t| t.container_format.clone()));
    let muxer = match &output_container {
        Some(fmt) => container::normalize_muxer(fmt),
        None => container::infer_muxer_from_extension(
            output.extension().and_then(|e| e.to_str()),
        ),
    };
    args.push("-f".to_string());
    args.push(muxer.clone());

    if container::supports_faststart(&muxer) {
        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
    }

    if let Some(threads) = options.thread_count {
        args.push("-threads".to_string());
        args.push(threads.to_string());
    }

    match pass {
        Some(PassStage::First { log_prefix_path }) => {
            args.push("-pass".to_string());
            args.push("1".to_string());
            args.push("-passlogfile".to_string());
            args.push(log_prefix_path);
            args.push("-an".to_string());
            args.push("-f".to_string());
            args.push("null".to_string());
            args.push(if cfg!(windows) { "NUL".to_string() } else { "/dev/null".to_string() });
        }
        Some(PassStage::Second { log_prefix_path }) => {
            args.push("-pass".to_string());
            args.push("2".to_string());
            args.push("-passlogfile".to_string());
            args.push(log_prefix_path);
            args.push(output.to_string_lossy().into_owned());
        }
        None => {
            args.push(output.to_string_lossy().into_owned());
        }
    }

    args.push("-progress".to_string());
    args.push("pipe:2".to_string());

    Ok(args)
}

fn apply_transcode_args(
    args: &mut Vec<String>,
    t: &crate::domain::operation::TranscodeParams,
    hw_caps: &HardwareCapabilities,
) {
    let video_codec = t.video_codec.as_deref().unwrap_or("h264");
    if video_codec == "copy" {
        args.push("-c:v".to_string());
        args.push("copy".to_string());
    } else {
        let encoder = hw_caps.select_video_encoder(video_codec, t.hardware_acceleration.as_deref());
        args.push("-c:v".to_string());
        args.push(encoder);

        if let Some(crf) = t.crf {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }
        if let Some(bitrate) = t.video_bitrate_bps {
            args.push("-b:v".to_string());
            args.push(format!("{}k", bitrate / 1000));
        }
        if let Some(ref preset) = t.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }
        if let Some(ref profile) = t.profile {
            args.push("-profile:v".to_string());
            args.push(profile.clone());
        }
        if let Some(ref level) = t.level {
            args.push("-level".to_string());
            args.push(level.clone());
        }
        if let Some(ref tune) = t.tune {
            args.push("-tune".to_string());
            args.push(tune.clone());
        }
        if let Some(ref pix_fmt) = t.pixel_format {
            args.push("-pix_fmt".to_string());
            args.push(pix_fmt.clone());
        }
        if let Some(gop) = t.gop_size {
            args.push("-g".to_string());
            args.push(gop.to_string());
        }
        if let Some(bf) = t.b_frames {
            args.push("-bf".to_string());
            args.push(bf.to_string());
        }
    }

    if let Some(fps) = t.fps {
        args.push("-r".to_string());
        args.push(fps.to_string());
    }
    if let Some(w) = t.width {
        let h = t.height.map(|h| h.to_string()).unwrap_or_else(|| "-1".to_string());
        args.push("-vf".to_string());
        args.push(format!("scale={w}:{h}"));
    }

    let audio_codec = t.audio_codec.as_deref().unwrap_or("aac");
    args.push("-c:a".to_string());
    args.push(audio_codec.to_string());
    if let Some(bitrate) = t.audio_bitrate_bps {
        args.push("-b:a".to_string());
        args.push(format!("{}k", bitrate / 1000));
    }
}

fn build_concat_args(
    concat: &crate::domain::operation::ConcatParams,
    options: &JobOptions,
    output: &Path,
) -> Vec<String> {
    use crate::domain::operation::ConcatMode;

    let mut args: Vec<String> = vec!["-y".to_string(), "-nostdin".to_string()];
    match concat.mode {
        ConcatMode::Demuxer => {
            args.push("-f".to_string());
            args.push("concat".to_string());
            args.push("-safe".to_string());
            args.push("0".to_string());
            args.push("-i".to_string());
            // The worker materializes a concat list file and passes its path
            // in; the builder only knows the logical input list here, so it
            // emits a sentinel the worker replaces with the real list path.
            args.push("__CONCAT_LIST__".to_string());
            args.push("-c".to_string());
            args.push("copy".to_string());
        }
        ConcatMode::Filter => {
            for input in &concat.inputs {
                args.push("-i".to_string());
                args.push(input.clone());
            }
            let n = concat.inputs.len();
            args.push("-filter_complex".to_string());
            args.push(format!("concat=n={n}:v=1:a=1[outv][outa]"));
            args.push("-map".to_string());
            args.push("[outv]".to_string());
            args.push("-map".to_string());
            args.push("[outa]".to_string());
        }
    }
    let muxer = options
        .container_format
        .as_deref()
        .map(container::normalize_muxer)
        .unwrap_or_else(|| {
            container::infer_muxer_from_extension(output.extension().and_then(|e| e.to_str()))
        });
    args.push("-f".to_string());
    args.push(muxer);
    args.push(output.to_string_lossy().into_owned());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::operation::TranscodeParams;

    #[test]
    fn builder_is_deterministic_for_identical_inputs() {
        let ops = vec![Operation::Transcode(TranscodeParams {
            video_codec: Some("h264".to_string()),
            crf: Some(23),
            ..Default::default()
        })];
        let options = JobOptions::default();
        let hw = HardwareCapabilities::default();
        let a = build_args(&ops, &options, Path::new("/tmp/in.mp4"), Path::new("/tmp/out.mp4"), &hw, None).unwrap();
        let b = build_args(&ops, &options, Path::new("/tmp/in.mp4"), Path::new("/tmp/out.mp4"), &hw, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn mp4_output_gets_faststart_but_webm_does_not() {
        let ops = vec![Operation::Transcode(TranscodeParams::default())];
        let hw = HardwareCapabilities::default();
        let mp4 = build_args(&ops, &JobOptions::default(), Path::new("in.mp4"), Path::new("out.mp4"), &hw, None).unwrap();
        assert!(mp4.windows(2).any(|w| w == ["-movflags", "+faststart"]));

        let webm = build_args(&ops, &JobOptions::default(), Path::new("in.mp4"), Path::new("out.webm"), &hw, None).unwrap();
        assert!(!webm.windows(2).any(|w| w == ["-movflags", "+faststart"]));
    }

    #[test]
    fn never_builds_a_single_shell_string() {
        // build_args's return type enforces this at compile time, but we
        // assert no element contains embedded whitespace-joined flag pairs
        // that would indicate accidental concatenation.
        let ops = vec![Operation::Transcode(TranscodeParams::default())];
        let hw = HardwareCapabilities::default();
        let args = build_args(&ops, &JobOptions::default(), Path::new("in.mp4"), Path::new("out.mp4"), &hw, None).unwrap();
        assert!(args.iter().all(|a| !a.contains(" -")));
    }
}
