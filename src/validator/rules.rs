//! Whitelists, codec/container compatibility, and the string-level security
//! checks shared across operation kinds.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

pub const MAX_OPERATIONS_PER_JOB_DEFAULT: usize = 50;

pub static ALLOWED_VIDEO_CODECS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "h264", "h265", "hevc", "vp8", "vp9", "av1", "libx264", "libx265", "copy",
    ]
    .into_iter()
    .collect()
});

pub static ALLOWED_AUDIO_CODECS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["aac", "mp3", "opus", "vorbis", "ac3", "libfdk_aac", "copy"]
        .into_iter()
        .collect()
});

pub static ALLOWED_PRESETS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ultrafast",
        "superfast",
        "veryfast",
        "faster",
        "fast",
        "medium",
        "slow",
        "slower",
        "veryslow",
        "placebo",
    ]
    .into_iter()
    .collect()
});

pub static ALLOWED_HARDWARE_ACCEL: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["none", "nvenc", "qsv", "vaapi", "videotoolbox", "amf"].into_iter().collect());

pub static ALLOWED_PIXEL_FORMATS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["yuv420p", "yuv422p", "yuv444p", "nv12", "p010le"]
        .into_iter()
        .collect()
});

pub static ALLOWED_SCALE_ALGORITHMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "lanczos",
        "bicubic",
        "bilinear",
        "neighbor",
        "area",
        "fast_bilinear",
    ]
    .into_iter()
    .collect()
});

pub static ALLOWED_FILTER_NAMES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "brightness",
        "contrast",
        "saturation",
        "speed",
        "grayscale",
        "sepia",
        "vignette",
        "sharpen",
        "denoise",
        "deinterlace",
    ]
    .into_iter()
    .collect()
});

pub static ALLOWED_SAMPLE_RATES: Lazy<HashSet<u32>> = Lazy::new(|| {
    [8000, 11025, 16000, 22050, 32000, 44100, 48000, 96000]
        .into_iter()
        .collect()
});

pub static ALLOWED_CHANNELS: Lazy<HashSet<u8>> = Lazy::new(|| [1, 2, 6, 8].into_iter().collect());

pub static ALLOWED_CONTAINERS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| ["mp4", "mkv", "webm", "avi", "mov", "ts"].into_iter().collect());

/// `output_container -> (video codecs, audio codecs)` compatibility table.
pub fn codec_container_compatibility(container: &str) -> Option<(&'static [&'static str], &'static [&'static str])> {
    match container {
        "mp4" => Some((&["h264", "h265", "hevc", "libx264", "libx265"], &["aac", "mp3"])),
        "mkv" => Some((
            &["h264", "h265", "hevc", "vp8", "vp9", "av1"],
            &["aac", "ac3", "opus", "flac"],
        )),
        "webm" => Some((&["vp8", "vp9"], &["opus", "vorbis"])),
        "avi" => Some((&["h264", "libx264"], &["mp3", "ac3"])),
        "mov" => Some((&["h264", "h265", "libx264"], &["aac"])),
        _ => None,
    }
}

/// Characters rejected anywhere in a string parameter, per the global rule.
pub const DANGEROUS_CHARS: &[char] = &['\0', '|', ';', '&', '$', '`', '<', '>', '"', '\'', '\n', '\r'];

pub fn contains_dangerous_chars(value: &str) -> bool {
    value.chars().any(|c| DANGEROUS_CHARS.contains(&c))
}

pub static OPERATION_TYPE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_]+$").unwrap());

pub static BITRATE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(\d+)([km])?$").unwrap());

/// Parse a bitrate string (`"100k"`, `"2m"`, plain digits = bits/s) into
/// bits-per-second, enforcing the 100 kbps - 50 Mbps range.
pub fn parse_bitrate(raw: &str) -> Option<u64> {
    let caps = BITRATE_REGEX.captures(raw.trim())?;
    let digits: u64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier: u64 = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(ref s) if s == "k" => 1_000,
        Some(ref s) if s == "m" => 1_000_000,
        None => 1,
        _ => return None,
    };
    let bps = digits.checked_mul(multiplier)?;
    let min = 100_000u64;
    let max = 50_000_000u64;
    if bps < min || bps > max {
        return None;
    }
    Some(bps)
}

/// Parse `SS`, `MM:SS`, or `HH:MM:SS[.ms]` into seconds, 0..=86400.
pub fn parse_time_string(raw: &str) -> Option<f64> {
    static TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"^(?:(\d{1,2}):)?(?:(\d{1,2}):)?(\d{1,2}(?:\.\d+)?)$").unwrap()
    });
    let raw = raw.trim();
    // Plain seconds (no colon).
    if !raw.contains(':') {
        let secs: f64 = raw.parse().ok()?;
        return (0.0..=86400.0).contains(&secs).then_some(secs);
    }
    let parts: Vec<&str> = raw.split(':').collect();
    let (h, m, s): (f64, f64, f64) = match parts.as_slice() {
        [mm, ss] => (0.0, mm.parse().ok()?, ss.parse().ok()?),
        [hh, mm, ss] => (hh.parse().ok()?, mm.parse().ok()?, ss.parse().ok()?),
        _ => return None,
    };
    let _ = &TIME_REGEX;
    if !(0.0..60.0).contains(&m) || !(0.0..60.0).contains(&s) {
        return None;
    }
    let total = h * 3600.0 + m * 60.0 + s;
    (0.0..=86400.0).contains(&total).then_some(total)
}

/// Second-pass metadata sanitization used by the command builder (§4.3):
/// dangerous characters replaced with `_`, length capped at 255.
pub fn sanitize_metadata_value(value: &str) -> String {
    const REPLACE: &[char] = &['|', ';', '&', '$', '`', '<', '>', '"', '\'', '\\', '\n', '\r', '\t'];
    let sanitized: String = value
        .chars()
        .map(|c| if REPLACE.contains(&c) { '_' } else { c })
        .collect();
    sanitized.chars().take(255).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitrate_boundaries() {
        assert!(parse_bitrate("99k").is_none());
        assert_eq!(parse_bitrate("100k"), Some(100_000));
        assert_eq!(parse_bitrate("50M"), Some(50_000_000));
        assert!(parse_bitrate("51M").is_none());
    }

    #[test]
    fn time_string_formats() {
        assert_eq!(parse_time_string("90"), Some(90.0));
        assert_eq!(parse_time_string("01:30"), Some(90.0));
        assert_eq!(parse_time_string("00:01:30"), Some(90.0));
        assert!(parse_time_string("99:99:99").is_none());
        assert!(parse_time_string("-5").is_none());
    }

    #[test]
    fn metadata_sanitization_caps_length_and_strips_dangerous_chars() {
        let long = "a".repeat(300);
        assert_eq!(sanitize_metadata_value(&long).len(), 255);
        assert_eq!(sanitize_metadata_value("a;b&c"), "a_b_c");
    }
}
