//! Container-name normalization: user-facing container names/extensions are
//! mapped onto the tool's muxer names before being placed after `-f`.

/// Normalize a user-facing container identifier into the muxer name the
/// tool expects. Unknown input is passed through unchanged so an output
/// file extension can still drive muxer selection (see
/// [`infer_muxer_from_extension`]).
pub fn normalize_muxer(format: &str) -> String {
    match format.trim().to_ascii_lowercase().as_str() {
        "mkv" | "matroska" => "matroska",
        "ts" | "m2ts" | "mpegts" => "mpegts",
        "m4a" | "mp4" => "mp4",
        "mov" => "mov",
        "webm" => "webm",
        "avi" => "avi",
        other => other,
    }
    .to_string()
}

/// Fallback muxer inference from the output path's extension, used when the
/// job did not specify a container format explicitly.
pub fn infer_muxer_from_extension(extension: Option<&str>) -> String {
    match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("mkv") => "matroska".to_string(),
        Some("ts") => "mpegts".to_string(),
        Some(other) => other.to_string(),
        None => "mp4".to_string(),
    }
}

/// `+faststart` is only meaningful (and only supported) on the MP4/MOV
/// family; WebM/MKV/TS reject the flag outright.
pub fn supports_faststart(muxer: &str) -> bool {
    matches!(muxer, "mp4" | "mov")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_known_aliases() {
        assert_eq!(normalize_muxer("mkv"), "matroska");
        assert_eq!(normalize_muxer("ts"), "mpegts");
        assert_eq!(normalize_muxer("mp4"), "mp4");
    }

    #[test]
    fn faststart_only_for_mp4_family() {
        assert!(supports_faststart("mp4"));
        assert!(supports_faststart("mov"));
        assert!(!supports_faststart("webm"));
        assert!(!supports_faststart("matroska"));
    }
}
