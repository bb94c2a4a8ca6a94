//! Progress Parser (C4): a small state machine over lines from the tool's
//! stderr. Recognized fields are extracted with the classic
//! `frame=`/`fps=`/`time=`/`bitrate=`/`speed=` regex family (the format the
//! tool emits on its human-readable stderr stream, as opposed to the
//! key=value `-progress pipe:` machine format).

use once_cell::sync::Lazy;
use regex::Regex;

static FRAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());
static FPS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"fps=\s*([\d.]+)").unwrap());
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"time=\s*(\d{2}):(\d{2}):(\d{2})\.(\d{2})").unwrap());
static BITRATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"bitrate=\s*([\d.]+)kbits/s").unwrap());
static SPEED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"speed=\s*([\d.]+)x").unwrap());

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSample {
    pub frame: Option<u64>,
    pub fps: Option<f64>,
    pub time_seconds: Option<f64>,
    pub bitrate_kbps: Option<f64>,
    pub speed: Option<f64>,
    pub percentage: Option<f64>,
}

impl ProgressSample {
    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
            && self.fps.is_none()
            && self.time_seconds.is_none()
            && self.bitrate_kbps.is_none()
            && self.speed.is_none()
    }
}

/// Parse one stderr line, computing percentage against `total_duration_secs`
/// when known (clamped to 100; omitted when duration is unknown, or forced
/// to 100 when `time_seconds > 0` and duration is exactly 0).
pub fn parse_line(line: &str, total_duration_secs: Option<f64>) -> ProgressSample {
    let frame = FRAME_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let fps = FPS_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let time_seconds = TIME_RE.captures(line).and_then(|c| {
        let h: f64 = c.get(1)?.as_str().parse().ok()?;
        let m: f64 = c.get(2)?.as_str().parse().ok()?;
        let s: f64 = c.get(3)?.as_str().parse().ok()?;
        let cs: f64 = c.get(4)?.as_str().parse().ok()?;
        Some(h * 3600.0 + m * 60.0 + s + cs / 100.0)
    });
    let bitrate_kbps = BITRATE_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let speed = SPEED_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());

    let percentage = compute_percentage(time_seconds, total_duration_secs);

    ProgressSample {
        frame,
        fps,
        time_seconds,
        bitrate_kbps,
        speed,
        percentage,
    }
}

fn compute_percentage(time_seconds: Option<f64>, total_duration_secs: Option<f64>) -> Option<f64> {
    let time_seconds = time_seconds?;
    match total_duration_secs {
        None => None,
        Some(total) if total <= 0.0 => {
            if time_seconds > 0.0 {
                Some(100.0)
            } else {
                None
            }
        }
        Some(total) => Some((time_seconds / total * 100.0).min(100.0)),
    }
}

/// Remaps a pass-2 percentage into the 50..100 half of overall job
/// progress for two-pass encodes; pass 1 has no meaningful tool-reported
/// percentage (null sink), so the Worker synthesizes its own 0..50 signal.
pub fn remap_second_pass_percentage(pass2_percentage: f64) -> f64 {
    50.0 + (pass2_percentage / 2.0).min(50.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_representative_stderr_line() {
        let line = "frame= 1234 fps= 29.97 q=28.0 size=   10240kB time=00:00:41.00 bitrate=2048.0kbits/s speed=1.02x";
        let sample = parse_line(line, Some(120.0));
        assert_eq!(sample.frame, Some(1234));
        assert_eq!(sample.fps, Some(29.97));
        assert_eq!(sample.time_seconds, Some(41.0));
        assert_eq!(sample.bitrate_kbps, Some(2048.0));
        assert_eq!(sample.speed, Some(1.02));
        assert!((sample.percentage.unwrap() - 34.166_666_666_666_67).abs() < 1e-6);
    }

    #[test]
    fn percentage_clamped_to_100() {
        let line = "time=01:00:00.00";
        let sample = parse_line(line, Some(30.0));
        assert_eq!(sample.percentage, Some(100.0));
    }

    #[test]
    fn percentage_omitted_when_duration_unknown() {
        let line = "time=00:00:30.00";
        let sample = parse_line(line, None);
        assert_eq!(sample.percentage, None);
    }

    #[test]
    fn zero_duration_with_positive_time_is_100_percent() {
        let line = "time=00:00:01.00";
        let sample = parse_line(line, Some(0.0));
        assert_eq!(sample.percentage, Some(100.0));
    }

    #[test]
    fn second_pass_percentage_spans_50_to_100() {
        assert_eq!(remap_second_pass_percentage(0.0), 50.0);
        assert_eq!(remap_second_pass_percentage(100.0), 100.0);
        assert_eq!(remap_second_pass_percentage(50.0), 75.0);
    }

    #[test]
    fn non_matching_line_yields_empty_sample() {
        let sample = parse_line("Input #0, mov,mp4,m4a,3gp,3g2,mj2", None);
        assert!(sample.is_empty());
    }
}
