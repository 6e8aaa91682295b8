use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, warn};

use crate::errors::{PipelineError, PipelineResult};
use crate::scene_detector::frame_difference;

fn get_ffmpeg_path() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

fn get_ffprobe_path() -> String {
    std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string())
}

fn decode_failure(video: &Path, reason: impl Into<String>) -> PipelineError {
    PipelineError::DecodeFailure {
        video: video.to_path_buf(),
        reason: reason.into(),
    }
}

#[derive(Debug, Clone)]
pub struct VideoInfo {
    pub duration: f64,
    pub fps: f64,
    pub frame_count: u64,
    pub width: i32,
    pub height: i32,
}

pub fn probe_video(video_path: &Path) -> PipelineResult<VideoInfo> {
    let output = Command::new(get_ffprobe_path())
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(video_path)
        .output()
        .map_err(|e| decode_failure(video_path, format!("ffprobe failed: {}", e)))?;

    if !output.status.success() {
        return Err(decode_failure(
            video_path,
            format!("ffprobe exited with status: {}", output.status),
        ));
    }

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| decode_failure(video_path, format!("ffprobe JSON parse error: {}", e)))?;

    let duration = parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0);

    let streams = parsed["streams"]
        .as_array()
        .ok_or_else(|| decode_failure(video_path, "no streams found"))?;

    let video_stream = streams
        .iter()
        .find(|stream| stream["codec_type"] == "video")
        .ok_or_else(|| decode_failure(video_path, "no video stream found"))?;

    let width = video_stream["width"].as_i64().unwrap_or(0) as i32;
    let height = video_stream["height"].as_i64().unwrap_or(0) as i32;

    let fps = video_stream["avg_frame_rate"]
        .as_str()
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    // nb_frames is container-dependent; fall back to duration * fps.
    let frame_count = video_stream["nb_frames"]
        .as_str()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or_else(|| (duration * fps).round() as u64);

    Ok(VideoInfo {
        duration,
        fps,
        frame_count,
        width,
        height,
    })
}

/// Parses an ffprobe rational frame rate such as "30000/1001".
fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => raw.parse().ok(),
    }
}

/// Decodes the video as downscaled grayscale frames and returns the
/// content-change score of every frame relative to its predecessor.
///
/// The result has one entry per decoded frame (the first is 0.0), so its
/// length doubles as the authoritative frame count for segmentation. Frames
/// stream through a rawvideo pipe; only one previous frame is held in memory.
pub fn frame_difference_scores(
    video_path: &Path,
    width: u32,
    height: u32,
) -> PipelineResult<Vec<f32>> {
    let mut child = Command::new(get_ffmpeg_path())
        .args(["-v", "error", "-i"])
        .arg(video_path)
        .args([
            "-vf",
            &format!("scale={}:{}", width, height),
            "-pix_fmt",
            "gray",
            "-f",
            "rawvideo",
            "pipe:1",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| decode_failure(video_path, format!("ffmpeg failed: {}", e)))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| decode_failure(video_path, "ffmpeg produced no stdout pipe"))?;

    let frame_size = (width * height) as usize;
    let mut buf = vec![0u8; frame_size];
    let mut prev: Option<Vec<u8>> = None;
    let mut scores = Vec::new();

    while read_full_frame(&mut stdout, &mut buf)
        .map_err(|e| decode_failure(video_path, format!("rawvideo read error: {}", e)))?
    {
        let score = match &prev {
            Some(prev_frame) => frame_difference(prev_frame, &buf),
            None => 0.0,
        };
        scores.push(score);
        prev = Some(std::mem::take(&mut buf));
        buf = vec![0u8; frame_size];
    }

    let status = child
        .wait()
        .map_err(|e| decode_failure(video_path, format!("ffmpeg wait failed: {}", e)))?;

    if scores.is_empty() && !status.success() {
        return Err(decode_failure(
            video_path,
            format!("ffmpeg exited with status: {}", status),
        ));
    }

    debug!(
        "Decoded {} analysis frames from {}",
        scores.len(),
        video_path.display()
    );

    Ok(scores)
}

/// Reads exactly one frame into `buf`. Returns false on clean end-of-stream;
/// a truncated trailing frame is discarded.
fn read_full_frame(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(true)
}

/// Extracts the given absolute frame numbers as JPEG files in a single ffmpeg
/// invocation, which is much faster than seeking per frame.
///
/// Returns `(frame_number, file_path)` pairs for the frames that actually
/// decoded; requested numbers past the end of the stream are reported and
/// dropped, not errors. Duplicate frame numbers are decoded once.
pub fn extract_frames_batch(
    video_path: &Path,
    frame_numbers: &[u64],
    output_dir: &Path,
) -> PipelineResult<Vec<(u64, PathBuf)>> {
    if frame_numbers.is_empty() {
        return Ok(Vec::new());
    }

    let mut wanted: Vec<u64> = frame_numbers.to_vec();
    wanted.sort_unstable();
    wanted.dedup();

    std::fs::create_dir_all(output_dir)?;

    let select_expr = wanted
        .iter()
        .map(|n| format!("eq(n\\,{})", n))
        .collect::<Vec<_>>()
        .join("+");

    let output_pattern = output_dir.join("frame_%05d.jpg");

    let output = Command::new(get_ffmpeg_path())
        .args(["-y", "-v", "error", "-i"])
        .arg(video_path)
        .args([
            "-vf",
            &format!("select={}", select_expr),
            "-vsync",
            "0",
            "-q:v",
            "2",
        ])
        .arg(&output_pattern)
        .output()
        .map_err(|e| decode_failure(video_path, format!("ffmpeg failed: {}", e)))?;

    if !output.status.success() {
        return Err(decode_failure(
            video_path,
            format!("ffmpeg exited with status: {}", output.status),
        ));
    }

    // select passes frames in stream order, so the Nth output file is the Nth
    // requested frame number in sorted order.
    let mut extracted = Vec::with_capacity(wanted.len());
    for (i, &frame_number) in wanted.iter().enumerate() {
        let frame_path = output_dir.join(format!("frame_{:05}.jpg", i + 1));
        if frame_path.exists() {
            extracted.push((frame_number, frame_path));
        } else {
            warn!(
                "Frame {} of {} was not decoded (past end of stream?)",
                frame_number,
                video_path.display()
            );
        }
    }

    Ok(extracted)
}

/// Decodes one exact frame and writes it to `output_path` as an image.
pub fn extract_frame(
    video_path: &Path,
    frame_number: u64,
    output_path: &Path,
) -> PipelineResult<()> {
    if let Some(parent) = output_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let output = Command::new(get_ffmpeg_path())
        .args(["-y", "-v", "error", "-i"])
        .arg(video_path)
        .args([
            "-vf",
            &format!("select=eq(n\\,{})", frame_number),
            "-vsync",
            "0",
            "-frames:v",
            "1",
            "-q:v",
            "2",
        ])
        .arg(output_path)
        .output()
        .map_err(|e| decode_failure(video_path, format!("ffmpeg failed: {}", e)))?;

    if !output.status.success() {
        return Err(decode_failure(
            video_path,
            format!("ffmpeg exited with status: {}", output.status),
        ));
    }

    // ffmpeg exits 0 with no output when the select filter matches nothing.
    if !output_path.exists() {
        return Err(decode_failure(
            video_path,
            format!("frame {} not found in stream", frame_number),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn has_command(cmd: &str) -> bool {
        std::process::Command::new(cmd)
            .arg("-version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn should_run_video_tests() -> bool {
        let run_var = std::env::var("RUN_VIDEO_TESTS").unwrap_or_default();
        if !(run_var == "1" || run_var.eq_ignore_ascii_case("true")) {
            eprintln!("RUN_VIDEO_TESTS not set to '1' or 'true'; skipping video tests");
            return false;
        }
        if !has_command("ffmpeg") || !has_command("ffprobe") {
            eprintln!("ffmpeg/ffprobe not found in PATH; skipping video tests");
            return false;
        }
        true
    }

    // 3 seconds of the testsrc pattern at 30 fps = 90 frames.
    fn generate_test_video(dir: &Path) -> PathBuf {
        let path = dir.join("testsrc.mp4");
        let status = std::process::Command::new(get_ffmpeg_path())
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=3:rate=30"])
            .arg(&path)
            .status()
            .expect("failed to run ffmpeg");
        assert!(status.success(), "test video generation failed");
        path
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(
            parse_frame_rate("30000/1001").map(|f| (f * 1000.0).round()),
            Some(29970.0)
        );
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_probe_missing_file_is_error() {
        let result = probe_video(Path::new("/nonexistent/video.mp4"));
        assert!(result.is_err());
    }

    #[test]
    fn test_probe_and_scores_on_generated_video() {
        if !should_run_video_tests() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let video = generate_test_video(temp.path());

        let info = probe_video(&video).unwrap();
        assert_eq!(info.frame_count, 90);
        assert!((info.fps - 30.0).abs() < 0.1);

        let scores = frame_difference_scores(&video, 96, 54).unwrap();
        assert_eq!(scores.len(), 90);
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn test_extract_frames_batch_drops_out_of_range() {
        if !should_run_video_tests() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let video = generate_test_video(temp.path());
        let out_dir = temp.path().join("frames");

        let extracted = extract_frames_batch(&video, &[0, 30, 60, 5000], &out_dir).unwrap();
        let numbers: Vec<u64> = extracted.iter().map(|(n, _)| *n).collect();

        assert_eq!(numbers, vec![0, 30, 60]);
        for (_, path) in &extracted {
            assert!(path.exists());
            assert!(image::open(path).is_ok());
        }
    }

    #[test]
    fn test_extract_single_frame() {
        if !should_run_video_tests() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let video = generate_test_video(temp.path());
        let out = temp.path().join("match.jpg");

        extract_frame(&video, 45, &out).unwrap();
        assert!(out.exists());

        let past_end = extract_frame(&video, 100_000, &temp.path().join("none.jpg"));
        assert!(past_end.is_err());
    }
}
