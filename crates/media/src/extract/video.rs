//! Video metadata via an external `ffprobe` process.

use crate::error::{ErrorKind, Result};
use crate::models::VideoMetadata;
use exn::{OptionExt, ResultExt};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Locate an `ffprobe` executable on `PATH`.
pub(crate) fn discover() -> Result<PathBuf> {
    match which::which("ffprobe") {
        Ok(path) => Ok(path),
        Err(_) => {
            tracing::info!("ffprobe executable not found in PATH");
            exn::bail!(ErrorKind::ProberNotFound);
        },
    }
}

/// Probe `path` with `ffprobe` and parse its JSON report.
pub(crate) fn extract(ffprobe: &Path, path: &Path, timeout: Duration) -> Result<VideoMetadata> {
    let mut command = Command::new(ffprobe);
    command
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path);
    let output = run(command, path, timeout)?;
    parse_probe_output(&output)
}

/// Run a probe command to completion, killing it once `timeout` elapses.
fn run(mut command: Command, path: &Path, timeout: Duration) -> Result<Vec<u8>> {
    let mut child = match command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::null()).spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(e).or_raise(|| ErrorKind::ProberNotFound);
        },
        Err(e) => return Err(e).or_raise(|| ErrorKind::ProbeFailed(path.to_path_buf())),
    };
    // Drain stdout on its own thread so a large report can't fill the pipe
    // and stall the child while it is being polled.
    let mut stdout = child.stdout.take().ok_or_raise(|| ErrorKind::ProbeFailed(path.to_path_buf()))?;
    let reader = std::thread::spawn(move || {
        let mut buffer = Vec::new();
        stdout.read_to_end(&mut buffer).map(|_| buffer)
    });

    let status = wait(&mut child, timeout)?;
    let output = reader
        .join()
        .ok()
        .ok_or_raise(|| ErrorKind::ProbeFailed(path.to_path_buf()))?
        .map_err(ErrorKind::Io)?;
    if !status.success() {
        tracing::debug!(path = %path.display(), %status, "ffprobe exited unsuccessfully");
        exn::bail!(ErrorKind::ProbeFailed(path.to_path_buf()));
    }
    Ok(output)
}

fn wait(child: &mut Child, timeout: Duration) -> Result<std::process::ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().map_err(ErrorKind::Io)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            // Killing an already-exited child fails harmlessly.
            let _ = child.kill();
            let _ = child.wait();
            exn::bail!(ErrorKind::ProbeTimeout(timeout));
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[derive(Debug, Default, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    bit_rate: Option<String>,
    color_space: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Build [`VideoMetadata`] from `ffprobe -print_format json` output.
///
/// Only the first video stream and the first audio stream are considered. A
/// report without a video stream still yields metadata, with zero dimensions
/// and the container duration.
pub(crate) fn parse_probe_output(output: &[u8]) -> Result<VideoMetadata> {
    let report: ProbeReport = serde_json::from_slice(output)
        .or_raise(|| ErrorKind::InvalidProbeOutput("malformed JSON".to_string()))?;
    let find = |kind: &str| report.streams.iter().find(|s| s.codec_type.as_deref() == Some(kind));
    let video = find("video");
    let audio = find("audio");
    if video.is_none() {
        tracing::debug!("ffprobe reported no video stream");
    }

    let duration = [
        video.and_then(|v| v.duration.as_deref()),
        report.format.as_ref().and_then(|f| f.duration.as_deref()),
    ]
    .into_iter()
    .flatten()
    .find_map(|d| d.trim().parse::<f64>().ok())
    .unwrap_or_default();

    Ok(VideoMetadata {
        width: video.and_then(|v| v.width).unwrap_or_default(),
        height: video.and_then(|v| v.height).unwrap_or_default(),
        duration,
        codec: video.and_then(|v| non_empty(&v.codec_name)),
        frame_rate: video.and_then(|v| v.avg_frame_rate.as_deref()).and_then(parse_frame_rate),
        bit_rate: video.and_then(|v| non_empty(&v.bit_rate)),
        color_profile: video.and_then(|v| non_empty(&v.color_space)),
        audio_codec: audio.and_then(|a| non_empty(&a.codec_name)),
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.is_empty()).map(str::to_string)
}

/// Parse a `"num/den"` (or plain decimal) frame rate. A zero denominator
/// yields `None`.
pub(crate) fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den != 0.0).then(|| num / den)
        },
        None => rate.trim().parse().ok(),
    }
}
