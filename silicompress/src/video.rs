//! Video re-encoding through an external transcoder

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::Error;

pub const DEFAULT_VIDEO_WIDTH: u32 = 1920;
pub const DEFAULT_VIDEO_HEIGHT: u32 = 1080;
pub const DEFAULT_VIDEO_BITRATE: u32 = 5_000_000;

/// Target used when a request leaves a value at zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDefaults {
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

impl Default for VideoDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_VIDEO_WIDTH,
            height: DEFAULT_VIDEO_HEIGHT,
            bitrate: DEFAULT_VIDEO_BITRATE,
        }
    }
}

/// Caller's view of a conversion. Zero means "use the default".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeRequest {
    pub source: PathBuf,
    pub destination_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
}

impl TranscodeRequest {
    pub fn new(source: impl Into<PathBuf>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination_dir: destination_dir.into(),
            width: 0,
            height: 0,
            bitrate: 0,
        }
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Fill in defaults and orient the target box to match the source.
    ///
    /// A source stored with a 90 or 270 degree rotation is displayed on its
    /// side, so the target width and height trade places.
    pub fn resolve(&self, defaults: VideoDefaults, rotation: u32, output: PathBuf) -> Result<TranscodeParams, Error> {
        if self.source.as_os_str().is_empty() {
            return Err(Error::invalid("source path is empty"));
        }

        let or_default = |value: u32, default: u32| if value > 0 { value } else { default };

        let mut width = or_default(self.width, defaults.width);
        let mut height = or_default(self.height, defaults.height);
        let bitrate = or_default(self.bitrate, defaults.bitrate);

        if width == 0 || height == 0 || bitrate == 0 {
            return Err(Error::invalid(format!(
                "unresolved target {width}x{height} @ {bitrate} bps"
            )));
        }

        let rotation = rotation % 360;
        if rotation == 90 || rotation == 270 {
            std::mem::swap(&mut width, &mut height);
        }

        Ok(TranscodeParams {
            source: self.source.clone(),
            output,
            width,
            height,
            bitrate,
            rotation,
        })
    }
}

/// Fully resolved conversion handed to a [`VideoTranscoder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
    pub bitrate: u32,
    pub rotation: u32,
}

/// Something that can re-encode a video file.
pub trait VideoTranscoder: Send + Sync {
    /// Display rotation of the source in degrees
    fn probe_rotation(&self, _source: &Path) -> Result<u32> {
        Ok(0)
    }

    /// Write the re-encoded video to `params.output`
    fn transcode(&self, params: &TranscodeParams) -> Result<()>;
}

/// Transcoder backed by the `ffmpeg` and `ffprobe` executables
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }
}

impl FfmpegTranscoder {
    pub fn with_binaries(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Checks if ffmpeg can be executed
    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn args(params: &TranscodeParams) -> Vec<String> {
        let bitrate_k = (params.bitrate / 1000).max(1);
        vec![
            "-y".into(),
            "-v".into(),
            "error".into(),
            "-i".into(),
            params.source.to_string_lossy().into_owned(),
            "-vf".into(),
            format!(
                "scale=w={}:h={}:force_original_aspect_ratio=decrease:force_divisible_by=2",
                params.width, params.height
            ),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "medium".into(),
            "-b:v".into(),
            format!("{bitrate_k}k"),
            "-maxrate".into(),
            format!("{bitrate_k}k"),
            "-bufsize".into(),
            format!("{}k", bitrate_k * 2),
            "-c:a".into(),
            "aac".into(),
            "-movflags".into(),
            "+faststart".into(),
            params.output.to_string_lossy().into_owned(),
        ]
    }
}

impl VideoTranscoder for FfmpegTranscoder {
    fn probe_rotation(&self, source: &Path) -> Result<u32> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream_tags=rotate:stream_side_data=rotation",
                "-of",
                "json",
            ])
            .arg(source)
            .output()
            .context("Failed to execute ffprobe")?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed with code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(parse_rotation(&String::from_utf8_lossy(&output.stdout)).unwrap_or(0))
    }

    fn transcode(&self, params: &TranscodeParams) -> Result<()> {
        if !self.is_available() {
            return Err(Error::TranscoderUnavailable(format!(
                "{} is not found in PATH",
                self.ffmpeg.display()
            ))
            .into());
        }

        log::debug!("Running {} {:?}", self.ffmpeg.display(), Self::args(params));

        let output = Command::new(&self.ffmpeg)
            .args(Self::args(params))
            .output()
            .context("Failed to execute ffmpeg")?;

        if !output.status.success() {
            let code = output.status.code();
            anyhow::bail!(
                "ffmpeg failed with code {:?}: {}",
                code,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        Ok(())
    }
}

/// Rotation in degrees from `ffprobe -of json` output, normalized to 0..360.
///
/// Newer ffmpeg reports a display matrix rotation (counter-clockwise, often
/// negative), older versions a `rotate` tag.
fn parse_rotation(json: &str) -> Option<u32> {
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let stream = value.get("streams")?.get(0)?;

    let from_side_data = stream
        .get("side_data_list")
        .and_then(|list| list.as_array())
        .and_then(|list| list.iter().find_map(|entry| entry.get("rotation")?.as_i64()))
        .map(|degrees| -degrees);

    let from_tag = || {
        stream
            .get("tags")?
            .get("rotate")?
            .as_str()?
            .trim()
            .parse::<i64>()
            .ok()
    };

    let degrees = from_side_data.or_else(from_tag)?;
    Some(degrees.rem_euclid(360) as u32)
}
