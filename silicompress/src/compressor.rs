use anyhow::{Context, Result};

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;

use crate::config::CompressorConfig;
use crate::error::Error;
use crate::image::{self, ImageRequest};
use crate::output;
use crate::sample_size::{self, ImageDimensions, SampleFactor};
use crate::video::{FfmpegTranscoder, TranscodeRequest, VideoTranscoder};

static SHARED: OnceLock<Compressor> = OnceLock::new();

/// Entry point for image and video compression
#[derive(Clone)]
pub struct Compressor {
    config: CompressorConfig,
    transcoder: Arc<dyn VideoTranscoder>,
}

impl std::fmt::Debug for Compressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compressor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Compressor {
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Process-wide instance, built on first use from the saved config
    pub fn shared() -> &'static Compressor {
        SHARED.get_or_init(|| {
            log::debug!("Initializing shared compressor");
            Compressor::builder()
                .config(CompressorConfig::load().unwrap_or_default())
                .build()
        })
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn sample_size(&self, original: ImageDimensions, requested: ImageDimensions) -> Result<SampleFactor, Error> {
        sample_size::compute(original, requested)
    }

    /// Compress an image with the configured bounds and format
    pub fn compress_image(&self, source: impl AsRef<Path>, destination_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let request = ImageRequest::new(source.as_ref(), destination_dir.as_ref())
            .max_dimensions(self.config.max_dimensions)
            .format(self.config.image_format);
        image::compress_image(&request)
    }

    pub fn compress_image_with(&self, request: &ImageRequest) -> Result<PathBuf> {
        image::compress_image(request)
    }

    pub fn compress_images(&self, requests: &[ImageRequest]) -> Vec<Result<PathBuf>> {
        image::compress_images(requests)
    }

    /// Re-encode a video into `destination_dir`.
    ///
    /// `width`, `height` and `bitrate` of 0 fall back to the configured defaults.
    pub fn compress_video(
        &self,
        source: impl AsRef<Path>,
        destination_dir: impl AsRef<Path>,
        width: u32,
        height: u32,
        bitrate: u32,
    ) -> Result<PathBuf> {
        let request = TranscodeRequest::new(source.as_ref(), destination_dir.as_ref())
            .size(width, height)
            .bitrate(bitrate);
        self.compress_video_with(&request)
    }

    pub fn compress_video_with(&self, request: &TranscodeRequest) -> Result<PathBuf> {
        if request.source.as_os_str().is_empty() {
            return Err(Error::invalid("source path is empty").into());
        }
        if !request.source.is_file() {
            return Err(Error::SourceNotReadable(request.source.clone()).into());
        }

        let rotation = self
            .transcoder
            .probe_rotation(&request.source)
            .unwrap_or_else(|e| {
                log::warn!("Could not probe rotation of {}: {:#}", request.source.display(), e);
                0
            });

        let output = output::timestamped_path(
            &request.destination_dir,
            "VIDEO",
            output::VIDEO_TIMESTAMP,
            "mp4",
        )?;
        let params = request.resolve(self.config.video, rotation, output)?;

        log::info!(
            "Converting {} to {}x{} @ {} bps",
            params.source.display(),
            params.width,
            params.height,
            params.bitrate
        );

        if let Err(e) = self.transcoder.transcode(&params) {
            discard_partial(&params.output);
            return Err(e)
                .with_context(|| format!("Video conversion failed for {}", params.source.display()));
        }

        log::info!("Video conversion complete: {}", params.output.display());

        Ok(params.output)
    }

    /// Run [`compress_video_with`](Self::compress_video_with) on a background
    /// thread. Join the handle for the output path or the failure.
    pub fn schedule_video(&self, request: TranscodeRequest) -> JoinHandle<Result<PathBuf>> {
        let compressor = self.clone();
        log::debug!("Scheduling conversion of {}", request.source.display());
        std::thread::spawn(move || compressor.compress_video_with(&request))
    }
}

fn discard_partial(path: &Path) {
    if !path.exists() {
        return;
    }
    match std::fs::remove_file(path) {
        Ok(()) => log::debug!("Removed partial output {}", path.display()),
        Err(e) => log::warn!("Failed to remove partial output {}: {}", path.display(), e),
    }
}

#[derive(Default)]
pub struct Builder {
    config: Option<CompressorConfig>,
    transcoder: Option<Arc<dyn VideoTranscoder>>,
}

impl Builder {
    pub fn config(mut self, config: CompressorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn transcoder(mut self, transcoder: Arc<dyn VideoTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    pub fn build(self) -> Compressor {
        Compressor {
            config: self.config.unwrap_or_default(),
            transcoder: self
                .transcoder
                .unwrap_or_else(|| Arc::new(FfmpegTranscoder::default())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::{TranscodeParams, VideoDefaults};
    use imageproc::image::{Rgb, RgbImage};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTranscoder {
        rotation: u32,
        seen: Mutex<Vec<TranscodeParams>>,
    }

    impl VideoTranscoder for RecordingTranscoder {
        fn probe_rotation(&self, _source: &Path) -> Result<u32> {
            Ok(self.rotation)
        }

        fn transcode(&self, params: &TranscodeParams) -> Result<()> {
            std::fs::write(&params.output, b"mp4")?;
            self.seen.lock().unwrap().push(params.clone());
            Ok(())
        }
    }

    struct FailingTranscoder;

    impl VideoTranscoder for FailingTranscoder {
        fn transcode(&self, _params: &TranscodeParams) -> Result<()> {
            anyhow::bail!("encoder exploded")
        }
    }

    struct TruncatingTranscoder;

    impl VideoTranscoder for TruncatingTranscoder {
        fn transcode(&self, params: &TranscodeParams) -> Result<()> {
            std::fs::write(&params.output, b"ftyp")?;
            anyhow::bail!("stream ended early")
        }
    }

    fn fake_video(dir: &Path) -> PathBuf {
        let path = dir.join("clip.mp4");
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    #[test]
    fn forwards_caller_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let source = fake_video(dir.path());
        let transcoder = Arc::new(RecordingTranscoder::default());
        let compressor = Compressor::builder().transcoder(transcoder.clone()).build();

        let out = compressor
            .compress_video(&source, dir.path().join("out"), 640, 360, 1_000_000)
            .unwrap();

        let seen = transcoder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!((seen[0].width, seen[0].height, seen[0].bitrate), (640, 360, 1_000_000));
        assert_eq!(seen[0].source, source);
        assert_eq!(seen[0].output, out);
        assert!(out.is_file());

        let name = out.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("VIDEO_") && name.ends_with(".mp4"), "{name}");
    }

    #[test]
    fn zero_parameters_use_configured_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(RecordingTranscoder {
            rotation: 90,
            ..Default::default()
        });
        let config = CompressorConfig {
            video: VideoDefaults {
                width: 1280,
                height: 720,
                bitrate: 2_000_000,
            },
            ..Default::default()
        };
        let compressor = Compressor::builder()
            .config(config)
            .transcoder(transcoder.clone())
            .build();

        compressor
            .compress_video(fake_video(dir.path()), dir.path(), 0, 0, 0)
            .unwrap();

        let seen = transcoder.seen.lock().unwrap();
        assert_eq!((seen[0].width, seen[0].height, seen[0].bitrate), (720, 1280, 2_000_000));
        assert_eq!(seen[0].rotation, 90);
    }

    #[test]
    fn missing_video_is_not_readable() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let compressor = Compressor::builder().transcoder(transcoder.clone()).build();

        let err = compressor
            .compress_video(dir.path().join("gone.mp4"), dir.path(), 0, 0, 0)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::SourceNotReadable(_))
        ));
        assert!(transcoder.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn transcoder_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = Compressor::builder()
            .transcoder(Arc::new(FailingTranscoder))
            .build();

        let err = compressor
            .compress_video(fake_video(dir.path()), dir.path(), 0, 0, 0)
            .unwrap_err();
        assert!(format!("{err:#}").contains("encoder exploded"));
    }

    #[test]
    fn failed_conversion_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let compressor = Compressor::builder()
            .transcoder(Arc::new(TruncatingTranscoder))
            .build();

        let err = compressor
            .compress_video(fake_video(dir.path()), &out_dir, 0, 0, 0)
            .unwrap_err();

        assert!(format!("{err:#}").contains("stream ended early"));
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[test]
    fn scheduled_video_runs_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = Arc::new(RecordingTranscoder::default());
        let compressor = Compressor::builder().transcoder(transcoder.clone()).build();

        let request = TranscodeRequest::new(fake_video(dir.path()), dir.path().join("out"))
            .size(1280, 720)
            .bitrate(2_000_000);
        let handle = compressor.schedule_video(request);
        let out = handle.join().unwrap().unwrap();

        assert!(out.is_file());
        let seen = transcoder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!((seen[0].width, seen[0].height, seen[0].bitrate), (1280, 720, 2_000_000));
        assert_eq!(seen[0].output, out);
    }

    #[test]
    fn scheduled_video_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let compressor = Compressor::builder()
            .transcoder(Arc::new(FailingTranscoder))
            .build();

        let request = TranscodeRequest::new(fake_video(dir.path()), dir.path());
        let handle = compressor.schedule_video(request);
        let err = handle.join().unwrap().unwrap_err();
        assert!(format!("{err:#}").contains("encoder exploded"));
    }

    #[test]
    fn compress_image_uses_config() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("wide.png");
        RgbImage::from_pixel(1000, 500, Rgb([1, 2, 3])).save(&source).unwrap();

        let compressor = Compressor::builder()
            .config(CompressorConfig {
                max_dimensions: ImageDimensions::new(200, 200),
                ..Default::default()
            })
            .build();

        let out = compressor.compress_image(&source, dir.path().join("out")).unwrap();
        let img = image::decode_bytes(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
    }

    #[test]
    fn sample_size_delegates() {
        let compressor = Compressor::builder().build();
        let factor = compressor
            .sample_size(ImageDimensions::new(4000, 3000), ImageDimensions::new(1200, 1200))
            .unwrap();
        assert_eq!(factor.get(), 3);
    }

    #[test]
    fn shared_is_initialized_once() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| Compressor::shared() as *const Compressor as usize))
            .collect();
        let addresses: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }
}
