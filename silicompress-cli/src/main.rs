use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use silicompress::{
    Compressor, CompressorConfig, FfmpegTranscoder, ImageDimensions, ImageFormat, ImageRequest,
    PngCompression,
};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tif", "tiff"];

#[derive(Parser)]
#[command(name = "silicompress-cli")]
#[command(about = "Downscale images and re-encode videos", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true, default_value_t)]
    verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true, default_value_t)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Compress one or more images (directories are searched recursively)
    Image(ImageArgs),
    /// Re-encode a video with ffmpeg
    Video(VideoArgs),
    /// Print the decode sample factor for an image size and a target size
    SampleSize {
        original_width: u32,
        original_height: u32,
        requested_width: u32,
        requested_height: u32,
    },
}

#[derive(Args)]
struct ImageArgs {
    /// Input images or directories
    #[arg(value_name = "INPUT", required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Maximum output width
    #[arg(long, value_name = "PIXELS")]
    max_width: Option<u32>,

    /// Maximum output height
    #[arg(long, value_name = "PIXELS")]
    max_height: Option<u32>,

    /// Image format
    #[arg(long, value_enum)]
    format: Option<ImageFormatArg>,

    /// JPEG/WebP quality (1-100)
    #[arg(long, value_name = "QUALITY")]
    quality: Option<u8>,

    /// PNG compression level
    #[arg(long, value_enum)]
    png_compression: Option<PngCompressionArg>,

    /// Persist these settings as the new defaults
    #[arg(long, default_value_t)]
    save_config: bool,
}

#[derive(Args)]
struct VideoArgs {
    /// Input video
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output directory
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Target width (0 = default)
    #[arg(long, value_name = "PIXELS", default_value_t = 0)]
    width: u32,

    /// Target height (0 = default)
    #[arg(long, value_name = "PIXELS", default_value_t = 0)]
    height: u32,

    /// Target bitrate in bits per second (0 = default)
    #[arg(long, value_name = "BPS", default_value_t = 0)]
    bitrate: u32,

    /// ffmpeg executable
    #[arg(long, value_name = "PATH", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe executable
    #[arg(long, value_name = "PATH", default_value = "ffprobe")]
    ffprobe: PathBuf,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum ImageFormatArg {
    Jpeg,
    Png,
    Webp,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PngCompressionArg {
    Fast,
    Default,
    Best,
}

impl From<PngCompressionArg> for PngCompression {
    fn from(arg: PngCompressionArg) -> Self {
        match arg {
            PngCompressionArg::Fast => PngCompression::Fast,
            PngCompressionArg::Default => PngCompression::Default,
            PngCompressionArg::Best => PngCompression::Best,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = CompressorConfig::load().unwrap_or_default();

    match cli.command {
        Command::Image(args) => run_image(args, config),
        Command::Video(args) => run_video(args, config),
        Command::SampleSize {
            original_width,
            original_height,
            requested_width,
            requested_height,
        } => {
            let factor = silicompress::sample_size::compute(
                ImageDimensions::new(original_width, original_height),
                ImageDimensions::new(requested_width, requested_height),
            )?;
            println!("{factor}");
            Ok(())
        }
    }
}

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run_image(args: ImageArgs, mut config: CompressorConfig) -> Result<()> {
    apply_image_args(&args, &mut config)?;

    if args.save_config {
        match config.save() {
            Some(()) => log::info!("Saved settings as defaults"),
            None => log::warn!("Failed to save config"),
        }
    }

    let files = collect_images(&args.inputs)?;
    if files.is_empty() {
        anyhow::bail!("No images found");
    }
    log::info!("Found {} images", files.len());

    let compressor = Compressor::builder().config(config.clone()).build();

    let requests: Vec<ImageRequest> = files
        .into_iter()
        .map(|file| {
            ImageRequest::new(file, &args.output_dir)
                .max_dimensions(config.max_dimensions)
                .format(config.image_format)
        })
        .collect();

    let results = compressor.compress_images(&requests);
    let failed = results.iter().filter(|r| r.is_err()).count();

    for path in results.iter().flatten() {
        println!("{}", path.display());
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} images failed", results.len());
    }

    Ok(())
}

fn apply_image_args(args: &ImageArgs, config: &mut CompressorConfig) -> Result<()> {
    if let Some(width) = args.max_width {
        config.max_dimensions.width = width;
    }
    if let Some(height) = args.max_height {
        config.max_dimensions.height = height;
    }
    if config.max_dimensions.width == 0 || config.max_dimensions.height == 0 {
        anyhow::bail!("Maximum dimensions must be positive");
    }

    let current_compression = match config.image_format {
        ImageFormat::Png { compression } => compression,
        ImageFormat::Jpeg { .. } | ImageFormat::WebP { .. } => PngCompression::Default,
    };
    let compression = args
        .png_compression
        .map(PngCompression::from)
        .unwrap_or(current_compression);

    let current_quality = match config.image_format {
        ImageFormat::Jpeg { quality } | ImageFormat::WebP { quality } => quality,
        ImageFormat::Png { .. } => silicompress::image::DEFAULT_QUALITY,
    };
    let quality = args.quality.unwrap_or(current_quality);

    let format = args.format.or(match config.image_format {
        ImageFormat::Jpeg { .. } => Some(ImageFormatArg::Jpeg),
        ImageFormat::Png { .. } => Some(ImageFormatArg::Png),
        ImageFormat::WebP { .. } => Some(ImageFormatArg::Webp),
    });

    config.image_format = match format {
        Some(ImageFormatArg::Png) => ImageFormat::Png { compression },
        Some(ImageFormatArg::Webp) => ImageFormat::WebP { quality },
        Some(ImageFormatArg::Jpeg) | None => ImageFormat::Jpeg { quality },
    };
    config.image_format.validate()?;

    Ok(())
}

fn collect_images(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if !input.exists() {
            anyhow::bail!("Input does not exist: {}", input.display());
        }

        if input.is_file() {
            files.push(input.clone());
            continue;
        }

        for entry in walkdir::WalkDir::new(input).sort_by_file_name() {
            let entry =
                entry.with_context(|| format!("Failed to read directory {}", input.display()))?;
            if entry.file_type().is_file() && is_image(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn run_video(args: VideoArgs, config: CompressorConfig) -> Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {}", args.input.display());
    }

    let transcoder = FfmpegTranscoder::with_binaries(&args.ffmpeg, &args.ffprobe);
    if !transcoder.is_available() {
        anyhow::bail!(
            "{} is not available. Please install ffmpeg to convert videos.",
            args.ffmpeg.display()
        );
    }

    let compressor = Compressor::builder()
        .config(config)
        .transcoder(Arc::new(transcoder))
        .build();

    let output = compressor
        .compress_video(
            &args.input,
            &args.output_dir,
            args.width,
            args.height,
            args.bitrate,
        )
        .context("Failed to convert video")?;

    println!("{}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn image_flags_override_config() {
        let cli = Cli::parse_from([
            "silicompress-cli",
            "image",
            "a.jpg",
            "--max-width",
            "1024",
            "--format",
            "webp",
            "--quality",
            "70",
        ]);
        let Command::Image(args) = cli.command else {
            panic!("expected image command");
        };

        let mut config = CompressorConfig::default();
        apply_image_args(&args, &mut config).unwrap();

        assert_eq!(config.max_dimensions, ImageDimensions::new(1024, 816));
        assert_eq!(config.image_format, ImageFormat::WebP { quality: 70 });
    }

    #[test]
    fn saved_png_compression_survives_without_flag() {
        let cli = Cli::parse_from(["silicompress-cli", "image", "a.png"]);
        let Command::Image(args) = cli.command else {
            panic!("expected image command");
        };

        let mut config = CompressorConfig {
            image_format: ImageFormat::Png {
                compression: PngCompression::Best,
            },
            ..Default::default()
        };
        apply_image_args(&args, &mut config).unwrap();

        assert_eq!(
            config.image_format,
            ImageFormat::Png {
                compression: PngCompression::Best
            }
        );
    }

    #[test]
    fn png_compression_flag_overrides_saved() {
        let cli = Cli::parse_from([
            "silicompress-cli",
            "image",
            "a.png",
            "--png-compression",
            "fast",
        ]);
        let Command::Image(args) = cli.command else {
            panic!("expected image command");
        };

        let mut config = CompressorConfig {
            image_format: ImageFormat::Png {
                compression: PngCompression::Best,
            },
            ..Default::default()
        };
        apply_image_args(&args, &mut config).unwrap();

        assert_eq!(
            config.image_format,
            ImageFormat::Png {
                compression: PngCompression::Fast
            }
        );
    }

    #[test]
    fn quality_out_of_range_rejected() {
        let cli = Cli::parse_from(["silicompress-cli", "image", "a.jpg", "--quality", "0"]);
        let Command::Image(args) = cli.command else {
            panic!("expected image command");
        };
        assert!(apply_image_args(&args, &mut CompressorConfig::default()).is_err());
    }

    #[test]
    fn directories_are_walked_for_images() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.JPG"), b"").unwrap();
        std::fs::write(dir.path().join("sub").join("b.png"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = collect_images(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| is_image(f)));
    }
}
