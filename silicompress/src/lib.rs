pub mod compressor;
pub mod config;
pub mod error;
pub mod image;
pub mod output;
pub mod sample_size;
pub mod video;

// Re-export commonly used types
pub use compressor::Compressor;
pub use config::CompressorConfig;
pub use error::Error;
pub use image::{ImageFormat, ImageRequest, PngCompression};
pub use sample_size::{ImageDimensions, SampleFactor};
pub use video::{FfmpegTranscoder, TranscodeParams, TranscodeRequest, VideoTranscoder};
