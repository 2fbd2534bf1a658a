//! Output file naming and writing

use anyhow::{Context, Result};
use chrono::Local;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// `IMG_20260318_142501.jpg` style name
pub const IMAGE_TIMESTAMP: &str = "%Y%m%d_%H%M%S";
/// `VIDEO_18032026_142501.mp4` style name
pub const VIDEO_TIMESTAMP: &str = "%d%m%Y_%H%M%S";

fn stamped_name(prefix: &str, stamp: &str, extension: &str, suffixed: bool) -> String {
    if suffixed {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        format!("{prefix}_{stamp}_{}.{extension}", &suffix[..8])
    } else {
        format!("{prefix}_{stamp}.{extension}")
    }
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))
}

/// Create `dir` if needed and pick a timestamped file name that does not exist yet.
///
/// Used when another process writes the file. Two outputs in the same second
/// get a short random suffix.
pub fn timestamped_path(dir: &Path, prefix: &str, timestamp: &str, extension: &str) -> Result<PathBuf> {
    create_dir(dir)?;

    let stamp = Local::now().format(timestamp).to_string();
    let mut path = dir.join(stamped_name(prefix, &stamp, extension, false));
    while path.exists() {
        path = dir.join(stamped_name(prefix, &stamp, extension, true));
    }

    Ok(path)
}

/// Write `data` to a new timestamped file in `dir`.
///
/// The bytes go to a temp file first and are moved into place without
/// replacing anything, so concurrent writers in the same second each get
/// their own name and readers never see a partial file.
pub fn write_timestamped(
    dir: &Path,
    prefix: &str,
    timestamp: &str,
    extension: &str,
    data: &[u8],
) -> Result<PathBuf> {
    create_dir(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)?;

    let stamp = Local::now().format(timestamp).to_string();
    let mut path = dir.join(stamped_name(prefix, &stamp, extension, false));

    loop {
        match tmp.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
                log::trace!("{} exists, retrying with suffix", path.display());
                tmp = e.file;
                path = dir.join(stamped_name(prefix, &stamp, extension, true));
            }
            Err(e) => {
                return Err(e.error).with_context(|| format!("Failed to write {}", path.display()))
            }
        }
    }
}
