//! Installer bundle acquisition.
//!
//! - Download is skipped when the archive is already on disk
//! - Optional sha256 verification of whatever is on disk
//! - Extraction always runs, through the system `tar`
//!
//! A partial or corrupt archive left by an earlier run is never re-fetched;
//! remove it by hand to force a new download.

mod fetch;

pub use fetch::{Fetcher, HttpFetcher};

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{IoContext, ProvisionError, Result};
use crate::process::{CommandRunner, CommandSpec};

/// Outcome of [`acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    AlreadyPresent,
    Downloaded,
}

/// Ensure `archive` exists, downloading it from `url` if it does not.
pub fn acquire(fetcher: &dyn Fetcher, url: &str, archive: &Path) -> Result<DownloadOutcome> {
    if archive.exists() {
        debug!(archive = %archive.display(), "archive present, skipping download");
        return Ok(DownloadOutcome::AlreadyPresent);
    }

    if let Some(parent) = archive.parent() {
        fs::create_dir_all(parent)
            .io_context(|| format!("creating install directory '{}'", parent.display()))?;
    }

    let partial = partial_path(archive);
    fetcher.fetch(url, &partial)?;
    fs::rename(&partial, archive).io_context(|| {
        format!(
            "renaming download '{}' -> '{}'",
            partial.display(),
            archive.display()
        )
    })?;

    info!(url, archive = %archive.display(), "installer bundle downloaded");
    Ok(DownloadOutcome::Downloaded)
}

fn partial_path(archive: &Path) -> PathBuf {
    let mut name = archive
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    archive.with_file_name(name)
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let f = File::open(path).io_context(|| format!("opening '{}'", path.display()))?;
    let mut r = BufReader::new(f);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r
            .read(&mut buf)
            .io_context(|| format!("reading '{}'", path.display()))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(ProvisionError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_ascii_lowercase(),
            actual,
        })
    }
}

pub fn extract_command(archive: &Path, dest: &Path) -> CommandSpec {
    CommandSpec::new("tar")
        .arg("-xzf")
        .path_arg(archive)
        .arg("-C")
        .path_arg(dest)
}

pub fn extract(runner: &mut dyn CommandRunner, archive: &Path, dest: &Path) -> Result<()> {
    runner.run(&extract_command(archive, dest))
}

/// Name of the top-level directory inside a gzip'd tarball, taken from the
/// first listed entry.
pub fn archive_top_level_dir(archive: &Path) -> Result<PathBuf> {
    let archive_err = |message: String| ProvisionError::Archive {
        path: archive.to_path_buf(),
        message,
    };

    let file = File::open(archive).io_context(|| format!("opening '{}'", archive.display()))?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut entries = tar
        .entries()
        .map_err(|err| archive_err(format!("listing entries: {err}")))?;
    let first = entries
        .next()
        .ok_or_else(|| archive_err("archive is empty".to_string()))?
        .map_err(|err| archive_err(format!("reading first entry: {err}")))?;
    let path = first
        .path()
        .map_err(|err| archive_err(format!("decoding first entry path: {err}")))?;

    path.components()
        .find_map(|component| match component {
            Component::Normal(part) => Some(PathBuf::from(part)),
            _ => None,
        })
        .ok_or_else(|| {
            archive_err(format!(
                "first entry '{}' has no directory component",
                path.display()
            ))
        })
}
