//! Fetch functions - download archived datasets and unpack them
//!
//! Hands the core a list of local file paths; everything in here is I/O
//! glue around reqwest, zip and tar.

use crate::error::{EtlError, Result};
use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// The file name a URL downloads to: its last path segment.
pub fn url_to_filename(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Download a raw dataset file into the raw data directory.
pub async fn download_file(url: &str, dir: &Path, fname: &str) -> Result<PathBuf> {
    info!("Downloading {}", url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    info!("Downloaded {} bytes", bytes.len());

    let path = dir.join(fname);
    fs::write(&path, &bytes)?;
    Ok(path)
}

/// Unpack a `.tar.gz` or `.zip` archive into `dest`, returning the paths
/// of the extracted files. Any other extension is a format error.
pub fn unpack_archive(path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let fname = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if fname.ends_with(".tar.gz") {
        return unpack_tar_gz(path, dest);
    }
    if fname.ends_with(".zip") {
        return unpack_zip(path, dest);
    }
    Err(EtlError::Format {
        path: path.to_path_buf(),
        reason: "unknown archive format".to_string(),
    })
}

fn unpack_tar_gz(path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    info!("Unpacking tar.gz archive {:?}", path.file_name());
    let file = fs::File::open(path)?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));

    let mut extracted = Vec::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.to_path_buf();
        if entry.unpack_in(dest)? && entry.header().entry_type().is_file() {
            extracted.push(dest.join(member));
        }
    }
    info!("Extracted {} files", extracted.len());
    Ok(extracted)
}

fn unpack_zip(path: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    info!("Unpacking zip archive {:?}", path.file_name());
    let file = fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut member = archive.by_index(i)?;
        let name = member.name().to_string();
        if name.ends_with('/') {
            continue;
        }
        let out_path = dest.join(&name);
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&out_path)?;
        io::copy(&mut member, &mut out)?;
        extracted.push(out_path);
    }
    info!("Extracted {} files", extracted.len());
    Ok(extracted)
}

/// The local files belonging to one downloaded dataset: the file itself
/// for plain `.csv`/`.txt` sources, the extracted members for archives.
pub fn dataset_files(raw_data_dir: &Path, fname: &str) -> Result<Vec<PathBuf>> {
    let path = raw_data_dir.join(fname);
    if fname.ends_with(".csv") || fname.ends_with(".txt") {
        return Ok(vec![path]);
    }
    unpack_archive(&path, raw_data_dir)
}
