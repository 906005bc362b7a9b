//! Release downloads and archive extraction.

use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::InstallError;

/// Stream `url` into `dest`, creating parent directories. Returns the number
/// of bytes written.
pub async fn download_file(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, InstallError> {
    info!(url, dest = %dest.display(), "Downloading");
    let download_err = |source| InstallError::Download {
        url: url.to_string(),
        source,
    };

    if let Some(parent) = dest.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;

    let mut file = File::create(dest).await?;
    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(download_err)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    info!(dest = %dest.display(), bytes = written, "Downloaded");
    Ok(written)
}

/// Unpack a gzip-compressed tarball into `dest`.
pub async fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<(), InstallError> {
    let archive_path = archive.to_path_buf();
    let dest = dest.to_path_buf();

    let path = archive_path.clone();
    tokio::task::spawn_blocking(move || -> io::Result<()> {
        std::fs::create_dir_all(&dest)?;
        let file = std::fs::File::open(&path)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(true);
        archive.unpack(&dest)
    })
    .await
    .map_err(io::Error::other)?
    .map_err(|source| InstallError::Extract {
        path: archive_path.clone(),
        source,
    })?;

    info!(archive = %archive_path.display(), "Extracted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve_bytes, serve_status, tgz_with};
    use tempfile::TempDir;

    #[tokio::test]
    async fn download_writes_body_and_creates_dirs() {
        let temp = TempDir::new().unwrap();
        let url = serve_bytes(b"binary-bytes".to_vec()).await;
        let dest = temp.path().join("a").join("b").join("cloudflared");

        let written = download_file(&reqwest::Client::new(), &url, &dest).await.unwrap();
        assert_eq!(written, 12);
        assert_eq!(std::fs::read(&dest).unwrap(), b"binary-bytes");
    }

    #[tokio::test]
    async fn download_rejects_error_status() {
        let temp = TempDir::new().unwrap();
        let url = serve_status(404, "Not Found").await;
        let dest = temp.path().join("cloudflared");

        let result = download_file(&reqwest::Client::new(), &url, &dest).await;
        assert!(matches!(result, Err(InstallError::Download { .. })));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn extract_unpacks_tarball() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("cloudflared.tgz");
        std::fs::write(&archive, tgz_with("cloudflared", b"#!/bin/sh\n", 0o755)).unwrap();
        let dest = temp.path().join("out");

        extract_tar_gz(&archive, &dest).await.unwrap();
        assert_eq!(std::fs::read(dest.join("cloudflared")).unwrap(), b"#!/bin/sh\n");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(dest.join("cloudflared")).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[tokio::test]
    async fn extract_reports_corrupt_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("broken.tgz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let result = extract_tar_gz(&archive, &temp.path().join("out")).await;
        assert!(matches!(result, Err(InstallError::Extract { path, .. }) if path == archive));
    }
}
