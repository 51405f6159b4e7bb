/*
 * slurpy - Arch User Repository search/download/update helper.
 * Copyright (C) 2025  slurpy contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Snapshot download and extraction.

use console::style;
use flate2::read::GzDecoder;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::Write;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tar::Archive;
use tracing::{debug, info, Instrument};

use super::client::AurPackage;
use crate::config::Config;
use crate::error::{SlurpyError, SlurpyResult};

/// Fetches package snapshots into the save directory, one at a time
pub struct Downloader {
    client: reqwest::Client,
    base_url: String,
    save_to: PathBuf,
    force: bool,
    keep_tarball: bool,
    quiet: bool,
}

impl Downloader {
    pub fn new(config: &Config, force: bool, quiet: bool) -> SlurpyResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.aur.timeout_secs.min(10)))
            .user_agent(concat!("slurpy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SlurpyError::ConfigError {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.aur.base_url.clone(),
            save_to: config.save_to.clone(),
            force,
            keep_tarball: config.keep_tarball,
            quiet,
        })
    }

    /// Directory a package base is extracted into
    pub fn target_dir(&self, info: &AurPackage) -> PathBuf {
        self.save_to.join(&info.package_base)
    }

    /// Make room for a fresh extraction, honoring --force
    fn prepare_target(&self, extract_dir: &Path) -> SlurpyResult<()> {
        fs::create_dir_all(&self.save_to)
            .map_err(|e| SlurpyError::filesystem(&self.save_to, "cannot create download directory", e))?;

        if extract_dir.exists() {
            if !self.force {
                return Err(SlurpyError::TargetExists {
                    path: extract_dir.to_path_buf(),
                });
            }
            debug!(path = %extract_dir.display(), "removing old package directory");
            fs::remove_dir_all(extract_dir)
                .map_err(|e| SlurpyError::filesystem(extract_dir, "cannot remove old package directory", e))?;
        }
        Ok(())
    }

    /// Download and extract a package snapshot, returning the extracted directory
    pub async fn fetch(&self, info: &AurPackage) -> SlurpyResult<PathBuf> {
        let span = tracing::info_span!("download", package = %info.package_base);
        self.fetch_inner(info).instrument(span).await
    }

    async fn fetch_inner(&self, info: &AurPackage) -> SlurpyResult<PathBuf> {
        let snapshot_url = info.snapshot_url(&self.base_url)?;
        let tarball_path = self.save_to.join(format!("{}.tar.gz", info.package_base));
        let extract_dir = self.target_dir(info);

        self.prepare_target(&extract_dir)?;

        info!(url = %snapshot_url, "downloading snapshot");
        let response = self
            .client
            .get(&snapshot_url)
            .send()
            .await
            .map_err(|e| SlurpyError::network(&snapshot_url, e))?;

        if !response.status().is_success() {
            return Err(SlurpyError::http_status(&snapshot_url, response.status().as_u16()));
        }

        if let Err(e) = self.write_tarball(response, &tarball_path, &snapshot_url).await {
            remove_quietly(&tarball_path);
            return Err(e);
        }

        let extracted = extract_snapshot(&tarball_path, &self.save_to, &info.package_base);

        if !self.keep_tarball {
            remove_quietly(&tarball_path);
        }
        if let Err(e) = extracted {
            if let Err(cleanup) = fs::remove_dir_all(&extract_dir) {
                debug!(path = %extract_dir.display(), error = %cleanup, "could not remove partial extraction");
            }
            return Err(e);
        }

        if !self.quiet {
            println!(
                "{} {} {}",
                style("->").green(),
                style(&info.package_base).white().bold(),
                style(format!("saved to {}", extract_dir.display())).dim()
            );
        }

        Ok(extract_dir)
    }

    /// Stream the response body into `tarball_path` behind a progress bar
    async fn write_tarball(
        &self,
        response: reqwest::Response,
        tarball_path: &Path,
        snapshot_url: &str,
    ) -> SlurpyResult<()> {
        let total_size = response.content_length().unwrap_or(0);
        let pb = if self.quiet || total_size == 0 {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new(total_size);
            let bar_style = ProgressStyle::default_bar()
                .template("   {spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-");
            pb.set_style(bar_style);
            pb
        };

        let mut file = fs::File::create(tarball_path)
            .map_err(|e| SlurpyError::filesystem(tarball_path, "cannot create tarball", e))?;
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    pb.abandon();
                    return Err(SlurpyError::network(snapshot_url, e));
                }
            };
            file.write_all(&chunk)
                .map_err(|e| SlurpyError::filesystem(tarball_path, "write failed", e))?;
            downloaded += chunk.len() as u64;
            pb.set_position(downloaded);
        }
        pb.finish_and_clear();

        debug!(bytes = downloaded, "snapshot downloaded");
        Ok(())
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        debug!(path = %path.display(), error = %e, "could not remove tarball");
    }
}

/// Unpack a gzip snapshot into `dest`; every entry must live under `<package_base>/`
pub fn extract_snapshot(tarball: &Path, dest: &Path, package_base: &str) -> SlurpyResult<()> {
    let extract_err = |message: String| SlurpyError::Extract {
        package: package_base.to_string(),
        message,
    };

    let file = fs::File::open(tarball).map_err(|e| extract_err(e.to_string()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries().map_err(|e| extract_err(e.to_string()))? {
        let mut entry = entry.map_err(|e| extract_err(e.to_string()))?;
        let path = entry
            .path()
            .map_err(|e| extract_err(e.to_string()))?
            .into_owned();

        // pax global headers carry no file data
        if entry.header().entry_type() == tar::EntryType::XGlobalHeader {
            continue;
        }

        let top = path.components().find(|c| !matches!(c, Component::CurDir));
        if top != Some(Component::Normal(OsStr::new(package_base))) {
            return Err(extract_err(format!(
                "archive entry '{}' is outside '{}/'",
                path.display(),
                package_base
            )));
        }

        let unpacked = entry.unpack_in(dest).map_err(|e| extract_err(e.to_string()))?;
        if !unpacked {
            return Err(extract_err(format!(
                "archive entry '{}' escapes the target directory",
                path.display()
            )));
        }
    }

    if !dest.join(package_base).is_dir() {
        return Err(extract_err(format!("archive does not contain '{}/'", package_base)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aur::client::tests::sample_package;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tarball_with(files: &[(&str, &str)]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap()
    }

    fn snapshot_bytes(package_base: &str) -> Vec<u8> {
        let pkgbuild = format!("pkgname={}\npkgver=1.0\npkgrel=1\n", package_base);
        let name = format!("{}/PKGBUILD", package_base);
        tarball_with(&[(name.as_str(), pkgbuild.as_str())])
    }

    fn test_config(save_to: &Path, base_url: &str) -> Config {
        let mut config = Config::default();
        config.save_to = save_to.to_path_buf();
        config.aur.base_url = base_url.to_string();
        config
    }

    #[test]
    fn test_extract_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("foo.tar.gz");
        fs::write(&tarball, snapshot_bytes("foo")).unwrap();

        extract_snapshot(&tarball, dir.path(), "foo").unwrap();
        let pkgbuild = fs::read_to_string(dir.path().join("foo/PKGBUILD")).unwrap();
        assert!(pkgbuild.contains("pkgname=foo"));
    }

    #[test]
    fn test_extract_requires_package_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("foo.tar.gz");
        fs::write(&tarball, snapshot_bytes("bar")).unwrap();

        assert!(matches!(
            extract_snapshot(&tarball, dir.path(), "foo"),
            Err(SlurpyError::Extract { .. })
        ));
    }

    #[test]
    fn test_extract_leaves_sibling_directories_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("bar")).unwrap();
        fs::write(dir.path().join("bar/PKGBUILD"), "user's own").unwrap();

        let tarball = dir.path().join("foo.tar.gz");
        fs::write(
            &tarball,
            tarball_with(&[("foo/PKGBUILD", "pkgname=foo\n"), ("bar/PKGBUILD", "replaced\n")]),
        )
        .unwrap();

        assert!(matches!(
            extract_snapshot(&tarball, dir.path(), "foo"),
            Err(SlurpyError::Extract { .. })
        ));
        assert_eq!(fs::read_to_string(dir.path().join("bar/PKGBUILD")).unwrap(), "user's own");
    }

    #[test]
    fn test_extract_rejects_top_level_files() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("foo.tar.gz");
        fs::write(&tarball, tarball_with(&[("foo/PKGBUILD", "x"), ("README", "y")])).unwrap();

        assert!(extract_snapshot(&tarball, dir.path(), "foo").is_err());
        assert!(!dir.path().join("README").exists());
    }

    #[test]
    fn test_extract_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("foo.tar.gz");
        fs::write(&tarball, b"<html>not found</html>").unwrap();

        assert!(extract_snapshot(&tarball, dir.path(), "foo").is_err());
    }

    #[tokio::test]
    async fn test_fetch_and_force() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgit/aur.git/snapshot/foo.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(snapshot_bytes("foo")))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), &server.uri());
        let pkg = sample_package("foo", "1.0-1");

        let downloader = Downloader::new(&config, false, true).unwrap();
        let extracted = downloader.fetch(&pkg).await.unwrap();
        assert_eq!(extracted, dir.path().join("foo"));
        assert!(extracted.join("PKGBUILD").is_file());
        // tarball is removed unless keep_tarball is set
        assert!(!dir.path().join("foo.tar.gz").exists());

        // second download without --force refuses to overwrite
        assert!(matches!(
            downloader.fetch(&pkg).await,
            Err(SlurpyError::TargetExists { .. })
        ));

        fs::write(extracted.join("stale"), "x").unwrap();
        let forced = Downloader::new(&config, true, true).unwrap();
        forced.fetch(&pkg).await.unwrap();
        assert!(!extracted.join("stale").exists());
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), &server.uri());
        config.keep_tarball = true;

        let downloader = Downloader::new(&config, false, true).unwrap();
        let err = downloader.fetch(&sample_package("foo", "1.0-1")).await.unwrap_err();
        assert!(matches!(err, SlurpyError::Network { status: Some(404), .. }));
        assert!(!dir.path().join("foo").exists());
    }

    #[tokio::test]
    async fn test_fetch_truncated_body_removes_tarball() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // advertises more bytes than it sends, then hangs up
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 4096\r\n\r\npartial")
                .await;
            let _ = socket.shutdown().await;
        });

        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path(), &format!("http://{}", addr));
        config.keep_tarball = true;

        let downloader = Downloader::new(&config, false, true).unwrap();
        let err = downloader.fetch(&sample_package("foo", "1.0-1")).await.unwrap_err();
        assert!(matches!(err, SlurpyError::Network { .. }));
        assert!(!dir.path().join("foo.tar.gz").exists());
        assert!(!dir.path().join("foo").exists());
    }
}
