use anyhow::{anyhow, Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::fetcher::parse_descriptor;
use super::version::VersionString;
use crate::shell::Location;

pub const VERSION_FILE: &str = "version.json";
pub const ROOT_DOCUMENT: &str = "index.html";
const ARCHIVE_FILE: &str = "update.zip";
const STAGING_DIR: &str = ".staging";

/// The installed game content under the data directory
#[derive(Debug, Clone)]
pub struct LocalInstallation {
    data_dir: PathBuf,
    subtree: PathBuf,
}

impl LocalInstallation {
    pub fn new(data_dir: impl Into<PathBuf>, subtree: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            subtree: subtree_path(subtree),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Subtree name as it appears inside the archive
    pub fn subtree(&self) -> &Path {
        &self.subtree
    }

    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join(&self.subtree)
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.content_dir().join(VERSION_FILE)
    }

    pub fn root_document(&self) -> PathBuf {
        self.content_dir().join(ROOT_DOCUMENT)
    }

    /// Scratch location for a download in progress
    pub fn archive_path(&self) -> PathBuf {
        self.data_dir.join(ARCHIVE_FILE)
    }

    pub fn is_installed(&self) -> bool {
        self.root_document().is_file()
    }

    /// Read the installed `version.json`
    pub fn read_version(&self) -> Result<VersionString> {
        let path = self.descriptor_path();
        let body = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let descriptor =
            parse_descriptor(&body).with_context(|| format!("Invalid {}", path.display()))?;
        Ok(descriptor.version)
    }

    /// Local content when it is servable, otherwise the remote game
    pub fn display_location(&self, game_url: &str) -> Location {
        if self.is_installed() {
            Location::Local(self.root_document())
        } else {
            Location::Remote(game_url.to_string())
        }
    }
}

fn subtree_path(subtree: &str) -> PathBuf {
    subtree
        .split('/')
        .filter(|part| !part.is_empty())
        .collect()
}

pub struct ArchiveInstaller;

impl ArchiveInstaller {
    /// Extract `subtree` of `archive` into `dest_root`, keeping in-archive paths.
    ///
    /// Nothing in `dest_root` is touched until the whole subtree has been staged.
    pub fn install(archive: &Path, dest_root: &Path, subtree: &str) -> bool {
        match Self::try_install(archive, dest_root, &subtree_path(subtree)) {
            Ok(count) => {
                log::info!("Installed {} files from {}", count, archive.display());
                true
            }
            Err(e) => {
                log::warn!("Extraction of {} failed: {:#}", archive.display(), e);
                false
            }
        }
    }

    fn try_install(archive: &Path, dest_root: &Path, subtree: &Path) -> Result<usize> {
        fs::create_dir_all(dest_root)?;
        let staging = StagingDir::create(dest_root.join(STAGING_DIR))?;

        let count = extract_subtree(archive, staging.path(), subtree)?;
        if count == 0 {
            return Err(anyhow!("'{}' not found in archive", subtree.display()));
        }

        promote(staging.path(), dest_root)?;
        Ok(count)
    }
}

fn extract_subtree(archive_path: &Path, staging: &Path, subtree: &Path) -> Result<usize> {
    let file = File::open(archive_path).context("Failed to open archive")?;
    let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;
    let mut count = 0;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;

        let Some(name) = entry.enclosed_name() else {
            log::debug!("Skipping unsafe entry {}", entry.name());
            continue;
        };
        if !name.starts_with(subtree) {
            continue;
        }

        let target = staging.join(&name);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        count += 1;
    }

    Ok(count)
}

/// Move staged files over the destination, replacing what is there
fn promote(staging: &Path, dest_root: &Path) -> Result<()> {
    let entries = WalkDir::new(staging)
        .min_depth(1)
        .into_iter()
        .collect::<walkdir::Result<Vec<_>>>()?;

    for entry in entries {
        let relative = entry.path().strip_prefix(staging)?;
        let target = dest_root.join(relative);

        if entry.file_type().is_dir() {
            if target.is_file() {
                fs::remove_file(&target)?;
            }
            fs::create_dir_all(&target)?;
        } else {
            if target.is_dir() {
                fs::remove_dir_all(&target)?;
            }
            fs::rename(entry.path(), &target)
                .with_context(|| format!("Failed to replace {}", target.display()))?;
        }
    }
    Ok(())
}

struct StagingDir(PathBuf);

impl StagingDir {
    fn create(path: PathBuf) -> Result<Self> {
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}
