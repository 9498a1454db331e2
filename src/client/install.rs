use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

const BINARY_NAME: &str = if cfg!(windows) { "trimps.exe" } else { "trimps" };

/// Unpack a release archive and return the shell binary inside it
pub fn unpack(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)?;
    let file = File::open(archive_path).context("Failed to open client archive")?;

    if archive_path.to_string_lossy().ends_with(".tar.gz") {
        let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        archive.unpack(dest_dir).context("Failed to extract tar.gz")?;
    } else if archive_path.extension().is_some_and(|e| e == "zip") {
        let mut archive = zip::ZipArchive::new(file).context("Failed to read zip archive")?;
        archive.extract(dest_dir).context("Failed to extract zip")?;
    } else {
        return Err(anyhow!("Unknown archive format: {}", archive_path.display()));
    }

    find_binary(dest_dir)
}

/// Look for the binary at the top level or one directory down
fn find_binary(dir: &Path) -> Result<PathBuf> {
    let direct = dir.join(BINARY_NAME);
    if direct.is_file() {
        return Ok(direct);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            let nested = path.join(BINARY_NAME);
            if nested.is_file() {
                return Ok(nested);
            }
        }
    }

    Err(anyhow!("'{}' not found in client archive", BINARY_NAME))
}

/// Swap `new_binary` in for `target`; on Windows the old one is kept as `.bak`
pub fn replace_executable(new_binary: &Path, target: &Path) -> Result<()> {
    #[cfg(windows)]
    {
        let backup = target.with_extension("exe.bak");
        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        fs::rename(target, &backup).context("Failed to move running binary aside")?;
    }

    // Copy next to the target first so the final step is a rename
    let incoming = target.with_extension("new");
    fs::copy(new_binary, &incoming).context("Failed to copy new binary")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&incoming)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&incoming, perms)?;
    }

    fs::rename(&incoming, target).context("Failed to install new binary")?;
    Ok(())
}

pub fn staging_dir() -> PathBuf {
    std::env::temp_dir().join("trimps-client-update")
}

pub fn cleanup_staging() -> Result<()> {
    let dir = staging_dir();
    if dir.exists() {
        fs::remove_dir_all(&dir)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    fn tar_gz_with_binary(dir: &Path, nested: bool) -> PathBuf {
        let path = dir.join("trimps-test.tar.gz");
        let encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let contents = b"#!/bin/sh\necho trimps\n";
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        let name = if nested {
            format!("trimps-release/{}", BINARY_NAME)
        } else {
            BINARY_NAME.to_string()
        };
        builder.append_data(&mut header, name, &contents[..]).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn test_unpack_tar_gz_top_level() {
        let dir = tempdir().unwrap();
        let archive = tar_gz_with_binary(dir.path(), false);
        let binary = unpack(&archive, &dir.path().join("out")).unwrap();
        assert_eq!(binary, dir.path().join("out").join(BINARY_NAME));
    }

    #[test]
    fn test_unpack_tar_gz_nested() {
        let dir = tempdir().unwrap();
        let archive = tar_gz_with_binary(dir.path(), true);
        let binary = unpack(&archive, &dir.path().join("out")).unwrap();
        assert!(binary.ends_with(Path::new("trimps-release").join(BINARY_NAME)));
    }

    #[test]
    fn test_unpack_unknown_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trimps.rar");
        fs::write(&path, b"rar").unwrap();
        assert!(unpack(&path, &dir.path().join("out")).is_err());
    }

    #[test]
    fn test_replace_executable() {
        let dir = tempdir().unwrap();
        let target = dir.path().join(BINARY_NAME);
        let new_binary = dir.path().join("downloaded");
        fs::write(&target, b"old").unwrap();
        fs::write(&new_binary, b"new").unwrap();

        replace_executable(&new_binary, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        assert!(!target.with_extension("new").exists());
    }
}
