pub mod install;
pub mod release;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::shell::{ask, Dialog, ShellWindow};

pub use release::{Release, CURRENT_VERSION};

/// A newer shell binary unpacked and ready to be swapped in
#[derive(Debug)]
pub struct StagedClient {
    pub version: String,
    pub binary: PathBuf,
}

/// Newer release of the shell, if the release endpoint is configured and has one
pub async fn check_for_update(config: &Config) -> Result<Option<Release>> {
    let Some(url) = config.client_release_url.as_deref() else {
        log::debug!("No client release endpoint configured");
        return Ok(None);
    };

    let client = release::http_client()?;
    let Some(latest) = release::fetch_latest(&client, url).await? else {
        return Ok(None);
    };

    if release::is_newer_release(&latest.tag_name, CURRENT_VERSION)? {
        log::info!("Client update available: {} -> {}", CURRENT_VERSION, latest.version());
        Ok(Some(latest))
    } else {
        Ok(None)
    }
}

/// Download and unpack the platform build of `latest`
pub async fn stage(latest: &Release) -> Result<StagedClient> {
    let asset = latest.platform_asset()?;
    install::cleanup_staging()?;
    let staging = install::staging_dir();
    tokio::fs::create_dir_all(&staging).await?;

    let archive_path = staging.join(&asset.name);
    let client = release::http_client()?;
    release::download_asset(&client, asset, &archive_path).await?;

    let unpack_dir = staging.join("unpacked");
    let binary =
        tokio::task::spawn_blocking(move || install::unpack(&archive_path, &unpack_dir)).await??;

    Ok(StagedClient {
        version: latest.version().to_string(),
        binary,
    })
}

impl StagedClient {
    /// Replace the running executable and return its path
    pub fn install(&self) -> Result<PathBuf> {
        let current = std::env::current_exe().context("Failed to get current executable path")?;
        install::replace_executable(&self.binary, &current)?;
        if let Err(e) = install::cleanup_staging() {
            log::debug!("Leaving client staging dir behind: {}", e);
        }
        Ok(current)
    }
}

/// Ask whether to restart into `staged` now; `Later` keeps the running binary
pub async fn offer_restart<W: ShellWindow + ?Sized>(shell: &W, staged: &StagedClient) -> bool {
    let dialog = Dialog::ClientUpdateReady {
        version: staged.version.clone(),
    };
    ask(shell, &dialog).await == 0
}

/// Start the freshly installed shell
pub fn relaunch(executable: &Path) -> Result<()> {
    std::process::Command::new(executable)
        .args(std::env::args_os().skip(1))
        .spawn()
        .with_context(|| format!("Failed to relaunch {}", executable.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_endpoint_skips_check() {
        let config = Config::default();
        assert!(check_for_update(&config).await.unwrap().is_none());
    }
}
