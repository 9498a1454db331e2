use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use semver::Version;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Version of the running shell
pub const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const USER_AGENT: &str = concat!("trimps-shell/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub body: Option<String>,
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    pub size: u64,
}

impl Release {
    pub fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }

    /// Archive built for the platform we are running on
    pub fn platform_asset(&self) -> Result<&Asset> {
        let expected = asset_name();
        self.assets
            .iter()
            .find(|a| a.name == expected)
            .ok_or_else(|| anyhow!("Release {} has no {}", self.tag_name, expected))
    }
}

/// Parse a release tag such as `v0.2.0`
pub fn parse_tag(tag: &str) -> Result<Version> {
    let cleaned = tag.trim().trim_start_matches('v');
    Version::parse(cleaned).map_err(|e| anyhow!("Invalid release tag '{}': {}", tag, e))
}

pub fn is_newer_release(tag: &str, current: &str) -> Result<bool> {
    Ok(parse_tag(tag)? > parse_tag(current)?)
}

pub fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().user_agent(USER_AGENT).build()?)
}

/// Latest published release, `None` when the repository has none yet
pub async fn fetch_latest(client: &reqwest::Client, url: &str) -> Result<Option<Release>> {
    let response = client
        .get(url)
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .context("Failed to fetch releases")?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(anyhow!("Release API error: {}", response.status()));
    }

    let release = response
        .json::<Release>()
        .await
        .context("Failed to parse release JSON")?;
    Ok(Some(release))
}

/// Stream `asset` into `dest`
pub async fn download_asset(client: &reqwest::Client, asset: &Asset, dest: &Path) -> Result<u64> {
    let response = client
        .get(&asset.browser_download_url)
        .send()
        .await
        .context("Failed to download asset")?;

    if !response.status().is_success() {
        return Err(anyhow!("Download failed: {}", response.status()));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .context("Failed to create download file")?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Download interrupted")?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;
    }
    file.flush().await?;

    if asset.size > 0 && downloaded != asset.size {
        return Err(anyhow!(
            "Downloaded {} bytes, expected {}",
            downloaded,
            asset.size
        ));
    }
    Ok(downloaded)
}

pub fn asset_name() -> String {
    let extension = if cfg!(windows) { ".zip" } else { ".tar.gz" };
    format!("trimps-{}{}", target_triple(), extension)
}

fn target_triple() -> &'static str {
    #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
    return "x86_64-apple-darwin";

    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    return "aarch64-apple-darwin";

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    return "x86_64-unknown-linux-gnu";

    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    return "aarch64-unknown-linux-gnu";

    #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
    return "x86_64-pc-windows-msvc";

    #[cfg(not(any(
        all(target_os = "macos", target_arch = "x86_64"),
        all(target_os = "macos", target_arch = "aarch64"),
        all(target_os = "linux", target_arch = "x86_64"),
        all(target_os = "linux", target_arch = "aarch64"),
        all(target_os = "windows", target_arch = "x86_64")
    )))]
    return "unknown";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(tag: &str, names: &[&str]) -> Release {
        Release {
            tag_name: tag.to_string(),
            name: None,
            body: None,
            assets: names
                .iter()
                .map(|n| Asset {
                    name: n.to_string(),
                    browser_download_url: format!("https://example.invalid/{}", n),
                    size: 10,
                })
                .collect(),
        }
    }

    #[test]
    fn test_parse_tag() {
        assert_eq!(parse_tag("v0.2.0").unwrap(), Version::new(0, 2, 0));
        assert_eq!(parse_tag("1.4.1").unwrap(), Version::new(1, 4, 1));
        assert!(parse_tag("nightly").is_err());
    }

    #[test]
    fn test_is_newer_release() {
        assert!(is_newer_release("v0.2.0", "0.1.9").unwrap());
        assert!(!is_newer_release("v0.1.0", "0.1.0").unwrap());
        assert!(!is_newer_release("0.0.9", "0.1.0").unwrap());
        assert!(is_newer_release("garbage", "0.1.0").is_err());
    }

    #[test]
    fn test_platform_asset() {
        let own = asset_name();
        let r = release("v0.2.0", &["trimps-other-triple.tar.gz", own.as_str()]);
        assert_eq!(r.platform_asset().unwrap().name, own);
        assert_eq!(r.version(), "0.2.0");

        let missing = release("v0.2.0", &["trimps-other-triple.tar.gz"]);
        assert!(missing.platform_asset().is_err());
    }

    #[test]
    fn test_release_json() {
        let json = r#"{
            "tag_name": "v0.3.0",
            "name": "0.3.0",
            "body": "notes",
            "html_url": "https://example.invalid/release",
            "assets": [{"name": "a.zip", "browser_download_url": "https://example.invalid/a.zip", "size": 42}]
        }"#;
        let r: Release = serde_json::from_str(json).unwrap();
        assert_eq!(r.assets[0].size, 42);
        assert_eq!(r.version(), "0.3.0");
    }
}
