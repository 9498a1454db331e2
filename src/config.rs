use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_GAME_URL: &str = "https://trimps.github.io/";
const DEFAULT_VERSION_URL: &str = "https://trimps.github.io/version.json";
const DEFAULT_ARCHIVE_URL: &str = "https://github.com/Trimps/Trimp/archive/refs/heads/master.zip";
const DEFAULT_ARCHIVE_SUBTREE: &str = "Trimp-master/docs";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote location shown while no local copy is installed
    pub game_url: String,

    /// JSON descriptor holding the latest published `version`
    pub version_url: String,

    /// Zip archive of the game content
    pub archive_url: String,

    /// Directory inside the archive that holds the deployable content
    pub archive_subtree: String,

    /// Where the game is installed (defaults to the platform data dir)
    pub data_dir: Option<PathBuf>,

    /// Poll for content updates while the shell is running
    pub auto_check: bool,

    pub poll_interval_secs: u64,
    pub startup_delay_secs: u64,
    pub remind_delay_secs: u64,
    pub request_timeout_secs: u64,

    /// GitHub "latest release" endpoint for the shell binary itself
    pub client_release_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_url: DEFAULT_GAME_URL.to_string(),
            version_url: DEFAULT_VERSION_URL.to_string(),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            archive_subtree: DEFAULT_ARCHIVE_SUBTREE.to_string(),
            data_dir: None,
            auto_check: true,
            poll_interval_secs: 60 * 60,
            startup_delay_secs: 10,
            remind_delay_secs: 60 * 60,
            request_timeout_secs: 30,
            client_release_url: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from an explicit path; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("remind_delay_secs", self.remind_delay_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            ensure!(secs > 0, "{} must be greater than 0", name);
        }
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("trimps")
            .join("config.toml")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("trimps")
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn remind_delay(&self) -> Duration {
        Duration::from_secs(self.remind_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(3600));
        assert_eq!(config.startup_delay(), Duration::from_secs(10));
        assert_eq!(config.archive_subtree, "Trimp-master/docs");
        assert!(config.auto_check);
        assert!(config.client_release_url.is_none());
    }

    #[test]
    fn test_partial_file_overrides_only_given_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "auto_check = false\npoll_interval_secs = 120\ndata_dir = \"/opt/trimps\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.auto_check);
        assert_eq!(config.poll_interval(), Duration::from_secs(120));
        assert_eq!(config.data_dir(), PathBuf::from("/opt/trimps"));
        assert_eq!(config.version_url, DEFAULT_VERSION_URL);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_secs = \"soon\"").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        fs::write(&path, "poll_interval_secs = 0\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("poll_interval_secs"));

        fs::write(&path, "remind_delay_secs = 0\n").unwrap();
        assert!(Config::load_from(&path).is_err());

        fs::write(&path, "startup_delay_secs = 0\n").unwrap();
        assert!(Config::load_from(&path).is_ok());
    }
}
