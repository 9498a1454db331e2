pub mod fetcher;
pub mod installer;
pub mod session;
pub mod updater;
pub mod version;

#[cfg(test)]
pub(crate) mod test_support;

pub use fetcher::{ContentSource, HttpFetcher, VersionDescriptor};
pub use installer::{ArchiveInstaller, LocalInstallation};
pub use session::{SessionOutcome, UpdateSession};
pub use updater::{PollTimer, TimerAction, Updater, UpdaterSettings, UpdaterState};
pub use version::{is_newer_version, VersionString, VersionStore, DEFAULT_VERSION};
