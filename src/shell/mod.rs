pub mod terminal;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

pub use terminal::TerminalShell;

const APP_TITLE: &str = "Trimps";

/// What the shell is asked to display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote(String),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "file://{}", path.display()),
            Location::Remote(url) => f.write_str(url),
        }
    }
}

/// Status pushed into the displayed content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Loading-screen line, replaces the previous one
    Status(String),
    /// Titled message shown over the running game
    Toast { title: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLifecycle {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Info,
    Error,
}

/// Modal questions the updater can ask
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    UpdateAvailable { version: String },
    UpdateFailed,
    ReloadAfterUpdate,
    ClientUpdateReady { version: String },
}

impl Dialog {
    pub fn title(&self) -> String {
        match self {
            Dialog::UpdateAvailable { .. } => format!("{} - Update available!", APP_TITLE),
            Dialog::UpdateFailed => format!("{} - Update failed!", APP_TITLE),
            Dialog::ReloadAfterUpdate => format!("{} - Update success!", APP_TITLE),
            Dialog::ClientUpdateReady { .. } => {
                format!("{} - Client Update Available!", APP_TITLE)
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Dialog::UpdateAvailable { version } => format!(
                "There is a new update available (v{}),\nwould you like to download it now?",
                version
            ),
            Dialog::UpdateFailed => {
                "Failed to download or extract the update,\nwould you like to retry?".to_string()
            }
            Dialog::ReloadAfterUpdate => {
                "Successfully updated,\nwould you like to reload the page now?".to_string()
            }
            Dialog::ClientUpdateReady { version } => format!(
                "A new client version (v{}) is ready,\nwould you like to install it now?",
                version
            ),
        }
    }

    pub fn buttons(&self) -> &'static [&'static str] {
        match self {
            Dialog::UpdateAvailable { .. } => &["Update Now", "Remind Me", "No (disable check)"],
            Dialog::UpdateFailed | Dialog::ReloadAfterUpdate => &["Yes", "No"],
            Dialog::ClientUpdateReady { .. } => &["Restart App Now", "Later"],
        }
    }

    pub fn kind(&self) -> DialogKind {
        match self {
            Dialog::UpdateFailed => DialogKind::Error,
            _ => DialogKind::Info,
        }
    }

    /// Index answered when the prompt itself cannot be shown
    pub fn decline_index(&self) -> usize {
        self.buttons().len() - 1
    }
}

/// The window hosting the game, as seen by the updater
#[async_trait(?Send)]
pub trait ShellWindow {
    async fn notify(&self, notice: &Notice) -> Result<()>;

    async fn load(&self, location: &Location) -> Result<()>;

    /// Show `dialog` and wait for the index of the chosen button
    async fn prompt(&self, dialog: &Dialog) -> Result<usize>;

    fn lifecycle(&self) -> WindowLifecycle;

    fn is_closed(&self) -> bool {
        self.lifecycle() != WindowLifecycle::Open
    }
}

/// Push a notice, ignoring failures: the window may legitimately be gone
pub async fn notify_best_effort<W: ShellWindow + ?Sized>(shell: &W, notice: Notice) {
    if let Err(e) = shell.notify(&notice).await {
        log::trace!("Dropped notice {:?}: {}", notice, e);
    }
}

/// Navigate, ignoring failures for the same reason as [`notify_best_effort`]
pub async fn load_best_effort<W: ShellWindow + ?Sized>(shell: &W, location: &Location) {
    if let Err(e) = shell.load(location).await {
        log::trace!("Could not load {}: {}", location, e);
    }
}

/// Ask `dialog`, falling back to its declining answer when it cannot be shown
pub async fn ask<W: ShellWindow + ?Sized>(shell: &W, dialog: &Dialog) -> usize {
    match shell.prompt(dialog).await {
        Ok(index) if index < dialog.buttons().len() => index,
        Ok(index) => {
            log::debug!("Out of range answer {} to '{}'", index, dialog.title());
            dialog.decline_index()
        }
        Err(e) => {
            log::debug!("Prompt '{}' unavailable: {}", dialog.title(), e);
            dialog.decline_index()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dialog_buttons() {
        let available = Dialog::UpdateAvailable {
            version: "5.9.2".into(),
        };
        assert_eq!(available.buttons().len(), 3);
        assert_eq!(available.decline_index(), 2);
        assert!(available.message().contains("v5.9.2"));
        assert_eq!(Dialog::UpdateFailed.kind(), DialogKind::Error);
        assert_eq!(Dialog::ReloadAfterUpdate.decline_index(), 1);
    }

    #[test]
    fn test_location_display() {
        assert_eq!(
            Location::Remote("https://trimps.github.io/".into()).to_string(),
            "https://trimps.github.io/"
        );
        assert_eq!(
            Location::Local(PathBuf::from("/data/index.html")).to_string(),
            "file:///data/index.html"
        );
    }
}
