pub mod client;
pub mod config;
pub mod content;
pub mod error;
pub mod shell;

pub use config::Config;
pub use content::{LocalInstallation, Updater, UpdaterSettings};
pub use error::UpdateError;
pub use shell::{ShellWindow, TerminalShell};
